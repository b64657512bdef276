//! Blob storage for uploaded chat images.
//!
//! Persisting an image is best-effort: the chat gateway logs and swallows
//! every storage error. The local implementation writes under the configured
//! media root and returns URLs served by the `/media` route.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod local;

pub use local::LocalBlobStore;

use crate::error::Result;
use async_trait::async_trait;

/// A persisted blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub url: String,
}

/// Byte persistence returning a retrievable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a name derived from `suggested_name`. The final
    /// name may differ to avoid overwriting an existing blob.
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<StoredAsset>;
}
