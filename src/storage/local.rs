// Local filesystem blob store
// Author: kelexine (https://github.com/kelexine)

use super::{BlobStore, StoredAsset};
use crate::config::UploadConfig;
use crate::error::{ChatError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const FALLBACK_NAME: &str = "upload";
const MAX_NAME_ATTEMPTS: usize = 8;

/// Writes blobs to `<media_root>/<upload_dir>/` and serves them from
/// `<media_url><upload_dir>/`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    upload_dir: String,
    media_url: String,
}

impl LocalBlobStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            root: PathBuf::from(&config.media_root),
            upload_dir: config.upload_dir.trim_matches('/').to_string(),
            media_url: config.media_url.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn url_for(&self, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.media_url.trim_end_matches('/'),
            self.upload_dir,
            file_name
        )
    }
}

/// Reduce a client-supplied name to a safe base file name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// `cat.png` -> `cat_1a2b3c4d.png`
fn with_random_suffix(name: &str) -> String {
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, suffix, ext),
        _ => format!("{}_{}", name, suffix),
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<StoredAsset> {
        let dir = self.root.join(&self.upload_dir);
        tokio::fs::create_dir_all(&dir).await?;

        let base_name = sanitize_file_name(suggested_name);
        let mut file_name = base_name.clone();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = dir.join(&file_name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    debug!("Stored {} bytes at {}", bytes.len(), path.display());
                    return Ok(StoredAsset {
                        url: self.url_for(&file_name),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    file_name = with_random_suffix(&base_name);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ChatError::Storage(format!(
            "Could not find a free name for {}",
            base_name
        )))
    }
}
