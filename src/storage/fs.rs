//! Filesystem-backed token file store.

use crate::core::{FileStoreError, SecureString};
use crate::traits::TokenFileStore;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;

/// Token file store writing through `tokio::fs`.
///
/// Writes create missing parent directories, since the per-session secret
/// directory may not exist yet when the first token lands.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsTokenFileStore;

impl FsTokenFileStore {
    /// Create a filesystem store.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TokenFileStore for FsTokenFileStore {
    async fn write(&self, path: &Path, token: &SecureString) -> Result<(), FileStoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| FileStoreError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        fs::write(path, token.expose().as_bytes())
            .await
            .map_err(|source| FileStoreError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn read(&self, path: &Path) -> Result<String, FileStoreError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| FileStoreError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(content.trim_end().to_string())
    }

    async fn delete(&self, path: &Path) -> Result<(), FileStoreError> {
        fs::remove_file(path)
            .await
            .map_err(|source| FileStoreError::Delete {
                path: path.to_path_buf(),
                source,
            })
    }
}
