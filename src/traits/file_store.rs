use crate::core::{FileStoreError, SecureString};
use async_trait::async_trait;
use std::path::Path;

/// Durable on-disk shadow of a credential's token value.
///
/// The file at a session's token path is read by the sandboxed process;
/// it is never the source of truth — the ledger row is.
#[async_trait]
pub trait TokenFileStore: Send + Sync {
    /// Write the token at `path`, replacing any stale content.
    async fn write(&self, path: &Path, token: &SecureString) -> Result<(), FileStoreError>;

    /// Read the token stored at `path`.
    async fn read(&self, path: &Path) -> Result<String, FileStoreError>;

    /// Delete the token file at `path` (best-effort for callers).
    async fn delete(&self, path: &Path) -> Result<(), FileStoreError>;
}
