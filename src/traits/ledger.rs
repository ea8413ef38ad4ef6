use crate::core::{CredentialUsage, LedgerError, MaterialKey};
use async_trait::async_trait;

/// Persisted idempotency registry of attempted materializations.
///
/// A row's existence means a materialization was *attempted* for its key;
/// it does not guarantee a live in-memory record exists. Rows are written
/// before the signer is invoked so recovery never misses an attempted
/// issuance, and deleted on confirmed cleanup or when recovery gives up.
#[async_trait]
pub trait MaterialLedger: Send + Sync {
    /// Whether a row exists for the key.
    async fn exists(&self, key: &MaterialKey) -> Result<bool, LedgerError>;

    /// Persist a row for the key.
    async fn persist(&self, key: &MaterialKey) -> Result<(), LedgerError>;

    /// Delete the row for the key. Deleting an absent row is not an error.
    async fn delete(&self, key: &MaterialKey) -> Result<(), LedgerError>;

    /// All rows recorded for the given usage.
    async fn find_all_by_usage(
        &self,
        usage: CredentialUsage,
    ) -> Result<Vec<MaterialKey>, LedgerError>;
}
