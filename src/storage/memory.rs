//! In-memory materialization ledger.

use crate::core::{CredentialUsage, LedgerError, MaterialKey};
use crate::traits::MaterialLedger;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory implementation of [`MaterialLedger`].
///
/// Suitable for tests and single-node deployments; production clusters
/// back the ledger with a shared table so all nodes see the same rows.
pub struct MemoryLedger {
    rows: Arc<DashMap<MaterialKey, ()>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Arc::new(DashMap::new()),
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the ledger has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl MaterialLedger for MemoryLedger {
    async fn exists(&self, key: &MaterialKey) -> Result<bool, LedgerError> {
        Ok(self.rows.contains_key(key))
    }

    async fn persist(&self, key: &MaterialKey) -> Result<(), LedgerError> {
        self.rows.insert(*key, ());
        Ok(())
    }

    async fn delete(&self, key: &MaterialKey) -> Result<(), LedgerError> {
        self.rows.remove(key);
        Ok(())
    }

    async fn find_all_by_usage(
        &self,
        usage: CredentialUsage,
    ) -> Result<Vec<MaterialKey>, LedgerError> {
        Ok(self
            .rows
            .iter()
            .map(|entry| *entry.key())
            .filter(|key| key.usage == usage)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ProjectId, UserId};

    fn key(project: i32, user: i32) -> MaterialKey {
        MaterialKey::new(ProjectId(project), UserId(user), CredentialUsage::Notebook)
    }

    #[tokio::test]
    async fn persist_exists_delete() {
        let ledger = MemoryLedger::new();
        let k = key(1, 7);

        assert!(!ledger.exists(&k).await.unwrap());
        ledger.persist(&k).await.unwrap();
        assert!(ledger.exists(&k).await.unwrap());

        ledger.delete(&k).await.unwrap();
        assert!(!ledger.exists(&k).await.unwrap());
        // Deleting an absent row is not an error.
        ledger.delete(&k).await.unwrap();
    }

    #[tokio::test]
    async fn find_all_filters_by_usage() {
        let ledger = MemoryLedger::new();
        ledger.persist(&key(1, 7)).await.unwrap();
        ledger.persist(&key(2, 8)).await.unwrap();

        let rows = ledger
            .find_all_by_usage(CredentialUsage::Notebook)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
