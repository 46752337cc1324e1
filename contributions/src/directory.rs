//! Gift-list ownership lookup
//!
//! List content lives with the host; the recorder only needs to know who
//! owns a list. The lookup is an explicit injected collaborator rather
//! than an ambient query against the host's content store.

use async_trait::async_trait;
use ledger_core::UserId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Resolves a gift list to its owning account
#[async_trait]
pub trait ListDirectory: Send + Sync {
    /// The owner of a list, or `None` when the list does not exist
    async fn owner_of(&self, list_id: u64) -> Option<UserId>;
}

/// Map-backed directory for tests and simple embeddings
#[derive(Debug, Default)]
pub struct StaticListDirectory {
    owners: RwLock<HashMap<u64, UserId>>,
}

impl StaticListDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a list owner
    pub fn insert(&self, list_id: u64, owner: UserId) {
        self.owners.write().insert(list_id, owner);
    }
}

#[async_trait]
impl ListDirectory for StaticListDirectory {
    async fn owner_of(&self, list_id: u64) -> Option<UserId> {
        self.owners.read().get(&list_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_lookup() {
        let directory = StaticListDirectory::new();
        directory.insert(12, UserId::new(7));

        assert_eq!(directory.owner_of(12).await, Some(UserId::new(7)));
        assert_eq!(directory.owner_of(99).await, None);
    }
}
