use std::collections::HashMap;

use {async_trait::async_trait, tokio::sync::RwLock, uuid::Uuid};

use crate::store::{Identity, IdentityStore, StoreError};

#[derive(Default)]
struct Tables {
    by_token: HashMap<Uuid, Identity>,
    /// name → token
    by_name: HashMap<String, Uuid>,
}

/// Process-local identity store. Records are lost on restart.
#[derive(Default)]
pub struct MemoryIdentityStore {
    tables: RwLock<Tables>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn insert(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.by_name.contains_key(&identity.name) {
            return Err(StoreError::NameTaken);
        }
        tables
            .by_name
            .insert(identity.name.clone(), identity.token);
        tables.by_token.insert(identity.token, identity.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Identity>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_name
            .get(name)
            .and_then(|token| tables.by_token.get(token))
            .cloned())
    }

    async fn find_by_token(&self, token: &Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.tables.read().await.by_token.get(token).cloned())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn insert_and_lookup() {
        let store = MemoryIdentityStore::new();
        let id = Identity::new("alice", "h");
        store.insert(&id).await.unwrap();
        assert_eq!(store.find_by_token(&id.token).await.unwrap(), Some(id.clone()));
        assert_eq!(store.find_by_name("alice").await.unwrap(), Some(id));
        assert!(store.find_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_inserts_of_one_name_admit_exactly_one() {
        let store = Arc::new(MemoryIdentityStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert(&Identity::new("dupe", format!("h{i}"))).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(StoreError::NameTaken) => {},
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
    }
}
