//! InMemoryDocumentStore - development and test store.
//!
//! One mutex over the whole map, so every transaction is serialised. Failure
//! injection is per collection.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::domain::MutationError;
use crate::ports::{DocPath, DocumentStore, StoreError, TxUpdate};

#[derive(Default)]
struct Inner {
    docs: BTreeMap<DocPath, Value>,
    failing: HashSet<String>,
    touched: HashMap<String, usize>,
}

impl Inner {
    fn access(&mut self, collection: &str) -> Result<(), StoreError> {
        *self.touched.entry(collection.to_string()).or_default() += 1;
        if self.failing.contains(collection) {
            return Err(StoreError::Unavailable(format!(
                "injected failure on collection '{collection}'"
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a document without counting it as an access.
    pub fn insert(&self, path: DocPath, value: Value) {
        self.lock().docs.insert(path, value);
    }

    /// Peek at a document without counting it as an access.
    pub fn snapshot(&self, path: &DocPath) -> Option<Value> {
        self.lock().docs.get(path).cloned()
    }

    /// Make every operation on `collection` fail until [`restore`](Self::restore).
    pub fn fail_collection(&self, collection: &str) {
        self.lock().failing.insert(collection.to_string());
    }

    pub fn restore(&self, collection: &str) {
        self.lock().failing.remove(collection);
    }

    /// Number of operations issued against a collection, failed ones included.
    pub fn access_count(&self, collection: &str) -> usize {
        self.lock().touched.get(collection).copied().unwrap_or(0)
    }
}

fn shallow_merge(existing: Option<Value>, fields: Value) -> Value {
    match (existing, fields) {
        (Some(Value::Object(mut base)), Value::Object(patch)) => {
            base.extend(patch);
            Value::Object(base)
        }
        (_, fields) => fields,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        let mut inner = self.lock();
        inner.access(&path.collection)?;
        Ok(inner.docs.get(path).cloned())
    }

    async fn set(&self, path: &DocPath, value: Value) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.access(&path.collection)?;
        inner.docs.insert(path.clone(), value);
        Ok(())
    }

    async fn merge(&self, path: &DocPath, fields: Value) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.access(&path.collection)?;
        let existing = inner.docs.remove(path);
        inner.docs.insert(path.clone(), shallow_merge(existing, fields));
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let mut inner = self.lock();
        inner.access(collection)?;
        Ok(inner
            .docs
            .iter()
            .filter(|(path, _)| path.collection == collection)
            .map(|(path, value)| (path.id.clone(), value.clone()))
            .collect())
    }

    async fn transaction(
        &self,
        path: &DocPath,
        update: TxUpdate<'_>,
    ) -> Result<Option<Value>, MutationError> {
        let mut inner = self.lock();
        inner.access(&path.collection)?;
        let current = inner.docs.get(path).cloned();
        match update(current.as_ref())? {
            Some(next) => {
                inner.docs.insert(path.clone(), next.clone());
                Ok(Some(next))
            }
            None => Ok(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn merge_keeps_untouched_fields() {
        let store = InMemoryDocumentStore::new();
        let path = DocPath::new("teams", "t1");
        store.set(&path, json!({"a": 1, "b": 2})).await.unwrap();
        store.merge(&path, json!({"b": 3, "c": 4})).await.unwrap();
        assert_eq!(
            store.get(&path).await.unwrap(),
            Some(json!({"a": 1, "b": 3, "c": 4}))
        );
    }

    #[tokio::test]
    async fn injected_failures_are_scoped_to_a_collection() {
        let store = InMemoryDocumentStore::new();
        store.fail_collection("teams");
        assert!(store.list("teams").await.is_err());
        assert!(store.get(&DocPath::new("schedule", "today")).await.is_ok());
        assert_eq!(store.access_count("teams"), 1);

        store.restore("teams");
        assert!(store.list("teams").await.is_ok());
    }

    #[tokio::test]
    async fn aborted_transaction_writes_nothing() {
        let store = InMemoryDocumentStore::new();
        let path = DocPath::new("rateLimits", "u1");
        let result = store
            .transaction(&path, &|_| Err(MutationError::local_rate_limit("no", 60)))
            .await;
        assert!(result.is_err());
        assert_eq!(store.snapshot(&path), None);
    }

    #[tokio::test]
    async fn concurrent_transactions_do_not_lose_updates() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let path = DocPath::new("counters", "c");
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                store
                    .transaction(&path, &|current| {
                        let n = current.and_then(Value::as_u64).unwrap_or(0);
                        Ok(Some(json!(n + 1)))
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.snapshot(&path), Some(json!(16)));
    }
}
