use crate::traits::KVStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// A `KVStore` over a single JSON document on disk: the whole document is
/// read on first access and rewritten whole on every `set`, the same
/// load/rewrite-whole-file idiom the reference wallet uses for its keys file.
pub struct FileKvStore {
    path: PathBuf,
    document: Mutex<Option<HashMap<String, Value>>>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), document: Mutex::new(None) }
    }

    async fn load(&self) -> HashMap<String, Value> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    async fn persist(&self, document: &HashMap<String, Value>) {
        if let Some(parent) = self.path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Ok(serialized) = serde_json::to_string_pretty(document) {
            let _ = tokio::fs::write(&self.path, serialized).await;
        }
    }
}

#[async_trait]
impl KVStore for FileKvStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut guard = self.document.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        guard.as_ref().and_then(|doc| doc.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) {
        let mut guard = self.document.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let doc = guard.as_mut().expect("document hydrated above");
        doc.insert(key.to_string(), value);
        self.persist(doc).await;
    }

    async fn remove(&self, key: &str) {
        let mut guard = self.document.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let doc = guard.as_mut().expect("document hydrated above");
        doc.remove(key);
        self.persist(doc).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(dir.path().join("kv.json"));

        assert_eq!(store.get("k").await, None);
        store.set("k", json!({"a": 1})).await;
        assert_eq!(store.get("k").await, Some(json!({"a": 1})));
        store.remove("k").await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn survives_a_fresh_instance_over_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");

        let store = FileKvStore::new(&path);
        store.set("rpc.health.v1", json!({"https://a": {}})).await;
        drop(store);

        let reopened = FileKvStore::new(&path);
        assert_eq!(reopened.get("rpc.health.v1").await, Some(json!({"https://a": {}})));
    }
}
