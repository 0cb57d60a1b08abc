//! Fallback durable-store backend: one JSON file per harness, written
//! atomically via a temp-file-then-rename.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{DurableStore, PersistedDocument, StoreError};

/// File-backed fallback store. Used when the primary (Postgres) store is
/// unavailable.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, harness_id: &str) -> PathBuf {
        self.dir.join(format!("{harness_id}.json"))
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn persist(&self, harness_id: &str, doc: &PersistedDocument) -> Result<(), StoreError> {
        self.ensure_dir().await?;
        let bytes = serde_json::to_vec_pretty(&doc.json)?;

        let tmp_path = self.dir.join(format!("{harness_id}.json.tmp"));
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, self.path_for(harness_id)).await?;
        Ok(())
    }

    async fn restore(&self, harness_id: &str) -> Result<Option<PersistedDocument>, StoreError> {
        let path = self.path_for(harness_id);
        if !Path::new(&path).exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).await?;
        let json: serde_json::Value = serde_json::from_slice(&bytes)?;
        let doc = PersistedDocument::new(json)?;
        Ok(Some(doc))
    }

    async fn delete(&self, harness_id: &str) -> Result<(), StoreError> {
        let path = self.path_for(harness_id);
        if Path::new(&path).exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_dir().await?;
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name.strip_suffix(".json") {
                    ids.push(id.to_owned());
                }
            }
        }
        Ok(ids)
    }

    async fn is_available(&self) -> bool {
        self.ensure_dir().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn persist_then_restore_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let doc = PersistedDocument::new(json!({"schemaVersion": 1, "harnessId": "h-1"})).unwrap();
        store.persist("h-1", &doc).await.unwrap();

        let restored = store.restore("h-1").await.unwrap().unwrap();
        assert_eq!(restored.json, doc.json);
        assert_eq!(restored.schema_version, 1);
    }

    #[tokio::test]
    async fn restore_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.restore("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let doc = PersistedDocument::new(json!({"schemaVersion": 1})).unwrap();
        store.persist("h-2", &doc).await.unwrap();
        store.delete("h-2").await.unwrap();
        assert!(store.restore("h-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_ids_returns_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let doc = PersistedDocument::new(json!({"schemaVersion": 1})).unwrap();
        store.persist("h-a", &doc).await.unwrap();
        store.persist("h-b", &doc).await.unwrap();

        let mut ids = store.list_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["h-a".to_owned(), "h-b".to_owned()]);
    }
}
