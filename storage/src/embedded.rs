//! The in-process reference Store Manager backend: one WAL-backed space per
//! space key, documents indexed both by internal key (for the WAL/ANN index)
//! and by their external stable id (for delete-before-add upsert and
//! fingerprint-cache lookups).
//!
//! This is the "ambient stack still ships one in-process reference backend"
//! variant — a real deployment is expected to point `VECTOR_STORE` at
//! `postgres` or a true vector database, but this backend must work
//! correctly and durably on its own.

use crate::index::LinearAnnIndex;
use crate::store_manager::{QueryFilter, ScoredDocument, StoreError, StoreManager};
use crate::wal::Wal;
use async_trait::async_trait;
use ragserver_core::metadata::{keys, FileFingerprint};
use ragserver_core::model::{Document, Payload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Serialize, Deserialize)]
enum WalRecord {
    Upsert {
        internal_id: u64,
        external_id: String,
        document: Document,
        vector: Vec<f32>,
    },
    Delete {
        internal_id: u64,
    },
}

struct StoredDocument {
    document: Document,
    vector: Vec<f32>,
}

struct SpaceState {
    wal: Mutex<Wal>,
    documents: RwLock<HashMap<u64, StoredDocument>>,
    id_index: RwLock<HashMap<String, u64>>,
    ann: RwLock<LinearAnnIndex>,
    fingerprint_cache: RwLock<HashMap<String, FileFingerprint>>,
}

/// Derives the WAL/ANN-internal key from a UUIDv5 stable id: the first 8
/// bytes of its 16-byte form, read little-endian. Never observable outside
/// this module.
fn internal_id(external_id: &str) -> u64 {
    let parsed = uuid::Uuid::parse_str(external_id).unwrap_or(uuid::Uuid::nil());
    let bytes = parsed.as_bytes();
    u64::from_le_bytes(bytes[..8].try_into().unwrap())
}

pub struct EmbeddedStoreManager {
    data_dir: PathBuf,
    load_limit: usize,
    spaces: RwLock<HashMap<String, Arc<SpaceState>>>,
    active: RwLock<Option<String>>,
}

impl EmbeddedStoreManager {
    pub fn new(data_dir: impl Into<PathBuf>, load_limit: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            load_limit: load_limit.max(1),
            spaces: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
        }
    }

    fn wal_path(&self, space_key: &str) -> PathBuf {
        self.data_dir.join(space_key).join("wal.log")
    }

    async fn open_space(&self, space_key: &str) -> Result<Arc<SpaceState>, StoreError> {
        if let Some(existing) = self.spaces.read().await.get(space_key) {
            return Ok(existing.clone());
        }

        let mut spaces = self.spaces.write().await;
        if let Some(existing) = spaces.get(space_key) {
            return Ok(existing.clone());
        }

        let path = self.wal_path(space_key);
        let mut wal = Wal::open(&path).await.map_err(|e| StoreError::Wal(e.to_string()))?;

        let mut documents = HashMap::new();
        let mut id_index = HashMap::new();
        let mut ann = LinearAnnIndex::new();
        let mut fingerprint_cache = HashMap::new();

        wal.replay(|_lsn, bytes| {
            let record: WalRecord = serde_json::from_slice(&bytes)
                .map_err(|_| crate::wal::WalError::CorruptEntry)?;
            match record {
                WalRecord::Upsert {
                    internal_id,
                    external_id,
                    document,
                    vector,
                } => {
                    if fingerprint_cache.len() < self.load_limit {
                        if let Some(source) = document.source() {
                            if let Some(fp) = FileFingerprint::from_metadata(document.metadata()) {
                                fingerprint_cache.insert(source.to_string(), fp);
                            }
                        }
                    }
                    ann.insert(internal_id, vector.clone());
                    id_index.insert(external_id, internal_id);
                    documents.insert(internal_id, StoredDocument { document, vector });
                }
                WalRecord::Delete { internal_id } => {
                    ann.delete(internal_id);
                    documents.remove(&internal_id);
                    id_index.retain(|_, v| *v != internal_id);
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Wal(e.to_string()))?;

        let state = Arc::new(SpaceState {
            wal: Mutex::new(wal),
            documents: RwLock::new(documents),
            id_index: RwLock::new(id_index),
            ann: RwLock::new(ann),
            fingerprint_cache: RwLock::new(fingerprint_cache),
        });

        spaces.insert(space_key.to_string(), state.clone());
        Ok(state)
    }

    async fn resolve_space(
        &self,
        space_key: Option<&str>,
    ) -> Result<(String, Arc<SpaceState>), StoreError> {
        let key = match space_key {
            Some(key) => key.to_string(),
            None => self
                .active
                .read()
                .await
                .clone()
                .ok_or(StoreError::NoActiveSpace)?,
        };
        let state = self
            .spaces
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::SpaceNotLoaded(key.clone()))?;
        Ok((key, state))
    }

    async fn upsert_with_vectors(
        &self,
        docs: Vec<Document>,
        vectors: Vec<Vec<f32>>,
        space_key: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let (_, state) = self.resolve_space(space_key).await?;

        let mut kept: Vec<(Document, Vec<f32>)> = Vec::with_capacity(docs.len());
        {
            let cache = state.fingerprint_cache.read().await;
            for (doc, vector) in docs.into_iter().zip(vectors.into_iter()) {
                let source = doc.source().unwrap_or_default().to_string();
                let incoming = FileFingerprint::from_metadata(doc.metadata());
                let drop_doc = match (cache.get(&source), incoming.as_ref()) {
                    (Some(cached), Some(new_fp)) => cached == new_fp,
                    _ => false,
                };
                if !drop_doc {
                    kept.push((doc, vector));
                }
            }
        }

        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(kept.len());
        for (doc, vector) in &kept {
            let id = doc
                .id()
                .ok_or_else(|| StoreError::InvalidMetadata(keys::ID.to_string()))?;
            ids.push(id.to_string());

            let int_id = internal_id(id);
            let record = WalRecord::Upsert {
                internal_id: int_id,
                external_id: id.to_string(),
                document: doc.clone(),
                vector: vector.clone(),
            };
            let bytes = serde_json::to_vec(&record).map_err(|e| StoreError::Wal(e.to_string()))?;

            let mut wal = state.wal.lock().await;
            wal.append(&bytes).await.map_err(|e| StoreError::Wal(e.to_string()))?;
            wal.flush().await.map_err(|e| StoreError::Wal(e.to_string()))?;
        }

        {
            let mut documents = state.documents.write().await;
            let mut id_index = state.id_index.write().await;
            let mut ann = state.ann.write().await;
            let mut cache = state.fingerprint_cache.write().await;

            for (doc, vector) in kept {
                let id = doc.id().unwrap().to_string();
                let int_id = internal_id(&id);

                if let Some(old) = id_index.insert(id.clone(), int_id) {
                    if old != int_id {
                        documents.remove(&old);
                        ann.delete(old);
                    }
                }

                ann.insert(int_id, vector.clone());

                if let Some(source) = doc.source() {
                    if let Some(fp) = FileFingerprint::from_metadata(doc.metadata()) {
                        cache.insert(source.to_string(), fp);
                    }
                }

                documents.insert(int_id, StoredDocument { document: doc, vector });
            }
        }

        Ok(ids)
    }
}

#[async_trait]
impl StoreManager for EmbeddedStoreManager {
    async fn load_space(&self, space_key: &str) -> Result<(), StoreError> {
        self.open_space(space_key).await?;
        Ok(())
    }

    async fn activate_space(&self, space_key: &str) -> Result<(), StoreError> {
        self.open_space(space_key).await?;
        *self.active.write().await = Some(space_key.to_string());
        Ok(())
    }

    async fn get_active(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    async fn upsert(
        &self,
        docs: Vec<Document>,
        vectors: Vec<Vec<f32>>,
        space_key: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        self.upsert_with_vectors(docs, vectors, space_key).await
    }

    async fn upsert_multi(
        &self,
        docs: Vec<Document>,
        vectors: Vec<Vec<f32>>,
        space_key: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        self.upsert_with_vectors(docs, vectors, space_key).await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&QueryFilter>,
        space_key: Option<&str>,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let (_, state) = self.resolve_space(space_key).await?;

        let hits = {
            let ann = state.ann.read().await;
            // Over-fetch before filtering so a metadata filter doesn't starve
            // the caller of `k` results.
            let fetch = if filter.map(|f| f.is_empty()).unwrap_or(true) {
                k
            } else {
                (k * 4).max(k)
            };
            ann.search(vector, fetch)
        };

        let documents = state.documents.read().await;
        let mut out = Vec::with_capacity(hits.len());
        for (internal_id, score) in hits {
            let Some(stored) = documents.get(&internal_id) else {
                continue;
            };
            if let Some(filter) = filter {
                let matches = filter.iter().all(|(key, value)| {
                    stored
                        .document
                        .metadata()
                        .get(key)
                        .and_then(|v| v.as_str())
                        .map(|actual| actual == value)
                        .unwrap_or(false)
                });
                if !matches {
                    continue;
                }
            }
            out.push(ScoredDocument {
                document: stored.document.clone(),
                score,
            });
            if out.len() >= k {
                break;
            }
        }

        Ok(out)
    }

    async fn skip_update(&self, source: &str, check_update: bool) -> bool {
        if check_update {
            return false;
        }
        let Some(key) = self.active.read().await.clone() else {
            return false;
        };
        let Some(state) = self.spaces.read().await.get(&key).cloned() else {
            return false;
        };
        state.fingerprint_cache.read().await.contains_key(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragserver_core::metadata::{stable_id_for, EMBTYPE_TEXT};
    use ragserver_core::metadata::{Metadata, MetaValue};

    fn doc(source: &str, fp_sha: &str, chunk_no: i64) -> Document {
        let id = stable_id_for(EMBTYPE_TEXT, source, fp_sha, None, Some(chunk_no));
        let mut meta = Metadata::new();
        meta.insert(keys::ID.to_string(), MetaValue::Str(id));
        meta.insert(keys::SOURCE.to_string(), MetaValue::Str(source.to_string()));
        meta.insert(keys::SPACE_KEY.to_string(), MetaValue::Str("space".into()));
        meta.insert(keys::EMBED_TYPE.to_string(), MetaValue::Str(EMBTYPE_TEXT.into()));
        meta.insert(keys::FP_SIZE.to_string(), MetaValue::Int(10));
        meta.insert(keys::FP_MTIME.to_string(), MetaValue::Float(1.0));
        meta.insert(keys::FP_SHA.to_string(), MetaValue::Str(fp_sha.to_string()));
        meta.insert(keys::CHUNK_NO.to_string(), MetaValue::Int(chunk_no));
        Document::new(Payload::Text(format!("chunk {chunk_no}")), meta)
    }

    #[tokio::test]
    async fn upsert_then_query_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EmbeddedStoreManager::new(dir.path(), 10_000);
        manager.activate_space("space").await.unwrap();

        let d = doc("/tmp/a.txt", "sha1", 0);
        let ids = manager
            .upsert_multi(vec![d.clone()], vec![vec![1.0, 0.0, 0.0]], None)
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);

        let results = manager.query(&[1.0, 0.0, 0.0], 5, None, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.source(), Some("/tmp/a.txt"));
    }

    #[tokio::test]
    async fn upsert_skips_identical_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EmbeddedStoreManager::new(dir.path(), 10_000);
        manager.activate_space("space").await.unwrap();

        let d = doc("/tmp/a.txt", "sha1", 0);
        manager
            .upsert_multi(vec![d.clone()], vec![vec![1.0, 0.0]], None)
            .await
            .unwrap();

        let ids = manager
            .upsert_multi(vec![d], vec![vec![1.0, 0.0]], None)
            .await
            .unwrap();
        assert!(ids.is_empty(), "identical fingerprint should be dropped");
    }

    #[tokio::test]
    async fn upsert_replaces_on_fingerprint_change() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EmbeddedStoreManager::new(dir.path(), 10_000);
        manager.activate_space("space").await.unwrap();

        let original = doc("/tmp/a.txt", "sha1", 0);
        manager
            .upsert_multi(vec![original], vec![vec![1.0, 0.0]], None)
            .await
            .unwrap();

        let changed = doc("/tmp/a.txt", "sha2", 0);
        let ids = manager
            .upsert_multi(vec![changed], vec![vec![0.0, 1.0]], None)
            .await
            .unwrap();
        assert_eq!(ids.len(), 1, "changed fingerprint should be re-indexed");
    }

    #[tokio::test]
    async fn skip_update_respects_check_update_flag() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EmbeddedStoreManager::new(dir.path(), 10_000);
        manager.activate_space("space").await.unwrap();

        let d = doc("/tmp/a.txt", "sha1", 0);
        manager
            .upsert_multi(vec![d], vec![vec![1.0, 0.0]], None)
            .await
            .unwrap();

        assert!(manager.skip_update("/tmp/a.txt", false).await);
        assert!(!manager.skip_update("/tmp/a.txt", true).await);
        assert!(!manager.skip_update("/tmp/unseen.txt", false).await);
    }

    #[tokio::test]
    async fn wal_replay_restores_space_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = EmbeddedStoreManager::new(dir.path(), 10_000);
            manager.activate_space("space").await.unwrap();
            let d = doc("/tmp/a.txt", "sha1", 0);
            manager
                .upsert_multi(vec![d], vec![vec![1.0, 0.0]], None)
                .await
                .unwrap();
        }

        let reopened = EmbeddedStoreManager::new(dir.path(), 10_000);
        reopened.activate_space("space").await.unwrap();
        let results = reopened.query(&[1.0, 0.0], 5, None, None).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
