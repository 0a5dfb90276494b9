//! The Store Manager trait: per-space collection lifecycle, idempotent
//! upsert and ANN query. Both backends in this crate (`embedded`,
//! `postgres`) implement this same surface so the ingest orchestrator and
//! retriever never know which one they're talking to.

use async_trait::async_trait;
use ragserver_core::error::{ErrorCode, RagServerError};
use ragserver_core::model::Document;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
    #[error("wal error: {0}")]
    Wal(String),
    #[error("sql error: {0}")]
    Sql(String),
    #[error("space not loaded: {0}")]
    SpaceNotLoaded(String),
    #[error("no active space set")]
    NoActiveSpace,
    #[error("document missing required metadata: {0}")]
    InvalidMetadata(String),
}

impl RagServerError for StoreError {
    fn error_code(&self) -> ErrorCode {
        match self {
            StoreError::Io(_) | StoreError::Wal(_) | StoreError::Sql(_) => ErrorCode::Store,
            StoreError::SpaceNotLoaded(_) | StoreError::NoActiveSpace => ErrorCode::Store,
            StoreError::InvalidMetadata(_) => ErrorCode::InvalidMetadata,
        }
    }
}

/// A single retrieved result: the document plus its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// A metadata-only equality filter applied at query time (e.g. restrict to
/// one `base_source`). Empty means "no filter".
pub type QueryFilter = Vec<(String, String)>;

#[async_trait]
pub trait StoreManager: Send + Sync {
    /// Opens (or returns the cached handle for) the collection backing
    /// `space_key`. Each space is opened at most once per process.
    async fn load_space(&self, space_key: &str) -> Result<(), StoreError>;

    /// Makes `space_key` the target of subsequent `upsert`/`query` calls
    /// that omit an explicit space key.
    async fn activate_space(&self, space_key: &str) -> Result<(), StoreError>;

    /// The currently active space key, if one has been activated.
    async fn get_active(&self) -> Option<String>;

    /// Upserts text documents, filtered by fingerprint (see the
    /// embedded/postgres module docs), and returns their ids. `vectors[i]`
    /// is the already-computed embedding for `docs[i]`; callers (the ingest
    /// orchestrator) are responsible for calling the embedder first. This
    /// differs from the store owning an embedder reference directly —
    /// see `DESIGN.md` for why.
    async fn upsert(
        &self,
        docs: Vec<Document>,
        vectors: Vec<Vec<f32>>,
        space_key: Option<&str>,
    ) -> Result<Vec<String>, StoreError>;

    /// Upserts image-payload documents. Callers are responsible for
    /// embedding the image payloads before calling this (the store only
    /// persists vectors it is handed); see `ingestion`'s orchestrator for
    /// the embed-then-upsert sequencing and temp-file cleanup.
    async fn upsert_multi(
        &self,
        docs: Vec<Document>,
        vectors: Vec<Vec<f32>>,
        space_key: Option<&str>,
    ) -> Result<Vec<String>, StoreError>;

    /// Similarity search by vector, returning up to `k` results ordered by
    /// descending score.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&QueryFilter>,
        space_key: Option<&str>,
    ) -> Result<Vec<ScoredDocument>, StoreError>;

    /// True iff `check_update` is false and `source` is already present in
    /// the fingerprint cache for the active space.
    async fn skip_update(&self, source: &str, check_update: bool) -> bool;
}
