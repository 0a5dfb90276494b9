//! SQL-backed Store Manager: one table per process, spaces distinguished by
//! a `space_key` column, vectors stored as `float4[]` and the full metadata
//! map as `jsonb`. Similarity is computed in Rust after fetching candidate
//! rows — this crate does not assume `pgvector` is installed, matching the
//! "we assume an external store that supports collection-scoped upsert/
//! delete/ANN query by vector" framing: here that external store is plain
//! Postgres, and the ANN query is a manual cosine scan over `space_key`.

use crate::store_manager::{QueryFilter, ScoredDocument, StoreError, StoreManager};
use async_trait::async_trait;
use ragserver_core::metadata::{keys, FileFingerprint};
use ragserver_core::model::{Document, Payload};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tokio::sync::RwLock;

pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl PostgresConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

pub struct PostgresStoreManager {
    pool: PgPool,
    loaded_spaces: RwLock<std::collections::HashSet<String>>,
    active: RwLock<Option<String>>,
}

impl PostgresStoreManager {
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.connection_string())
            .await
            .map_err(|e| StoreError::Sql(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ragserver_documents (
                external_id TEXT PRIMARY KEY,
                space_key TEXT NOT NULL,
                source TEXT NOT NULL,
                payload_kind TEXT NOT NULL,
                payload_value TEXT NOT NULL,
                vector FLOAT4[] NOT NULL,
                metadata JSONB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Sql(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS ragserver_documents_space_key_idx \
             ON ragserver_documents (space_key)",
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Sql(e.to_string()))?;

        Ok(Self {
            pool,
            loaded_spaces: RwLock::new(std::collections::HashSet::new()),
            active: RwLock::new(None),
        })
    }

    async fn resolve_space(&self, space_key: Option<&str>) -> Result<String, StoreError> {
        match space_key {
            Some(key) => Ok(key.to_string()),
            None => self.active.read().await.clone().ok_or(StoreError::NoActiveSpace),
        }
    }

    async fn fingerprint_for_source(
        &self,
        space_key: &str,
        source: &str,
    ) -> Result<Option<FileFingerprint>, StoreError> {
        let row = sqlx::query(
            "SELECT metadata FROM ragserver_documents WHERE space_key = $1 AND source = $2 LIMIT 1",
        )
        .bind(space_key)
        .bind(source)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Sql(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let metadata_json: serde_json::Value = row.try_get("metadata").map_err(|e| StoreError::Sql(e.to_string()))?;
        let metadata: ragserver_core::metadata::Metadata =
            serde_json::from_value(metadata_json).map_err(|e| StoreError::Sql(e.to_string()))?;
        Ok(FileFingerprint::from_metadata(&metadata))
    }

    async fn upsert_rows(
        &self,
        docs: Vec<Document>,
        vectors: Vec<Vec<f32>>,
        space_key: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let space_key = self.resolve_space(space_key).await?;

        let mut ids = Vec::with_capacity(docs.len());
        for (doc, vector) in docs.into_iter().zip(vectors.into_iter()) {
            let source = doc.source().unwrap_or_default().to_string();
            let incoming_fp = FileFingerprint::from_metadata(doc.metadata());
            let cached_fp = self.fingerprint_for_source(&space_key, &source).await?;

            if let (Some(cached), Some(incoming)) = (&cached_fp, &incoming_fp) {
                if cached == incoming {
                    continue;
                }
            }

            let id = doc
                .id()
                .ok_or_else(|| StoreError::InvalidMetadata(keys::ID.to_string()))?
                .to_string();

            let (payload_kind, payload_value) = match doc.payload() {
                Payload::Text(text) => ("text", text.clone()),
                Payload::ImagePath(path) => ("image", path.clone()),
            };
            let metadata_json = serde_json::to_value(doc.metadata())
                .map_err(|e| StoreError::Sql(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO ragserver_documents
                    (external_id, space_key, source, payload_kind, payload_value, vector, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (external_id) DO UPDATE SET
                    space_key = EXCLUDED.space_key,
                    source = EXCLUDED.source,
                    payload_kind = EXCLUDED.payload_kind,
                    payload_value = EXCLUDED.payload_value,
                    vector = EXCLUDED.vector,
                    metadata = EXCLUDED.metadata
                "#,
            )
            .bind(&id)
            .bind(&space_key)
            .bind(&source)
            .bind(payload_kind)
            .bind(&payload_value)
            .bind(&vector)
            .bind(&metadata_json)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Sql(e.to_string()))?;

            ids.push(id);
        }

        Ok(ids)
    }
}

#[async_trait]
impl StoreManager for PostgresStoreManager {
    async fn load_space(&self, space_key: &str) -> Result<(), StoreError> {
        self.loaded_spaces.write().await.insert(space_key.to_string());
        Ok(())
    }

    async fn activate_space(&self, space_key: &str) -> Result<(), StoreError> {
        self.load_space(space_key).await?;
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
        self.upsert_rows(docs, vectors, space_key).await
    }

    async fn upsert_multi(
        &self,
        docs: Vec<Document>,
        vectors: Vec<Vec<f32>>,
        space_key: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        self.upsert_rows(docs, vectors, space_key).await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&QueryFilter>,
        space_key: Option<&str>,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let space_key = self.resolve_space(space_key).await?;

        let rows = sqlx::query(
            "SELECT payload_kind, payload_value, vector, metadata \
             FROM ragserver_documents WHERE space_key = $1",
        )
        .bind(&space_key)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Sql(e.to_string()))?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let payload_kind: String = row.try_get("payload_kind").map_err(|e| StoreError::Sql(e.to_string()))?;
            let payload_value: String = row.try_get("payload_value").map_err(|e| StoreError::Sql(e.to_string()))?;
            let row_vector: Vec<f32> = row.try_get("vector").map_err(|e| StoreError::Sql(e.to_string()))?;
            let metadata_json: serde_json::Value = row.try_get("metadata").map_err(|e| StoreError::Sql(e.to_string()))?;
            let metadata: ragserver_core::metadata::Metadata =
                serde_json::from_value(metadata_json).map_err(|e| StoreError::Sql(e.to_string()))?;

            if let Some(filter) = filter {
                let matches = filter
                    .iter()
                    .all(|(key, value)| metadata.get(key).and_then(|v| v.as_str()) == Some(value.as_str()));
                if !matches {
                    continue;
                }
            }

            let payload = match payload_kind.as_str() {
                "image" => Payload::ImagePath(payload_value),
                _ => Payload::Text(payload_value),
            };
            let score = cosine_similarity(vector, &row_vector);
            scored.push(ScoredDocument {
                document: Document::new(payload, metadata),
                score,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn skip_update(&self, source: &str, check_update: bool) -> bool {
        if check_update {
            return false;
        }
        let Some(space_key) = self.active.read().await.clone() else {
            return false;
        };
        self.fingerprint_for_source(&space_key, source)
            .await
            .ok()
            .flatten()
            .is_some()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
