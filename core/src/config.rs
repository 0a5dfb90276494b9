//! Configuration surface (§6.3): one flat `Settings` struct, loaded from an
//! optional `config/default` + `config/{RUN_MODE}` file pair layered under
//! unprefixed environment variables, with defaults and validation rules
//! matching the environment-variable table exactly.

use crate::error::{ErrorCode, RagServerError};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl RagServerError for SettingsError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Config
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    Embedded,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedProviderKind {
    Local,
    Openai,
    Cohere,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RerankProviderKind {
    Local,
    Cohere,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub vector_store: VectorStoreKind,
    pub load_limit: u64,
    pub check_update: bool,
    pub embedded_store_data_dir: String,

    pub pg_host: String,
    pub pg_port: u16,
    pub pg_database: String,
    pub pg_user: String,
    pub pg_password: String,

    pub embed_provider: EmbedProviderKind,
    pub openai_embed_model_text: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub cohere_embed_model_text: String,
    pub cohere_embed_model_image: String,
    pub cohere_api_key: Option<String>,
    pub local_embed_model_text: String,
    pub local_embed_model_image: String,
    pub local_embed_base_url: String,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub user_agent: String,

    pub rerank_provider: RerankProviderKind,
    pub local_rerank_model: String,
    pub local_rerank_base_url: String,
    pub cohere_rerank_model: String,

    pub topk: usize,
    pub topk_rerank_scale: usize,
    pub upload_dir: String,

    pub requests_per_second: f64,
    pub fetch_timeout_secs: u64,
    pub max_fetch_body_bytes: u64,
    pub scan_asset_links: bool,

    pub run_mode: String,
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let settings: Settings = Config::builder()
            .set_default("vector_store", "embedded")?
            .set_default("load_limit", 10_000)?
            .set_default("check_update", false)?
            .set_default("embedded_store_data_dir", "data/store")?
            .set_default("pg_host", "localhost")?
            .set_default("pg_port", 5432)?
            .set_default("pg_database", "ragserver")?
            .set_default("pg_user", "ragserver")?
            .set_default("pg_password", "ragserver")?
            .set_default("embed_provider", "local")?
            .set_default("openai_embed_model_text", "text-embedding-3-small")?
            .set_default("cohere_embed_model_text", "embed-v4.0")?
            .set_default("cohere_embed_model_image", "embed-v4.0")?
            .set_default("local_embed_model_text", "openai/clip-vit-base-patch32")?
            .set_default("local_embed_model_image", "openai/clip-vit-base-patch32")?
            .set_default("local_embed_base_url", "http://localhost:8001/v1")?
            .set_default("chunk_size", 500)?
            .set_default("chunk_overlap", 50)?
            .set_default("user_agent", "ragserver")?
            .set_default("rerank_provider", "local")?
            .set_default("local_rerank_model", "BAAI/bge-reranker-v2-m3")?
            .set_default("local_rerank_base_url", "http://localhost:8002/v1")?
            .set_default("cohere_rerank_model", "rerank-multilingual-v3.0")?
            .set_default("topk", 10)?
            .set_default("topk_rerank_scale", 5)?
            .set_default("upload_dir", "upload")?
            .set_default("requests_per_second", 2.0)?
            .set_default("fetch_timeout_secs", 30)?
            .set_default("max_fetch_body_bytes", 104_857_600i64)?
            .set_default("scan_asset_links", false)?
            .set_default("run_mode", run_mode.clone())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(Environment::default())
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.load_limit == 0 {
            return Err(SettingsError::Invalid("load_limit must be > 0".into()));
        }
        if self.chunk_size == 0 {
            return Err(SettingsError::Invalid("chunk_size must be > 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SettingsError::Invalid(
                "chunk_overlap must be less than chunk_size".into(),
            ));
        }
        if self.topk == 0 {
            return Err(SettingsError::Invalid("topk must be > 0".into()));
        }
        if self.topk_rerank_scale == 0 {
            return Err(SettingsError::Invalid(
                "topk_rerank_scale must be > 0".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(SettingsError::Invalid("user_agent must be non-empty".into()));
        }
        if self.vector_store == VectorStoreKind::Postgres
            && (self.pg_host.trim().is_empty()
                || self.pg_database.trim().is_empty()
                || self.pg_user.trim().is_empty()
                || self.pg_password.trim().is_empty())
        {
            return Err(SettingsError::Invalid(
                "postgres vector store requires pg_host, pg_database, pg_user and pg_password".into(),
            ));
        }
        if self.embed_provider == EmbedProviderKind::Local && self.local_embed_base_url.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "local embed provider requires local_embed_base_url".into(),
            ));
        }
        if self.rerank_provider == RerankProviderKind::Local && self.local_rerank_base_url.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "local rerank provider requires local_rerank_base_url".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            vector_store: VectorStoreKind::Embedded,
            load_limit: 10_000,
            check_update: false,
            embedded_store_data_dir: "data/store".into(),
            pg_host: "localhost".into(),
            pg_port: 5432,
            pg_database: "ragserver".into(),
            pg_user: "ragserver".into(),
            pg_password: "ragserver".into(),
            embed_provider: EmbedProviderKind::Local,
            openai_embed_model_text: "text-embedding-3-small".into(),
            openai_api_key: None,
            openai_base_url: None,
            cohere_embed_model_text: "embed-v4.0".into(),
            cohere_embed_model_image: "embed-v4.0".into(),
            cohere_api_key: None,
            local_embed_model_text: "openai/clip-vit-base-patch32".into(),
            local_embed_model_image: "openai/clip-vit-base-patch32".into(),
            local_embed_base_url: "http://localhost:8001/v1".into(),
            chunk_size: 500,
            chunk_overlap: 50,
            user_agent: "ragserver".into(),
            rerank_provider: RerankProviderKind::Local,
            local_rerank_model: "BAAI/bge-reranker-v2-m3".into(),
            local_rerank_base_url: "http://localhost:8002/v1".into(),
            cohere_rerank_model: "rerank-multilingual-v3.0".into(),
            topk: 10,
            topk_rerank_scale: 5,
            upload_dir: "upload".into(),
            requests_per_second: 2.0,
            fetch_timeout_secs: 30,
            max_fetch_body_bytes: 104_857_600,
            scan_asset_links: false,
            run_mode: "development".into(),
        }
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let mut settings = base_settings();
        settings.chunk_overlap = settings.chunk_size;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_postgres_without_credentials() {
        let mut settings = base_settings();
        settings.vector_store = VectorStoreKind::Postgres;
        settings.pg_password = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn accepts_defaults() {
        assert!(base_settings().validate().is_ok());
    }
}
