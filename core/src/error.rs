use serde::{Deserialize, Serialize};

/// Coarse error tags shared by every crate's error enum. An HTTP shell (not
/// part of this crate) can map these onto status codes without depending on
/// any per-crate error type directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Config,
    Io,
    Network,
    Decode,
    InvalidMetadata,
    Embed,
    Rerank,
    Store,
    Ingest,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::Config => "CONFIG",
            ErrorCode::Io => "IO",
            ErrorCode::Network => "NETWORK",
            ErrorCode::Decode => "DECODE",
            ErrorCode::InvalidMetadata => "INVALID_METADATA",
            ErrorCode::Embed => "EMBED",
            ErrorCode::Rerank => "RERANK",
            ErrorCode::Store => "STORE",
            ErrorCode::Ingest => "INGEST",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{}", s)
    }
}

pub trait RagServerError: std::error::Error {
    fn error_code(&self) -> ErrorCode;
}
