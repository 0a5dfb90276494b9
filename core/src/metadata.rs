//! Stable IDs, per-entity metadata schemas and file fingerprinting.
//!
//! This is the identity layer everything else in the engine builds on: the
//! same `(embed_type, source, fingerprint[, page][, chunk_no|image_no])`
//! tuple always produces the same `id`, which is what makes upsert
//! idempotent end to end.

use crate::error::{ErrorCode, RagServerError};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

pub const PROJECT_NAME: &str = "ragserver";

pub const EMBTYPE_TEXT: &str = "text";
pub const EMBTYPE_IMAGE: &str = "image";

/// Metadata keys, kept as named constants rather than bare string literals
/// so a typo becomes a compile error at the call site instead of a silently
/// missing column.
pub mod keys {
    pub const ID: &str = "id";
    pub const SOURCE: &str = "source";
    pub const BASE_SOURCE: &str = "base_source";
    pub const SPACE_KEY: &str = "space_key";
    pub const EMBED_TYPE: &str = "embed_type";
    pub const FP_SIZE: &str = "fingerprint_size";
    pub const FP_MTIME: &str = "fingerprint_mtime";
    pub const FP_SHA: &str = "fingerprint_sha256_head";
    pub const PAGE: &str = "page";
    pub const CHUNK_NO: &str = "chunk_no";
    pub const IMAGE_NO: &str = "image_no";
}

pub const FINGERPRINT_KEYS: [&str; 3] = [keys::FP_SIZE, keys::FP_MTIME, keys::FP_SHA];

const INT_DEFAULT: i64 = -1;
const FLOAT_DEFAULT: f64 = -1.0;
const STR_DEFAULT: &str = "";

/// A primitive metadata value. Stores are free to widen this to their own
/// column types; the engine only ever produces these three shapes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl MetaValue {
    fn is_default(&self) -> bool {
        match self {
            MetaValue::Str(s) => s.as_str() == STR_DEFAULT,
            MetaValue::Int(i) => *i == INT_DEFAULT,
            MetaValue::Float(f) => *f == FLOAT_DEFAULT,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

pub type Metadata = HashMap<String, MetaValue>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to stat file: {0}")]
    Stat(#[source] std::io::Error),
    #[error("failed to read file head: {0}")]
    ReadHead(#[source] std::io::Error),
    #[error("missing required metadata keys: {0}")]
    MissingKeys(String),
    #[error("metadata keys not set: {0}")]
    UnsetKeys(String),
}

impl RagServerError for MetadataError {
    fn error_code(&self) -> ErrorCode {
        match self {
            MetadataError::Stat(_) | MetadataError::ReadHead(_) => ErrorCode::Io,
            MetadataError::MissingKeys(_) | MetadataError::UnsetKeys(_) => {
                ErrorCode::InvalidMetadata
            }
        }
    }
}

/// The kinds of entities the loader pipeline produces documents for. Each
/// kind has its own required-key set; `assert_required_keys` is driven by
/// this table rather than a type per combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    TextFile,
    ImageFile,
    PdfText,
    PdfImage,
    WebText,
    WebImage,
}

impl MetadataKind {
    pub fn required_keys(self) -> &'static [&'static str] {
        use keys::*;
        const BASIC: [&str; 4] = [ID, SOURCE, SPACE_KEY, EMBED_TYPE];
        match self {
            MetadataKind::TextFile => &[ID, SOURCE, SPACE_KEY, EMBED_TYPE, FP_SIZE, FP_MTIME, FP_SHA, CHUNK_NO],
            MetadataKind::ImageFile => &[ID, SOURCE, SPACE_KEY, EMBED_TYPE, FP_SIZE, FP_MTIME, FP_SHA],
            MetadataKind::PdfText => &[ID, SOURCE, SPACE_KEY, EMBED_TYPE, FP_SIZE, FP_MTIME, FP_SHA, PAGE, CHUNK_NO],
            MetadataKind::PdfImage => &[ID, SOURCE, SPACE_KEY, EMBED_TYPE, FP_SIZE, FP_MTIME, FP_SHA, PAGE, IMAGE_NO],
            MetadataKind::WebText => &[ID, SOURCE, SPACE_KEY, EMBED_TYPE, CHUNK_NO],
            MetadataKind::WebImage => {
                let _ = BASIC;
                &[ID, SOURCE, SPACE_KEY, EMBED_TYPE, IMAGE_NO]
            }
        }
    }
}

/// `(size, mtime, sha256_head)` identifying a file's content for change
/// detection. URL sources use `FileFingerprint::sentinel()`, which still
/// marks "source is known" but always compares unequal to a real
/// fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFingerprint {
    pub size: i64,
    pub mtime: f64,
    pub sha256_head: String,
}

impl FileFingerprint {
    pub fn sentinel() -> Self {
        Self {
            size: INT_DEFAULT,
            mtime: FLOAT_DEFAULT,
            sha256_head: STR_DEFAULT.to_string(),
        }
    }

    pub fn into_metadata(self, meta: &mut Metadata) {
        meta.insert(keys::FP_SIZE.to_string(), MetaValue::Int(self.size));
        meta.insert(keys::FP_MTIME.to_string(), MetaValue::Float(self.mtime));
        meta.insert(
            keys::FP_SHA.to_string(),
            MetaValue::Str(self.sha256_head),
        );
    }

    pub fn from_metadata(meta: &Metadata) -> Option<Self> {
        Some(Self {
            size: meta.get(keys::FP_SIZE)?.as_i64()?,
            mtime: meta.get(keys::FP_MTIME)?.as_f64()?,
            sha256_head: meta.get(keys::FP_SHA)?.as_str()?.to_string(),
        })
    }
}

/// SHA-256 over the first `head_bytes` of `path`, plus size/mtime via `stat`.
pub fn file_fingerprint(path: impl AsRef<Path>, head_bytes: usize) -> Result<FileFingerprint, MetadataError> {
    let path = path.as_ref();
    let meta = std::fs::metadata(path).map_err(MetadataError::Stat)?;
    let size = meta.len() as i64;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(FLOAT_DEFAULT);

    let bytes = std::fs::read(path).map_err(MetadataError::ReadHead)?;
    let head = &bytes[..bytes.len().min(head_bytes)];
    let mut hasher = Sha256::new();
    hasher.update(head);
    let sha256_head = format!("{:x}", hasher.finalize());

    Ok(FileFingerprint { size, mtime, sha256_head })
}

static NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("https://{PROJECT_NAME}/namespace").as_bytes(),
    )
});

/// Deterministic UUIDv5 inside the project namespace. Same `key` always
/// produces the same id, in this process or any other.
pub fn stable_id(key: &str) -> String {
    Uuid::new_v5(&NAMESPACE, key.as_bytes()).to_string()
}

/// Builds the canonical stable-id key described in the data model and
/// returns its UUIDv5.
pub fn stable_id_for(
    embed_type: &str,
    source: &str,
    fingerprint_sha256_head: &str,
    page: Option<i64>,
    chunk_or_image_no: Option<i64>,
) -> String {
    let mut key = format!("{embed_type}::{source}::{fingerprint_sha256_head}");
    if let Some(page) = page {
        key.push_str(&format!("::{page}"));
    }
    if let Some(n) = chunk_or_image_no {
        key.push_str(&format!("::{n}"));
    }
    stable_id(&key)
}

fn still_default(meta: &Metadata, key: &str) -> Result<bool, MetadataError> {
    Ok(meta
        .get(key)
        .map(|value| value.is_default())
        .unwrap_or(true))
}

/// Verifies `meta` carries every key `kind` requires, and that none of them
/// is still at its sentinel default (meaning it was never actually set).
pub fn assert_required_keys(meta: &Metadata, kind: MetadataKind) -> Result<(), MetadataError> {
    let required = kind.required_keys();

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| !meta.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(MetadataError::MissingKeys(missing.join(", ")));
    }

    let unset: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| still_default(meta, key).unwrap_or(true))
        .collect();
    if !unset.is_empty() {
        return Err(MetadataError::UnsetKeys(unset.join(", ")));
    }

    Ok(())
}

/// Sanitises `"<provider>__<model>__<embed_type>"` into a space key matching
/// `^[A-Za-z0-9][A-Za-z0-9._-]{1,510}[A-Za-z0-9]$`.
pub fn space_key(provider: &str, model: &str, embed_type: &str) -> String {
    let raw = format!("{provider}__{model}__{embed_type}");
    sanitize_space_key(&raw)
}

fn sanitize_space_key(raw: &str) -> String {
    if raw.is_empty() {
        return "000".to_string();
    }

    let mut cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    cleaned.truncate(512);

    // Force leading/trailing characters to be alphanumeric.
    let chars: Vec<char> = cleaned.chars().collect();
    let mut start = 0;
    while start < chars.len() && !chars[start].is_ascii_alphanumeric() {
        start += 1;
    }
    let mut end = chars.len();
    while end > start && !chars[end - 1].is_ascii_alphanumeric() {
        end -= 1;
    }

    cleaned = if start < end {
        chars[start..end].iter().collect()
    } else {
        String::new()
    };

    while cleaned.len() < 3 {
        cleaned.push('0');
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_deterministic() {
        let a = stable_id_for("text", "/tmp/a.txt", "abcd", None, Some(0));
        let b = stable_id_for("text", "/tmp/a.txt", "abcd", None, Some(0));
        assert_eq!(a, b);
    }

    #[test]
    fn stable_id_differs_on_chunk_no() {
        let a = stable_id_for("text", "/tmp/a.txt", "abcd", None, Some(0));
        let b = stable_id_for("text", "/tmp/a.txt", "abcd", None, Some(1));
        assert_ne!(a, b);
    }

    #[test]
    fn space_key_sanitizes_and_pads_empty_input() {
        assert_eq!(space_key("", "", ""), "000");
    }

    #[test]
    fn space_key_strips_disallowed_chars() {
        let key = space_key("openai", "text embedding 3!", "text");
        let re = regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{1,510}[A-Za-z0-9]$").unwrap();
        assert!(re.is_match(&key), "key was: {key}");
    }

    #[test]
    fn space_key_isolates_distinct_providers() {
        let a = space_key("openai", "text-embedding-3-small", "text");
        let b = space_key("cohere", "text-embedding-3-small", "text");
        assert_ne!(a, b);
    }

    #[test]
    fn assert_required_keys_rejects_missing_and_sentinel() {
        let mut meta = Metadata::new();
        meta.insert(keys::ID.to_string(), MetaValue::Str("id".to_string()));
        meta.insert(keys::SOURCE.to_string(), MetaValue::Str("src".to_string()));
        meta.insert(keys::SPACE_KEY.to_string(), MetaValue::Str("space".to_string()));
        meta.insert(keys::EMBED_TYPE.to_string(), MetaValue::Str(EMBTYPE_TEXT.to_string()));

        // WebText additionally requires chunk_no.
        assert!(assert_required_keys(&meta, MetadataKind::WebText).is_err());

        meta.insert(keys::CHUNK_NO.to_string(), MetaValue::Int(-1));
        assert!(assert_required_keys(&meta, MetadataKind::WebText).is_err());

        meta.insert(keys::CHUNK_NO.to_string(), MetaValue::Int(0));
        assert!(assert_required_keys(&meta, MetadataKind::WebText).is_ok());
    }

    #[test]
    fn url_sentinel_fingerprint_marks_source_known() {
        let sentinel = FileFingerprint::sentinel();
        assert_eq!(sentinel.size, -1);
        assert_eq!(sentinel.sha256_head, "");
    }
}
