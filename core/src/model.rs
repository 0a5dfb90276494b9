//! The `Document` type: payload plus metadata, immutable after construction.

use crate::metadata::{keys, Metadata, MetaValue};

/// What a `Document` carries as content. Text chunks are embedded directly;
/// image documents carry a path to a (possibly temporary) image file on
/// disk, which the embedder reads.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Payload {
    Text(String),
    ImagePath(String),
}

/// A unit of indexable content: payload plus the metadata mapping that
/// carries its full identity and provenance. Construct via `Document::new`;
/// there is no mutation API, matching the data model's immutability
/// invariant.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    payload: Payload,
    metadata: Metadata,
}

impl Document {
    pub fn new(payload: Payload, metadata: Metadata) -> Self {
        Self { payload, metadata }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn id(&self) -> Option<&str> {
        self.metadata.get(keys::ID).and_then(MetaValue::as_str)
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(keys::SOURCE).and_then(MetaValue::as_str)
    }

    pub fn space_key(&self) -> Option<&str> {
        self.metadata
            .get(keys::SPACE_KEY)
            .and_then(MetaValue::as_str)
    }

    pub fn embed_type(&self) -> Option<&str> {
        self.metadata
            .get(keys::EMBED_TYPE)
            .and_then(MetaValue::as_str)
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            Payload::ImagePath(_) => None,
        }
    }

    pub fn as_image_path(&self) -> Option<&str> {
        match &self.payload {
            Payload::ImagePath(path) => Some(path),
            Payload::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{stable_id_for, EMBTYPE_TEXT};

    fn sample_metadata() -> Metadata {
        let mut meta = Metadata::new();
        let id = stable_id_for(EMBTYPE_TEXT, "/tmp/a.txt", "abcd", None, Some(0));
        meta.insert(keys::ID.to_string(), MetaValue::Str(id));
        meta.insert(keys::SOURCE.to_string(), MetaValue::Str("/tmp/a.txt".into()));
        meta.insert(keys::SPACE_KEY.to_string(), MetaValue::Str("space".into()));
        meta.insert(
            keys::EMBED_TYPE.to_string(),
            MetaValue::Str(EMBTYPE_TEXT.to_string()),
        );
        meta
    }

    #[test]
    fn accessors_read_through_metadata() {
        let doc = Document::new(Payload::Text("hello".into()), sample_metadata());
        assert_eq!(doc.as_text(), Some("hello"));
        assert_eq!(doc.embed_type(), Some(EMBTYPE_TEXT));
        assert!(doc.id().is_some());
    }

    #[test]
    fn image_payload_has_no_text() {
        let doc = Document::new(Payload::ImagePath("/tmp/a.png".into()), sample_metadata());
        assert_eq!(doc.as_text(), None);
        assert_eq!(doc.as_image_path(), Some("/tmp/a.png"));
    }
}
