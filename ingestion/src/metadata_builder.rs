//! Assembles the metadata map and stable id for a loader-produced
//! `Document`, then verifies it against the entity's required-key schema
//! before handing it back — a malformed metadata map never reaches the
//! store.
//!
//! Callers pass the `MetadataKind` explicitly rather than having it
//! inferred from `page`/`base_source`: a direct-linked file downloaded by
//! the html loader still carries a real fingerprint of its downloaded
//! bytes and stays `PdfText`/`PdfImage`/`TextFile`/`ImageFile` even though
//! `base_source` is set to the page that linked it. Only content parsed
//! straight out of an HTML body, with no underlying file to fingerprint,
//! is `WebText`/`WebImage`.

use crate::error::IngestError;
use ragserver_core::metadata::{
    assert_required_keys, keys, stable_id_for, FileFingerprint, MetadataKind, EMBTYPE_IMAGE,
    EMBTYPE_TEXT,
};
use ragserver_core::model::{Document, Payload};

#[allow(clippy::too_many_arguments)]
fn base_metadata(
    embed_type: &str,
    source: &str,
    base_source: Option<&str>,
    space_key: &str,
    fingerprint: &FileFingerprint,
    page: Option<i64>,
    chunk_or_image_no: Option<i64>,
) -> ragserver_core::metadata::Metadata {
    let mut meta = ragserver_core::metadata::Metadata::new();

    let id = stable_id_for(
        embed_type,
        source,
        &fingerprint.sha256_head,
        page,
        chunk_or_image_no,
    );

    meta.insert(keys::ID.to_string(), id.into());
    meta.insert(keys::SOURCE.to_string(), source.into());
    if let Some(base) = base_source {
        meta.insert(keys::BASE_SOURCE.to_string(), base.into());
    }
    meta.insert(keys::SPACE_KEY.to_string(), space_key.into());
    meta.insert(keys::EMBED_TYPE.to_string(), embed_type.into());
    fingerprint.clone().into_metadata(&mut meta);
    if let Some(page) = page {
        meta.insert(keys::PAGE.to_string(), page.into());
    }
    meta
}

#[allow(clippy::too_many_arguments)]
pub fn text_chunk_document(
    kind: MetadataKind,
    source: &str,
    base_source: Option<&str>,
    space_key: &str,
    fingerprint: &FileFingerprint,
    page: Option<i64>,
    chunk_no: i64,
    text: String,
) -> Result<Document, IngestError> {
    let mut meta = base_metadata(
        EMBTYPE_TEXT,
        source,
        base_source,
        space_key,
        fingerprint,
        page,
        Some(chunk_no),
    );
    meta.insert(keys::CHUNK_NO.to_string(), chunk_no.into());

    assert_required_keys(&meta, kind)?;

    Ok(Document::new(Payload::Text(text), meta))
}

#[allow(clippy::too_many_arguments)]
pub fn image_document(
    kind: MetadataKind,
    source: &str,
    base_source: Option<&str>,
    space_key: &str,
    fingerprint: &FileFingerprint,
    page: Option<i64>,
    image_no: i64,
    path: String,
) -> Result<Document, IngestError> {
    let mut meta = base_metadata(
        EMBTYPE_IMAGE,
        source,
        base_source,
        space_key,
        fingerprint,
        page,
        Some(image_no),
    );
    meta.insert(keys::IMAGE_NO.to_string(), image_no.into());

    assert_required_keys(&meta, kind)?;

    Ok(Document::new(Payload::ImagePath(path), meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> FileFingerprint {
        FileFingerprint {
            size: 100,
            mtime: 1.0,
            sha256_head: "abcd".to_string(),
        }
    }

    #[test]
    fn text_chunk_document_builds_stable_id_and_metadata() {
        let doc = text_chunk_document(
            MetadataKind::TextFile,
            "/tmp/a.txt",
            None,
            "space",
            &fp(),
            None,
            0,
            "hello".to_string(),
        )
        .unwrap();
        assert_eq!(doc.as_text(), Some("hello"));
        assert_eq!(doc.source(), Some("/tmp/a.txt"));
    }

    #[test]
    fn web_text_document_does_not_require_fingerprint() {
        let doc = text_chunk_document(
            MetadataKind::WebText,
            "https://example.com/",
            None,
            "space",
            &FileFingerprint::sentinel(),
            None,
            0,
            "hello".to_string(),
        );
        assert!(doc.is_ok());
    }

    #[test]
    fn pdf_image_document_requires_page_and_real_fingerprint() {
        let doc = image_document(
            MetadataKind::PdfImage,
            "https://example.com/doc.pdf",
            Some("https://example.com/page"),
            "space",
            &FileFingerprint::sentinel(),
            Some(2),
            0,
            "/tmp/img0.jpg".to_string(),
        );
        assert!(doc.is_err(), "sentinel fingerprint must fail PdfImage validation");
    }
}
