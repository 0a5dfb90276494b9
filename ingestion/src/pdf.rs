//! PDF text and embedded-image extraction.
//!
//! Text is extracted via `pdf-extract`, which separates pages with a form
//! feed (`\x0c`) in its plain-text output; splitting on that character
//! gives per-page text without needing a page-aware extraction API.
//!
//! Embedded-image extraction walks each page's `/XObject` resources via
//! `lopdf` and recovers images stored with the `DCTDecode` (JPEG) filter
//! verbatim. Other encodings (raw/CMYK `FlateDecode` samples, `CCITTFax`,
//! `JPXDecode`) are logged and skipped: turning an arbitrary PDF color
//! space into a displayable raster needs a pixel-decoding/image-encoding
//! crate that isn't part of this workspace's dependency stack, and JPEG is
//! by far the common case for photographic content in real PDFs.

use lopdf::{Document as LopdfDocument, Object};

pub struct PdfPage {
    pub page_no: i64,
    pub text: String,
}

pub struct ExtractedImage {
    pub page_no: i64,
    pub image_no: i64,
    pub bytes: Vec<u8>,
}

pub const IMAGE_EXTENSION: &str = "jpg";

/// Extracts per-page text. Returns an empty `Vec` (logged by the caller)
/// if the document can't be parsed at all.
pub fn extract_pages_text(bytes: &[u8]) -> Vec<PdfPage> {
    let text = match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %err, "failed to extract pdf text");
            return Vec::new();
        }
    };

    text.split('\x0c')
        .enumerate()
        .filter_map(|(i, page_text)| {
            let trimmed = page_text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PdfPage {
                    page_no: i as i64,
                    text: trimmed.to_string(),
                })
            }
        })
        .collect()
}

/// Extracts JPEG-encoded embedded images, grouped by page.
pub fn extract_images(bytes: &[u8]) -> Vec<ExtractedImage> {
    let doc = match LopdfDocument::load_mem(bytes) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(error = %err, "failed to open pdf for image extraction");
            return Vec::new();
        }
    };

    let mut images = Vec::new();

    for (page_index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
        let mut image_no = 0i64;
        let Ok(resources) = doc.get_page_resources_dict(page_id) else {
            continue;
        };
        let Some(resources) = resources else { continue };

        let Ok(xobjects) = resources.get(b"XObject").and_then(|o| o.as_dict()) else {
            continue;
        };

        for (_, xobject_ref) in xobjects.iter() {
            let Ok(object_id) = xobject_ref.as_reference() else {
                continue;
            };
            let Ok(object) = doc.get_object(object_id) else {
                continue;
            };
            let Object::Stream(stream) = object else {
                continue;
            };

            let is_image = stream
                .dict
                .get(b"Subtype")
                .and_then(|o| o.as_name())
                .map(|name| name == b"Image")
                .unwrap_or(false);
            if !is_image {
                continue;
            }

            let is_jpeg = matches_filter(stream.dict.get(b"Filter").ok(), b"DCTDecode");
            if !is_jpeg {
                tracing::debug!(
                    page = page_index,
                    "skipping embedded image with unsupported filter"
                );
                continue;
            }

            images.push(ExtractedImage {
                page_no: page_index as i64,
                image_no,
                bytes: stream.content.clone(),
            });
            image_no += 1;
        }
    }

    images
}

fn matches_filter(filter: Option<&Object>, wanted: &[u8]) -> bool {
    match filter {
        Some(Object::Name(name)) => name == wanted,
        Some(Object::Array(names)) => names
            .iter()
            .any(|o| o.as_name().map(|n| n == wanted).unwrap_or(false)),
        _ => false,
    }
}

trait ResourcesDictExt {
    fn get_page_resources_dict<'a>(
        &'a self,
        page_id: (u32, u16),
    ) -> Result<Option<&'a lopdf::Dictionary>, lopdf::Error>;
}

impl ResourcesDictExt for LopdfDocument {
    fn get_page_resources_dict<'a>(
        &'a self,
        page_id: (u32, u16),
    ) -> Result<Option<&'a lopdf::Dictionary>, lopdf::Error> {
        let page_dict = self.get_object(page_id)?.as_dict()?;
        let resources = match page_dict.get(b"Resources") {
            Ok(Object::Reference(r)) => self.get_object(*r)?.as_dict()?,
            Ok(Object::Dictionary(d)) => d,
            _ => return Ok(None),
        };
        Ok(Some(resources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_pages_text_handles_garbage_input_gracefully() {
        let pages = extract_pages_text(b"not a pdf");
        assert!(pages.is_empty());
    }

    #[test]
    fn extract_images_handles_garbage_input_gracefully() {
        let images = extract_images(b"not a pdf");
        assert!(images.is_empty());
    }
}
