//! HTML/sitemap loader. A `.xml` target is treated as a sitemap and
//! recursed into per `<loc>`; other URLs are either downloaded as a
//! direct-linked file (delegated to `FileLoader`) or fetched and parsed as
//! an HTML page, optionally followed by an asset-link scan.

use crate::chunker::chunk_text;
use crate::error::IngestError;
use crate::file_loader::FileLoader;
use crate::loader::{LoadResult, Loader};
use async_trait::async_trait;
use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader as XmlReader;
use ragserver_core::cool_down;
use ragserver_core::metadata::{FileFingerprint, MetadataKind};
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use storage::StoreManager;
use tracing::warn;

const SUPPORTED_FILE_EXTENSIONS: [&str; 6] = ["txt", "md", "pdf", "jpg", "jpeg", "png"];

pub struct HtmlLoader {
    client: Client,
    file_loader: FileLoader,
    chunk_size: usize,
    chunk_overlap: usize,
    user_agent: String,
    requests_per_second: f64,
    max_body_bytes: u64,
    scan_asset_links: bool,
    img_src_re: Regex,
    href_re: Regex,
    srcset_re: Regex,
}

impl HtmlLoader {
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        user_agent: String,
        requests_per_second: f64,
        timeout_secs: u64,
        max_body_bytes: u64,
        scan_asset_links: bool,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            file_loader: FileLoader::new(chunk_size, chunk_overlap),
            chunk_size,
            chunk_overlap,
            user_agent,
            requests_per_second,
            max_body_bytes,
            scan_asset_links,
            img_src_re: Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).unwrap(),
            href_re: Regex::new(r#"(?i)<a[^>]+href=["']([^"']+)["']"#).unwrap(),
            srcset_re: Regex::new(r#"(?i)<source[^>]+srcset=["']([^"']+)["']"#).unwrap(),
        }
    }

    fn is_sitemap(url: &str) -> bool {
        url.split(['?', '#']).next().unwrap_or(url).ends_with(".xml")
    }

    fn direct_linked_extension(url: &str) -> Option<String> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let last_segment = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = last_segment.rsplit_once('.')?;
        let ext = ext.to_lowercase();
        SUPPORTED_FILE_EXTENSIONS
            .contains(&ext.as_str())
            .then_some(ext)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Sec-Fetch-Site", "same-origin")
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes {
                return Err(IngestError::Network(format!(
                    "response body too large: {len} bytes"
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;
        cool_down(self.requests_per_second).await;

        if bytes.len() as u64 > self.max_body_bytes {
            return Err(IngestError::Network(format!(
                "response body too large: {} bytes",
                bytes.len()
            )));
        }

        Ok(bytes.to_vec())
    }

    async fn load_sitemap(
        &self,
        url: &str,
        text_space: &str,
        image_space: Option<&str>,
        check_update: bool,
        store: &dyn StoreManager,
        source_cache: &mut HashSet<String>,
    ) -> Result<LoadResult, IngestError> {
        let mut result = LoadResult::default();

        let bytes = match self.get_bytes(url).await {
            Ok(b) => b,
            Err(err) => {
                warn!(url, error = %err, "failed to fetch sitemap");
                return Ok(result);
            }
        };

        let locs = parse_sitemap_locs(&bytes);
        for loc in locs {
            if source_cache.contains(&loc) {
                continue;
            }
            match self
                .load(&loc, text_space, image_space, check_update, store, source_cache)
                .await
            {
                Ok(child) => result.merge(child),
                Err(err) => warn!(url = %loc, error = %err, "failed to load sitemap entry, skipping"),
            }
        }

        Ok(result)
    }

    async fn load_direct_file(
        &self,
        url: &str,
        base_source: Option<&str>,
        text_space: &str,
        image_space: Option<&str>,
        store: &dyn StoreManager,
        source_cache: &mut HashSet<String>,
    ) -> Result<LoadResult, IngestError> {
        if !source_cache.insert(url.to_string()) {
            return Ok(LoadResult::default());
        }

        let bytes = self.get_bytes(url).await?;

        let ext = Self::direct_linked_extension(url).unwrap_or_default();
        let temp_path = std::env::temp_dir().join(format!(
            "ragserver-web-{}.{}",
            stable_basename(url),
            if ext.is_empty() { "bin" } else { &ext }
        ));
        tokio::fs::write(&temp_path, &bytes).await?;

        let mut result = self
            .file_loader
            .load_file(
                &temp_path,
                url,
                base_source,
                text_space,
                image_space,
                true,
                store,
                &mut HashSet::new(),
            )
            .await?;
        result.temp_files.push(temp_path);
        Ok(result)
    }

    async fn load_page(
        &self,
        url: &str,
        text_space: &str,
        image_space: Option<&str>,
        store: &dyn StoreManager,
        source_cache: &mut HashSet<String>,
    ) -> Result<LoadResult, IngestError> {
        if !source_cache.insert(url.to_string()) {
            return Ok(LoadResult::default());
        }
        if store.skip_update(url, true).await {
            return Ok(LoadResult::default());
        }

        let bytes = self.get_bytes(url).await?;
        let html = String::from_utf8_lossy(&bytes).into_owned();
        let text = nanohtml2text::html2text(&html);

        let mut result = LoadResult::default();
        for (chunk_no, chunk) in chunk_text(&text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            let doc = crate::metadata_builder::text_chunk_document(
                MetadataKind::WebText,
                url,
                None,
                text_space,
                &FileFingerprint::sentinel(),
                None,
                chunk_no as i64,
                chunk,
            )?;
            result.text_docs.push(doc);
        }

        if self.scan_asset_links {
            let child = self
                .scan_assets(&html, url, text_space, image_space, store, source_cache)
                .await;
            result.merge(child);
        }

        Ok(result)
    }

    async fn scan_assets(
        &self,
        html: &str,
        page_url: &str,
        text_space: &str,
        image_space: Option<&str>,
        store: &dyn StoreManager,
        source_cache: &mut HashSet<String>,
    ) -> LoadResult {
        let mut result = LoadResult::default();
        let mut candidates = Vec::new();
        for re in [&self.img_src_re, &self.href_re, &self.srcset_re] {
            for cap in re.captures_iter(html) {
                if let Some(m) = cap.get(1) {
                    candidates.push(m.as_str().split_whitespace().next().unwrap_or("").to_string());
                }
            }
        }

        for candidate in candidates {
            let Some(resolved) = resolve_url(page_url, &candidate) else {
                continue;
            };
            if Self::direct_linked_extension(&resolved).is_none() {
                continue;
            }
            if source_cache.contains(&resolved) {
                continue;
            }
            match self
                .load_direct_file(
                    &resolved,
                    Some(page_url),
                    text_space,
                    image_space,
                    store,
                    source_cache,
                )
                .await
            {
                Ok(child) => result.merge(child),
                Err(err) => warn!(url = %resolved, error = %err, "failed to fetch linked asset, skipping"),
            }
        }

        result
    }
}

#[async_trait]
impl Loader for HtmlLoader {
    async fn load(
        &self,
        target: &str,
        text_space: &str,
        image_space: Option<&str>,
        check_update: bool,
        store: &dyn StoreManager,
        source_cache: &mut HashSet<String>,
    ) -> Result<LoadResult, IngestError> {
        if Self::is_sitemap(target) {
            return self
                .load_sitemap(target, text_space, image_space, check_update, store, source_cache)
                .await;
        }

        if Self::direct_linked_extension(target).is_some() {
            return self
                .load_direct_file(target, Some(target), text_space, image_space, store, source_cache)
                .await;
        }

        self.load_page(target, text_space, image_space, store, source_cache)
            .await
    }
}

fn parse_sitemap_locs(bytes: &[u8]) -> Vec<String> {
    let mut reader = XmlReader::from_reader(bytes);
    reader.config_mut().trim_text = true;

    let mut locs = Vec::new();
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) if e.name().as_ref() == b"loc" => in_loc = true,
            Ok(XmlEvent::End(e)) if e.name().as_ref() == b"loc" => in_loc = false,
            Ok(XmlEvent::Text(t)) if in_loc => {
                if let Ok(text) = t.unescape() {
                    locs.push(text.into_owned());
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(err) => {
                warn!(error = %err, "malformed sitemap xml, stopping recursion early");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    locs
}

fn resolve_url(base: &str, candidate: &str) -> Option<String> {
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return Some(candidate.to_string());
    }
    let base = reqwest::Url::parse(base).ok()?;
    base.join(candidate).ok().map(|u| u.to_string())
}

fn stable_basename(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_sitemap_detects_xml_extension() {
        assert!(HtmlLoader::is_sitemap("https://example.com/sitemap.xml"));
        assert!(!HtmlLoader::is_sitemap("https://example.com/page"));
    }

    #[test]
    fn direct_linked_extension_matches_supported_extensions() {
        assert_eq!(
            HtmlLoader::direct_linked_extension("https://example.com/doc.pdf"),
            Some("pdf".to_string())
        );
        assert_eq!(
            HtmlLoader::direct_linked_extension("https://example.com/page"),
            None
        );
    }

    #[test]
    fn parse_sitemap_locs_extracts_urls() {
        let xml = br#"<?xml version="1.0"?><urlset><url><loc>https://a.com/1</loc></url><url><loc>https://a.com/2</loc></url></urlset>"#;
        let locs = parse_sitemap_locs(xml);
        assert_eq!(locs, vec!["https://a.com/1", "https://a.com/2"]);
    }

    #[test]
    fn resolve_url_joins_relative_paths() {
        let resolved = resolve_url("https://example.com/blog/post", "../img/a.png").unwrap();
        assert_eq!(resolved, "https://example.com/img/a.png");
    }
}
