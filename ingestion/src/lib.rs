//! Loads heterogeneous content — local files, sitemaps, web pages, PDFs,
//! images — into chunked, schema-validated `Document`s and hands them to
//! a store through an embed-then-upsert pipeline.

pub mod chunker;
pub mod error;
pub mod file_loader;
pub mod html_loader;
pub mod loader;
pub mod metadata_builder;
pub mod orchestrator;
pub mod pdf;

pub use error::IngestError;
pub use file_loader::FileLoader;
pub use html_loader::HtmlLoader;
pub use loader::{LoadResult, Loader};
pub use orchestrator::IngestOrchestrator;
