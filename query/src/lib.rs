//! The retrieval half of the pipeline: embed a query, search a store
//! space, optionally rerank, return documents.

pub mod error;
pub mod retriever;

pub use error::RetrieveError;
pub use retriever::Retriever;
