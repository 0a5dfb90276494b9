pub mod embedded;
pub mod index;
pub mod postgres;
pub mod store_manager;
pub mod wal;

pub use embedded::EmbeddedStoreManager;
pub use postgres::{PostgresConfig, PostgresStoreManager};
pub use store_manager::{QueryFilter, ScoredDocument, StoreError, StoreManager};
