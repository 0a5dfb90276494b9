//! The boundary's core-facing facade: a `ServerState` whose methods
//! correspond 1:1 to the HTTP surface an (out-of-scope) thin shell exposes.
//! Nothing in this crate depends on a web framework.

pub mod error;
pub mod state;

pub use error::ServerError;
pub use state::{DocumentView, HealthStatus, ReloadTarget, SavedFile, ServerState, UploadedFile};
