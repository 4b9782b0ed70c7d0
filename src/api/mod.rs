//! HTTP surface.
//!
//! Exposes extraction, the assessment pipeline and portfolio analytics as
//! JSON endpoints. Routes are nested under `/api/`; `api_router()` returns
//! a `Router` that can be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_server, ApiServer};
pub use types::ApiContext;
