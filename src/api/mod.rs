//! HTTP API module
//!
//! The oracle-facing surface of the adapter: request/response wire types
//! and the dispatcher router.

pub mod routes;
pub mod types;

pub use routes::{create_adapter_router, AppState};
pub use types::{EvaluationRequest, OracleRequest, OracleResponse, RequestMode};
