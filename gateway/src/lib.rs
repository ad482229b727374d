//! HTTP surface of the gateway.
//!
//! Binds the scheduler, upstream client, and translator behind an axum
//! router: chat completions (buffered and streaming), the batch credential
//! validator, and the service/health/stats documents.

pub mod auth;
pub mod chat;
pub mod error;
pub mod meta;
pub mod router;
pub mod state;
pub mod verify;

pub use router::router;
pub use state::AppState;
