//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer stack)
//!     → request.rs (request ID)
//!     → auth_header layer (strip + sign)
//!     → server.rs forward_handler (rewrite URI, send upstream)
//!     → upstream response returned unchanged
//! ```

pub mod request;
pub mod server;

pub use request::{request_id, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
