//! Authorization header signing proxy.
//!
//! Replaces the inbound `Authorization` header with a server-signed
//! `X-Auth-Claims` / `X-Auth-Ts` / `X-Auth-Sig` envelope before forwarding to
//! a single upstream. The signer is a plain tower layer and can be mounted in
//! any tower/axum stack without the bundled proxy.

pub mod auth_header;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use auth_header::{AuthHeaderConfig, AuthHeaderLayer, AuthHeaderService, Signer, Verifier};
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
