//! Authorization header signing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (Authorization: Bearer <token>)
//!     → layer.rs (tower service, strips spoofable headers)
//!     → signer.rs (claims → timestamp → canonical message → HMAC-SHA256)
//!     → X-Auth-Claims / X-Auth-Ts / X-Auth-Sig set on the request
//!     → next service in the chain
//!
//! Upstream side:
//!     verify.rs recomputes the HMAC and checks the timestamp window
//! ```
//!
//! # Design Decisions
//! - Secret resolved once, at construction, through a `SecretSource`
//! - Construction fails closed when the secret is missing
//! - Per-request handling never fails and never answers the client itself
//! - Credential contents are never parsed or interpreted

pub mod error;
pub mod layer;
pub mod secret;
pub mod signer;
pub mod verify;

use axum::http::HeaderName;

pub use error::{ConfigError, VerifyError};
pub use layer::{AuthHeaderLayer, AuthHeaderService};
pub use secret::{EnvSecrets, SecretSource};
pub use signer::{AuthHeaderConfig, Outcome, SignedEnvelope, Signer};
pub use verify::Verifier;

/// Carries the base64 encoded credential.
pub const X_AUTH_CLAIMS: HeaderName = HeaderName::from_static("x-auth-claims");

/// Carries the signing time as decimal Unix seconds.
pub const X_AUTH_TS: HeaderName = HeaderName::from_static("x-auth-ts");

/// Carries the base64 encoded HMAC-SHA256 signature.
pub const X_AUTH_SIG: HeaderName = HeaderName::from_static("x-auth-sig");

/// Environment variable named by `AuthHeaderConfig::default()`.
pub const DEFAULT_SECRET_ENV_VAR: &str = "X_AUTH_SIG_SECRET";

/// Environment variable used when the configured name is empty at construction.
pub const FALLBACK_SECRET_ENV_VAR: &str = "AUTH_SHARED_SECRET";

/// Credential prefix stripped before signing.
pub const DEFAULT_AUTH_HEADER_PREFIX: &str = "Bearer ";
