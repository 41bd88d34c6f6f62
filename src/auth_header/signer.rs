//! Credential signing.
//!
//! # Responsibilities
//! - Resolve middleware options and the shared secret at construction
//! - Strip client-supplied trust headers from every request
//! - Build the canonical message `<ts>.<claims>` and sign it with HMAC-SHA256
//! - Write the X-Auth-* triplet back onto the request
//!
//! # Design Decisions
//! - Header values are handled as bytes, so non-UTF-8 credentials still sign
//! - The HMAC is keyed once and cloned per request
//! - Base64 uses the standard alphabet without padding

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{
    header::{InvalidHeaderValue, AUTHORIZATION},
    HeaderMap, HeaderValue,
};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::error::ConfigError;
use super::secret::SecretSource;
use super::{
    DEFAULT_AUTH_HEADER_PREFIX, DEFAULT_SECRET_ENV_VAR, FALLBACK_SECRET_ENV_VAR, X_AUTH_CLAIMS,
    X_AUTH_SIG, X_AUTH_TS,
};

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// Operator options for one middleware mount.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthHeaderConfig {
    /// Name of the environment variable holding the HMAC key.
    #[serde(alias = "sharedSecretEnvVar")]
    pub shared_secret_env_var: String,

    /// Prefix removed from the credential before signing.
    #[serde(alias = "authHeaderPrefix")]
    pub auth_header_prefix: String,
}

impl Default for AuthHeaderConfig {
    fn default() -> Self {
        Self {
            shared_secret_env_var: DEFAULT_SECRET_ENV_VAR.to_string(),
            auth_header_prefix: DEFAULT_AUTH_HEADER_PREFIX.to_string(),
        }
    }
}

impl AuthHeaderConfig {
    /// Variable name actually read at construction.
    ///
    /// An empty name falls back to `AUTH_SHARED_SECRET`, which is not the
    /// factory default `X_AUTH_SIG_SECRET`.
    pub fn resolved_env_var(&self) -> &str {
        if self.shared_secret_env_var.is_empty() {
            FALLBACK_SECRET_ENV_VAR
        } else {
            &self.shared_secret_env_var
        }
    }

    /// Prefix actually stripped from credentials.
    pub fn resolved_prefix(&self) -> &str {
        if self.auth_header_prefix.is_empty() {
            DEFAULT_AUTH_HEADER_PREFIX
        } else {
            &self.auth_header_prefix
        }
    }
}

/// The three header values produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Unpadded base64 of the claims substring.
    pub claims: String,
    /// Unix seconds at signing time.
    pub timestamp: u64,
    /// Unpadded base64 of the HMAC-SHA256 digest.
    pub signature: String,
}

impl SignedEnvelope {
    /// Overwrites the X-Auth-* headers with this envelope.
    pub fn write_to(&self, headers: &mut HeaderMap) -> Result<(), InvalidHeaderValue> {
        let claims = HeaderValue::from_str(&self.claims)?;
        let signature = HeaderValue::from_str(&self.signature)?;

        headers.insert(X_AUTH_CLAIMS, claims);
        headers.insert(X_AUTH_TS, HeaderValue::from(self.timestamp));
        headers.insert(X_AUTH_SIG, signature);
        Ok(())
    }
}

/// Result of processing one request's headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Whether a signed envelope was attached.
    pub signed: bool,
    /// Number of client-supplied X-Auth-* headers that were removed.
    pub spoofed: usize,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        if self.signed {
            "signed"
        } else {
            "unsigned"
        }
    }
}

/// Signs credentials for one middleware mount.
///
/// Immutable after construction and safe to share across requests.
#[derive(Clone)]
pub struct Signer {
    name: String,
    secret_env_var: String,
    prefix: String,
    mac: HmacSha256,
}

impl Signer {
    /// Resolve options and the shared secret.
    ///
    /// Fails when the secret variable is unset or empty; the caller must not
    /// mount the middleware in that case.
    pub fn from_config<S>(
        config: &AuthHeaderConfig,
        name: impl Into<String>,
        secrets: &S,
    ) -> Result<Self, ConfigError>
    where
        S: SecretSource + ?Sized,
    {
        let name = name.into();
        let secret_env_var = config.resolved_env_var().to_string();
        let prefix = config.resolved_prefix().to_string();

        let secret = secrets
            .lookup(&secret_env_var)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingSecret(secret_env_var.clone()))?;
        let mac = keyed_mac(secret.as_bytes())?;

        tracing::info!(
            middleware = %name,
            secret_env_var = %secret_env_var,
            prefix = ?prefix,
            "Auth header signer initialized"
        );

        Ok(Self {
            name,
            secret_env_var,
            prefix,
            mac,
        })
    }

    /// Instance name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The part of the credential that gets signed.
    ///
    /// Exact, case-sensitive prefix match; a non-matching credential is
    /// signed whole.
    pub fn claims_of<'a>(&self, authorization: &'a [u8]) -> &'a [u8] {
        authorization
            .strip_prefix(self.prefix.as_bytes())
            .unwrap_or(authorization)
    }

    /// Sign a credential at the current wall-clock time.
    pub fn sign(&self, authorization: &[u8]) -> SignedEnvelope {
        self.sign_at(authorization, unix_now())
    }

    /// Sign a credential at a fixed timestamp.
    pub fn sign_at(&self, authorization: &[u8], timestamp: u64) -> SignedEnvelope {
        let claims = STANDARD_NO_PAD.encode(self.claims_of(authorization));
        let signature = self.signature(timestamp, &claims);

        SignedEnvelope {
            claims,
            timestamp,
            signature,
        }
    }

    /// Base64 HMAC over the canonical message.
    pub fn signature(&self, timestamp: u64, claims: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(canonical_message(timestamp, claims).as_bytes());
        STANDARD_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Strip trust headers and, when a credential was present, sign it.
    pub fn apply(&self, headers: &mut HeaderMap) -> Outcome {
        // Removes every value; the first one is the credential.
        let authorization = headers.remove(AUTHORIZATION);

        let spoofed = [X_AUTH_CLAIMS, X_AUTH_TS, X_AUTH_SIG]
            .into_iter()
            .filter(|name| headers.remove(name).is_some())
            .count();

        let authorization = match authorization {
            Some(value) if !value.is_empty() => value,
            _ => {
                return Outcome {
                    signed: false,
                    spoofed,
                }
            }
        };

        let envelope = self.sign(authorization.as_bytes());
        let signed = match envelope.write_to(headers) {
            Ok(()) => true,
            Err(e) => {
                // Unreachable with base64 output; the request still goes out stripped.
                tracing::error!(middleware = %self.name, error = %e, "Failed to set signed headers");
                false
            }
        };

        Outcome { signed, spoofed }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("name", &self.name)
            .field("secret_env_var", &self.secret_env_var)
            .field("prefix", &self.prefix)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// `<timestamp>.<claims>`, with the timestamp exactly as it appears in `X-Auth-Ts`.
pub fn canonical_message(timestamp: impl fmt::Display, claims: &str) -> String {
    format!("{}.{}", timestamp, claims)
}

/// Current Unix time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn keyed_mac(secret: &[u8]) -> Result<HmacSha256, ConfigError> {
    HmacSha256::new_from_slice(secret).map_err(|_| ConfigError::InvalidKey)
}
