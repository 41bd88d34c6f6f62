//! Envelope verification for upstream services.
//!
//! Recomputes the HMAC over `<X-Auth-Ts>.<X-Auth-Claims>` and compares it in
//! constant time. The skew window is optional; without one any timestamp is
//! accepted.

use std::fmt;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use hmac::Mac;

use super::error::{ConfigError, VerifyError};
use super::signer::{canonical_message, keyed_mac, HmacSha256};
use super::{X_AUTH_CLAIMS, X_AUTH_SIG, X_AUTH_TS};

/// Checks X-Auth-* headers produced by the signing middleware.
#[derive(Clone)]
pub struct Verifier {
    mac: HmacSha256,
    max_skew: Option<Duration>,
}

impl Verifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ConfigError::InvalidKey);
        }

        Ok(Self {
            mac: keyed_mac(secret)?,
            max_skew: None,
        })
    }

    /// Reject envelopes whose timestamp is further than `max_skew` from now.
    pub fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.max_skew = Some(max_skew);
        self
    }

    /// Verify the envelope and return the decoded claims.
    pub fn verify(&self, headers: &HeaderMap, now: u64) -> Result<Vec<u8>, VerifyError> {
        let claims = header_str(headers, &X_AUTH_CLAIMS, "X-Auth-Claims")?;
        let ts = header_str(headers, &X_AUTH_TS, "X-Auth-Ts")?;
        let sig = header_str(headers, &X_AUTH_SIG, "X-Auth-Sig")?;

        // Only the exact decimal form the signer emits; `+` or leading zeros
        // would let an unsigned string through.
        let timestamp: u64 = ts.parse().map_err(|_| VerifyError::InvalidTimestamp)?;
        if timestamp.to_string() != ts {
            return Err(VerifyError::InvalidTimestamp);
        }

        if let Some(max_skew) = self.max_skew {
            let max_skew_secs = max_skew.as_secs();
            if now.abs_diff(timestamp) > max_skew_secs {
                return Err(VerifyError::Expired {
                    timestamp,
                    now,
                    max_skew_secs,
                });
            }
        }

        let expected = STANDARD_NO_PAD
            .decode(sig)
            .map_err(|_| VerifyError::Malformed("X-Auth-Sig"))?;

        let mut mac = self.mac.clone();
        mac.update(canonical_message(ts, claims).as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| VerifyError::BadSignature)?;

        STANDARD_NO_PAD
            .decode(claims)
            .map_err(|_| VerifyError::Malformed("X-Auth-Claims"))
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("secret", &"<redacted>")
            .field("max_skew", &self.max_skew)
            .finish()
    }
}

fn header_str<'a>(
    headers: &'a HeaderMap,
    name: &HeaderName,
    label: &'static str,
) -> Result<&'a str, VerifyError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(VerifyError::MissingHeader(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_header::{AuthHeaderConfig, Signer};
    use axum::http::HeaderValue;
    use std::collections::HashMap;

    const NOW: u64 = 1_700_000_000;

    fn signed_headers(credential: &'static str, ts: u64) -> HeaderMap {
        let mut secrets = HashMap::new();
        secrets.insert("X_AUTH_SIG_SECRET".to_string(), "s3cr3t".to_string());
        let signer = Signer::from_config(&AuthHeaderConfig::default(), "test", &secrets).unwrap();

        let mut headers = HeaderMap::new();
        signer
            .sign_at(credential.as_bytes(), ts)
            .write_to(&mut headers)
            .unwrap();
        headers
    }

    #[test]
    fn test_accepts_signed_envelope() {
        let verifier = Verifier::new("s3cr3t").unwrap();
        let claims = verifier.verify(&signed_headers("Bearer abc123", NOW), NOW).unwrap();
        assert_eq!(claims, b"abc123");
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let verifier = Verifier::new("other").unwrap();
        let err = verifier.verify(&signed_headers("Bearer abc123", NOW), NOW).unwrap_err();
        assert_eq!(err, VerifyError::BadSignature);
    }

    #[test]
    fn test_rejects_tampered_fields() {
        let verifier = Verifier::new("s3cr3t").unwrap();

        let mut headers = signed_headers("Bearer abc123", NOW);
        headers.insert(X_AUTH_CLAIMS, HeaderValue::from_static("YWJjMTI0"));
        assert_eq!(verifier.verify(&headers, NOW), Err(VerifyError::BadSignature));

        let mut headers = signed_headers("Bearer abc123", NOW);
        headers.insert(X_AUTH_TS, HeaderValue::from(NOW + 1));
        assert_eq!(verifier.verify(&headers, NOW), Err(VerifyError::BadSignature));

        let mut headers = signed_headers("Bearer abc123", NOW);
        headers.insert(X_AUTH_SIG, HeaderValue::from_static("evil"));
        assert_eq!(verifier.verify(&headers, NOW), Err(VerifyError::BadSignature));
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let verifier = Verifier::new("s3cr3t").unwrap();

        let mut headers = signed_headers("Bearer abc123", NOW);
        headers.remove(X_AUTH_SIG);
        assert_eq!(
            verifier.verify(&headers, NOW),
            Err(VerifyError::MissingHeader("X-Auth-Sig"))
        );

        let mut headers = signed_headers("Bearer abc123", NOW);
        headers.insert(X_AUTH_TS, HeaderValue::from_static("-5"));
        assert_eq!(verifier.verify(&headers, NOW), Err(VerifyError::InvalidTimestamp));

        for ts in ["+1700000000", "01700000000", "0001700000000", " 1700000000"] {
            let mut headers = signed_headers("Bearer abc123", NOW);
            headers.insert(X_AUTH_TS, HeaderValue::from_static(ts));
            assert_eq!(
                verifier.verify(&headers, NOW),
                Err(VerifyError::InvalidTimestamp),
                "{ts:?} must not verify"
            );
        }

        let mut headers = signed_headers("Bearer abc123", NOW);
        headers.insert(X_AUTH_SIG, HeaderValue::from_static("!!!"));
        assert_eq!(
            verifier.verify(&headers, NOW),
            Err(VerifyError::Malformed("X-Auth-Sig"))
        );
    }

    #[test]
    fn test_skew_window() {
        let verifier = Verifier::new("s3cr3t")
            .unwrap()
            .with_max_skew(Duration::from_secs(30));
        let headers = signed_headers("Bearer abc123", NOW);

        assert!(verifier.verify(&headers, NOW + 30).is_ok());
        assert!(verifier.verify(&headers, NOW - 30).is_ok());
        assert_eq!(
            verifier.verify(&headers, NOW + 31),
            Err(VerifyError::Expired {
                timestamp: NOW,
                now: NOW + 31,
                max_skew_secs: 30,
            })
        );
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert_eq!(Verifier::new("").unwrap_err(), ConfigError::InvalidKey);
    }
}
