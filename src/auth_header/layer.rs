//! Tower middleware wrapping the next handler.
//!
//! The signer runs synchronously inside `call`, before the inner future is
//! created, and the inner service is called exactly once per request on both
//! the signed and the unsigned path.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::Request;
use tower::{Layer, Service};

use super::error::ConfigError;
use super::secret::SecretSource;
use super::signer::{AuthHeaderConfig, Signer};
use crate::observability::metrics;

/// Layer producing [`AuthHeaderService`]s that share one signer.
#[derive(Debug, Clone)]
pub struct AuthHeaderLayer {
    signer: Arc<Signer>,
}

impl AuthHeaderLayer {
    /// Resolve the secret and build the layer. Fails closed.
    pub fn new<S>(
        config: &AuthHeaderConfig,
        name: impl Into<String>,
        secrets: &S,
    ) -> Result<Self, ConfigError>
    where
        S: SecretSource + ?Sized,
    {
        let signer = Signer::from_config(config, name, secrets)?;
        Ok(Self::from_signer(Arc::new(signer)))
    }

    pub fn from_signer(signer: Arc<Signer>) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }
}

impl<S> Layer<S> for AuthHeaderLayer {
    type Service = AuthHeaderService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthHeaderService {
            inner,
            signer: self.signer.clone(),
        }
    }
}

/// Strips trust headers, signs the credential, then calls `inner`.
#[derive(Debug, Clone)]
pub struct AuthHeaderService<S> {
    inner: S,
    signer: Arc<Signer>,
}

impl<S> AuthHeaderService<S> {
    /// Wrap `next`. Returns an error instead of a service when the secret
    /// cannot be resolved.
    pub fn new<Src>(
        next: S,
        config: &AuthHeaderConfig,
        name: impl Into<String>,
        secrets: &Src,
    ) -> Result<Self, ConfigError>
    where
        Src: SecretSource + ?Sized,
    {
        Ok(AuthHeaderLayer::new(config, name, secrets)?.layer(next))
    }
}

impl<S, B> Service<Request<B>> for AuthHeaderService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let outcome = self.signer.apply(req.headers_mut());

        if outcome.spoofed > 0 {
            tracing::warn!(
                middleware = %self.signer.name(),
                count = outcome.spoofed,
                "Discarded client-supplied X-Auth-* headers"
            );
        }
        tracing::debug!(
            middleware = %self.signer.name(),
            outcome = outcome.label(),
            "Auth headers processed"
        );
        metrics::record_auth_outcome(self.signer.name(), &outcome);

        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_header::{X_AUTH_CLAIMS, X_AUTH_SIG, X_AUTH_TS};
    use axum::http::{header::AUTHORIZATION, HeaderMap};
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{service_fn, ServiceExt};

    fn secrets() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("X_AUTH_SIG_SECRET".to_string(), "s3cr3t".to_string());
        map
    }

    /// Next handler that counts calls and returns the headers it received.
    fn recording_service(
        calls: Arc<AtomicUsize>,
    ) -> impl Service<Request<()>, Response = HeaderMap, Error = Infallible> + Clone {
        service_fn(move |req: Request<()>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(req.headers().clone())
            }
        })
    }

    #[tokio::test]
    async fn test_signed_request_reaches_next_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = AuthHeaderService::new(
            recording_service(calls.clone()),
            &AuthHeaderConfig::default(),
            "test",
            &secrets(),
        )
        .unwrap();

        let req = Request::builder()
            .header(AUTHORIZATION, "Bearer abc123")
            .body(())
            .unwrap();
        let headers = svc.oneshot(req).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.get(X_AUTH_CLAIMS).unwrap(), "YWJjMTIz");
        assert!(headers.get(X_AUTH_TS).is_some());
        assert!(headers.get(X_AUTH_SIG).is_some());
    }

    #[tokio::test]
    async fn test_unsigned_request_reaches_next_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = AuthHeaderService::new(
            recording_service(calls.clone()),
            &AuthHeaderConfig::default(),
            "test",
            &secrets(),
        )
        .unwrap();

        let req = Request::builder()
            .header("X-Auth-Sig", "evil")
            .header("X-Auth-Claims", "ZXZpbA")
            .header("X-Other", "kept")
            .body(())
            .unwrap();
        let headers = svc.oneshot(req).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(headers.get(X_AUTH_CLAIMS).is_none());
        assert!(headers.get(X_AUTH_TS).is_none());
        assert!(headers.get(X_AUTH_SIG).is_none());
        assert_eq!(headers.get("x-other").unwrap(), "kept");
    }

    #[tokio::test]
    async fn test_layer_shares_signer_across_services() {
        let calls = Arc::new(AtomicUsize::new(0));
        let layer = AuthHeaderLayer::new(&AuthHeaderConfig::default(), "shared", &secrets()).unwrap();

        for _ in 0..3 {
            let svc = layer.layer(recording_service(calls.clone()));
            let req = Request::builder()
                .header(AUTHORIZATION, "Token xyz")
                .body(())
                .unwrap();
            let headers = svc.oneshot(req).await.unwrap();
            assert_eq!(headers.get(X_AUTH_CLAIMS).unwrap(), "VG9rZW4geHl6");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(layer.signer().name(), "shared");
    }

    #[test]
    fn test_construction_fails_without_secret() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = AuthHeaderService::new(
            recording_service(calls.clone()),
            &AuthHeaderConfig::default(),
            "test",
            &HashMap::<String, String>::new(),
        );

        assert!(matches!(result, Err(ConfigError::MissingSecret(ref name)) if name == "X_AUTH_SIG_SECRET"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
