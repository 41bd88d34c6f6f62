//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding handler
//! - Wire up middleware (tracing, request ID, timeout, auth header signing)
//! - Bind server to listener
//! - Forward requests to the upstream service
//! - Observability (metrics, correlation IDs)

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, Scheme},
        Request, StatusCode, Uri, Version,
    },
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth_header::{AuthHeaderLayer, ConfigError, EnvSecrets, SecretSource};
use crate::config::ProxyConfig;
use crate::http::request::request_id;
use crate::lifecycle::shutdown::wait_for;
use crate::observability::metrics;

/// Failure to build the server. The proxy must not start.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("auth header middleware: {0}")]
    Signer(#[from] ConfigError),

    #[error("invalid upstream address {0:?}")]
    InvalidUpstream(String),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
}

/// HTTP server for the signing proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server whose signer reads its secret from the process environment.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        Self::with_secrets(config, &EnvSecrets)
    }

    /// Create a server resolving the signing secret through `secrets`.
    pub fn with_secrets<S>(config: ProxyConfig, secrets: &S) -> Result<Self, ServerError>
    where
        S: SecretSource + ?Sized,
    {
        let auth = AuthHeaderLayer::new(
            &config.auth_header.options,
            config.auth_header.name.clone(),
            secrets,
        )?;

        let upstream: Authority = config
            .upstream
            .address
            .trim()
            .parse()
            .map_err(|_| ServerError::InvalidUpstream(config.upstream.address.clone()))?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState { client, upstream };
        let router = Self::build_router(&config, state, auth);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The auth header layer is innermost so that nothing after it can
    /// re-introduce client headers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState, auth: AuthHeaderLayer) -> Router {
        Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .with_state(state)
            .layer(auth)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            middleware = %self.config.auth_header.name,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router, for in-process use.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Forward the (already signed) request to the upstream.
async fn forward_handler(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().to_string();

    let uri = match upstream_uri(&state.upstream, request.uri()) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            metrics::record_request(&method, 500, start_time);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid upstream URI").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Forwarding request"
    );

    *request.uri_mut() = uri;
    *request.version_mut() = Version::HTTP_11;

    match state.client.request(request).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start_time);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_request(&method, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// `http://<upstream><path?query>`
fn upstream_uri(upstream: &Authority, uri: &Uri) -> Result<Uri, axum::http::Error> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(upstream.clone())
        .path_and_query(path_and_query)
        .build()
}
