//! HTTP server setup and request forwarding.
//!
//! # Responsibilities
//! - Create the Axum router with a catch-all handler
//! - Wire up middleware (tracing, request ID, optional timeout)
//! - Serve the overwrite folder, then forward to the upstream
//! - Run the response transformer on the way back
//! - Serve over plain TCP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::director;
use crate::http::overwrite;
use crate::http::response::ResponseTransformer;
use crate::lifecycle::shutdown::wait_for;
use crate::net::InFlightTracker;
use crate::observability::metrics;
use crate::rewrite::UrlMatcher;

/// In-flight requests get this long to finish after shutdown is requested.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that stop the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub client: reqwest::Client,
    pub responses: ResponseTransformer,
    pub in_flight: InFlightTracker,
}

/// HTTP server for the forward gateway.
pub struct HttpServer {
    router: Router,
    in_flight: InFlightTracker,
}

impl HttpServer {
    /// Create a server for `config`. The URL matcher is compiled here, once.
    pub fn new(config: Arc<ProxyConfig>) -> Result<Self, ServerError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout)
            .build()?;

        let matcher = Arc::new(UrlMatcher::new());
        let in_flight = InFlightTracker::new();
        let state = AppState {
            config: Arc::clone(&config),
            client,
            responses: ResponseTransformer::new(Arc::clone(&config), matcher),
            in_flight: in_flight.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, in_flight })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        if let Some(timeout) = config.request_timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.clone().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        self.log_stopped("HTTP");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            wait_for(shutdown).await;
            drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        let app = self.router.clone().into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;

        self.log_stopped("HTTPS");
        Ok(())
    }

    fn log_stopped(&self, protocol: &str) {
        tracing::info!(
            in_flight = self.in_flight.active_count(),
            cancelled = self.in_flight.cancelled_count(),
            "{protocol} server stopped"
        );
    }

    /// In-flight and cancelled request counts.
    pub fn in_flight(&self) -> &InFlightTracker {
        &self.in_flight
    }
}

/// Catch-all handler: overwrite folder, then the upstream.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let start = Instant::now();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or_default()
        .to_string();
    let guard = state.in_flight.track(request_id);
    let method = request.method().clone();

    let result = forward(&state, remote, request, guard.request_id()).await;

    let status = match &result {
        Ok(response) => response.status().as_u16(),
        Err(_) => 500,
    };
    metrics::record_request(method.as_str(), status, start);
    guard.complete();
    result
}

async fn forward(
    state: &AppState,
    remote: SocketAddr,
    request: Request<Body>,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let (mut parts, body) = request.into_parts();

    if let Some(folder) = &state.config.overwrite_folder {
        if let Some(response) = overwrite::lookup(folder, &parts.method, parts.uri.path()).await? {
            metrics::record_overwrite_hit();
            tracing::info!(request_id, "[{}] {} (overwrite)", parts.method, parts.uri);
            return Ok(response);
        }
    }

    let directed = director::direct(&state.config, &parts.uri, &mut parts.headers, remote)?;
    tracing::info!(
        request_id,
        mode = directed.context.mode.as_str(),
        "[{}] {}",
        parts.method,
        directed.url
    );

    let mut outbound = state
        .client
        .request(parts.method.clone(), directed.url.clone())
        .headers(parts.headers);
    if body.size_hint().exact() != Some(0) {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = outbound.send().await.map_err(|source| ProxyError::Upstream {
        url: directed.url.to_string(),
        source,
    })?;

    state
        .responses
        .transform(&directed.context, &parts.method, upstream)
        .await
}
