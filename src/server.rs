//! HTTP front end and process lifecycle.

use crate::config::{GlobalSettings, MockServerConfig};
use crate::engine::{Resolution, ResolutionEngine};
use crate::request::{category_from_path, RequestInput};
use crate::store::FixtureStore;
use crate::watcher::{FixtureWatcher, IgnoreRules};
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Header naming the fallback tier that produced a response.
pub const SOURCE_HEADER: &str = "x-mock-source";

/// Body written to the global default fixture when it is missing.
const SEED_DEFAULT: &str = "{\n  \"status\": \"ok\",\n  \"message\": \"Default mock response\"\n}\n";

/// Request counters.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    requests_total: AtomicU64,
    fixtures_served: AtomicU64,
    fallbacks_served: AtomicU64,
}

impl ServerMetrics {
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_fixtures(&self) -> u64 {
        self.fixtures_served.load(Ordering::Relaxed)
    }

    pub fn total_fallbacks(&self) -> u64 {
        self.fallbacks_served.load(Ordering::Relaxed)
    }

    fn record(&self, resolution: &Resolution) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if resolution.source.is_fallback() {
            self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fixtures_served.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ResolutionEngine>,
    metrics: Arc<ServerMetrics>,
    lookup_field: Arc<str>,
    delay_param: Arc<str>,
    settings: GlobalSettings,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<ResolutionEngine>, config: &MockServerConfig) -> Self {
        Self {
            engine,
            metrics: Arc::new(ServerMetrics::default()),
            lookup_field: config.fixtures.lookup_field.as_str().into(),
            delay_param: config.delay.param.as_str().into(),
            settings: config.settings.clone(),
            started_at: Utc::now(),
        }
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_ms: i64,
    pub fixtures_cached: usize,
    pub requests_total: u64,
    pub fixtures_served: u64,
    pub fallbacks_served: u64,
}

/// Build the router: a health endpoint plus a catch-all fixture handler.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/__mock/health", get(health))
        .fallback(serve_fixture)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_ms = (Utc::now() - state.started_at).num_milliseconds().max(0);
    Json(HealthResponse {
        status: "ok",
        started_at: state.started_at,
        uptime_ms,
        fixtures_cached: state.engine.store().len(),
        requests_total: state.metrics.total_requests(),
        fixtures_served: state.metrics.total_fixtures(),
        fallbacks_served: state.metrics.total_fallbacks(),
    })
}

async fn serve_fixture(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let input = RequestInput::new(method.clone(), uri.query()).with_body(content_type, &body);

    let category = category_from_path(uri.path());
    let lookup = input.lookup_value(&state.lookup_field);
    let explicit_delay = input.explicit_delay(&state.delay_param);
    let request_data = input.request_data();

    let resolution = state
        .engine
        .resolve(lookup.as_deref(), category, &request_data, explicit_delay);
    state.metrics.record(&resolution);

    if state.settings.log_requests {
        info!(
            method = %method,
            path = %uri.path(),
            category = ?category,
            lookup = ?lookup,
            source = resolution.source.label(),
            delay_ms = resolution.delay_ms,
            "Serving mock response"
        );
    }
    if state.settings.log_fallbacks && resolution.source.is_fallback() {
        warn!(
            method = %method,
            path = %uri.path(),
            source = resolution.source.label(),
            "No specific fixture matched, served fallback"
        );
    }

    if resolution.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(resolution.delay_ms)).await;
    }

    let mut response = Json(resolution.body).into_response();
    response.headers_mut().insert(
        HeaderName::from_static(SOURCE_HEADER),
        HeaderValue::from_static(resolution.source.label()),
    );
    response
}

/// Create the fixture root and, if enabled, a placeholder default fixture.
pub async fn prepare_fixture_root(config: &MockServerConfig) -> anyhow::Result<()> {
    let root = &config.fixtures.root;
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("creating fixture root {}", root.display()))?;

    let default_path = root.join(&config.fixtures.default_file);
    if config.fixtures.seed_default && !tokio::fs::try_exists(&default_path).await.unwrap_or(false) {
        tokio::fs::write(&default_path, SEED_DEFAULT)
            .await
            .with_context(|| format!("writing {}", default_path.display()))?;
        info!(path = %default_path.display(), "Created default fixture");
    }
    Ok(())
}

/// Build the engine and router over a prepared fixture root.
pub fn build_app(config: &MockServerConfig) -> anyhow::Result<(Arc<FixtureStore>, Router)> {
    let store = Arc::new(
        FixtureStore::open(&config.fixtures.root).context("opening fixture root")?,
    );
    let engine = Arc::new(ResolutionEngine::new(Arc::clone(&store), config));
    let router = build_router(AppState::new(engine, config));
    Ok((store, router))
}

/// Run the server until Ctrl-C or SIGTERM.
pub async fn run(config: MockServerConfig) -> anyhow::Result<()> {
    prepare_fixture_root(&config).await?;
    let (store, router) = build_app(&config)?;

    let watcher = if config.watch.enabled {
        let ignore = IgnoreRules::new(&config.watch.ignore).context("compiling watch ignore rules")?;
        Some(FixtureWatcher::start(Arc::clone(&store), ignore).context("starting fixture watcher")?)
    } else {
        info!("Hot reload disabled, fixtures are cached until restart");
        None
    };

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(
        address = %config.server.listen,
        root = %store.root().display(),
        "Fixture mock server listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving mock HTTP router")?;

    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    store.clear();
    info!("Fixture mock server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
