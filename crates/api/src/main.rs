use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use throttleq_api::config::ServerConfig;
use throttleq_api::state::AppState;
use throttleq_api::{background, routes};
use throttleq_core::clock::{Clock, SystemClock};
use throttleq_core::rate_limit::SlidingWindowLimiter;
use throttleq_queue::MemoryQueue;
use throttleq_worker::email::EmailVerificationTask;
use throttleq_worker::gate::HttpGate;
use throttleq_worker::offboard::OffboardTask;
use throttleq_worker::pool::WorkerPool;
use throttleq_worker::telemetry;

/// How long background tasks get to stop after the server drains.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    telemetry::init_tracing("throttleq_api=debug,throttleq_worker=debug,tower_http=debug");

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window_ms,
        "Loaded server configuration",
    );

    // --- CORS ---
    let cors = build_cors_layer(&config)?;

    // --- Limiter ---
    let limiter = Arc::new(SlidingWindowLimiter::new(config.rate_limit));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cancel = CancellationToken::new();

    let reaper_handle = config.rate_limit_idle_ttl.map(|idle_ttl| {
        tokio::spawn(background::idle_reaper::run(
            Arc::clone(&limiter),
            Arc::clone(&clock),
            idle_ttl,
            cancel.clone(),
        ))
    });

    // --- Queue ---
    let queue = Arc::new(MemoryQueue::new(config.queue));
    let events_handle = tokio::spawn(telemetry::log_queue_events(
        queue.subscribe(),
        cancel.clone(),
    ));

    // --- Workers ---
    let pools = if config.worker_enabled {
        let gate = HttpGate::new(config.worker.gate_url.clone(), config.worker.gate_timeout)
            .context("Failed to build gate client")?;
        let handler = Arc::new(OffboardTask::new(Arc::new(gate), config.worker.work_delay));
        let offboard = WorkerPool::spawn(&config.worker, queue.clone(), handler, cancel.clone());

        let email = WorkerPool::spawn(
            &config.worker.with_channel(config.worker.email_channel.clone()),
            queue.clone(),
            Arc::new(EmailVerificationTask::new(config.worker.email_step_delay)),
            cancel.clone(),
        );
        vec![offboard, email]
    } else {
        tracing::info!("In-process worker pools disabled");
        Vec::new()
    };

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        limiter,
        clock,
        queue,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check and admission gate at root level (not under /api/v1).
        .merge(routes::health::router())
        .merge(routes::gate::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    // --- Start server ---
    let host = config
        .host
        .parse::<IpAddr>()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    // In-process offboard workers call this server's gate, so the pools drain
    // before the listener closes.
    let drain = async move {
        shutdown_signal().await;
        futures::future::join_all(pools.into_iter().map(|p| p.shutdown(SHUTDOWN_GRACE))).await;
    };

    // Peer addresses feed the gate's identity fallback.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(drain)
    .await
    .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    if let Some(handle) = reaper_handle {
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle).await;
    }
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, events_handle).await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// `Retry-After` is exposed so browser clients can read the gate's delay.
fn build_cors_layer(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let origins = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin '{o}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([axum::http::header::RETRY_AFTER])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600)))
}
