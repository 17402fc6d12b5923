//! Comment Analyzer: binary entrypoint.
//! Boots the Axum HTTP server: config, tracing, metrics, engine and routes.

use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use comment_analyzer::metrics::Metrics;
use comment_analyzer::{router, AnalyzerRuntime, AppState};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Compact logs by default, JSON lines when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("comment_analyzer=info,warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init().context("installing prometheus recorder")?;

    let rt = AnalyzerRuntime::from_env().context("loading analyzer config")?;
    let warmed = rt.warmup().await;
    tracing::info!(?warmed, "startup warm-up finished");

    let engine = rt.engine.clone();
    let app = router(AppState::new(rt.engine.clone())).merge(metrics.router());

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()
        .context("parsing BIND_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving http")?;

    engine.shutdown();
    Ok(())
}
