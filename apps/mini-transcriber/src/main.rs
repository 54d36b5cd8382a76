use anyhow::Result;
use clap::Parser;
use job_queue::JobQueue;
use mini_transcriber::{build_router, drain_queue, engine::build_engine, observability::init_tracing, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Upper bound on waiting for admitted jobs after the server stops.
const SHUTDOWN_DRAIN_TIMEOUT_SECS: u64 = 600;

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();

	let config = Config::parse();
	config.validate().map_err(anyhow::Error::msg)?;

	init_tracing(&config)?;

	info!(
		engine = ?config.engine,
		default_model = %config.default_model,
		max_workers = config.queue.max_workers,
		max_queue_size = config.queue.max_queue_size,
		"🎯 Starting transcription service"
	);

	let engine = build_engine(&config)?;
	let queue = Arc::new(JobQueue::start(config.queue.clone(), Arc::clone(&engine), prometheus::default_registry())?);

	let config = Arc::new(config);
	let state = AppState::new(Arc::clone(&config), Arc::clone(&queue), engine);
	let app = build_router(state);

	let listener = TcpListener::bind(config.bind_addr()).await?;
	info!("🚀 Listening on {}", listener.local_addr()?);

	let shutdown_token = CancellationToken::new();
	let signal_token = shutdown_token.clone();
	tokio::spawn(async move {
		wait_for_shutdown_signal().await;
		info!("🛑 Shutdown signal received (SIGTERM/SIGINT)");
		signal_token.cancel();
	});

	let server_token = shutdown_token.clone();
	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			server_token.cancelled().await;
		})
		.await?;
	info!("Server stopped, draining admitted jobs...");

	if drain_queue(&queue, Duration::from_secs(SHUTDOWN_DRAIN_TIMEOUT_SECS)).await {
		info!("✅ Shutdown complete");
		return Ok(());
	}

	// dropping the runtime would block on the stuck engine threads; the OS reclaims them
	error!(active_workers = queue.query_health().active_workers, "❌ Drain timeout - exiting with jobs still running");
	std::process::exit(1);
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!(error = %e, "⚠️ Failed to install Ctrl+C handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "⚠️ Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}
