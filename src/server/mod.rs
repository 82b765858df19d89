//! HTTP service: JSON endpoints over the mailbox, spreadsheet and working-storage operations.
//!
//! No credential state lives here; every mailbox-facing request carries its own.

pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::mail::{MailRelay, MailTransport};
use crate::store::WorkDir;

/// Shared per-process state handed to every handler.
pub struct AppState<T> {
    pub transport: Arc<T>,
    pub relay: Arc<dyn MailRelay>,
    pub workdir: WorkDir,
    pub config: Arc<Config>,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            relay: Arc::clone(&self.relay),
            workdir: self.workdir.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: MailTransport> AppState<T> {
    pub fn new(transport: T, relay: Arc<dyn MailRelay>, workdir: WorkDir, config: Config) -> Self {
        Self {
            transport: Arc::new(transport),
            relay,
            workdir,
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
pub fn router<T: MailTransport + 'static>(state: AppState<T>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/authenticate", post(handlers::authenticate::<T>))
        .route("/api/fetch-emails", post(handlers::fetch_emails::<T>))
        .route(
            "/api/download-attachment",
            post(handlers::download_attachment::<T>),
        )
        .route("/api/process-excel", post(handlers::process_excel::<T>))
        .route("/api/send-email", post(handlers::send_email::<T>))
        .route("/api/mark-as-read", post(handlers::mark_as_read::<T>))
        .route("/download", get(handlers::download::<T>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically delete working files older than `max_age`.
pub fn spawn_sweep(workdir: WorkDir, every: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let dir = workdir.clone();
            match tokio::task::spawn_blocking(move || dir.sweep(max_age)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Working-directory sweep failed"),
                Err(e) => tracing::warn!(error = %e, "Sweep task failed"),
            }
        }
    })
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
pub async fn serve<T: MailTransport + 'static>(state: AppState<T>, addr: &str) -> anyhow::Result<()> {
    let sweeper = spawn_sweep(
        state.workdir.clone(),
        state.config.server.sweep_interval(),
        state.config.server.file_max_age(),
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        work_dir = %state.workdir.root().display(),
        "Listening"
    );

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
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
    tracing::info!("Shutting down");
}
