use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::GatewayConfig;
use crate::server;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub http_listen: String,
    pub grpc_listen: String,
    pub admin_listen: Option<String>,
}

/// Gateway lifecycle: init -> serve -> shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();

    let config = GatewayConfig::load(&args.config_path)?;
    let state = server::GatewayState::new(config);

    let shutdown = Arc::new(Notify::new());

    if let Some(admin_listen) = args.admin_listen.clone() {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_admin_server(&admin_listen, state).await {
                tracing::error!("bootstrap: admin server failed, error={}", e);
            }
        });
    }

    let grpc_handle = tokio::spawn({
        let state = state.clone();
        let shutdown = shutdown.clone();
        let listen = args.grpc_listen.clone();
        async move { server::run_grpc_server(&listen, state, shutdown).await }
    });

    let front_door_handle = tokio::spawn({
        let state = state.clone();
        let shutdown = shutdown.clone();
        let listen = args.http_listen.clone();
        async move { server::run_front_door(&listen, state, shutdown).await }
    });

    tracing::info!(
        "bootstrap: gateway started, http_listen={}, grpc_listen={}",
        args.http_listen,
        args.grpc_listen
    );

    wait_for_shutdown(&shutdown).await;

    if let Err(e) = front_door_handle.await {
        tracing::error!("bootstrap: front-door task panicked, error={}", e);
    }
    if let Err(e) = grpc_handle.await {
        tracing::error!("bootstrap: grpc task panicked, error={}", e);
    }

    tracing::info!("bootstrap: shutdown complete");
    Ok(())
}

pub fn init_tracing() {
    let (non_blocking, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    // Non-blocking writer must outlive the process; main() never returns
    // early enough to drop it safely.
    std::mem::forget(guard);
}

async fn wait_for_shutdown(shutdown: &Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("bootstrap: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("bootstrap: received SIGTERM, shutting down"),
    }

    shutdown.notify_waiters();
}
