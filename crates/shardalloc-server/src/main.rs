#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::router;
use server::telemetry::{TelemetryProviders, init_telemetry};
use shardalloc::{AllocationService, SeedStore};
use tokio::net::TcpListener;
use tokio::signal;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    // A corrupt seed file aborts startup.
    let store = SeedStore::open(&config.seeds_file, config.address_space)
        .with_context(|| format!("failed to open {}", config.seeds_file.display()))?
        .with_fsync(config.fsync);
    let service = AllocationService::new(store);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    log_startup_info(&config, &service);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal(providers))
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(_config: &ServerConfig, _service: &AllocationService) {
    #[cfg(feature = "tracing")]
    {
        let registered = _service.store().len().unwrap_or_default();
        tracing::info!(
            "Starting shard allocator on {} with {} registered seeds in {}\n{}",
            _config.listen_addr,
            registered,
            _config.seeds_file.display(),
            _config.address_space
        );
        if cfg!(debug_assertions) {
            tracing::debug!("Full config: {:#?}", _config);
        }
    }
}

async fn shutdown_signal(providers: TelemetryProviders) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {}", _e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {}", _e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, draining in-flight requests...");

    providers.shutdown();
}
