//! clusterlet daemon
//!
//! Runs the scheduler, its health monitor and the REST API in one process.

use anyhow::Context;
use clap::Parser;
use clusterlet_api::create_router;
use clusterlet_core::{DaemonConfig, ExecutionBackend, LoggingConfig};
use clusterlet_runtime::{ExecutionPort, MemoryPort, ProcessPort, ProcessPortConfig};
use clusterlet_scheduler::{HealthMonitor, Scheduler};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// clusterlet daemon - minimal CPU bin-packing cluster scheduler
#[derive(Parser, Debug)]
#[command(name = "clusterletd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind the API server
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server
    #[arg(long)]
    port: Option<u16>,

    /// Execution backend (process or memory)
    #[arg(long)]
    backend: Option<ExecutionBackend>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Load the config file (if any) and apply flag overrides
    fn into_config(self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DaemonConfig::default(),
        };

        if let Some(address) = self.address {
            config.api.address = address;
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(backend) = self.backend {
            config.execution.backend = backend;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        Ok(config)
    }
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let log_level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false);

    let result = if config.format.eq_ignore_ascii_case("compact") {
        tracing::subscriber::set_global_default(builder.compact().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set subscriber")
}

fn build_port(config: &DaemonConfig) -> Arc<dyn ExecutionPort> {
    match config.execution.backend {
        ExecutionBackend::Process => Arc::new(ProcessPort::new(ProcessPortConfig {
            command: config.execution.command.clone(),
            args: config.execution.args.clone(),
        })),
        ExecutionBackend::Memory => Arc::new(MemoryPort::new()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_logging(&config.logging)?;

    info!("Starting clusterlet daemon v{}", env!("CARGO_PKG_VERSION"));

    let scheduler = Arc::new(Scheduler::new(build_port(&config)));

    let monitor = HealthMonitor::new(scheduler.clone(), config.monitor.clone())
        .context("Invalid monitor configuration")?
        .spawn();

    let router = create_router(scheduler.clone());

    let addr: SocketAddr = format!("{}:{}", config.api.address, config.api.port)
        .parse()
        .context("Invalid address")?;

    info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    monitor.shutdown().await;
    scheduler.dispose_all().await;
    info!("clusterlet daemon stopped");

    Ok(())
}
