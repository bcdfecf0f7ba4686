//! clusterlet CLI
//!
//! Command-line interface for interacting with the clusterlet daemon.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// clusterlet - minimal CPU bin-packing cluster scheduler
#[derive(Parser, Debug)]
#[command(name = "clusterlet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(long, default_value = "http://localhost:5000", global = true)]
    api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage nodes
    #[command(subcommand)]
    Nodes(NodeCommands),

    /// Manage pods
    #[command(subcommand)]
    Pods(PodCommands),

    /// Show cluster status
    Top,
}

#[derive(Subcommand, Debug)]
enum NodeCommands {
    /// Register a node
    Add {
        /// CPU cores of the node
        #[arg(long, allow_negative_numbers = true)]
        cpu: i64,
    },

    /// List all nodes
    Ls,

    /// Show one node
    Get { id: String },

    /// Send a heartbeat for a node
    Heartbeat { id: String },

    /// Stop a node and drain its pods
    Stop { id: String },

    /// Resume a stopped or failed node
    Resume { id: String },

    /// Mark a failed node recovered; its next heartbeat heals it
    Recover { id: String },
}

#[derive(Subcommand, Debug)]
enum PodCommands {
    /// Launch a pod
    Launch {
        /// CPU cores the pod requires
        #[arg(long, allow_negative_numbers = true)]
        cpu: i64,
    },

    /// List all pods
    Ls,

    /// Show one pod
    Get { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let client = commands::ApiClient::new(&cli.api);

    match cli.command {
        Commands::Nodes(cmd) => match cmd {
            NodeCommands::Add { cpu } => commands::add_node(&client, cpu).await?,
            NodeCommands::Ls => commands::list_nodes(&client).await?,
            NodeCommands::Get { id } => commands::get_node(&client, &id).await?,
            NodeCommands::Heartbeat { id } => {
                commands::node_action(&client, &id, "heartbeat").await?
            }
            NodeCommands::Stop { id } => commands::node_action(&client, &id, "stop").await?,
            NodeCommands::Resume { id } => commands::node_action(&client, &id, "resume").await?,
            NodeCommands::Recover { id } => {
                commands::node_action(&client, &id, "recover").await?
            }
        },
        Commands::Pods(cmd) => match cmd {
            PodCommands::Launch { cpu } => commands::launch_pod(&client, cpu).await?,
            PodCommands::Ls => commands::list_pods(&client).await?,
            PodCommands::Get { id } => commands::get_pod(&client, &id).await?,
        },
        Commands::Top => commands::top(&client).await?,
    }

    Ok(())
}
