use ark_types::ArkCluster;
use clap::{Parser, Subcommand};
use kube::{client::Client, Api};

mod build;
mod client;
mod cluster;
mod config;
mod ini;
mod maps;
mod rcon;
mod resources;
mod restart;
mod size;
mod util;
mod watcher;

#[cfg(feature = "metrics")]
mod metrics;

/// Top-level CLI configuration for the binary.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Prometheus metrics server scrape port. Disabled by default.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the `ArkCluster` controller loop. Default when invoked with no
    /// subcommand.
    Run,

    /// Runs the config/secret watcher that triggers restarts on change.
    Watch,

    /// One-shot check against Steam for a newer server build, without
    /// starting the controller.
    CheckUpdates,

    /// Sends a single RCON command to a running map pod.
    Rcon {
        #[arg(long)]
        host: String,
        #[arg(long, default_value_t = 27020)]
        port: u16,
        #[arg(long, env = "ARK_OP_RCON_PASSWORD")]
        password: String,
        command: String,
    },

    /// Writes `/etc/ready` so a readiness probe can pass immediately.
    ForceReady,
}

async fn run(client: Client) -> Result<(), util::Error> {
    let cli = Cli::parse();

    #[cfg(feature = "metrics")]
    if let Some(metrics_port) = cli.metrics_port {
        tokio::spawn(metrics::run_server(metrics_port));
    }

    match cli.command {
        Command::Run => cluster::reconcile::run(client).await,
        Command::Watch => {
            let clusters: Api<ArkCluster> = Api::all(client.clone());
            watcher::run(client, clusters).await
        }
        Command::CheckUpdates => {
            let http = reqwest::Client::new();
            let latest = build::latest_buildid(&http).await?;
            println!("latest build id: {latest}");
            Ok(())
        }
        Command::Rcon { host, port, password, command } => {
            let pool = rcon::RconPool::new();
            let response = pool.send(&host, port, &password, &command).await?;
            println!("{response}");
            Ok(())
        }
        Command::ForceReady => {
            ark_common::signal_ready();
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    ark_common::init();

    let client: Client = Client::try_default()
        .await
        .expect("Expected a valid KUBECONFIG environment variable.");

    if let Err(err) = run(client).await {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}
