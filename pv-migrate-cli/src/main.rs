use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use pv_migrate_core::{ClaimRef, Exposure, MigrationRequest, Migrator};
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "pv-migrate")]
#[command(about = "Migrate the contents of one persistent volume claim to another", long_about = None)]
struct Cli {
    /// Source persistent volume claim
    #[arg(long)]
    source: Option<String>,

    /// Source namespace
    #[arg(long)]
    source_namespace: Option<String>,

    /// Source cluster context
    #[arg(long)]
    source_context: Option<String>,

    /// Destination persistent volume claim
    #[arg(long)]
    dest: Option<String>,

    /// Destination namespace
    #[arg(long)]
    dest_namespace: Option<String>,

    /// Destination cluster context
    #[arg(long)]
    dest_context: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Mount the source volume read-only
    #[arg(long = "sourceReadOnly", default_value_t = true, action = ArgAction::Set)]
    source_read_only: bool,

    /// Delete extraneous files from destination dirs
    #[arg(long)]
    dest_delete_extraneous_files: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (Some(source), Some(source_namespace), Some(dest), Some(dest_namespace)) =
        (cli.source, cli.source_namespace, cli.dest, cli.dest_namespace)
    else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if cli.dest_delete_extraneous_files {
        warn!("delete extraneous files from dest is enabled");
    }

    let source_client = cluster_client(cli.kubeconfig.as_deref(), cli.source_context.as_deref())
        .await
        .context("failed to build source cluster client")?;
    let dest_client = cluster_client(cli.kubeconfig.as_deref(), cli.dest_context.as_deref())
        .await
        .context("failed to build destination cluster client")?;

    let request = MigrationRequest {
        source: ClaimRef { namespace: source_namespace, name: source },
        dest: ClaimRef { namespace: dest_namespace, name: dest },
        source_read_only: cli.source_read_only,
        delete_extraneous_files: cli.dest_delete_extraneous_files,
        exposure: Exposure::for_contexts(
            cli.source_context.as_deref(),
            cli.dest_context.as_deref(),
        ),
    };

    let migrator = Arc::new(Migrator::new(source_client, dest_client));
    spawn_interrupt_handler(migrator.clone(), request.clone());

    if let Err(e) = migrator.run(&request).await {
        error!("migration failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Build a client for one side from the kubeconfig and an optional context.
async fn cluster_client(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Client> {
    let kubeconfig = match kubeconfig {
        Some(path) => Kubeconfig::read_from(path)
            .with_context(|| format!("failed to read kubeconfig at {}", path.display()))?,
        None => Kubeconfig::read().context("failed to load kubeconfig")?,
    };
    let options = KubeConfigOptions { context: context.map(str::to_string), ..Default::default() };
    let config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .context("failed to resolve cluster context")?;
    Client::try_from(config).context("failed to build cluster client")
}

/// Tear down both sides and exit non-zero when SIGINT or SIGTERM arrives.
/// In-flight cluster operations race with this cleanup; the label-selector
/// deletion and the job TTL make that safe.
fn spawn_interrupt_handler(migrator: Arc<Migrator>, request: MigrationRequest) {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("interrupted, cleaning up before exiting");
        migrator.cleanup(&request).await;
        std::process::exit(1);
    });
}

/// Complete when SIGINT (Ctrl+C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            warn!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            warn!("Received SIGTERM");
        }
    }
}
