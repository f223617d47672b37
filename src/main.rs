use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use netguard::{config, context, db, logging, web::WebServer};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "netguard")]
#[command(about = "Network device configuration backups over SSH", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./netguard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Query a running server
    Status,
}

#[derive(Args, Serialize)]
struct ServeArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    backup_directory: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    http_bind: Option<SocketAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    max_concurrency: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_file = cli.config.as_deref();

    let config = match &cli.command {
        Commands::Serve(args) => config::AppConfig::new(config_file, Some(args))?,
        _ => config::AppConfig::new(config_file, None::<&ServeArgs>)?,
    };

    logging::init(logging::LogConfig::from(&config));

    match &cli.command {
        Commands::Serve(_) => {
            tokio::fs::create_dir_all(&config.backup_directory)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create backup directory {}",
                        config.backup_directory.display()
                    )
                })?;
            let db_conn = db::init(&config.database_path).await?;
            let ctx = context::AppContext::new(config, db_conn);
            run_server(ctx).await.context("Failed to run server")?
        }
        Commands::Status => run_status(&config)
            .await
            .context("Failed to check status of server")?,
    }

    Ok(())
}

async fn run_server(ctx: context::AppContext) -> Result<()> {
    tracing::info!(
        backup_directory = %ctx.config.backup_directory.display(),
        database = %ctx.config.database_path.display(),
        max_concurrency = ctx.config.max_concurrency,
        capture = ?ctx.config.session.capture,
        "Starting netguard"
    );

    let server = Arc::new(WebServer::new(ctx.clone(), ctx.config.http_bind));
    let mut running = tokio::spawn({
        let server = server.clone();
        async move { server.start().await }
    });

    tokio::select! {
        joined = &mut running => return joined?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested");
        }
    }

    server.shutdown();
    running.await?
}

#[derive(Deserialize)]
struct Health {
    status: String,
    version: String,
    uptime_secs: u64,
    max_concurrency: usize,
}

async fn run_status(config: &config::AppConfig) -> Result<()> {
    let mut addr = config.http_bind;
    if addr.ip().is_unspecified() {
        addr.set_ip([127, 0, 0, 1].into());
    }
    let url = format!("http://{}/api/health", addr);

    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Server not reachable at {}", url))?;
    if !response.status().is_success() {
        bail!("Server at {} answered {}", url, response.status());
    }
    let health: Health = response.json().await?;

    println!("netguard {} at {}", health.version, addr);
    println!("  status:          {}", health.status);
    println!("  uptime:          {}s", health.uptime_secs);
    println!("  max concurrency: {}", health.max_concurrency);
    Ok(())
}
