use std::path::PathBuf;

use clap::Parser;

use retro_store::Database;
use retro_telemetry::TelemetryConfig;

/// Real-time retrospective board server.
#[derive(Debug, Parser)]
#[command(name = "retro", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8787)]
    port: u16,

    /// Path to the SQLite database (defaults to ~/.retro/database/retro.db).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Path to the warn+ log database (defaults to ~/.retro/database/logs.db).
    #[arg(long)]
    log_db_path: Option<PathBuf>,

    /// Disable persisting warn+ logs to SQLite.
    #[arg(long)]
    no_log_db: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig {
        log_to_sqlite: !cli.no_log_db,
        ..Default::default()
    };
    if let Some(path) = cli.log_db_path {
        telemetry.log_db_path = path;
    }
    let _telemetry = retro_telemetry::init_telemetry(telemetry);

    tracing::info!("starting retro server");

    let db_path = cli
        .db_path
        .unwrap_or_else(|| retro_home().join("database").join("retro.db"));
    let db = Database::open(&db_path)?;

    let config = retro_server::ServerConfig {
        port: cli.port,
        ..Default::default()
    };
    let handle = retro_server::start(config, db).await?;
    tracing::info!(port = handle.port, "retro server ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

fn retro_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".retro")
}
