use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use park_bot::api::BotClient;
use park_db::Database;
use park_sync::bridge::HttpPlatform;
use park_sync::{Engine, SyncError, SyncSettings, report, resolver};
use park_types::models::DeploymentConfig;

#[derive(Parser)]
#[command(name = "park", version, about = "Community membership sync and neighbour bot")]
struct Cli {
    /// SQLite database holding the ledgers and `bot_config`.
    #[arg(long, env = "PARK_DB_PATH", default_value = "park.db")]
    db: PathBuf,

    /// Row of `bot_config` to run with.
    #[arg(long, env = "PARK_DEPLOYMENT")]
    deployment: String,

    /// Base URL of the user-API bridge.
    #[arg(long, env = "PARK_BRIDGE_URL", default_value = "http://127.0.0.1:8081")]
    bridge_url: String,

    #[arg(long, env = "PARK_SYNC_INTERVAL_SECS", default_value_t = 300)]
    interval_secs: u64,

    #[arg(long, env = "PARK_FORWARD_DELAY_MS", default_value_t = 1000)]
    forward_delay_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or replace the `bot_config` row of this deployment.
    Configure(ConfigureArgs),
    #[command(flatten)]
    Job(Job),
}

#[derive(Args)]
struct ConfigureArgs {
    #[arg(long)]
    api_id: i64,
    #[arg(long)]
    api_hash: String,
    /// Link or exact display name of the community chat.
    #[arg(long)]
    chat_url: String,
    #[arg(long)]
    bot_username: String,
    /// Bot API token, needed only by `bot`.
    #[arg(long)]
    bot_key: Option<String>,
}

/// Commands that run against a stored deployment.
#[derive(Subcommand)]
enum Job {
    /// Reconcile, harvest and relay on a fixed interval.
    Sync,
    /// Run the neighbour bot.
    Bot,
    /// Print current members who never tagged their building.
    Inactive,
    /// Forward each member's latest tagged message in a building to a chat.
    ForwardBuilding {
        building: i64,
        /// Exact display name of the destination chat.
        #[arg(long)]
        dest: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "park=info,park_sync=info,park_bot=info,park_db=info".into()),
        )
        .init();

    let cli = Cli::parse();
    info!(
        "Started version '{}' with '{}' as DB and '{}' config",
        env!("CARGO_PKG_VERSION"),
        cli.db.display(),
        cli.deployment
    );

    let db = Database::open(&cli.db)?;
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let settings = SyncSettings {
        interval: Duration::from_secs(cli.interval_secs),
        forward_delay: Duration::from_millis(cli.forward_delay_ms),
        ..SyncSettings::default()
    };

    let res = match cli.command {
        Command::Configure(args) => configure(&db, &cli.deployment, args),
        Command::Job(job) => {
            run_job(&db, &cli.deployment, &cli.bridge_url, settings, job, shutdown).await
        }
    };

    if let Err(e) = &res {
        error!("Fatal: {:#}", e);
    }
    res
}

fn configure(db: &Database, deployment: &str, args: ConfigureArgs) -> anyhow::Result<()> {
    db.save_config(&DeploymentConfig {
        id: deployment.to_string(),
        api_id: args.api_id,
        api_hash: args.api_hash,
        chat_url: args.chat_url,
        bot_username: args.bot_username,
        bot_key: args.bot_key,
    })?;
    info!("Saved bot_config row {:?}", deployment);
    Ok(())
}

async fn run_job(
    db: &Database,
    deployment: &str,
    bridge_url: &str,
    settings: SyncSettings,
    job: Job,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let config = db
        .load_config(deployment)?
        .ok_or_else(|| SyncError::Config(format!("no bot_config row named {:?}", deployment)))?;

    match job {
        Job::Sync => sync(db, &config, bridge_url, settings, shutdown).await,
        Job::Bot => bot(db, &config, shutdown).await,
        Job::Inactive => inactive(db, &config, bridge_url, &settings).await,
        Job::ForwardBuilding { building, dest } => {
            forward_building(db, &config, bridge_url, &settings, building, &dest).await
        }
    }
}

async fn sync(
    db: &Database,
    config: &DeploymentConfig,
    bridge_url: &str,
    settings: SyncSettings,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let platform = HttpPlatform::start(bridge_url, config).await?;
    let engine = Engine::start(&platform, db, config, settings).await?;
    info!(
        "Syncing chat {} and relaying to bot {}",
        engine.channel().id,
        engine.bot().id
    );
    engine.run(shutdown).await;
    Ok(())
}

async fn bot(db: &Database, config: &DeploymentConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let key = config
        .bot_key
        .as_deref()
        .ok_or_else(|| SyncError::Config(format!("deployment {:?} has no bot_key", config.id)))?;
    let client = BotClient::new(key)?;
    db.set_busy_timeout(park_bot::STORE_BUSY_TIMEOUT)?;
    park_bot::run(db, &client, shutdown).await;
    Ok(())
}

async fn inactive(
    db: &Database,
    config: &DeploymentConfig,
    bridge_url: &str,
    settings: &SyncSettings,
) -> anyhow::Result<()> {
    let platform = HttpPlatform::start(bridge_url, config).await?;
    let channel = resolver::resolve_channel(&platform, &config.chat_url).await?;
    for line in report::inactive_members(&platform, db, &channel, settings.forward_delay).await? {
        println!("{}", line);
    }
    Ok(())
}

async fn forward_building(
    db: &Database,
    config: &DeploymentConfig,
    bridge_url: &str,
    settings: &SyncSettings,
    building: i64,
    dest: &str,
) -> anyhow::Result<()> {
    let platform = HttpPlatform::start(bridge_url, config).await?;
    let source = resolver::resolve_channel(&platform, &config.chat_url).await?;
    let dest = resolver::resolve_dialog(&platform, dest).await?;
    let n = report::forward_building(&platform, db, &source, &dest, building, settings.forward_delay)
        .await?;
    info!("Forwarded {} messages of building {}", n, building);
    Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
    shutdown.cancel();
}
