//! Club bracket HTTP server.
//!
//! Connects to PostgreSQL, loads the reward policy and serves the bracket API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use cb_server::{
    api::{self, AppState},
    config::ServerConfig,
    logging, metrics,
};
use club_bracket::{
    BracketManager, PgBracketRepository,
    db::Database,
    tournament::RewardPolicy,
};
use pico_args::Arguments;
use tracing::info;

const HELP: &str = "\
Run the club bracket server

USAGE:
  cb_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --migrate                Apply schema migrations before serving
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  METRICS_BIND             Prometheus scrape address (disabled when unset)
  REWARD_TABLE_PATH        JSON reward table (built-in table when unset)
  BRACKET_CUTOFF_TOP8      Last position paid as Top 8
  BRACKET_CUTOFF_TOP16     Last position paid as Top 16
  RUST_LOG                 Log filter [default: info,sqlx=warn,hyper=warn]
  (See .env file for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        migrate: pargs.contains("--migrate"),
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(anyhow::Error::msg)?;
        info!(%metrics_bind, "Prometheus exporter listening");
    }

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected successfully");

    if args.migrate {
        db.migrate().await.context("Failed to apply migrations")?;
        info!("Schema migrations applied");
    }

    let policy = RewardPolicy::from_env().context("Failed to load reward policy")?;
    info!(
        top8_cutoff = policy.top8_cutoff,
        top16_cutoff = policy.top16_cutoff,
        "Reward policy loaded"
    );

    let repo = PgBracketRepository::new(Arc::new(db.pool().clone()))
        .with_query_timeout(Duration::from_secs(config.database.query_timeout_secs));
    let manager = BracketManager::new(Arc::new(repo), Arc::new(policy));

    let app = api::create_router(AppState {
        manager: Arc::new(manager),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    db.close().await;

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
}
