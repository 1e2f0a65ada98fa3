//! Sunshine Service - Forecast sync scheduler and HTTP API.
//!
//! Run with: `cargo run -p sunshine-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use sunshine_core::{ForecastSource, OpenWeatherClient};
use sunshine_service::{AppState, Config, QueryEngine, SyncJob, SyncSettings, api, ws};
use sunshine_store::{ForecastRow, Store};
use sunshine_types::today_utc;

/// Sunshine Service - Forecast sync scheduler and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "sunshine-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Preferred location (overrides config).
    #[arg(short, long, global = true)]
    location: Option<String>,

    /// Disable periodic syncing (API only mode).
    #[arg(long, global = true)]
    no_sync: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Sync the preferred location once and exit.
    Sync,

    /// Print the stored forecast for the preferred location.
    Query {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sunshine_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Sync) => sync_once(config).await,
        Some(Command::Query { json }) => print_forecast(&config, json),
        Some(Command::Run) | None => run_server(config, args.no_sync).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    if let Some(location) = &args.location {
        config.sync.location = location.trim().to_string();
    }

    config.validate()?;
    Ok(config)
}

fn forecast_source(config: &Config) -> anyhow::Result<Arc<dyn ForecastSource>> {
    let client = OpenWeatherClient::new(config.api.client_config(config.sync.units))
        .context("Failed to create forecast client")?;
    if config.api.resolved_key().is_none() {
        tracing::warn!("No API key configured; the provider may reject requests");
    }
    Ok(Arc::new(client))
}

async fn sync_once(config: Config) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;
    let query = QueryEngine::new(Arc::new(Mutex::new(store)), config.server.broadcast_buffer);
    let job = SyncJob::new(
        forecast_source(&config)?,
        query,
        SyncSettings::from(&config.sync),
    );

    let report = job
        .run(&config.sync.location, &CancellationToken::new())
        .await
        .with_context(|| format!("Sync for '{}' failed", config.sync.location))?;

    println!(
        "Synced {} day(s) for {} ({}), pruned {}",
        report.rows_written, config.sync.location, report.city_name, report.rows_pruned
    );
    Ok(())
}

fn print_forecast(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;
    let rows = store.forecast_for_setting(&config.sync.location, today_utc())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No stored forecast for '{}'", config.sync.location);
        return Ok(());
    }

    println!("{} ({})", rows[0].city_name, rows[0].location_setting);
    for row in &rows {
        println!("{}", format_row(row));
    }
    Ok(())
}

fn format_row(row: &ForecastRow) -> String {
    let suffix = row.units.temperature_suffix();
    format!(
        "{}  {:>6.1}{suffix} / {:>6.1}{suffix}  {}",
        row.day.date, row.day.max_temp, row.day.min_temp, row.day.description
    )
}

async fn run_server(config: Config, no_sync: bool) -> anyhow::Result<()> {
    // Open the database
    let store = Store::open(&config.storage.path)?;
    let source = forecast_source(&config)?;

    // Create application state
    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(store, config, source);

    // Arm the periodic sync
    if !no_sync {
        state.start_sync().await;
    } else {
        info!("Periodic sync disabled");
    }

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    info!("Starting server on {}", addr);

    // Run the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
