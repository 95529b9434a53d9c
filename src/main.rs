//! CLI for markerhub
//!
//! Subcommands:
//! - `listen`: connect to the hub and keep the local marker set in sync
//! - `markers`: print every marker the server knows
//! - `marker`: print one marker
//! - `edit`: change fields of a marker on the server

use std::sync::Arc;

use clap::Parser;
use markerhub::config::{Settings, load_config};
use markerhub::listener::MarkerListener;
use markerhub::markers::{MarkerApi, MarkerStore, MarkerSync};
use markerhub::persistence::MarkerCache;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "markerhub")]
enum Command {
    /// Connect to the hub and keep the local marker set in sync
    Listen,
    /// Fetch and print every marker
    Markers {
        /// Print a GeoJSON feature collection instead of raw markers
        #[arg(long)]
        geojson: bool,
    },
    /// Fetch and print one marker
    Marker { id: i32 },
    /// Edit a marker on the server
    Edit {
        id: i32,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        volume: Option<i32>,
        #[arg(long)]
        marker_type: Option<i32>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            markerhub::utils::logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    markerhub::utils::logging::init(&settings.log.level);

    let result = match cmd {
        Command::Listen => run_listener(&settings).await,
        Command::Markers { geojson } => print_markers(&settings, geojson).await,
        Command::Marker { id } => print_marker(&settings, id).await,
        Command::Edit {
            id,
            title,
            volume,
            marker_type,
        } => edit_marker(&settings, id, title, volume, marker_type).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_listener(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let api = MarkerApi::new(&settings.api.base_url)?;
    let store = match &settings.cache.path {
        Some(path) => {
            MarkerStore::with_cache(MarkerCache::open(path, settings.cache.max_age_secs)?)?
        }
        None => MarkerStore::new(),
    };
    if !store.is_empty() {
        info!("Restored {} marker(s) from cache", store.len());
    }

    let sync = Arc::new(MarkerSync::new(
        api,
        store,
        tokio::runtime::Handle::current(),
    ));
    if let Err(e) = sync.load_all().await {
        warn!("Initial marker load failed: {e}");
    }

    let listener = MarkerListener::new(&settings.hub, sync.clone())?;
    listener.connection().on_closed(|error| match error {
        Some(e) => warn!("Hub connection lost: {e}"),
        None => info!("Hub connection closed"),
    });
    listener.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully.");

    if let Err(e) = listener.stop().await {
        warn!("Failed to stop listener: {e}");
    }
    if let Err(e) = sync.store().flush() {
        warn!("Failed to flush marker cache: {e}");
    }
    info!("{} marker(s) in sync at shutdown", sync.store().len());
    Ok(())
}

async fn print_markers(settings: &Settings, geojson: bool) -> Result<(), Box<dyn std::error::Error>> {
    let api = MarkerApi::new(&settings.api.base_url)?;
    let markers = api.fetch_all().await?;
    if geojson {
        let store = MarkerStore::new();
        store.replace_all(markers);
        println!("{}", serde_json::to_string_pretty(&store.to_feature_collection())?);
    } else {
        for marker in markers {
            println!(
                "{:>5}  {:<16} {:>10}, {:<10} {:<16} {}",
                marker.id,
                marker.title_or_default(),
                marker.x,
                marker.y,
                marker.kind().icon(),
                marker.label()
            );
        }
    }
    Ok(())
}

async fn print_marker(settings: &Settings, id: i32) -> Result<(), Box<dyn std::error::Error>> {
    let api = MarkerApi::new(&settings.api.base_url)?;
    let marker = api.fetch(id).await?;
    println!("{}", serde_json::to_string_pretty(&marker)?);
    Ok(())
}

async fn edit_marker(
    settings: &Settings,
    id: i32,
    title: Option<String>,
    volume: Option<i32>,
    marker_type: Option<i32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = MarkerApi::new(&settings.api.base_url)?;
    let mut marker = api.fetch(id).await?;
    if let Some(title) = title {
        marker.title = Some(title);
    }
    if let Some(volume) = volume {
        marker.volume = volume;
    }
    if let Some(marker_type) = marker_type {
        marker.marker_type = marker_type;
    }
    api.edit(&marker).await?;
    info!("Marker {id} updated");
    Ok(())
}
