//! weather-widget: keeps a JSON weather cache for a fixed list of cities and
//! serves an embeddable weather widget.
//!
//! * no arguments   – refresh the cache file for every configured city
//! * `test [CITY]`  – fetch one city and print what came back
//! * `serve`        – run the widget HTTP server

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod cache;
mod config;
mod error;
mod forecast;
mod refresh;
mod server;
mod snapshot;
mod templates;
mod weather;
mod widget;

use config::{Config, CredentialProvider, EnvCredentials};
use refresh::{diagnose_city, CacheRefresher};
use server::AppState;
use weather::{OpenWeatherMapProvider, WeatherProvider};
use widget::WeatherWidget;

#[derive(Parser)]
#[command(name = "weather-widget", about = "Weather cache refresher and widget server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a single city and print the result without touching the cache file.
    Test {
        /// City to query (defaults to the configured default city).
        city: Option<String>,
    },
    /// Serve the weather widget over HTTP.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration (also pulls in .env)
    let config = Config::load();

    match cli.command {
        None => refresh_cache(&config, &EnvCredentials).await,
        Some(Command::Test { city }) => {
            let provider = OpenWeatherMapProvider::from_config(&config, &EnvCredentials)?;
            let city = city.unwrap_or_else(|| config.default_city.clone());
            if !diagnose_city(&provider, &city).await {
                warn!("⚠️  No usable weather data for {}", city);
            }
            Ok(())
        }
        Some(Command::Serve { port }) => {
            let provider: Option<Arc<dyn WeatherProvider>> =
                match OpenWeatherMapProvider::from_config(&config, &EnvCredentials) {
                    Ok(provider) => Some(Arc::new(provider)),
                    Err(e) => {
                        warn!("⚠️  {}; the widget will show an error until it is set", e);
                        None
                    }
                };

            let widget = WeatherWidget::new(provider, &config);
            let port = port.unwrap_or(config.port);
            server::serve(AppState::new(widget, config), port).await
        }
    }
}

async fn refresh_cache(config: &Config, credentials: &dyn CredentialProvider) -> Result<()> {
    let provider = OpenWeatherMapProvider::from_config(config, credentials)?;
    info!("Using {} at {}", provider.name(), config.api_base);

    let refresher = CacheRefresher::new(Arc::new(provider), config);
    refresher
        .run()
        .await
        .context("weather data update failed")?;

    Ok(())
}
