//! Widget side: resolve a location, fetch through the TTL cache, and turn the
//! provider data into a presentation-free render model.
//!
//! Views only ever see [`WidgetState`]; they never touch provider payloads.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::WeatherCache;
use crate::config::{Config, Units};
use crate::error::WeatherError;
use crate::forecast::daily_forecast;
use crate::weather::{
    icon_emoji, parse_current, parse_forecast, wind_direction, ForecastEntry, ForecastList,
    WeatherProvider, WeatherRecord,
};

/// Query parameters a widget request may carry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationQuery {
    pub city: Option<String>,
    pub location: Option<String>,
}

/// Where the last successfully loaded location is remembered between visits.
pub trait LocationStore: Send {
    fn load(&self) -> Option<String>;
    fn save(&mut self, location: &str);
}

#[derive(Debug, Default)]
pub struct MemoryLocationStore {
    pub location: Option<String>,
}

impl LocationStore for MemoryLocationStore {
    fn load(&self) -> Option<String> {
        self.location.clone()
    }

    fn save(&mut self, location: &str) {
        self.location = Some(location.to_string());
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Priority: `city` query > `location` query > remembered value > configured default.
pub fn resolve_location(query: &LocationQuery, store: &dyn LocationStore, default_city: &str) -> String {
    non_empty(query.city.clone())
        .or_else(|| non_empty(query.location.clone()))
        .or_else(|| non_empty(store.load()))
        .unwrap_or_else(|| default_city.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRow {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDay {
    pub date: String,
    pub icon: &'static str,
    pub temp_max: i64,
    pub temp_min: i64,
    pub description: String,
}

/// Everything a view needs to draw a loaded widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderModel {
    pub location: String,
    pub updated_at: String,
    pub icon: &'static str,
    pub temperature: i64,
    pub unit: &'static str,
    pub description: String,
    pub details: Vec<DetailRow>,
    pub forecast: Vec<ForecastDay>,
}

/// Half-up rounding, so -2.5 becomes -2 rather than -3.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn format_wind(speed: f64, degrees: f64, units: Units) -> String {
    let direction = wind_direction(degrees);
    match units {
        Units::Imperial => format!("{} mph {}", round_half_up(speed), direction),
        // m/s → km/h
        Units::Metric | Units::Standard => format!("{} km/h {}", round_half_up(speed * 3.6), direction),
    }
}

fn format_uv_index(uvi: Option<f64>) -> String {
    match uvi {
        Some(uvi) if uvi != 0.0 => format!("{:.1}", uvi),
        _ => "N/A".to_string(),
    }
}

fn format_day(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|t| t.format("%a %-d %b").to_string())
        .unwrap_or_default()
}

impl RenderModel {
    pub fn build(current: &WeatherRecord, forecast: &ForecastList, units: Units, now: DateTime<Utc>) -> Self {
        let symbol = units.temperature_symbol();

        let details = vec![
            DetailRow {
                label: "Feels like",
                value: format!("{}{}", round_half_up(current.feels_like), symbol),
            },
            DetailRow {
                label: "Humidity",
                value: format!("{}%", current.humidity),
            },
            DetailRow {
                label: "Wind",
                value: format_wind(current.wind.speed, f64::from(current.wind.deg), units),
            },
            DetailRow {
                label: "Pressure",
                value: format!("{} hPa", current.pressure),
            },
            DetailRow {
                label: "Visibility",
                value: format!("{:.1} km", f64::from(current.visibility) / 1000.0),
            },
            DetailRow {
                label: "UV index",
                value: format_uv_index(current.uvi),
            },
        ];

        let forecast = daily_forecast(&forecast.list)
            .into_iter()
            .map(ForecastDay::from_entry)
            .collect();

        Self {
            location: format!("{}, {}", current.name, current.country),
            updated_at: now.format("%H:%M:%S").to_string(),
            icon: icon_emoji(&current.icon),
            temperature: round_half_up(current.temp),
            unit: symbol,
            description: current.description.clone(),
            details,
            forecast,
        }
    }
}

impl ForecastDay {
    fn from_entry(entry: &ForecastEntry) -> Self {
        Self {
            date: format_day(entry.dt),
            icon: icon_emoji(&entry.condition().icon),
            temp_max: round_half_up(entry.main.temp_max),
            temp_min: round_half_up(entry.main.temp_min),
            description: entry.condition().description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetState {
    Loading { location: String },
    Loaded(RenderModel),
    Failed { message: String, location: String },
}

/// Presentation surface. The only part of the widget that draws anything.
pub trait WidgetView: Send {
    fn show(&mut self, state: &WidgetState);
}

pub struct WeatherWidget {
    provider: Option<Arc<dyn WeatherProvider>>,
    cache: WeatherCache<Value>,
    units: Units,
    default_city: String,
}

impl WeatherWidget {
    /// `provider` is `None` when no API key is configured; every load then fails.
    pub fn new(provider: Option<Arc<dyn WeatherProvider>>, config: &Config) -> Self {
        Self {
            provider,
            cache: WeatherCache::new(config.cache_duration),
            units: config.units,
            default_city: config.default_city.clone(),
        }
    }

    pub fn cache(&self) -> &WeatherCache<Value> {
        &self.cache
    }

    pub fn resolve_location(&self, query: &LocationQuery, store: &dyn LocationStore) -> String {
        resolve_location(query, store, &self.default_city)
    }

    async fn cached<F>(&self, key: String, fetch: F) -> Result<Value, WeatherError>
    where
        F: std::future::Future<Output = Result<Value, WeatherError>>,
    {
        if let Some(cached) = self.cache.get(&key).await {
            debug!("📦 Cache hit for {}", key);
            return Ok(cached);
        }

        let data = fetch.await?;
        self.cache.set(key, data.clone()).await;
        Ok(data)
    }

    async fn current_weather(&self, provider: &dyn WeatherProvider, city: &str) -> Result<Value, WeatherError> {
        self.cached(format!("current-{}", city), provider.fetch_current(city)).await
    }

    async fn forecast(&self, provider: &dyn WeatherProvider, city: &str) -> Result<Value, WeatherError> {
        self.cached(format!("forecast-{}", city), provider.fetch_forecast(city)).await
    }

    /// Fetch both payloads (concurrently, through the cache) and build the render model.
    pub async fn load(&self, location: &str) -> Result<RenderModel, WeatherError> {
        let provider = self.provider.as_deref().ok_or(WeatherError::MissingApiKey)?;

        let (current, forecast) = tokio::try_join!(
            self.current_weather(provider, location),
            self.forecast(provider, location)
        )?;

        let current = parse_current(&current)?;
        let forecast = parse_forecast(&forecast)?;

        Ok(RenderModel::build(&current, &forecast, self.units, Utc::now()))
    }

    pub async fn init(&self, query: &LocationQuery, store: &mut dyn LocationStore, view: &mut dyn WidgetView) {
        self.init_with_retry(query, store, view, 0, Duration::ZERO).await
    }

    /// Run the load sequence, retrying up to `retries` extra times with a fixed delay.
    /// Configuration errors fail immediately.
    pub async fn init_with_retry(
        &self,
        query: &LocationQuery,
        store: &mut dyn LocationStore,
        view: &mut dyn WidgetView,
        retries: u32,
        delay: Duration,
    ) {
        let location = self.resolve_location(query, store);
        let mut attempt = 0;

        loop {
            view.show(&WidgetState::Loading {
                location: location.clone(),
            });

            match self.load(&location).await {
                Ok(model) => {
                    store.save(&location);
                    info!("🌤️  Widget loaded for {}", location);
                    view.show(&WidgetState::Loaded(model));
                    return;
                }
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Weather widget error: {}. Retry in {:?}... ({} attempts left)",
                        e,
                        delay,
                        retries - attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("❌ Weather widget error for {}: {}", location, e);
                    let message = if attempt > 0 {
                        format!("Could not load the weather after {} attempts: {}", attempt + 1, e)
                    } else {
                        e.to_string()
                    };
                    view.show(&WidgetState::Failed { message, location });
                    return;
                }
            }
        }
    }
}
