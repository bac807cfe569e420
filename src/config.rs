use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WeatherError;

pub const API_KEY_VAR: &str = "OPENWEATHER_API_KEY";

const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

pub const DEFAULT_API_BASE: &str = "https://api.openweathermap.org/data/2.5";

/// Upper bound for minute-valued settings (one year). Keeps the TTL well
/// inside what moka accepts.
const MAX_MINUTES: u64 = 365 * 24 * 60;

pub const DEFAULT_CITIES: &[&str] = &[
    "Warsaw", "Paris", "London", "New York", "Tokyo", "Sydney",
    "Barcelona", "Rome", "Berlin", "Amsterdam", "Prague", "Vienna",
    "Budapest", "Krakow", "Gdansk", "Wroclaw", "Poznan", "Zakopane",
    "Madrid", "Lisbon", "Stockholm", "Oslo", "Copenhagen", "Helsinki",
    "Dublin", "Edinburgh", "Brussels", "Zurich", "Milan", "Florence",
    "Athens", "Istanbul", "Moscow", "St Petersburg", "Kiev", "Minsk",
];

/// Unit system requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
            Units::Standard => "K",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "standard" | "kelvin" => Ok(Units::Standard),
            other => Err(format!("unknown unit system '{}'", other)),
        }
    }
}

/// Source of the provider API key.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Reads the key from the process environment (after `.env` has been loaded).
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        env::var(API_KEY_VAR).ok()
    }
}

/// Fixed credential, mostly for tests.
pub struct StaticCredentials(pub Option<String>);

impl CredentialProvider for StaticCredentials {
    fn api_key(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Resolve the API key, treating blanks and the documentation placeholder as unset.
pub fn require_api_key(credentials: &dyn CredentialProvider) -> Result<String, WeatherError> {
    credentials
        .api_key()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty() && key != PLACEHOLDER_API_KEY)
        .ok_or(WeatherError::MissingApiKey)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub language: String,
    pub units: Units,
    pub default_city: String,
    /// How long the widget keeps provider responses in memory.
    pub cache_duration: Duration,
    pub cities: Vec<String>,
    pub cache_path: PathBuf,
    /// Pause between cities during a refresh.
    pub request_delay: Duration,
    pub widget_retries: u32,
    pub retry_delay: Duration,
    /// How often the served widget page reloads itself.
    pub refresh_interval: Duration,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            language: "pl".to_string(),
            units: Units::Metric,
            default_city: "Warsaw".to_string(),
            cache_duration: Duration::from_secs(10 * 60),
            cities: DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
            cache_path: PathBuf::from("./data/weather.json"),
            request_delay: Duration::from_millis(200),
            widget_retries: 0,
            retry_delay: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(10 * 60),
            port: 5001,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup, falling back to defaults
    /// for anything missing or unparseable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_base = var("WEATHER_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);

        let language = var("WEATHER_LANGUAGE").unwrap_or(defaults.language);

        let units = var("WEATHER_UNITS")
            .and_then(|u| u.parse().ok())
            .unwrap_or(defaults.units);

        let default_city = var("WEATHER_DEFAULT_CITY").unwrap_or(defaults.default_city);

        let cache_duration = var("WEATHER_CACHE_MINUTES")
            .and_then(|m| parse_minutes(&m))
            .unwrap_or(defaults.cache_duration);

        let cities = var("WEATHER_CITIES")
            .map(|list| parse_city_list(&list))
            .filter(|cities| !cities.is_empty())
            .unwrap_or(defaults.cities);

        let cache_path = var("WEATHER_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_path);

        let request_delay = var("WEATHER_REQUEST_DELAY_MS")
            .and_then(|ms| ms.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_delay);

        let widget_retries = var("WEATHER_WIDGET_RETRIES")
            .and_then(|n| n.parse().ok())
            .unwrap_or(defaults.widget_retries);

        let retry_delay = var("WEATHER_RETRY_DELAY_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry_delay);

        let refresh_interval = var("WEATHER_REFRESH_MINUTES")
            .and_then(|m| parse_minutes(&m))
            .unwrap_or(defaults.refresh_interval);

        let port = var("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            api_base,
            language,
            units,
            default_city,
            cache_duration,
            cities,
            cache_path,
            request_delay,
            widget_retries,
            retry_delay,
            refresh_interval,
            port,
        }
    }
}

/// A whole number of minutes, at most [`MAX_MINUTES`].
fn parse_minutes(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|m| *m <= MAX_MINUTES)
        .map(|m| Duration::from_secs(m * 60))
}

fn parse_city_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|city| !city.is_empty())
        .map(str::to_string)
        .collect()
}
