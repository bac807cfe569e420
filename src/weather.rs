use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::config::{require_api_key, Config, CredentialProvider, Units};
use crate::error::WeatherError;

/// Normalized current conditions for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub name: String,
    pub country: String,
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub pressure: u32,
    pub description: String,
    pub icon: String,
    pub wind: Wind,
    pub visibility: u32,
    pub dt: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uvi: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    pub deg: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMain {
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastWind {
    pub speed: f64,
}

/// One fixed-interval sample from the forecast endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub dt: i64,
    pub main: ForecastMain,
    pub weather: [Condition; 1],
    pub wind: ForecastWind,
    pub dt_txt: String,
}

impl ForecastEntry {
    pub fn condition(&self) -> &Condition {
        &self.weather[0]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastList {
    pub list: Vec<ForecastEntry>,
}

/// Value stored under a city key in the cache snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityEntry {
    pub current: WeatherRecord,
    pub forecast: ForecastList,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    pub city: String,
}

// Raw provider payloads. Everything is optional here so that validation can
// report what is missing instead of failing inside serde.

#[derive(Debug, Deserialize)]
struct CurrentPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sys: Option<SysBlock>,
    #[serde(default)]
    main: Option<MainBlock>,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    #[serde(default)]
    wind: Option<WindBlock>,
    #[serde(default)]
    visibility: Option<f64>,
    #[serde(default)]
    dt: Option<i64>,
    #[serde(default)]
    uvi: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SysBlock {
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    temp_min: Option<f64>,
    #[serde(default)]
    temp_max: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    #[serde(default)]
    list: Option<Vec<ForecastItem>>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    #[serde(default)]
    main: Option<MainBlock>,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    #[serde(default)]
    wind: Option<WindBlock>,
    #[serde(default)]
    dt_txt: Option<String>,
}

/// Nearest whole number for an optional numeric field; missing or non-finite
/// values become 0. The `as` casts at the call sites saturate out-of-range values.
fn whole(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).map(f64::round).unwrap_or(0.0)
}

impl ConditionBlock {
    fn into_condition(self) -> Condition {
        Condition {
            description: self.description,
            icon: self.icon,
        }
    }
}

/// Normalize a raw `/weather` response.
pub fn parse_current(raw: &Value) -> Result<WeatherRecord, WeatherError> {
    let payload = CurrentPayload::deserialize(raw)
        .map_err(|e| WeatherError::InvalidPayload(format!("current conditions: {}", e)))?;

    let main = payload
        .main
        .ok_or_else(|| WeatherError::InvalidPayload("current conditions: missing main".into()))?;
    let condition = payload
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| WeatherError::InvalidPayload("current conditions: missing weather".into()))?;
    let wind = payload.wind;

    Ok(WeatherRecord {
        name: payload.name.unwrap_or_default(),
        country: payload.sys.and_then(|s| s.country).unwrap_or_default(),
        temp: main.temp,
        feels_like: main.feels_like.unwrap_or(main.temp),
        humidity: whole(main.humidity) as u8,
        pressure: whole(main.pressure) as u32,
        description: condition.description,
        icon: condition.icon,
        wind: Wind {
            speed: wind.as_ref().and_then(|w| w.speed).unwrap_or(0.0),
            deg: whole(wind.as_ref().and_then(|w| w.deg)) as u16,
        },
        visibility: whole(payload.visibility) as u32,
        dt: payload.dt.unwrap_or(0),
        uvi: payload.uvi,
    })
}

/// Normalize a raw `/forecast` response. An empty list is a validation failure.
pub fn parse_forecast(raw: &Value) -> Result<ForecastList, WeatherError> {
    let payload = ForecastPayload::deserialize(raw)
        .map_err(|e| WeatherError::InvalidPayload(format!("forecast: {}", e)))?;

    let items = payload
        .list
        .filter(|list| !list.is_empty())
        .ok_or_else(|| WeatherError::InvalidPayload("forecast: missing list".into()))?;

    let list = items
        .into_iter()
        .map(|item| {
            let main = item.main.ok_or_else(|| {
                WeatherError::InvalidPayload(format!("forecast entry {}: missing main", item.dt))
            })?;
            let condition = item.weather.into_iter().next().ok_or_else(|| {
                WeatherError::InvalidPayload(format!("forecast entry {}: missing weather", item.dt))
            })?;

            Ok(ForecastEntry {
                dt: item.dt,
                main: ForecastMain {
                    temp: main.temp,
                    temp_min: main.temp_min.unwrap_or(main.temp),
                    temp_max: main.temp_max.unwrap_or(main.temp),
                    humidity: whole(main.humidity) as u8,
                },
                weather: [condition.into_condition()],
                wind: ForecastWind {
                    speed: item.wind.and_then(|w| w.speed).unwrap_or(0.0),
                },
                dt_txt: item.dt_txt.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, WeatherError>>()?;

    Ok(ForecastList { list })
}

#[async_trait::async_trait]
pub trait WeatherProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_current(&self, city: &str) -> Result<Value, WeatherError>;
    async fn fetch_forecast(&self, city: &str) -> Result<Value, WeatherError>;
}

pub struct OpenWeatherMapProvider {
    client: Client,
    base_url: String,
    api_key: String,
    units: Units,
    language: String,
}

impl OpenWeatherMapProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        units: Units,
        language: impl Into<String>,
    ) -> Result<Self, WeatherError> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            units,
            language: language.into(),
        })
    }

    /// Fails with `MissingApiKey` before any network traffic when no key is available.
    pub fn from_config(
        config: &Config,
        credentials: &dyn CredentialProvider,
    ) -> Result<Self, WeatherError> {
        let api_key = require_api_key(credentials)?;
        Self::new(&config.api_base, api_key, config.units, &config.language)
    }

    async fn get(&self, endpoint: &'static str, path: &str, city: &str) -> Result<Value, WeatherError> {
        let url = format!("{}/{}", self.base_url, path);
        let params = [
            ("q", city),
            ("appid", self.api_key.as_str()),
            ("units", self.units.as_str()),
            ("lang", self.language.as_str()),
        ];

        let response = self.client.get(&url).query(&params).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(WeatherError::Http {
                endpoint,
                status: response.status(),
            })
        }
    }
}

#[async_trait::async_trait]
impl WeatherProvider for OpenWeatherMapProvider {
    fn name(&self) -> &str {
        "OpenWeatherMap"
    }

    async fn fetch_current(&self, city: &str) -> Result<Value, WeatherError> {
        self.get("Current weather", "weather", city).await
    }

    async fn fetch_forecast(&self, city: &str) -> Result<Value, WeatherError> {
        self.get("Forecast", "forecast", city).await
    }
}

async fn fetch_city(provider: &dyn WeatherProvider, city: &str) -> Result<CityEntry, WeatherError> {
    let (current, forecast) = tokio::join!(provider.fetch_current(city), provider.fetch_forecast(city));

    let current = parse_current(&current?)?;
    let forecast = parse_forecast(&forecast?)?;

    Ok(CityEntry {
        current,
        forecast,
        last_updated: Utc::now(),
        city: city.to_string(),
    })
}

/// Fetch and normalize one city. Any failure is logged and reported as `None`.
pub async fn fetch_weather_data(provider: &dyn WeatherProvider, city: &str) -> Option<CityEntry> {
    info!("🌤️  Fetching weather data for {} from {}", city, provider.name());

    match fetch_city(provider, city).await {
        Ok(entry) => Some(entry),
        Err(e) => {
            error!("❌ Error fetching weather for {}: {}", city, e);
            None
        }
    }
}

lazy_static::lazy_static! {
    static ref WEATHER_ICONS: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("01d", "☀️");
        map.insert("02d", "⛅");
        map.insert("03d", "☁️");
        map.insert("04d", "☁️");
        map.insert("09d", "🌧️");
        map.insert("10d", "🌦️");
        map.insert("11d", "⛈️");
        map.insert("13d", "❄️");
        map.insert("50d", "🌫️");
        map.insert("01n", "🌙");
        map.insert("02n", "☁️");
        map.insert("03n", "☁️");
        map.insert("04n", "☁️");
        map.insert("09n", "🌧️");
        map.insert("10n", "🌧️");
        map.insert("11n", "⛈️");
        map.insert("13n", "❄️");
        map.insert("50n", "🌫️");
        map
    };
}

const FALLBACK_ICON: &str = "🌤️";

pub fn icon_emoji(code: &str) -> &'static str {
    WEATHER_ICONS.get(code).copied().unwrap_or(FALLBACK_ICON)
}

const COMPASS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

pub fn wind_direction(degrees: f64) -> &'static str {
    let index = ((degrees / 45.0).round() as i64).rem_euclid(8) as usize;
    COMPASS[index]
}

#[cfg(test)]
pub mod testing {
    //! Payload builders and an in-memory provider shared by the test modules.

    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub const DAY: i64 = 86_400;
    /// 2024-01-01T00:00:00Z
    pub const JAN_1: i64 = 1_704_067_200;

    pub fn current_json(name: &str, temp: f64) -> Value {
        json!({
            "name": name,
            "sys": { "country": "PL" },
            "main": { "temp": temp, "feels_like": temp - 2.0, "humidity": 81, "pressure": 1013 },
            "weather": [{ "description": "zachmurzenie umiarkowane", "icon": "03d" }],
            "wind": { "speed": 4.12, "deg": 230 },
            "visibility": 10000,
            "dt": JAN_1
        })
    }

    /// `samples` 3-hourly entries starting at `start`.
    pub fn forecast_json(start: i64, samples: usize) -> Value {
        let list: Vec<Value> = (0..samples)
            .map(|i| {
                let dt = start + i as i64 * 3 * 3600;
                let dt_txt = DateTime::<Utc>::from_timestamp(dt, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                json!({
                    "dt": dt,
                    "main": { "temp": i as f64, "temp_min": i as f64 - 1.0, "temp_max": i as f64 + 1.0, "humidity": 70 },
                    "weather": [{ "description": "lekki deszcz", "icon": "10d" }],
                    "wind": { "speed": 3.0 },
                    "dt_txt": dt_txt
                })
            })
            .collect();
        json!({ "cod": "200", "list": list })
    }

    struct StubCity {
        current: Value,
        forecast: Value,
        failures_left: usize,
    }

    /// Serves canned payloads; unknown cities answer 404.
    #[derive(Default)]
    pub struct StubProvider {
        cities: Mutex<HashMap<String, StubCity>>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_city(self, city: &str, current: Value, forecast: Value) -> Self {
            self.with_flaky_city(city, current, forecast, 0)
        }

        /// The first `failures` current-conditions requests for `city` answer 503.
        pub fn with_flaky_city(self, city: &str, current: Value, forecast: Value, failures: usize) -> Self {
            if let Ok(mut cities) = self.cities.lock() {
                cities.insert(
                    city.to_string(),
                    StubCity {
                        current,
                        forecast,
                        failures_left: failures,
                    },
                );
            }
            self
        }

        /// Number of HTTP-equivalent requests served so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl WeatherProvider for StubProvider {
        fn name(&self) -> &str {
            "Stub"
        }

        async fn fetch_current(&self, city: &str) -> Result<Value, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut cities = self.cities.lock().unwrap();
            match cities.get_mut(city) {
                Some(stub) if stub.failures_left > 0 => {
                    stub.failures_left -= 1;
                    Err(WeatherError::Http {
                        endpoint: "Current weather",
                        status: StatusCode::SERVICE_UNAVAILABLE,
                    })
                }
                Some(stub) => Ok(stub.current.clone()),
                None => Err(WeatherError::Http {
                    endpoint: "Current weather",
                    status: StatusCode::NOT_FOUND,
                }),
            }
        }

        async fn fetch_forecast(&self, city: &str) -> Result<Value, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let cities = self.cities.lock().unwrap();
            cities
                .get(city)
                .map(|stub| stub.forecast.clone())
                .ok_or(WeatherError::Http {
                    endpoint: "Forecast",
                    status: StatusCode::NOT_FOUND,
                })
        }
    }
}
