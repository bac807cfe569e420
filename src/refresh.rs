use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::WeatherError;
use crate::snapshot::{city_key, CacheSnapshot};
use crate::weather::{fetch_weather_data, WeatherProvider};

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSummary {
    pub successful: usize,
    pub failed: usize,
    pub total_cities: usize,
    pub path: PathBuf,
    pub file_size: u64,
}

/// Rebuilds the cache file from the provider, one city at a time.
pub struct CacheRefresher {
    provider: Arc<dyn WeatherProvider>,
    cities: Vec<String>,
    cache_path: PathBuf,
    request_delay: Duration,
}

impl CacheRefresher {
    pub fn new(provider: Arc<dyn WeatherProvider>, config: &Config) -> Self {
        Self {
            provider,
            cities: config.cities.clone(),
            cache_path: config.cache_path.clone(),
            request_delay: config.request_delay,
        }
    }

    /// Merge fresh data for every configured city into `snapshot`.
    /// Returns the number of successful and failed cities.
    pub async fn refresh(&self, snapshot: &mut CacheSnapshot) -> Result<(usize, usize), WeatherError> {
        let total = self.cities.len();
        let mut successful = 0;
        let mut failed = 0;

        for (i, city) in self.cities.iter().enumerate() {
            let progress = format!("[{}/{}]", i + 1, total);
            info!("{} Processing {}...", progress, city);

            match fetch_weather_data(self.provider.as_ref(), city).await {
                Some(entry) => {
                    snapshot.insert(city, &entry)?;
                    successful += 1;
                    info!("{} ✅ {} - Success", progress, city);
                }
                None => {
                    failed += 1;
                    if snapshot.get(&city_key(city)).is_some() {
                        warn!("{} ❌ {} - Failed (keeping old data)", progress, city);
                    } else {
                        warn!("{} ❌ {} - Failed (no previous data)", progress, city);
                    }
                }
            }

            if i + 1 < total && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        Ok((successful, failed))
    }

    pub async fn run(&self) -> Result<RefreshSummary, WeatherError> {
        info!("🌤️  Starting weather data update...");
        info!("📍 Fetching data for {} cities", self.cities.len());

        let mut snapshot = CacheSnapshot::load(&self.cache_path);
        let (successful, failed) = self.refresh(&mut snapshot).await?;

        let metadata = snapshot.metadata(successful, failed, Utc::now());
        let file_size = snapshot.save(&self.cache_path, &metadata)?;

        let summary = RefreshSummary {
            successful,
            failed,
            total_cities: metadata.total_cities,
            path: self.cache_path.clone(),
            file_size,
        };

        info!("🎉 Weather data update completed!");
        info!("✅ Successful updates: {}", summary.successful);
        info!("❌ Failed updates: {}", summary.failed);
        info!("📊 Total cities in cache: {}", summary.total_cities);
        info!("💾 Data saved to: {}", summary.path.display());
        info!("📏 File size: {:.2} KB", summary.file_size as f64 / 1024.0);

        Ok(summary)
    }
}

/// Fetch one city and print a short report without touching the cache file.
pub async fn diagnose_city(provider: &dyn WeatherProvider, city: &str) -> bool {
    println!("🧪 Testing weather data for: {}", city);

    match fetch_weather_data(provider, city).await {
        Some(data) => {
            println!("✅ Success!");
            println!("📍 Location: {}, {}", data.current.name, data.current.country);
            println!("🌡️ Temperature: {}°", data.current.temp);
            println!("📝 Description: {}", data.current.description);
            println!("📅 Forecast entries: {}", data.forecast.list.len());
            true
        }
        None => {
            println!("❌ Failed to fetch data");
            false
        }
    }
}
