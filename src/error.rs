use std::path::PathBuf;

use reqwest::StatusCode;

use crate::config::API_KEY_VAR;

/// Everything that can go wrong while fetching, validating or persisting weather data.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather API key is not configured (set {})", API_KEY_VAR)]
    MissingApiKey,

    #[error("{endpoint} API error: {status}")]
    Http {
        endpoint: &'static str,
        status: StatusCode,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid weather data structure: {0}")]
    InvalidPayload(String),

    #[error("failed to write {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize cache snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WeatherError {
    /// Configuration problems won't fix themselves between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, WeatherError::MissingApiKey)
    }
}
