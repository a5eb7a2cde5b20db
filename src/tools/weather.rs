use crate::config::WeatherConfig;
use crate::shared::utils::http_client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DATA_SOURCE: &str = "open-meteo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub temperature_2m: Option<f64>,
    pub relative_humidity_2m: Option<f64>,
    pub precipitation: Option<f64>,
}

impl CurrentWeather {
    /// Summary block appended to the user's question for the narrator.
    pub fn summary(&self) -> String {
        fn show(value: Option<f64>) -> String {
            value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
        }
        format!(
            "Current weather data:\n- Temperature: {}°C\n- Humidity: {}%\n- Precipitation: {}mm",
            show(self.temperature_2m),
            show(self.relative_humidity_2m),
            show(self.precipitation)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected weather response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self) -> Result<CurrentWeather, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentWeather>,
}

pub struct OpenMeteoClient {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl OpenMeteoClient {
    pub fn new(config: WeatherConfig) -> Self {
        let client = http_client(config.timeout_secs, "weather");
        Self { client, config }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn current(&self) -> Result<CurrentWeather, WeatherError> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("latitude", self.config.latitude.to_string()),
                ("longitude", self.config.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,precipitation".to_string(),
                ),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: ForecastResponse = response.json().await?;
        body.current
            .ok_or_else(|| WeatherError::InvalidResponse("missing `current` block".to_string()))
    }
}
