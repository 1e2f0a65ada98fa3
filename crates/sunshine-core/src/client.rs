//! HTTP client for the daily forecast API.
//!
//! The client speaks the OpenWeatherMap `forecast/daily` dialect:
//!
//! ```text
//! GET {base_url}/forecast/daily?q=<location>&mode=json&units=<units>&cnt=<days>[&APPID=<key>]
//! ```
//!
//! It returns the body untouched as a [`RawPayload`]; decoding happens in
//! [`crate::parser`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sunshine_core::{ClientConfig, ForecastSource, OpenWeatherClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenWeatherClient::new(ClientConfig::default())?;
//! let payload = client.fetch("94043", 14, Duration::from_secs(30)).await?;
//! println!("{} bytes", payload.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sunshine_types::Units;
use tracing::{debug, instrument};

use crate::error::{Error, NetworkFailure, Result};
use crate::traits::{ForecastSource, clamp_days};

/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Raw, undecoded response body from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(String);

impl RawPayload {
    /// Wrap a response body.
    pub fn new(body: impl Into<String>) -> Self {
        Self(body.into())
    }

    /// The body as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RawPayload {
    fn from(body: String) -> Self {
        Self(body)
    }
}

impl From<&str> for RawPayload {
    fn from(body: &str) -> Self {
        Self(body.to_string())
    }
}

/// Forecast client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Provider base URL without trailing slash.
    pub base_url: String,
    /// API key, sent as `APPID` when present.
    pub api_key: Option<String>,
    /// Unit system requested from the provider.
    pub units: Units,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            units: Units::Metric,
        }
    }
}

/// OpenWeatherMap-compatible daily forecast client.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    config: ClientConfig,
}

impl OpenWeatherClient {
    /// Create a new client.
    ///
    /// Fails with [`Error::InvalidConfig`] if the base URL is not http(s).
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sunshine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Self::with_client(config, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(mut config: ClientConfig, client: Client) -> Result<Self> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "base URL must start with http:// or https://, got: {}",
                config.base_url
            )));
        }

        Ok(Self { client, config })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn query_params(&self, location: &str, days: u8) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", location.to_string()),
            ("mode", "json".to_string()),
            ("units", self.config.units.as_str().to_string()),
            ("cnt", clamp_days(days).to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            params.push(("APPID", key.clone()));
        }
        params
    }

    async fn send(&self, location: &str, days: u8) -> Result<RawPayload> {
        let url = format!("{}/forecast/daily", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .query(&self.query_params(location, days))
            .send()
            .await?;

        let status = response.status();
        debug!("Forecast request for {} returned {}", location, status);

        match status {
            StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(Error::RateLimited {
                    status: status.as_u16(),
                });
            }
            StatusCode::NOT_FOUND => return Err(Error::invalid_location(location)),
            s if !s.is_success() => {
                return Err(Error::Network(NetworkFailure::Status(s.as_u16())));
            }
            _ => {}
        }

        let body = response.text().await?;
        if reports_unknown_city(&body) {
            return Err(Error::invalid_location(location));
        }

        Ok(RawPayload::new(body))
    }
}

#[async_trait]
impl ForecastSource for OpenWeatherClient {
    #[instrument(skip(self), fields(base_url = %self.config.base_url))]
    async fn fetch(&self, location: &str, days: u8, deadline: Duration) -> Result<RawPayload> {
        match tokio::time::timeout(deadline, self.send(location, days)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(deadline)),
        }
    }
}

/// The provider sometimes answers 200 with `{"cod":"404", ...}` for unknown
/// places; `cod` may be a string or a number.
fn reports_unknown_city(body: &str) -> bool {
    #[derive(Deserialize)]
    struct Envelope {
        cod: Option<serde_json::Value>,
    }

    let Ok(envelope) = serde_json::from_str::<Envelope>(body) else {
        return false;
    };
    match envelope.cod {
        Some(serde_json::Value::String(code)) => code == "404",
        Some(serde_json::Value::Number(code)) => code.as_u64() == Some(404),
        _ => false,
    }
}
