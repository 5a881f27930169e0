use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

use super::Tool;
use crate::errors::ConfigError;
use crate::model::ToolDeclaration;

const TOOL_NAME: &str = "get_weather";

/// Configuration for the weather lookup client.
#[derive(Clone, Debug)]
pub struct WeatherConfig {
    pub api_key: String,
    /// Base URL of the weather service; `/weather` is appended.
    pub base_url: String,
    pub timeout: Duration,
}

impl WeatherConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `WEATHER_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("WEATHER_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ConfigError::Missing("WEATHER_API_KEY"));
        }
        Ok(Self::new(api_key))
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn weather_url(&self) -> String {
        format!("{}/weather", self.base_url.trim_end_matches('/'))
    }
}

/// Arguments the model supplies for a weather lookup.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WeatherArgs {
    pub city: String,
    /// `YYYY-MM-DD`; defaults to today.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeatherReport {
    main: MainReadings,
    weather: Vec<Condition>,
    wind: Wind,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

#[derive(Debug, thiserror::Error)]
enum ToolError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("status {status}")]
    Status { status: u16 },
    #[error("malformed report: {0}")]
    Malformed(String),
}

impl ToolError {
    fn sentence(&self, city: &str) -> String {
        match self {
            Self::Transport(_) => format!(
                "The weather service could not be reached, so conditions for {city} are unavailable right now."
            ),
            Self::Status { status: 404 } => {
                format!("The weather service has no data for a city called {city}.")
            }
            Self::Status { status } => format!(
                "The weather service returned an error (status {status}) when asked about {city}."
            ),
            Self::Malformed(_) => {
                format!("The weather service returned an incomplete report for {city}.")
            }
        }
    }
}

/// Current-conditions lookup against an OpenWeatherMap-style endpoint.
pub struct WeatherTool {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherTool {
    pub fn new(config: WeatherConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("WEATHER_API_KEY"));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "weather client",
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Looks up the weather and always returns a sentence.
    pub async fn lookup(&self, args: &WeatherArgs) -> String {
        let today = chrono::Local::now().date_naive();
        match self.fetch(&args.city).await {
            Ok(report) => describe(&report, args.date.as_deref(), today),
            Err(err) => {
                warn!(tool = TOOL_NAME, city = %args.city, error = %err, "weather lookup failed");
                err.sentence(&args.city)
            }
        }
    }

    async fn fetch(&self, city: &str) -> Result<WeatherReport, ToolError> {
        let response = self
            .client
            .get(self.config.weather_url())
            .query(&[
                ("city", city),
                ("key", self.config.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ToolError::Malformed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Tool for WeatherTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: TOOL_NAME.to_string(),
            description: "Get the weather for a city on a given date.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string", "description": "City name, for example Paris." },
                    "date": { "type": "string", "description": "Date as YYYY-MM-DD." }
                },
                "required": ["city", "date"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, arguments: &str) -> String {
        match serde_json::from_str::<WeatherArgs>(arguments) {
            Ok(args) if !args.city.trim().is_empty() => {
                debug!(tool = TOOL_NAME, city = %args.city, date = ?args.date, "weather lookup");
                self.lookup(&args).await
            }
            Ok(_) => "The weather could not be looked up because no city was given.".to_string(),
            Err(e) => {
                warn!(tool = TOOL_NAME, error = %e, "invalid weather arguments");
                "The weather could not be looked up because the request was malformed.".to_string()
            }
        }
    }
}

fn describe(report: &WeatherReport, date: Option<&str>, today: NaiveDate) -> String {
    let description = report
        .weather
        .first()
        .map(|c| c.description.as_str())
        .unwrap_or("no description");
    let requested = date.and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());
    let day = requested.unwrap_or(today);
    let mut text = format!(
        "Weather in {} on {}: {}, {:.1}°C (feels like {:.1}°C), humidity {:.0}%, wind {:.1} m/s.",
        report.name,
        day.format("%Y-%m-%d"),
        description,
        report.main.temp,
        report.main.feels_like,
        report.main.humidity,
        report.wind.speed,
    );
    if day != today {
        text.push_str(" These are current conditions; the service has no data for other dates.");
    }
    text
}
