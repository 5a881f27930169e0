use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use skycast_core::tools::{WeatherConfig, WeatherTool};
use skycast_core::vendors::openai::{OpenAiBackend, OpenAiClientConfig};
use skycast_core::{ConfigError, Orchestrator, ToolBox};

/// Server configuration from flags, environment, and an optional `.env` file.
#[derive(Debug, Clone, Parser)]
#[command(name = "skycast-server", version, about = "Streams weather-aware answers over HTTP")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "SKYCAST_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub openai_base_url: String,

    #[arg(long, env = "SKYCAST_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    #[arg(long, env = "WEATHER_API_KEY", hide_env_values = true)]
    pub weather_api_key: Option<String>,

    #[arg(
        long,
        env = "WEATHER_BASE_URL",
        default_value = "https://api.openweathermap.org/data/2.5"
    )]
    pub weather_base_url: String,

    /// Follow-up generations allowed after tool results.
    #[arg(long, env = "SKYCAST_MAX_TOOL_ROUNDS", default_value_t = 8)]
    pub max_tool_rounds: u32,
}

impl ServerConfig {
    /// Loads `.env` (if present) and parses flags and environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn openai_config(&self) -> Result<OpenAiClientConfig, ConfigError> {
        let api_key = required(&self.openai_api_key, "OPENAI_API_KEY")?;
        Ok(OpenAiClientConfig::new(api_key)
            .base_url(self.openai_base_url.clone())
            .model(self.model.clone()))
    }

    pub fn weather_config(&self) -> Result<WeatherConfig, ConfigError> {
        let api_key = required(&self.weather_api_key, "WEATHER_API_KEY")?;
        Ok(WeatherConfig::new(api_key).base_url(self.weather_base_url.clone()))
    }

    /// Builds the orchestrator. Any error here is fatal.
    pub fn build_orchestrator(&self) -> Result<Orchestrator, ConfigError> {
        let backend = OpenAiBackend::new(self.openai_config()?)?;
        let weather = WeatherTool::new(self.weather_config()?)?;
        Ok(Orchestrator::builder(Arc::new(backend))
            .tools(ToolBox::new().with_tool(Arc::new(weather)))
            .max_tool_rounds(self.max_tool_rounds)
            .build())
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .ok_or(ConfigError::Missing(name))
}
