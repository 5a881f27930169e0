use std::io::Write as _;
use std::sync::Arc;

use futures::StreamExt as _;
use skycast_core::prelude::*;
use skycast_core::tools::{WeatherConfig, WeatherTool};
use skycast_core::vendors::openai::OpenAiBackend;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What's the weather in Paris today?".to_string());

    let orchestrator = Orchestrator::builder(Arc::new(OpenAiBackend::from_env()?))
        .tools(ToolBox::new().with_tool(Arc::new(WeatherTool::new(WeatherConfig::from_env()?)?)))
        .build();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut units = orchestrator.stream(Query::parse(query)?, cancel);
    let mut stdout = std::io::stdout();
    while let Some(unit) = units.next().await {
        print!("{unit}");
        stdout.flush()?;
    }
    println!();
    Ok(())
}
