use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use skycast_client::{DocumentAggregator, DocumentState, HttpFragmentSource};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader, Stdout};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Ask a skycast server about the weather. Each line on stdin is a question;
/// a new line while an answer is streaming stops that answer.
#[derive(Debug, Parser)]
#[command(name = "skycast", version)]
struct Args {
    /// Base URL of the skycast server.
    #[arg(long, env = "SKYCAST_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Ask a single question and exit.
    query: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let source = HttpFragmentSource::new(args.server).context("failed to build HTTP client")?;
    let mut aggregator = DocumentAggregator::new(Arc::new(source));
    let mut view = View {
        state: aggregator.subscribe(),
        rendered: 0,
        out: tokio::io::stdout(),
    };

    if let Some(query) = args.query {
        aggregator.submit(&query).await;
        view.render().await?;
        while aggregator.next_update().await {
            view.render().await?;
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    aggregator.interrupt(line.trim()).await;
                }
                None => stdin_open = false,
            },
            _ = aggregator.next_update(), if aggregator.is_busy() => {}
            _ = tokio::signal::ctrl_c() => {
                if !aggregator.cancel().await {
                    break;
                }
            }
        }
        view.render().await?;
        if !stdin_open && !aggregator.is_busy() {
            break;
        }
    }
    Ok(())
}

/// Writes whatever the document gained since the last render.
struct View {
    state: watch::Receiver<DocumentState>,
    rendered: usize,
    out: Stdout,
}

impl View {
    async fn render(&mut self) -> std::io::Result<()> {
        if !self.state.has_changed().unwrap_or(false) {
            return Ok(());
        }
        let fresh = {
            let state = self.state.borrow_and_update();
            let fresh = state.document.get(self.rendered..).unwrap_or_default().to_owned();
            self.rendered = state.document.len();
            fresh
        };
        if !fresh.is_empty() {
            self.out.write_all(fresh.as_bytes()).await?;
            self.out.flush().await?;
        }
        Ok(())
    }
}
