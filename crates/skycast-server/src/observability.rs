use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const ENABLED_VAR: &str = "SKYCAST_OBSERVABILITY_ENABLED";
const LEVEL_VAR: &str = "SKYCAST_LOG_LEVEL";
const JSON_PATH_VAR: &str = "SKYCAST_JSON_LOG_PATH";
const DEFAULT_LOG_FILE: &str = "skycast.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
enum LogOutput {
    Console,
    JsonFile { dir: PathBuf, file_name: String },
}

/// Logging setup as read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    level: Option<String>,
    output: LogOutput,
}

impl LogSettings {
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = get(ENABLED_VAR)
            .and_then(|v| parse_flag(&v))
            .unwrap_or(true);
        let level = get(LEVEL_VAR).filter(|v| !v.trim().is_empty());
        let output = match get(JSON_PATH_VAR).filter(|v| !v.trim().is_empty()) {
            Some(raw) => json_output(Path::new(&raw)),
            None => LogOutput::Console,
        };
        Self {
            enabled,
            level,
            output,
        }
    }

    /// `SKYCAST_LOG_LEVEL` wins over `RUST_LOG`; an unparseable directive is ignored.
    fn filter(&self) -> EnvFilter {
        self.level
            .as_deref()
            .and_then(|level| EnvFilter::try_new(level).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

fn json_output(path: &Path) -> LogOutput {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    LogOutput::JsonFile { dir, file_name }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Installs the global subscriber the first time it is called.
///
/// - `SKYCAST_OBSERVABILITY_ENABLED=false` skips installation entirely.
/// - `SKYCAST_LOG_LEVEL` sets the filter directive, falling back to `RUST_LOG`, then `info`.
/// - `SKYCAST_JSON_LOG_PATH` sends JSON lines to that file instead of compact stdout output.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }
        let filter = settings.filter();
        match settings.output {
            LogOutput::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(&dir);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            LogOutput::Console => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stdout);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}
