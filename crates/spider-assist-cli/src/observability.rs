use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_ENV: &str = "SPIDER_ASSIST_OBSERVABILITY_ENABLED";
const LEVEL_ENV: &str = "SPIDER_ASSIST_LOG_LEVEL";
const JSON_PATH_ENV: &str = "SPIDER_ASSIST_JSON_LOG_PATH";
const DEFAULT_FILTER: &str = "info";
const DEFAULT_LOG_FILE: &str = "spider-assist.logs.jsonl";

/// Destination of log records. Stdout is reserved for the transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
enum LogSink {
    Off,
    Stderr,
    JsonFile { dir: PathBuf, file_name: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    filter: String,
    sink: LogSink,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(ENABLED_ENV)
            .and_then(|value| switch_value(&value))
            .unwrap_or(true);
        let filter = [LEVEL_ENV, "RUST_LOG"]
            .into_iter()
            .filter_map(&lookup)
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let sink = match lookup(JSON_PATH_ENV).filter(|path| !path.trim().is_empty()) {
            _ if !enabled => LogSink::Off,
            Some(path) => json_sink(Path::new(path.trim())),
            None => LogSink::Stderr,
        };
        Self { filter, sink }
    }
}

/// Reads an on/off switch. Unrecognised values yield `None`.
fn switch_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn json_sink(path: &Path) -> LogSink {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    LogSink::JsonFile { dir, file_name }
}

/// Installs the global subscriber once per process.
///
/// `SPIDER_ASSIST_OBSERVABILITY_ENABLED` switches logging off,
/// `SPIDER_ASSIST_LOG_LEVEL` (then `RUST_LOG`) sets the filter and
/// `SPIDER_ASSIST_JSON_LOG_PATH` writes JSONL to a file instead of the
/// compact stderr console.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
        let filter = EnvFilter::try_new(&settings.filter)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let registry = tracing_subscriber::registry().with(filter);
        let _ = match settings.sink {
            LogSink::Off => return,
            LogSink::Stderr => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogSink::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(&dir);
                registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_current_span(true)
                            .with_target(false)
                            .with_writer(tracing_appender::rolling::never(dir, file_name)),
                    )
                    .try_init()
            }
        };
    });
}
