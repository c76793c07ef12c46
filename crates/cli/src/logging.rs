use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tungstenite=warn,tokio_tungstenite=warn";
const LOG_FILE: &str = "client.log";

/// Keeps the file writer flushing; drop it last.
pub struct LoggingHandle {
    pub run_id: String,
    pub guard: WorkerGuard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("ACE_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// `ACE_LOG_FILTER`, then `RUST_LOG`, then the built-in default.
fn filter_directives() -> String {
    std::env::var("ACE_LOG_FILTER")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .filter(|d| EnvFilter::try_new(d).is_ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Send logs to `<log_dir>/client.log`; stdout belongs to the chat.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<LoggingHandle> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE);
    if std::env::var("ACE_TRUNCATE_LOG_ON_START").as_deref() == Ok("1") {
        std::fs::File::create(&log_path)?;
    }

    let directives = filter_directives();
    let format = LogFormat::from_env();
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        log_dir, LOG_FILE,
    ));

    let (json, pretty) = match format {
        LogFormat::Json => (Some(json_layer(writer)), None),
        LogFormat::Pretty => (None, Some(pretty_layer(writer))),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::new(&directives))
        .with(json)
        .with(pretty)
        .try_init()?;

    let run_id = std::env::var("ACE_RUN_ID").unwrap_or_else(|_| ace_protocol::new_id());
    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        log_path = %log_path.display(),
        format = ?format,
        filter = %directives,
    );

    Ok(LoggingHandle { run_id, guard })
}

fn json_layer<S>(writer: NonBlocking) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
}

fn pretty_layer<S>(writer: NonBlocking) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .pretty()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
}
