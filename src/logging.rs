//! Structured logging
//!
//! Two sinks: a human-readable layer on stderr (which the detached server's
//! `proxy.log` captures) and a JSON-lines layer appending one object per
//! line to the structured log file. The file is opened with `O_APPEND` so
//! concurrent writers cannot interleave inside a single record.
//!
//! Each JSON line carries `ts`, `level`, `msg`, and every field recorded on
//! the event (`component`, `req_id`, `model`, `upstream`, `status`,
//! `duration_ms`, `body_excerpt`, `error_code`, ...), flattened at the top
//! level.

use anyhow::{Context as AnyhowContext, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::io::Write;
use std::sync::Mutex;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Tracing layer that writes one JSON object per event.
pub struct JsonLinesLayer<W: Write + Send + 'static> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesLayer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonLinesLayer<W>
where
    S: Subscriber,
    W: Write + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Map::new();
        let mut visitor = JsonVisitor(&mut fields);
        event.record(&mut visitor);

        let msg = fields
            .remove("message")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();

        let mut record = Map::new();
        record.insert("ts".to_string(), json!(chrono::Utc::now().to_rfc3339()));
        record.insert(
            "level".to_string(),
            json!(event.metadata().level().to_string().to_lowercase()),
        );
        record.insert("msg".to_string(), json!(msg));
        for (key, value) in fields {
            record.insert(key, value);
        }

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", Value::Object(record));
        }
    }
}

struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl tracing::field::Visit for JsonVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), json!(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), json!(value));
    }
}

/// Initialize the global subscriber: env-filter from `CC_GLM_LOG` (falling
/// back to the configured level), stderr for humans, JSON lines to the
/// structured log file.
pub fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_env("CC_GLM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let log_path = config.structured_log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log dir {}", parent.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(JsonLinesLayer::new(file))
        .init();

    Ok(())
}
