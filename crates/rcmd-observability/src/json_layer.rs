//! Custom JSON layer for structured logging.
//!
//! Produces one JSON object per line with the fields every consumer of
//! the central log stream expects: timestamp, level, service, pid,
//! target, message, and whatever structured fields the call site
//! attached.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use chrono::Utc;
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Serialize)]
struct LogEntry {
    timestamp: String,
    level: String,
    service: String,
    pid: u32,
    target: String,
    message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    fields: HashMap<String, serde_json::Value>,
}

struct FieldVisitor {
    fields: HashMap<String, serde_json::Value>,
    message: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            fields: HashMap::new(),
            message: None,
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value_str = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(value_str);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(value_str));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::from(value));
        }
    }
}

fn level_str(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}

/// A `tracing_subscriber::Layer` that writes one JSON object per event to
/// whatever writer its `MakeWriter` produces.
pub struct JsonLayer<W> {
    service_name: String,
    writer: W,
    pid: u32,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: String, writer: W) -> Self {
        Self {
            service_name,
            writer,
            pid: std::process::id(),
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: level_str(event.metadata().level()).to_string(),
            service: self.service_name.clone(),
            pid: self.pid,
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        };

        if let Ok(mut line) = serde_json::to_string(&entry) {
            line.push('\n');
            let mut writer = self.writer.make_writer();
            let _ = writer.write_all(line.as_bytes());
        }
    }
}
