use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::Level;

/// Untyped log document, as ingested by Quickwit or read back from a log file.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Keys owned by [`LogRecord`] itself. Extra fields with these names are
/// dropped so they never shadow the fixed columns of the index.
pub const RESERVED_KEYS: &[&str] = &[
    "timestamp",
    "level",
    "logger",
    "message",
    "module",
    "function",
    "file",
    "line",
    "thread",
    "process",
    "app_name",
    "exception",
];

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub logger: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub thread: String,
    pub process: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

/// RFC 3339 with microseconds and a `Z` suffix, e.g. `2024-05-01T12:00:00.000123Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Map a `tracing` level onto the level names stored in the index.
pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE | Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

/// Name of the current thread, falling back to its id for unnamed threads.
pub fn current_thread_label() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

impl LogRecord {
    /// Minimal record stamped with the current time, thread and process.
    pub fn new(level: impl Into<String>, logger: impl Into<String>, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level: level.into(),
            logger: logger.into(),
            message: message.into(),
            module: None,
            function: None,
            file: None,
            line: None,
            thread: current_thread_label(),
            process: std::process::id(),
            app_name: None,
            exception: None,
            fields: BTreeMap::new(),
        }
    }

    /// Insert an extra field unless it collides with a reserved key.
    pub fn insert_field(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return;
        }
        self.fields.insert(key, value);
    }

    /// Compact single-line JSON, without the trailing newline.
    pub fn to_json_line(&self) -> String {
        // Every field is a string, number or already a `serde_json::Value`.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn into_document(self) -> Document {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Document::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_fixed_keys_and_flattens_extras() {
        let mut record = LogRecord::new("INFO", "app::http", "request served");
        record.line = Some(42);
        record.app_name = Some("shop".into());
        record.insert_field("status", json!(200));

        let value: serde_json::Value = serde_json::from_str(&record.to_json_line()).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["logger"], "app::http");
        assert_eq!(value["message"], "request served");
        assert_eq!(value["line"], 42);
        assert_eq!(value["app_name"], "shop");
        assert_eq!(value["status"], 200);
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(value.get("exception").is_none());
    }

    #[test]
    fn extra_fields_cannot_shadow_reserved_keys() {
        let mut record = LogRecord::new("ERROR", "app", "boom");
        record.insert_field("level", json!("DEBUG"));
        record.insert_field("message", json!("other"));

        let doc = record.into_document();
        assert_eq!(doc["level"], "ERROR");
        assert_eq!(doc["message"], "boom");
    }

    #[test]
    fn maps_tracing_levels() {
        assert_eq!(level_name(&Level::TRACE), "DEBUG");
        assert_eq!(level_name(&Level::WARN), "WARNING");
        assert_eq!(level_name(&Level::ERROR), "ERROR");
    }
}
