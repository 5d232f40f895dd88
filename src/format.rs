use crate::record::{level_name, LogRecord};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Event field that asks the layer to ship a record immediately instead of
/// batching it. It is stripped from the stored record.
pub const SEND_TO_QUICKWIT_FIELD: &str = "send_to_quickwit";

/// A [`LogRecord`] built from a `tracing` event plus the routing flags
/// carried by its fields.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub record: LogRecord,
    pub send_to_quickwit: bool,
}

/// Build a [`LogRecord`] from an event.
///
/// `function` is the name of the span the event was emitted in, if any.
pub fn capture_event(event: &Event<'_>, function: Option<String>, app_name: Option<&str>) -> CapturedEvent {
    let meta = event.metadata();
    let mut record = LogRecord::new(level_name(meta.level()), meta.target(), String::new());
    record.module = meta.module_path().map(|s| s.to_string());
    record.file = meta.file().map(|s| s.to_string());
    record.line = meta.line();
    record.function = function;
    record.app_name = app_name.map(|s| s.to_string());

    let mut visitor = FieldVisitor::default();
    event.record(&mut visitor);

    record.message = visitor.message.unwrap_or_default();
    record.exception = visitor.exception;
    for (key, value) in visitor.fields {
        record.insert_field(key, value);
    }

    CapturedEvent {
        record,
        send_to_quickwit: visitor.send_to_quickwit,
    }
}

#[derive(Default)]
pub struct FieldVisitor {
    pub fields: BTreeMap<String, serde_json::Value>,
    pub message: Option<String>,
    pub exception: Option<String>,
    pub send_to_quickwit: bool,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }

    /// `exception` always wins; `error` fills it only while it is empty.
    fn record_exception(&mut self, field: &Field, rendered: String) {
        if self.exception.is_none() || field.name() == "exception" {
            self.exception = Some(rendered);
        } else {
            self.insert(field, serde_json::Value::String(rendered));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "exception" | "error" => self.record_exception(field, value.to_string()),
            _ => self.insert(field, serde_json::Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON form.
        match serde_json::Number::from_f64(value) {
            Some(n) => self.insert(field, serde_json::Value::Number(n)),
            None => self.insert(field, serde_json::Value::String(value.to_string())),
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == SEND_TO_QUICKWIT_FIELD {
            self.send_to_quickwit = value;
        } else {
            self.insert(field, serde_json::Value::from(value));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut rendered = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            let _ = write!(rendered, ": {}", cause);
            source = cause.source();
        }
        self.record_exception(field, rendered);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(rendered),
            "exception" | "error" => self.record_exception(field, rendered),
            _ => self.insert(field, serde_json::Value::String(rendered)),
        }
    }
}

/// `fmt` event formatter that prints every event as one JSON line, in the
/// same shape the layer writes to the daily files and ships to Quickwit.
///
/// ```no_run
/// use quickwit_log::format::JsonFormatter;
///
/// tracing_subscriber::fmt()
///     .event_format(JsonFormatter::new(Some("shop".to_string())))
///     .init();
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pub app_name: Option<String>,
}

impl JsonFormatter {
    pub fn new(app_name: Option<String>) -> Self {
        JsonFormatter { app_name }
    }

    pub fn format_record(&self, event: &Event<'_>, function: Option<String>) -> String {
        capture_event(event, function, self.app_name.as_deref())
            .record
            .to_json_line()
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let function = ctx.lookup_current().map(|span| span.name().to_string());
        writeln!(writer, "{}", self.format_record(event, function))
    }
}
