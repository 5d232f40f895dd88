use crate::record::Document;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const VALID_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
pub const REQUIRED_FIELDS: &[&str] = &["timestamp", "level", "message"];

/// Value of `source` added by [`LogProcessor::enrich_log_entry`].
pub const DEFAULT_SOURCE: &str = "quickwit_log";

/// Parse an ISO 8601 timestamp, with or without offset, down to a bare date.
/// Naive timestamps are taken as UTC; a bare date is its midnight.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogStatistics {
    pub total_entries: usize,
    pub level_counts: BTreeMap<String, usize>,
    pub app_counts: BTreeMap<String, usize>,
    pub date_range: DateRange,
    /// Entries at `ERROR` or `CRITICAL`.
    pub error_count: usize,
}

/// Reads, validates and summarizes JSON log files.
#[derive(Debug, Clone, Default)]
pub struct LogProcessor;

impl LogProcessor {
    pub fn new() -> Self {
        LogProcessor
    }

    /// Every JSON object of a newline-delimited file. Blank and invalid
    /// lines are skipped; an unreadable file yields nothing.
    pub fn read_json_logs(&self, path: &Path) -> Vec<Document> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "cannot open log file");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "error reading log file");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(doc)) => entries.push(doc),
                Ok(_) => tracing::warn!(path = %path.display(), line = index + 1, "log line is not a JSON object"),
                Err(e) => tracing::warn!(path = %path.display(), line = index + 1, error = %e, "invalid JSON in log file"),
            }
        }
        entries
    }

    /// Entries of every file in `dir` with the given extension (without
    /// the dot), in file name order.
    pub fn process_log_directory(&self, dir: &Path, extension: &str) -> Vec<Document> {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(_) => {
                tracing::warn!(dir = %dir.display(), "log directory does not exist");
                return Vec::new();
            }
        };

        let mut files: Vec<_> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension))
            .collect();
        files.sort();

        files
            .iter()
            .flat_map(|path| {
                tracing::info!(path = %path.display(), "processing log file");
                self.read_json_logs(path)
            })
            .collect()
    }

    /// Parse one line: a JSON object, or the plain
    /// `<iso timestamp> <LEVEL> <message>` form.
    pub fn parse_log_line(&self, line: &str) -> Option<Document> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(doc)) => Some(doc),
            _ => self.parse_simple_log_line(line),
        }
    }

    fn parse_simple_log_line(&self, line: &str) -> Option<Document> {
        let mut parts = line.splitn(3, ' ');
        let (timestamp, level, message) = (parts.next()?, parts.next()?, parts.next()?);
        let timestamp = parse_timestamp(timestamp)?;

        let mut doc = Document::new();
        doc.insert("timestamp".into(), Value::String(timestamp.to_rfc3339()));
        doc.insert("level".into(), Value::String(level.to_string()));
        doc.insert("message".into(), Value::String(message.to_string()));
        doc.insert("raw_line".into(), Value::String(line.to_string()));
        Some(doc)
    }

    /// Check required fields, timestamp format and level name.
    pub fn validate_log_entry(&self, entry: &Document) -> bool {
        for field in REQUIRED_FIELDS {
            if !entry.contains_key(*field) {
                tracing::warn!(field, "missing required field in log entry");
                return false;
            }
        }

        let timestamp = entry.get("timestamp").and_then(Value::as_str);
        if timestamp.and_then(parse_timestamp).is_none() {
            tracing::warn!(timestamp = ?entry.get("timestamp"), "invalid timestamp format");
            return false;
        }

        match entry.get("level").and_then(Value::as_str) {
            Some(level) if VALID_LEVELS.contains(&level) => true,
            other => {
                tracing::warn!(level = ?other, "invalid log level");
                false
            }
        }
    }

    /// Copy of `entry` with `app_name` (when given), `processed_at` and a
    /// default `source`.
    pub fn enrich_log_entry(&self, entry: &Document, app_name: Option<&str>) -> Document {
        let mut enriched = entry.clone();
        if let Some(app) = app_name {
            enriched.insert("app_name".into(), Value::String(app.to_string()));
        }
        enriched.insert("processed_at".into(), Value::String(Utc::now().to_rfc3339()));
        enriched
            .entry("source")
            .or_insert_with(|| Value::String(DEFAULT_SOURCE.to_string()));
        enriched
    }

    /// Split into batches of at most `batch_size` (at least 1).
    pub fn batch_logs(&self, entries: Vec<Document>, batch_size: usize) -> Vec<Vec<Document>> {
        let batch_size = batch_size.max(1);
        let mut batches = Vec::with_capacity(entries.len() / batch_size + 1);
        let mut batch = Vec::with_capacity(batch_size);
        for entry in entries {
            batch.push(entry);
            if batch.len() >= batch_size {
                batches.push(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)));
            }
        }
        if !batch.is_empty() {
            batches.push(batch);
        }
        batches
    }

    pub fn get_log_statistics(&self, entries: &[Document]) -> LogStatistics {
        let mut stats = LogStatistics::default();
        let mut earliest: Option<DateTime<FixedOffset>> = None;
        let mut latest: Option<DateTime<FixedOffset>> = None;

        for entry in entries {
            stats.total_entries += 1;

            let level = entry.get("level").and_then(Value::as_str).unwrap_or("UNKNOWN");
            *stats.level_counts.entry(level.to_string()).or_default() += 1;

            let app = entry.get("app_name").and_then(Value::as_str).unwrap_or("unknown");
            *stats.app_counts.entry(app.to_string()).or_default() += 1;

            if level == "ERROR" || level == "CRITICAL" {
                stats.error_count += 1;
            }

            if let Some(ts) = entry.get("timestamp").and_then(Value::as_str).and_then(parse_timestamp) {
                if earliest.map_or(true, |e| ts < e) {
                    earliest = Some(ts);
                }
                if latest.map_or(true, |l| ts > l) {
                    latest = Some(ts);
                }
            }
        }

        stats.date_range = DateRange {
            earliest: earliest.map(|ts| ts.to_rfc3339()),
            latest: latest.map(|ts| ts.to_rfc3339()),
        };
        stats
    }
}
