use serde_json::{json, Value};

/// Quickwit index config for log records produced by this crate.
///
/// Field mappings follow [`LogRecord`](crate::record::LogRecord): raw
/// tokenizers for identifiers so they can be filtered on exactly, the default
/// tokenizer for `message`, and a 30 day retention.
pub fn default_index_config(index_id: &str) -> Value {
    json!({
        "version": "0.6",
        "index_id": index_id,
        "doc_mapping": {
            "mode": "dynamic",
            "timestamp_field": "timestamp",
            "field_mappings": [
                {
                    "name": "timestamp",
                    "type": "datetime",
                    "input_formats": ["unix_timestamp", "iso8601"],
                    "fast": true
                },
                { "name": "level", "type": "text", "tokenizer": "raw", "fast": true },
                { "name": "logger", "type": "text", "tokenizer": "raw", "fast": true },
                { "name": "message", "type": "text", "tokenizer": "default" },
                { "name": "module", "type": "text", "tokenizer": "raw" },
                { "name": "function", "type": "text", "tokenizer": "raw" },
                { "name": "line", "type": "u64" },
                { "name": "app_name", "type": "text", "tokenizer": "raw", "fast": true }
            ]
        },
        "search_settings": {
            "default_search_fields": ["message", "logger", "module"]
        },
        "indexing_settings": {
            "commit_timeout_secs": 1
        },
        "retention": {
            "period": "30d",
            "schedule": "daily"
        }
    })
}

/// Stamp `index_id` onto a user supplied template, or fall back to
/// [`default_index_config`] when there is none.
pub fn index_config_for(index_id: &str, template: Option<&Value>) -> Value {
    match template {
        Some(Value::Object(map)) => {
            let mut map = map.clone();
            map.insert("index_id".to_string(), Value::String(index_id.to_string()));
            Value::Object(map)
        }
        _ => default_index_config(index_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_timestamp_field() {
        let config = default_index_config("logs_shop");
        assert_eq!(config["index_id"], "logs_shop");
        assert_eq!(config["doc_mapping"]["timestamp_field"], "timestamp");
        let names: Vec<&str> = config["doc_mapping"]["field_mappings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"message"));
        assert!(names.contains(&"app_name"));
    }

    #[test]
    fn template_gets_index_id_overwritten() {
        let template = json!({"version": "0.7", "index_id": "stale", "doc_mapping": {}});
        let config = index_config_for("logs_api", Some(&template));
        assert_eq!(config["index_id"], "logs_api");
        assert_eq!(config["version"], "0.7");

        let fallback = index_config_for("logs_api", Some(&json!("not an object")));
        assert_eq!(fallback["version"], "0.6");
    }
}
