/// Environment variable names read by [`QuickwitConfig::from_env`].
///
/// Every setting can also be passed in code or
/// through a JSON config file.
///
/// [`QuickwitConfig::from_env`]: crate::config::QuickwitConfig::from_env

/// Quickwit base URL, e.g. `http://127.0.0.1:7280`.
pub const QUICKWIT_URL_ENV: &str = "QUICKWIT_LOG_URL";

/// Prefix of every index id; the index is named `{prefix}_{app}`.
pub const QUICKWIT_INDEX_PREFIX_ENV: &str = "QUICKWIT_LOG_INDEX_PREFIX";

/// Application name stamped on every record.
pub const QUICKWIT_APP_NAME_ENV: &str = "QUICKWIT_LOG_APP_NAME";

/// Directory holding the daily JSON log files.
pub const QUICKWIT_LOGS_DIR_ENV: &str = "QUICKWIT_LOG_LOGS_DIR";

pub const QUICKWIT_BATCH_SIZE_ENV: &str = "QUICKWIT_LOG_BATCH_SIZE";

/// Seconds between timer flushes.
pub const QUICKWIT_FLUSH_INTERVAL_ENV: &str = "QUICKWIT_LOG_FLUSH_INTERVAL";

/// `true`/`false`; disables shipping to Quickwit while keeping the files.
pub const QUICKWIT_ENABLE_INDEXING_ENV: &str = "QUICKWIT_LOG_ENABLE_INDEXING";

/// `true`/`false`; enables uploads of the log directory to MinIO.
pub const QUICKWIT_ENABLE_MINIO_ENV: &str = "QUICKWIT_LOG_ENABLE_MINIO";

/// Records queued between the layer and its worker before new ones are dropped.
pub const QUICKWIT_CHANNEL_BUFFER_ENV: &str = "QUICKWIT_LOG_CHANNEL_BUFFER";

/// Seconds before a Quickwit request is abandoned.
pub const QUICKWIT_REQUEST_TIMEOUT_ENV: &str = "QUICKWIT_LOG_REQUEST_TIMEOUT";

/// Lowest level captured by the layer (`DEBUG`, `INFO`, `WARNING`, `ERROR`).
pub const QUICKWIT_MIN_LEVEL_ENV: &str = "QUICKWIT_LOG_MIN_LEVEL";

pub const MINIO_ENDPOINT_ENV: &str = "QUICKWIT_LOG_MINIO_ENDPOINT";
pub const MINIO_PORT_ENV: &str = "QUICKWIT_LOG_MINIO_PORT";
pub const MINIO_ACCESS_KEY_ENV: &str = "QUICKWIT_LOG_MINIO_ACCESS_KEY";
pub const MINIO_SECRET_KEY_ENV: &str = "QUICKWIT_LOG_MINIO_SECRET_KEY";
pub const MINIO_BUCKET_ENV: &str = "QUICKWIT_LOG_MINIO_BUCKET";
pub const MINIO_SECURE_ENV: &str = "QUICKWIT_LOG_MINIO_SECURE";
pub const MINIO_REGION_ENV: &str = "QUICKWIT_LOG_MINIO_REGION";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and empty as absent.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean flag the way shell users write them.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
