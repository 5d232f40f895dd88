use crate::env::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Settings for the Quickwit integration.
///
/// Every field has a default, so a JSON config only needs the keys it
/// changes:
///
/// ```
/// use quickwit_log::config::QuickwitConfig;
///
/// let config = QuickwitConfig::from_json_str(r#"{"url": "http://localhost:7280", "app_name": "shop"}"#).unwrap();
/// assert_eq!(config.index_id(), "logs_shop");
/// assert_eq!(config.batch_size, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickwitConfig {
    pub url: String,
    pub index_prefix: String,
    pub app_name: String,
    pub logs_dir: PathBuf,
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    pub enable_quickwit_indexing: bool,
    pub enable_minio_uploads: bool,
    /// Lowest level captured by the layer.
    pub min_level: String,
    /// Capacity of the channel between the application and the flush task.
    pub channel_buffer: usize,
    pub request_timeout_secs: u64,
    /// Index config template; `None` uses [`default_index_config`].
    ///
    /// [`default_index_config`]: crate::index_config::default_index_config
    pub index_config: Option<serde_json::Value>,
    pub minio: MinioConfig,
}

impl Default for QuickwitConfig {
    fn default() -> Self {
        QuickwitConfig {
            url: "http://quickwit:7280".to_string(),
            index_prefix: "logs".to_string(),
            app_name: "app".to_string(),
            logs_dir: PathBuf::from("logs"),
            batch_size: 100,
            flush_interval_secs: 30,
            enable_quickwit_indexing: true,
            enable_minio_uploads: false,
            min_level: "INFO".to_string(),
            channel_buffer: 10_000,
            request_timeout_secs: 10,
            index_config: None,
            minio: MinioConfig::default(),
        }
    }
}

/// Settings for the MinIO (S3-compatible) bucket that receives log files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinioConfig {
    /// Host name without scheme, e.g. `minio` or `127.0.0.1`.
    pub endpoint_url: String,
    pub endpoint_port: Option<u16>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket_name: String,
    /// Use HTTPS when talking to the endpoint.
    pub secure: bool,
    pub region: String,
}

impl Default for MinioConfig {
    fn default() -> Self {
        MinioConfig {
            endpoint_url: "minio".to_string(),
            endpoint_port: Some(9000),
            access_key: None,
            secret_key: None,
            bucket_name: "logs".to_string(),
            secure: false,
            region: "us-east-1".to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parse a level name, accepting both `tracing` and stdlib-logging spellings.
pub fn parse_level(name: &str) -> Option<Level> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

impl QuickwitConfig {
    /// Defaults overridden by the `QUICKWIT_LOG_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = QuickwitConfig::default();

        if let Some(url) = env_opt(QUICKWIT_URL_ENV) {
            config.url = url;
        }
        if let Some(prefix) = env_opt(QUICKWIT_INDEX_PREFIX_ENV) {
            config.index_prefix = prefix;
        }
        if let Some(app) = env_opt(QUICKWIT_APP_NAME_ENV) {
            config.app_name = app;
        }
        if let Some(dir) = env_opt(QUICKWIT_LOGS_DIR_ENV) {
            config.logs_dir = PathBuf::from(dir);
        }
        if let Some(size) = env_opt(QUICKWIT_BATCH_SIZE_ENV) {
            config.batch_size = parse_env(QUICKWIT_BATCH_SIZE_ENV, &size)?;
        }
        if let Some(secs) = env_opt(QUICKWIT_FLUSH_INTERVAL_ENV) {
            config.flush_interval_secs = parse_env(QUICKWIT_FLUSH_INTERVAL_ENV, &secs)?;
        }
        if let Some(flag) = env_opt(QUICKWIT_ENABLE_INDEXING_ENV) {
            config.enable_quickwit_indexing = flag_env(QUICKWIT_ENABLE_INDEXING_ENV, &flag)?;
        }
        if let Some(flag) = env_opt(QUICKWIT_ENABLE_MINIO_ENV) {
            config.enable_minio_uploads = flag_env(QUICKWIT_ENABLE_MINIO_ENV, &flag)?;
        }
        if let Some(level) = env_opt(QUICKWIT_MIN_LEVEL_ENV) {
            config.min_level = level;
        }
        if let Some(buffer) = env_opt(QUICKWIT_CHANNEL_BUFFER_ENV) {
            config.channel_buffer = parse_env(QUICKWIT_CHANNEL_BUFFER_ENV, &buffer)?;
        }
        if let Some(secs) = env_opt(QUICKWIT_REQUEST_TIMEOUT_ENV) {
            config.request_timeout_secs = parse_env(QUICKWIT_REQUEST_TIMEOUT_ENV, &secs)?;
        }

        let minio = &mut config.minio;
        if let Some(endpoint) = env_opt(MINIO_ENDPOINT_ENV) {
            minio.endpoint_url = endpoint;
        }
        if let Some(port) = env_opt(MINIO_PORT_ENV) {
            minio.endpoint_port = Some(parse_env(MINIO_PORT_ENV, &port)?);
        }
        minio.access_key = env_opt(MINIO_ACCESS_KEY_ENV).or(minio.access_key.take());
        minio.secret_key = env_opt(MINIO_SECRET_KEY_ENV).or(minio.secret_key.take());
        if let Some(bucket) = env_opt(MINIO_BUCKET_ENV) {
            minio.bucket_name = bucket;
        }
        if let Some(flag) = env_opt(MINIO_SECURE_ENV) {
            minio.secure = flag_env(MINIO_SECURE_ENV, &flag)?;
        }
        minio.region = env_or(MINIO_REGION_ENV, &minio.region);

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: QuickwitConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations that cannot work at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Empty("url"));
        }
        if reqwest::Url::parse(&self.url).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "url",
                value: self.url.clone(),
            });
        }
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Empty("app_name"));
        }
        if self.index_prefix.trim().is_empty() {
            return Err(ConfigError::Empty("index_prefix"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size",
                value: "0".to_string(),
            });
        }
        if parse_level(&self.min_level).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "min_level",
                value: self.min_level.clone(),
            });
        }
        if self.enable_minio_uploads && self.minio.bucket_name.trim().is_empty() {
            return Err(ConfigError::Empty("minio.bucket_name"));
        }
        Ok(())
    }

    /// Index id used for `app`: `{index_prefix}_{app}`.
    pub fn index_id_for(&self, app: &str) -> String {
        format!("{}_{}", self.index_prefix, app)
    }

    pub fn index_id(&self) -> String {
        self.index_id_for(&self.app_name)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parsed [`min_level`](Self::min_level); `INFO` if it does not parse.
    pub fn level(&self) -> Level {
        parse_level(&self.min_level).unwrap_or(Level::INFO)
    }
}

impl MinioConfig {
    /// `host[:port]`, as used in object URLs.
    pub fn endpoint(&self) -> String {
        match self.endpoint_port {
            Some(port) => format!("{}:{}", self.endpoint_url, port),
            None => self.endpoint_url.clone(),
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.endpoint())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn flag_env(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    parse_flag(value).ok_or_else(|| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let config = QuickwitConfig::from_json_str(r#"{"app_name": "billing", "minio": {"bucket_name": "archive"}}"#).unwrap();
        assert_eq!(config.url, "http://quickwit:7280");
        assert_eq!(config.index_id(), "logs_billing");
        assert_eq!(config.flush_interval(), Duration::from_secs(30));
        assert_eq!(config.minio.bucket_name, "archive");
        assert_eq!(config.minio.endpoint(), "minio:9000");
        assert!(!config.enable_minio_uploads);
    }

    #[test]
    fn rejects_broken_settings() {
        assert!(matches!(
            QuickwitConfig::from_json_str(r#"{"batch_size": 0}"#),
            Err(ConfigError::InvalidValue { key: "batch_size", .. })
        ));
        assert!(matches!(
            QuickwitConfig::from_json_str(r#"{"url": "not a url"}"#),
            Err(ConfigError::InvalidValue { key: "url", .. })
        ));
        assert!(matches!(
            QuickwitConfig::from_json_str(r#"{"min_level": "LOUD"}"#),
            Err(ConfigError::InvalidValue { key: "min_level", .. })
        ));
        assert!(matches!(QuickwitConfig::from_json_str("[1, 2]"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn minio_urls_follow_secure_flag() {
        let mut minio = MinioConfig {
            endpoint_url: "storage.local".into(),
            endpoint_port: None,
            ..MinioConfig::default()
        };
        assert_eq!(minio.base_url(), "http://storage.local");
        minio.secure = true;
        minio.endpoint_port = Some(443);
        assert_eq!(minio.base_url(), "https://storage.local:443");
    }

    // The only test touching the process environment.
    #[test]
    fn env_overrides_channel_buffer_and_timeout() {
        std::env::set_var(QUICKWIT_CHANNEL_BUFFER_ENV, "512");
        std::env::set_var(QUICKWIT_REQUEST_TIMEOUT_ENV, "3");
        let config = QuickwitConfig::from_env();

        std::env::set_var(QUICKWIT_REQUEST_TIMEOUT_ENV, "soon");
        let broken = QuickwitConfig::from_env();

        std::env::remove_var(QUICKWIT_CHANNEL_BUFFER_ENV);
        std::env::remove_var(QUICKWIT_REQUEST_TIMEOUT_ENV);

        let config = config.unwrap();
        assert_eq!(config.channel_buffer, 512);
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert!(matches!(
            broken,
            Err(ConfigError::InvalidValue { key: QUICKWIT_REQUEST_TIMEOUT_ENV, .. })
        ));
    }

    #[test]
    fn level_names_cover_both_spellings() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("CRITICAL"), Some(Level::ERROR));
        assert_eq!(parse_level("verbose"), None);
    }
}
