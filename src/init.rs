use crate::client::{QuickwitClient, QuickwitError};
use crate::config::QuickwitConfig;
use crate::format::JsonFormatter;
use crate::layer::{LayerError, QuickwitHandle, QuickwitLayer};
use crate::noop_sink::NoopSink;
use crate::quickwit_sink::QuickwitSink;
use crate::sink::LogSink;
use crate::storage::MinioStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the logging layer.
///
/// Controls the size of the internal channel, the batch size sent to the
/// sink, how often a partial batch is flushed, where the daily files go and
/// whether events are also printed to the console.
///
/// **Fields**
/// - `channel_buffer`: maximum number of records queued before new ones
///   are dropped.
/// - `batch_size`: records per flush to the sink.
/// - `flush_interval`: maximum time between flushes of a partial batch.
/// - `logs_dir`: directory of the daily JSON files; `None` disables them.
/// - `enable_stdout`: add a `tracing_subscriber::fmt` layer on top.
/// - `json_stdout`: print console output as JSON lines via [`JsonFormatter`].
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub app_name: String,
    pub logs_dir: Option<PathBuf>,
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub min_level: Level,
    pub enable_stdout: bool,
    pub json_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self::from(&QuickwitConfig::default())
    }
}

impl From<&QuickwitConfig> for LayerConfig {
    fn from(config: &QuickwitConfig) -> Self {
        LayerConfig {
            app_name: config.app_name.clone(),
            logs_dir: Some(config.logs_dir.clone()),
            channel_buffer: config.channel_buffer,
            batch_size: config.batch_size,
            flush_interval: config.flush_interval(),
            min_level: config.level(),
            enable_stdout: true,
            json_stdout: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error("failed to build Quickwit client: {0}")]
    Client(#[from] QuickwitError),

    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// The sink selected by `config`: Quickwit when indexing is enabled,
/// otherwise a [`NoopSink`].
pub fn sink_for(config: &QuickwitConfig) -> Result<Arc<dyn LogSink>, InitError> {
    if !config.enable_quickwit_indexing {
        return Ok(Arc::new(NoopSink));
    }
    let client = QuickwitClient::new(config)?;
    Ok(Arc::new(QuickwitSink::new(client, config.app_name.clone())))
}

/// Connect to MinIO when uploads are enabled.
///
/// A storage that cannot be reached is reported on stderr and left out, so
/// logging keeps working without uploads.
pub async fn storage_for(config: &QuickwitConfig) -> Option<MinioStorage> {
    if !config.enable_minio_uploads {
        return None;
    }

    #[cfg(feature = "minio")]
    {
        match MinioStorage::connect(&config.minio).await {
            Ok(storage) => Some(storage),
            Err(e) => {
                eprintln!("MinIO uploads disabled: {}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "minio"))]
    {
        eprintln!("MinIO uploads requested but the `minio` feature is not enabled");
        None
    }
}

/// Build the layer and its handle without installing anything, for
/// applications that assemble their own subscriber.
pub async fn build_layer(config: &QuickwitConfig) -> Result<(QuickwitLayer, QuickwitHandle), InitError> {
    let sink = sink_for(config)?;
    let storage = storage_for(config).await;
    Ok(QuickwitLayer::new(sink, storage, &LayerConfig::from(config))?)
}

/// Initialize the global `tracing` subscriber from a [`QuickwitConfig`].
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`QuickwitLayer`] (and a console
/// `fmt` layer) as the global default subscriber, so every `tracing` event
/// in the process is observed by the layer.
///
/// Must be called from within a Tokio runtime.
pub async fn init_tracing(config: &QuickwitConfig) -> Result<QuickwitHandle, InitError> {
    let sink = sink_for(config)?;
    let storage = storage_for(config).await;
    init_tracing_with(sink, storage, LayerConfig::from(config))
}

/// Initialize the global subscriber with an explicit sink and layer config.
pub fn init_tracing_with(
    sink: Arc<dyn LogSink>,
    storage: Option<MinioStorage>,
    config: LayerConfig,
) -> Result<QuickwitHandle, InitError> {
    let (layer, handle) = QuickwitLayer::new(sink, storage, &config)?;

    // Subscriber types differ per console mode, so each branch installs its
    // own.
    if !config.enable_stdout {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else if config.json_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .event_format(JsonFormatter::new(Some(config.app_name.clone())));
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_config_follows_quickwit_config() {
        let config = QuickwitConfig {
            app_name: "billing".into(),
            batch_size: 7,
            flush_interval_secs: 2,
            min_level: "WARNING".into(),
            ..QuickwitConfig::default()
        };
        let layer = LayerConfig::from(&config);
        assert_eq!(layer.app_name, "billing");
        assert_eq!(layer.batch_size, 7);
        assert_eq!(layer.flush_interval, Duration::from_secs(2));
        assert_eq!(layer.min_level, Level::WARN);
        assert_eq!(layer.logs_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn disabled_indexing_selects_noop_sink() {
        let config = QuickwitConfig {
            enable_quickwit_indexing: false,
            ..QuickwitConfig::default()
        };
        assert_eq!(sink_for(&config).unwrap().describe(), "disabled");
    }

    #[tokio::test]
    async fn disabled_uploads_skip_storage() {
        assert!(storage_for(&QuickwitConfig::default()).await.is_none());
    }
}
