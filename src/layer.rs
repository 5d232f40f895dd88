use crate::client::CommitMode;
use crate::daily_file::DailyFileWriter;
use crate::format::{capture_event, SEND_TO_QUICKWIT_FIELD};
use crate::init::LayerConfig;
use crate::record::{level_name, LogRecord};
use crate::sink::LogSink;
use crate::storage::MinioStorage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets whose events are never captured: this crate's own diagnostics and
/// the HTTP stack it flushes through. Capturing them would feed every flush
/// back into the next batch.
const IGNORED_TARGETS: &[&str] = &["quickwit_log", "reqwest", "hyper", "h2", "rustls"];

fn is_ignored_target(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|ignored| {
        target == *ignored
            || (target.starts_with(ignored) && target[ignored.len()..].starts_with("::"))
    })
}

enum Command {
    Record(LogRecord),
    /// Skip the batch and ship right away with a forced commit.
    Immediate(LogRecord),
    LogNow(LogRecord, oneshot::Sender<bool>),
    Flush(oneshot::Sender<()>),
    Stats(oneshot::Sender<WorkerState>),
    SyncStorage(oneshot::Sender<Vec<String>>),
    Close(oneshot::Sender<()>),
}

struct WorkerState {
    pending_records: usize,
    last_flush: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Counters {
    /// Events seen by the layer, before any filtering.
    total_events: AtomicU64,
    /// Successfully enqueued into the channel.
    enqueued_events: AtomicU64,
    /// Dropped because the channel was full or closed.
    dropped_events: AtomicU64,
    indexed_records: AtomicU64,
    failed_records: AtomicU64,
    file_errors: AtomicU64,
}

#[derive(thiserror::Error, Debug)]
pub enum LayerError {
    #[error("the Quickwit layer must be created inside a Tokio runtime")]
    NoRuntime,

    #[error("failed to prepare logs directory {}: {source}", .path.display())]
    LogsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s, appends
/// them to daily JSON files and ships them to a [`LogSink`] in batches.
///
/// The application thread only formats the record and `try_send`s it into a
/// bounded channel. A single background task owns the batch, writes the
/// files and performs all network I/O. Records arriving while the channel is
/// full are dropped and counted.
pub struct QuickwitLayer {
    sender: mpsc::Sender<Command>,
    counters: Arc<Counters>,
    min_level: Level,
    app_name: String,
}

impl QuickwitLayer {
    /// Create the layer and spawn its flush task.
    ///
    /// Minimal thresholds are enforced for the channel buffer, batch size and
    /// flush interval to avoid degenerate configurations.
    pub fn new(
        sink: Arc<dyn LogSink>,
        storage: Option<MinioStorage>,
        config: &LayerConfig,
    ) -> Result<(Self, QuickwitHandle), LayerError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LayerError::NoRuntime)?;

        let buffer = config.channel_buffer.max(16);
        let batch_size = config.batch_size.max(1);
        let flush_interval = config.flush_interval.max(Duration::from_millis(10));

        let files = match &config.logs_dir {
            Some(dir) => Some(
                DailyFileWriter::new(dir, &config.app_name).map_err(|source| LayerError::LogsDir {
                    path: dir.clone(),
                    source,
                })?,
            ),
            None => None,
        };

        let (tx, rx) = mpsc::channel::<Command>(buffer);
        let counters = Arc::new(Counters::default());

        let handle = QuickwitHandle {
            sender: tx.clone(),
            counters: Arc::clone(&counters),
            app_name: config.app_name.clone(),
            target: sink.describe(),
            logs_dir: config.logs_dir.clone(),
        };

        let worker = FlushWorker {
            sink,
            files,
            storage,
            app_name: config.app_name.clone(),
            logs_dir: config.logs_dir.clone(),
            batch: Vec::with_capacity(batch_size),
            batch_size,
            last_flush: None,
            counters: Arc::clone(&counters),
        };
        runtime.spawn(worker.run(rx, flush_interval));

        let layer = QuickwitLayer {
            sender: tx,
            counters,
            min_level: config.min_level,
            app_name: config.app_name.clone(),
        };
        Ok((layer, handle))
    }

    fn enqueue(&self, command: Command) {
        match self.sender.try_send(command) {
            Ok(()) => {
                self.counters.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                let dropped = self.counters.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                // Report the first drop and then every thousandth one.
                if dropped == 1 || dropped % 1000 == 0 {
                    eprintln!("quickwit log channel full or closed, {} records dropped so far", dropped);
                }
            }
        }
    }
}

impl<S> Layer<S> for QuickwitLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.counters.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if is_ignored_target(meta.target()) {
            return;
        }

        // Events below the threshold only pass when they ask for immediate
        // delivery.
        let below_threshold = *meta.level() > self.min_level;
        if below_threshold && meta.fields().field(SEND_TO_QUICKWIT_FIELD).is_none() {
            return;
        }

        let function = ctx.event_span(event).map(|span| span.name().to_string());
        let captured = capture_event(event, function, Some(&self.app_name));

        if captured.send_to_quickwit {
            self.enqueue(Command::Immediate(captured.record));
        } else if !below_threshold {
            self.enqueue(Command::Record(captured.record));
        }
    }
}

/// Snapshot of a layer's state.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerStats {
    pub app_name: String,
    /// Where batches go, e.g. `http://quickwit:7280/logs_shop`.
    pub target: String,
    pub logs_directory: Option<PathBuf>,
    /// Records waiting for the next flush.
    pub pending_records: usize,
    pub last_flush: Option<DateTime<Utc>>,
    pub total_events: u64,
    pub enqueued_events: u64,
    pub dropped_events: u64,
    pub indexed_records: u64,
    pub failed_records: u64,
    pub file_errors: u64,
    /// `false` once the layer has been closed.
    pub running: bool,
}

/// Control handle of a [`QuickwitLayer`]. Cheap to clone.
#[derive(Clone)]
pub struct QuickwitHandle {
    sender: mpsc::Sender<Command>,
    counters: Arc<Counters>,
    app_name: String,
    target: String,
    logs_dir: Option<PathBuf>,
}

impl QuickwitHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(make(tx)).await.ok()?;
        rx.await.ok()
    }

    /// Ship the pending batch now and wait for the attempt to finish.
    pub async fn flush(&self) {
        let _ = self.request(Command::Flush).await;
    }

    /// Write one record to the daily file and send it to Quickwit right away
    /// with a forced commit, bypassing the batch.
    ///
    /// **Returns**
    /// - `true` if the sink accepted the record.
    /// - `false` if delivery failed or the layer is closed.
    pub async fn log_now(&self, level: Level, message: impl Into<String>, fields: BTreeMap<String, serde_json::Value>) -> bool {
        let mut record = LogRecord::new(level_name(&level), "quickwit_log", message);
        record.function = Some("log_now".to_string());
        record.app_name = Some(self.app_name.clone());
        for (key, value) in fields {
            record.insert_field(key, value);
        }
        self.request(|reply| Command::LogNow(record, reply))
            .await
            .unwrap_or(false)
    }

    /// Upload the daily files to object storage.
    ///
    /// Returns the object URLs; empty when uploads are disabled or nothing
    /// could be uploaded.
    pub async fn sync_logs_to_storage(&self) -> Vec<String> {
        self.request(Command::SyncStorage).await.unwrap_or_default()
    }

    pub async fn stats(&self) -> HandlerStats {
        let state = self.request(Command::Stats).await;
        let running = state.is_some();
        let state = state.unwrap_or(WorkerState {
            pending_records: 0,
            last_flush: None,
        });
        let c = &self.counters;
        HandlerStats {
            app_name: self.app_name.clone(),
            target: self.target.clone(),
            logs_directory: self.logs_dir.clone(),
            pending_records: state.pending_records,
            last_flush: state.last_flush,
            total_events: c.total_events.load(Ordering::Relaxed),
            enqueued_events: c.enqueued_events.load(Ordering::Relaxed),
            dropped_events: c.dropped_events.load(Ordering::Relaxed),
            indexed_records: c.indexed_records.load(Ordering::Relaxed),
            failed_records: c.failed_records.load(Ordering::Relaxed),
            file_errors: c.file_errors.load(Ordering::Relaxed),
            running,
        }
    }

    /// Flush what is pending and stop the background task. Events emitted
    /// afterwards are counted as dropped. Calling it again is a no-op.
    pub async fn close(&self) {
        let _ = self.request(Command::Close).await;
    }
}

struct FlushWorker {
    sink: Arc<dyn LogSink>,
    files: Option<DailyFileWriter>,
    storage: Option<MinioStorage>,
    app_name: String,
    logs_dir: Option<PathBuf>,
    batch: Vec<LogRecord>,
    batch_size: usize,
    last_flush: Option<DateTime<Utc>>,
    counters: Arc<Counters>,
}

impl FlushWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, flush_interval: Duration) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Record(record)) => self.push(record).await,
                    Some(Command::Immediate(record)) => {
                        self.send_now(record).await;
                    }
                    Some(Command::LogNow(record, reply)) => {
                        let ok = self.send_now(record).await;
                        let _ = reply.send(ok);
                    }
                    Some(Command::Flush(reply)) => {
                        self.flush().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(WorkerState {
                            pending_records: self.batch.len(),
                            last_flush: self.last_flush,
                        });
                    }
                    Some(Command::SyncStorage(reply)) => self.sync_storage(reply),
                    Some(Command::Close(reply)) => {
                        self.flush().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                _ = ticker.tick() => self.flush().await,
            }
        }
    }

    fn write_file(&mut self, record: &LogRecord) {
        if let Some(files) = &mut self.files {
            if let Err(e) = files.write_record(record) {
                self.counters.file_errors.fetch_add(1, Ordering::Relaxed);
                eprintln!("error writing to log file {}: {}", files.current_path().display(), e);
            }
        }
    }

    async fn push(&mut self, record: LogRecord) {
        self.write_file(&record);
        self.batch.push(record);
        if self.batch.len() >= self.batch_size {
            self.flush().await;
        }
    }

    async fn send_now(&mut self, record: LogRecord) -> bool {
        self.write_file(&record);
        match self
            .sink
            .send_batch(std::slice::from_ref(&record), CommitMode::Force)
            .await
        {
            Ok(()) => {
                self.counters.indexed_records.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.counters.failed_records.fetch_add(1, Ordering::Relaxed);
                eprintln!("error sending log record to {}: {}", self.sink.describe(), e);
                false
            }
        }
    }

    /// Send the batch. On failure the batch is reported and dropped; the
    /// records stay in the daily files.
    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let count = self.batch.len() as u64;
        match self.sink.send_batch(&self.batch, CommitMode::Auto).await {
            Ok(()) => {
                self.counters.indexed_records.fetch_add(count, Ordering::Relaxed);
                self.last_flush = Some(Utc::now());
            }
            Err(e) => {
                self.counters.failed_records.fetch_add(count, Ordering::Relaxed);
                eprintln!("error flushing {} log records to {}: {}", count, self.sink.describe(), e);
            }
        }

        if let Err(e) = self.sink.flush().await {
            eprintln!("error flushing log sink {}: {}", self.sink.describe(), e);
        }

        self.batch.clear();
    }

    fn sync_storage(&self, reply: oneshot::Sender<Vec<String>>) {
        let (storage, dir) = match (&self.storage, &self.logs_dir) {
            (Some(storage), Some(dir)) => (storage.clone(), dir.clone()),
            _ => {
                let _ = reply.send(Vec::new());
                return;
            }
        };
        let app_name = self.app_name.clone();
        // Uploads can be slow; keep flushing meanwhile.
        tokio::spawn(async move {
            let urls = storage.sync_logs_directory(&app_name, &dir).await;
            let _ = reply.send(urls);
        });
    }
}
