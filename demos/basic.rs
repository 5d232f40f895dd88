use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::json;
use tracing::{error, info, info_span, warn, Level};

use quickwit_log::config::QuickwitConfig;
use quickwit_log::init::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // QUICKWIT_LOG_* variables override the defaults.
    let config = QuickwitConfig::from_env()?;
    let handle = init_tracing(&config).await?;

    let n: u64 = 1_000;
    let start = Instant::now();

    for i in 0..n {
        let _span = info_span!("checkout").entered();
        info!(order_id = i, amount = 12.5, "order placed");
    }
    warn!(retries = 3, "payment provider slow");

    let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db down");
    error!(send_to_quickwit = true, error = &err as &dyn std::error::Error, "database connection failed");

    let elapsed = start.elapsed();
    println!(
        "sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let mut fields = BTreeMap::new();
    fields.insert("user_id".to_string(), json!("u-42"));
    let delivered = handle.log_now(Level::INFO, "user signed in", fields).await;
    println!("log_now delivered: {}", delivered);

    handle.flush().await;
    println!("{}", serde_json::to_string_pretty(&handle.stats().await)?);

    let urls = handle.sync_logs_to_storage().await;
    println!("uploaded {} file(s)", urls.len());

    handle.close().await;
    Ok(())
}
