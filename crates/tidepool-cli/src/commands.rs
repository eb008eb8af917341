//! Subcommand implementations

use std::time::Duration;

use anyhow::Context;
use tidepool_connection::ConnectionManager;

use crate::output;

pub async fn flush(manager: &ConnectionManager, json: bool) -> anyhow::Result<()> {
    let report = manager.flush().await.context("flush failed")?;
    println!("{}", output::flush_report(&report, json)?);
    Ok(())
}

pub async fn usage(manager: &ConnectionManager, json: bool) -> anyhow::Result<()> {
    let (limit, usage) = manager
        .server_usage()
        .await
        .context("failed to read server connection usage")?;
    println!("{}", output::server_usage(&limit, &usage, json)?);
    Ok(())
}

pub async fn query(manager: &ConnectionManager, sql: &str, json: bool) -> anyhow::Result<()> {
    let result = manager.query(sql, &[]).await.context("query failed")?;
    println!("{}", output::query_result(&result, json)?);
    Ok(())
}

/// Flush every `interval_secs` until Ctrl-C.
///
/// A failed flush is logged and the loop keeps going.
pub async fn watch(manager: &ConnectionManager, interval_secs: u64, json: bool) -> anyhow::Result<()> {
    anyhow::ensure!(interval_secs > 0, "--interval must be at least 1 second");

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(interval_secs, "watching; press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("interrupted, stopping watch");
                return Ok(());
            }
            _ = ticker.tick() => match manager.flush().await {
                Ok(report) => println!("{}", output::flush_report(&report, json)?),
                Err(err) => tracing::warn!(error = %err, "flush failed"),
            },
        }
    }
}
