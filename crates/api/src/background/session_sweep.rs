//! Periodic removal of expired sessions.
//!
//! Runs on a fixed interval using `tokio::time::interval`. Sessions are
//! rejected by the store as soon as they expire; the sweep only reclaims
//! their directories.

use std::sync::Arc;
use std::time::Duration;

use annotator_core::session::SessionStore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn SessionStore>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_ms = interval.as_millis() as u64,
        "Session sweep started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                let removed = store.sweep_expired().await;
                if removed > 0 {
                    tracing::info!(removed, "Session sweep: removed expired sessions");
                } else {
                    tracing::debug!("Session sweep: nothing expired");
                }
            }
        }
    }
}
