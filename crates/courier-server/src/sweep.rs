use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use courier_db::Database;

/// Server-owned presence expiry.
///
/// Runs on an interval and flips every online user whose last liveness
/// event is older than the window. A client that crashes or loses network
/// before firing its offline beacon would otherwise stay online forever —
/// this loop is the authoritative fallback; the beacon is only an
/// optimization for faster detection.
pub async fn run_presence_sweep(db: Arc<Database>, window_secs: u64, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let store = db.clone();
        match tokio::task::spawn_blocking(move || store.sweep_stale_presence(window_secs)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => info!("Presence sweep: {} users timed out", count),
            Ok(Err(e)) => warn!("Presence sweep failed: {}", e),
            Err(e) => warn!("Presence sweep task failed: {}", e),
        }
    }
}
