// service/background_jobs.rs
use std::sync::Arc;
use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::{db::settlementdb::SettlementExt, AppState};

/// Background sweep that flips stale open offers to expired. Expiry is also
/// enforced lazily on every offer mutation, so this sweep only keeps listings
/// tidy for readers; correctness does not depend on it running.
pub async fn start_offer_expiry_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(app_state.env.offer_sweep_interval_secs));

    loop {
        interval.tick().await;

        tracing::info!("Running offer expiry sweep at {}", Utc::now());

        match app_state.db_client.expire_stale_offers().await {
            Ok(0) => tracing::debug!("Offer expiry sweep: nothing to expire"),
            Ok(count) => tracing::info!("Offer expiry sweep: {} offers expired", count),
            Err(e) => tracing::error!("Offer expiry sweep failed: {}", e),
        }
    }
}
