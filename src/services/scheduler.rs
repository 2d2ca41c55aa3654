use std::time::Duration;

use tokio::time::sleep;

use crate::services::leasing;
use crate::state::AppState;

/// Background loop for periodic jobs. Each run is its own `tokio::spawn` so
/// a failing job never takes the loop down.
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");

    let pool = match state.db_pool.as_ref() {
        Some(p) => p.clone(),
        None => {
            tracing::warn!("Scheduler: no database pool configured, exiting");
            return;
        }
    };

    let sweep_interval =
        Duration::from_secs(state.config.lease_expiry_sweep_interval_seconds.max(60));

    loop {
        sleep(sweep_interval).await;

        let pool = pool.clone();
        tokio::spawn(async move {
            match leasing::expire_overdue_leases(&pool).await {
                Ok(expired) if expired > 0 => {
                    tracing::info!(expired, "Scheduler: expired overdue leases");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Scheduler: lease expiry sweep failed");
                }
            }
        });
    }
}
