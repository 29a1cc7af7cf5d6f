use tracing::{info, warn};

use crate::message::today;
use crate::poller::Poller;
use crate::scheduler::Scheduler;

/// Every minute, on the minute.
pub const ROLLOVER_CRON: &str = "0 * * * * *";
/// Top of every hour.
pub const HEARTBEAT_CRON: &str = "0 0 * * * *";

/// Register the day-rollover watcher and the heartbeat
pub async fn register_builtin_tasks(scheduler: &Scheduler, poller: Poller) -> anyhow::Result<()> {
    // Day rollover: a new local day starts an empty list and a fresh offset
    let rollover_poller = poller.clone();
    scheduler
        .add_cron_job(ROLLOVER_CRON, "day-rollover", move || {
            let poller = rollover_poller.clone();
            Box::pin(async move {
                poller.check_rollover(today()).await;
            })
        })
        .await?;

    // Heartbeat: log that the dashboard is alive every hour
    scheduler
        .add_cron_job(HEARTBEAT_CRON, "heartbeat", move || {
            let poller = poller.clone();
            Box::pin(async move {
                let snapshot = poller.snapshot().await;
                if let Some(e) = snapshot.status.error() {
                    warn!("Heartbeat: last poll failed: {}", e);
                } else if snapshot.polling && !snapshot.status.is_connected() {
                    warn!("Heartbeat: polling but not yet connected");
                }
                info!(
                    "Heartbeat: {} ({} message(s) on {}, last_update_id={})",
                    snapshot.status,
                    snapshot.messages.len(),
                    snapshot.day,
                    snapshot.last_update_id
                );
            })
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollerSettings;
    use crate::telegram::HttpUpdateSource;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_register_builtin_tasks() {
        let scheduler = Scheduler::new().await.unwrap();
        let poller = Poller::new(
            Arc::new(HttpUpdateSource::direct("http://127.0.0.1:9")),
            "",
            "",
            PollerSettings {
                interval: Duration::from_secs(2),
                interactive_settings: false,
            },
            today(),
        );

        // Job creation rejects malformed cron expressions.
        register_builtin_tasks(&scheduler, poller).await.unwrap();
    }
}
