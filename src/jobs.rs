use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::errors::ApsisError;
use crate::events::bus::EventBus;
use crate::events::types::PolicyHotKeyEvent;
use crate::store;

/// Starts the background scheduler.
///
/// The policy hot-key publisher announces every known business id on the
/// hot-key topic each minute; consumers warm their local policy caches
/// from it.
pub async fn init_scheduler(
    db: DatabaseConnection,
    bus: Arc<dyn EventBus>,
    hotkey_topic: String,
) -> Result<JobScheduler, ApsisError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| ApsisError::Other(format!("Failed to create job scheduler: {e}")))?;

    let hotkey_job = Job::new_async("0 * * * * *", move |_uuid, _l| {
        let db = db.clone();
        let bus = bus.clone();
        let topic = hotkey_topic.clone();
        Box::pin(async move {
            info!("Running policy hot-key publication");
            match publish_hot_keys(&db, bus.as_ref(), &topic).await {
                Ok(count) => info!("Published {} hot business ids", count),
                Err(e) => error!("Failed to publish policy hot keys: {}", e),
            }
        })
    })
    .map_err(|e| ApsisError::Other(format!("Failed to create hot-key job: {e}")))?;

    sched
        .add(hotkey_job)
        .await
        .map_err(|e| ApsisError::Other(format!("Failed to add hot-key job: {e}")))?;

    sched
        .start()
        .await
        .map_err(|e| ApsisError::Other(format!("Failed to start job scheduler: {e}")))?;

    info!("Job scheduler started with {} jobs", 1);
    Ok(sched)
}

pub async fn publish_hot_keys(
    db: &DatabaseConnection,
    bus: &dyn EventBus,
    topic: &str,
) -> Result<usize, ApsisError> {
    let biz_ids = store::businesses::list_business_ids(db).await?;
    let count = biz_ids.len();
    let event = PolicyHotKeyEvent { biz_ids };
    bus.publish(topic, &serde_json::to_vec(&event)?).await?;
    Ok(count)
}
