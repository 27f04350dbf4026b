//! Periodic pruning of the delivery log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DispatcherConfig;
use crate::store::{StoreError, WebhookStore};

/// Drop delivery rows older than `retention` before `now`.
pub async fn prune_once(
    store: &dyn WebhookStore,
    retention: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    store.prune_deliveries(now - retention).await
}

/// Prune every `prune_interval` until `cancel` fires.
pub async fn run(store: Arc<dyn WebhookStore>, config: DispatcherConfig, cancel: CancellationToken) {
    info!(
        retention_days = config.log_retention.num_days(),
        "Delivery log retention started"
    );
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.prune_interval) => {}
        }
        match prune_once(store.as_ref(), config.log_retention, Utc::now()).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Pruned delivery log"),
            Err(e) => warn!("Delivery log prune failed: {e}"),
        }
    }
    info!("Delivery log retention stopped");
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::models::{BrokenTransition, DeliveryAttempt, EntityRef, TargetType};
    use crate::store::MemoryStore;

    fn row(at: DateTime<Utc>) -> DeliveryAttempt {
        DeliveryAttempt {
            id: Uuid::now_v7(),
            webhook_id: Uuid::nil(),
            event_id: Uuid::new_v4(),
            event_type: "vote".into(),
            target: EntityRef::new(TargetType::Bot, "1"),
            attempt: 1,
            status_code: Some(200),
            latency_ms: 3,
            error: None,
            detail: None,
            at,
        }
    }

    #[tokio::test]
    async fn prunes_only_rows_past_retention() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for age in [40, 31, 2] {
            store
                .record_attempt(&row(now - chrono::Duration::days(age)), BrokenTransition::Unchanged)
                .await
                .unwrap();
        }
        let removed = prune_once(&store, chrono::Duration::days(30), now).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let store: Arc<dyn WebhookStore> = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(store, DispatcherConfig::default(), cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
