//! Background loop that alerts users when they can vote again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{ReminderConfig, VoteConfig};
use crate::models::{EntityInfo, Reminder};
use crate::store::{ReminderStore, VoteStore};
use crate::votes::{self, VoteError};
use crate::webhooks::{AlertPayload, Dispatcher, Event};

pub struct ReminderLoop {
    reminders: Arc<dyn ReminderStore>,
    votes: Arc<dyn VoteStore>,
    dispatcher: Dispatcher,
    config: ReminderConfig,
    vote_config: VoteConfig,
    frontend_url: String,
}

impl ReminderLoop {
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        votes: Arc<dyn VoteStore>,
        dispatcher: Dispatcher,
        config: ReminderConfig,
        vote_config: VoteConfig,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            reminders,
            votes,
            dispatcher,
            config,
            vote_config,
            frontend_url: frontend_url.into(),
        }
    }

    /// One scan at `now`. Returns the number of alerts queued.
    ///
    /// A reminder is stamped only once its alert reached at least one push
    /// webhook, so users without one are retried on later scans.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize, VoteError> {
        let due = self
            .reminders
            .due_reminders(now - self.config.interval)
            .await?;
        let mut sent = 0;

        for reminder in due {
            let eligibility = match votes::eligibility(
                self.votes.as_ref(),
                &self.vote_config,
                &reminder.user_id,
                &reminder.target,
                now,
            )
            .await
            {
                Ok(e) => e,
                Err(VoteError::NotFound(_) | VoteError::InvalidTarget) => {
                    debug!(user_id = %reminder.user_id, target = %reminder.target, "Reminder target gone");
                    self.reminders
                        .ack(&reminder.user_id, &reminder.target, now)
                        .await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !eligibility.can_vote {
                continue;
            }

            let alert = Event::alert(&reminder.user_id, &self.alert(&reminder, &eligibility.info));
            if self.dispatcher.enqueue(alert).await? == 0 {
                debug!(user_id = %reminder.user_id, "No push webhook, reminder kept");
                continue;
            }
            self.reminders
                .ack(&reminder.user_id, &reminder.target, now)
                .await?;
            sent += 1;
        }

        Ok(sent)
    }

    fn alert(&self, reminder: &Reminder, info: &EntityInfo) -> AlertPayload {
        AlertPayload {
            title: "Vote reminder".to_string(),
            message: format!("You can vote for {} again!", info.name),
            url: EntityInfo::vote_url(&reminder.target, &self.frontend_url),
            icon: info.avatar.clone(),
        }
    }

    /// Scan every `tick` until `cancel` fires. A failed scan waits
    /// `error_backoff` before the next one.
    pub async fn run(self, cancel: CancellationToken) {
        info!(tick_secs = self.config.tick.as_secs(), "Vote reminder loop started");
        loop {
            let delay = match self.run_once(Utc::now()).await {
                Ok(sent) => {
                    if sent > 0 {
                        info!(sent, "Vote reminders sent");
                    }
                    self.config.tick
                }
                Err(e) => {
                    error!("Vote reminder scan failed: {e}");
                    self.config.error_backoff
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Vote reminder loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::config::DispatcherConfig;
    use crate::models::{EntityRef, EntityVote, TargetType, Webhook};
    use crate::store::{MemoryStore, WebhookStore};

    fn bot() -> EntityRef {
        EntityRef::new(TargetType::Bot, "2")
    }

    async fn setup(push_webhook: bool) -> (Arc<MemoryStore>, ReminderLoop) {
        let store = Arc::new(MemoryStore::new());
        store.add_user("u", "t");
        store.set_entity_info(
            &bot(),
            EntityInfo {
                name: "Helper".into(),
                avatar: "https://cdn.example/a.png".into(),
                premium: false,
                vote_banned: false,
            },
        );
        if push_webhook {
            let hook = Webhook {
                id: Uuid::now_v7(),
                target: EntityRef::new(TargetType::User, "u"),
                name: "push".into(),
                url: "http://127.0.0.1:9/push".into(),
                secret: "s".into(),
                broken: false,
                simple_auth: false,
                event_whitelist: vec![],
                created_at: Utc::now(),
            };
            store.upsert(&hook).await.unwrap();
        }
        let dispatcher = Dispatcher::new(store.clone(), DispatcherConfig::default()).unwrap();
        let reminders = ReminderLoop::new(
            store.clone(),
            store.clone(),
            dispatcher,
            ReminderConfig::default(),
            VoteConfig::default(),
            "https://botlist.example",
        );
        (store, reminders)
    }

    #[tokio::test]
    async fn alerts_once_per_interval() {
        let (store, reminders) = setup(true).await;
        let t = Utc::now();
        store.add_reminder(Reminder {
            user_id: "u".into(),
            target: bot(),
            last_acked: t - chrono::Duration::hours(5),
        });

        assert_eq!(reminders.run_once(t).await.unwrap(), 1);
        assert_eq!(store.reminders()[0].last_acked, t);
        assert_eq!(reminders.run_once(t + chrono::Duration::hours(1)).await.unwrap(), 0);

        for _ in 0..200 {
            if !store.deliveries().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let rows = store.deliveries();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "alert");
        assert_eq!(rows[0].target, EntityRef::new(TargetType::User, "u"));
    }

    #[tokio::test]
    async fn no_push_webhook_leaves_reminder_due() {
        let (store, reminders) = setup(false).await;
        let t = Utc::now();
        let acked = t - chrono::Duration::hours(5);
        store.add_reminder(Reminder {
            user_id: "u".into(),
            target: bot(),
            last_acked: acked,
        });
        assert_eq!(reminders.run_once(t).await.unwrap(), 0);
        assert_eq!(store.reminders()[0].last_acked, acked);
    }

    #[tokio::test]
    async fn not_yet_eligible_is_skipped() {
        let (store, reminders) = setup(true).await;
        let t = Utc::now();
        store.add_vote(EntityVote {
            id: Uuid::now_v7(),
            author: "u".into(),
            target: bot(),
            upvote: true,
            redeemed: false,
            created_at: t - chrono::Duration::hours(2),
        });
        store.add_reminder(Reminder {
            user_id: "u".into(),
            target: bot(),
            last_acked: t - chrono::Duration::hours(5),
        });
        assert_eq!(reminders.run_once(t).await.unwrap(), 0);
        assert!(store.deliveries().is_empty());
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let (_store, reminders) = setup(false).await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reminders.run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
