//! Vote eligibility, vote creation and vote credit redemption.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::VoteConfig;
use crate::models::{EntityInfo, EntityRef, EntityVote, OutcomeCount, TargetType};
use crate::store::{StoreError, VoteStore, WebhookStore};
use crate::uuid::uuidv7;
use crate::webhooks::{DispatchError, Dispatcher, EVENT_VOTE, Event, VotePayload};

/// Vote errors.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Users cannot be voted for")]
    InvalidTarget,

    #[error("{0} cannot receive votes right now")]
    VoteBanned(String),

    #[error("You have already voted for this {target_type}, try again in {} minutes", .retry_after.num_minutes().max(1))]
    AlreadyVoted {
        target_type: TargetType,
        retry_after: chrono::Duration,
    },

    #[error("No vote credits to redeem")]
    NothingToRedeem,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Whether a user may vote for a target now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub can_vote: bool,
    pub last_vote: Option<DateTime<Utc>>,
    pub next_vote_at: Option<DateTime<Utc>>,
    pub window: chrono::Duration,
    pub info: EntityInfo,
}

/// A recorded vote and what happened after it.
#[derive(Debug, Clone)]
pub struct VoteCast {
    pub vote: EntityVote,
    /// Unredeemed vote total after this vote.
    pub votes: i64,
    /// Webhooks the vote event was queued for.
    pub webhooks: usize,
}

/// Premium bots use the shorter window.
pub fn window_for(config: &VoteConfig, info: &EntityInfo) -> chrono::Duration {
    if info.premium {
        config.premium_window
    } else {
        config.window
    }
}

async fn entity_info(store: &dyn VoteStore, target: &EntityRef) -> Result<EntityInfo, VoteError> {
    if target.target_type == TargetType::User {
        return Err(VoteError::InvalidTarget);
    }
    store
        .entity_info(target)
        .await?
        .ok_or_else(|| VoteError::NotFound(target.to_string()))
}

pub async fn eligibility(
    store: &dyn VoteStore,
    config: &VoteConfig,
    user_id: &str,
    target: &EntityRef,
    now: DateTime<Utc>,
) -> Result<Eligibility, VoteError> {
    let info = entity_info(store, target).await?;
    let window = window_for(config, &info);
    let last_vote = store.last_vote_at(user_id, target).await?;
    let next_vote_at = last_vote.map(|t| t + window);
    Ok(Eligibility {
        can_vote: next_vote_at.is_none_or(|next| next <= now),
        last_vote,
        next_vote_at,
        window,
        info,
    })
}

/// Record a vote by `user_id` and queue a `vote` event for the target's
/// webhooks. The eligibility check and insert are one atomic store call.
pub async fn create_vote(
    store: &dyn VoteStore,
    dispatcher: &Dispatcher,
    config: &VoteConfig,
    user_id: &str,
    target: &EntityRef,
    upvote: bool,
    now: DateTime<Utc>,
) -> Result<VoteCast, VoteError> {
    let info = entity_info(store, target).await?;
    if info.vote_banned {
        return Err(VoteError::VoteBanned(info.name));
    }

    let window = window_for(config, &info);
    let vote = EntityVote {
        id: uuidv7(),
        author: user_id.to_string(),
        target: target.clone(),
        upvote,
        redeemed: false,
        created_at: now,
    };
    if !store.insert_vote_since(&vote, now - window).await? {
        let last = store.last_vote_at(user_id, target).await?;
        let retry_after = last.map(|t| t + window - now).unwrap_or(window);
        return Err(VoteError::AlreadyVoted {
            target_type: target.target_type,
            retry_after,
        });
    }

    let votes = store.vote_count(target).await?;
    let event = Event::vote(
        target.clone(),
        &VotePayload {
            votes,
            voter_user_id: user_id.to_string(),
            test: false,
        },
    );
    // The vote is stored; a delivery problem must not undo it.
    let webhooks = match dispatcher.enqueue(event).await {
        Ok(n) => n,
        Err(e) => {
            warn!(%target, "Failed to queue vote event: {e}");
            0
        }
    };

    info!(%target, user_id, upvote, votes, "Vote recorded");
    Ok(VoteCast {
        vote,
        votes,
        webhooks,
    })
}

/// Collapse every unredeemed vote of `target` into one credit record.
pub async fn redeem(store: &dyn VoteStore, target: &EntityRef) -> Result<i64, VoteError> {
    entity_info(store, target).await?;
    let credits = store.redeem_votes(target).await?;
    if credits <= 0 {
        return Err(VoteError::NothingToRedeem);
    }
    info!(%target, credits, "Vote credits redeemed");
    Ok(credits)
}

/// Delivery outcomes of vote events sent for `target`.
pub async fn delivery_summary(
    store: &dyn WebhookStore,
    target: &EntityRef,
) -> Result<Vec<OutcomeCount>, VoteError> {
    Ok(store.delivery_summary(target, EVENT_VOTE).await?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::config::DispatcherConfig;
    use crate::models::Webhook;
    use crate::store::MemoryStore;

    fn bot() -> EntityRef {
        EntityRef::new(TargetType::Bot, "2")
    }

    fn info(premium: bool) -> EntityInfo {
        EntityInfo {
            name: "Bot".into(),
            avatar: String::new(),
            premium,
            vote_banned: false,
        }
    }

    fn setup(premium: bool) -> (Arc<MemoryStore>, Dispatcher) {
        let store = Arc::new(MemoryStore::new());
        store.add_user("1", "t");
        store.set_entity_info(&bot(), info(premium));
        let dispatcher = Dispatcher::new(store.clone(), DispatcherConfig::default()).unwrap();
        (store, dispatcher)
    }

    #[tokio::test]
    async fn second_vote_within_window_is_refused() {
        let (store, dispatcher) = setup(false);
        let config = VoteConfig::default();
        let now = Utc::now();

        let cast = create_vote(store.as_ref(), &dispatcher, &config, "1", &bot(), true, now)
            .await
            .unwrap();
        assert_eq!(cast.votes, 1);
        assert_eq!(cast.webhooks, 0);

        let later = now + chrono::Duration::hours(11);
        match create_vote(store.as_ref(), &dispatcher, &config, "1", &bot(), true, later).await {
            Err(VoteError::AlreadyVoted { retry_after, .. }) => {
                assert_eq!(retry_after, chrono::Duration::hours(1));
            }
            other => panic!("unexpected {other:?}"),
        }

        let eligible = eligibility(store.as_ref(), &config, "1", &bot(), later)
            .await
            .unwrap();
        assert!(!eligible.can_vote);
        assert_eq!(eligible.next_vote_at, Some(now + chrono::Duration::hours(12)));

        let cast = create_vote(
            store.as_ref(),
            &dispatcher,
            &config,
            "1",
            &bot(),
            true,
            now + chrono::Duration::hours(12),
        )
        .await
        .unwrap();
        assert_eq!(cast.votes, 2);
    }

    #[tokio::test]
    async fn premium_window_is_shorter() {
        let (store, dispatcher) = setup(true);
        let config = VoteConfig::default();
        let now = Utc::now();
        create_vote(store.as_ref(), &dispatcher, &config, "1", &bot(), true, now)
            .await
            .unwrap();
        let e = eligibility(store.as_ref(), &config, "1", &bot(), now + chrono::Duration::hours(4))
            .await
            .unwrap();
        assert!(e.can_vote);
        assert_eq!(e.window, chrono::Duration::hours(4));
    }

    #[tokio::test]
    async fn banned_missing_and_user_targets_are_refused() {
        let (store, dispatcher) = setup(false);
        let config = VoteConfig::default();
        let banned = EntityRef::new(TargetType::Server, "9");
        store.set_entity_info(
            &banned,
            EntityInfo {
                vote_banned: true,
                ..info(false)
            },
        );
        let now = Utc::now();
        assert!(matches!(
            create_vote(store.as_ref(), &dispatcher, &config, "1", &banned, true, now).await,
            Err(VoteError::VoteBanned(_))
        ));
        assert!(matches!(
            create_vote(store.as_ref(), &dispatcher, &config, "1", &EntityRef::new(TargetType::Pack, "x"), true, now).await,
            Err(VoteError::NotFound(_))
        ));
        assert!(matches!(
            create_vote(store.as_ref(), &dispatcher, &config, "1", &EntityRef::new(TargetType::User, "1"), true, now).await,
            Err(VoteError::InvalidTarget)
        ));
    }

    #[tokio::test]
    async fn vote_event_is_queued_for_target_webhooks() {
        let (store, dispatcher) = setup(false);
        store
            .upsert(&Webhook {
                id: Uuid::now_v7(),
                target: bot(),
                name: "main".into(),
                url: "http://127.0.0.1:9/hook".into(),
                secret: "s".into(),
                broken: false,
                simple_auth: false,
                event_whitelist: vec![],
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let cast = create_vote(store.as_ref(), &dispatcher, &VoteConfig::default(), "1", &bot(), true, Utc::now())
            .await
            .unwrap();
        assert_eq!(cast.webhooks, 1);

        for _ in 0..200 {
            if !store.deliveries().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let rows = store.deliveries();
        assert_eq!(rows[0].event_type, "vote");
        // Loopback is refused outside of tests that opt in.
        assert_eq!(rows[0].outcome(), "blocked");

        let summary = delivery_summary(store.as_ref(), &bot()).await.unwrap();
        assert_eq!(summary, [OutcomeCount { outcome: "blocked".into(), count: 1 }]);
    }

    #[tokio::test]
    async fn redeem_collapses_votes_once() {
        let (store, dispatcher) = setup(false);
        let config = VoteConfig::default();
        store.add_user("3", "t3");
        let now = Utc::now();
        for user in ["1", "3"] {
            create_vote(store.as_ref(), &dispatcher, &config, user, &bot(), true, now)
                .await
                .unwrap();
        }
        assert_eq!(redeem(store.as_ref(), &bot()).await.unwrap(), 2);
        assert!(matches!(
            redeem(store.as_ref(), &bot()).await,
            Err(VoteError::NothingToRedeem)
        ));
        assert_eq!(store.redeemed(&bot()), [2]);
        // Redeemed votes still count for the vote window.
        let e = eligibility(store.as_ref(), &config, "1", &bot(), now).await.unwrap();
        assert!(!e.can_vote);
    }
}
