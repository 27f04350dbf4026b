//! Domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! types in `botlist_api`.

pub mod bot;
pub mod entity;
pub mod team;
pub mod vote;
pub mod webhook;

pub use bot::BotSettings;
pub use entity::{EntityOwner, EntityRef, TargetType};
pub use team::TeamMember;
pub use vote::{EntityInfo, EntityVote, Reminder};
pub use webhook::{BrokenTransition, DeliveryAttempt, DeliveryError, OutcomeCount, Webhook};
