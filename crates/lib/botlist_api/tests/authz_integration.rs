//! Authorization, teams and ownership transfer through the router.

mod common;

use axum::http::StatusCode;
use botlist_core::models::{EntityOwner, EntityRef, TargetType, TeamMember};
use botlist_core::store::{EntityStore, TeamStore};
use serde_json::json;
use tower::ServiceExt;

use common::{body_json, request, test_app};

#[tokio::test]
async fn missing_token_is_unauthenticated() {
    let t = test_app();
    let resp = t
        .app
        .oneshot(request("DELETE", "/bots/b", None, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(resp).await;
    assert_eq!(json["error"], true);
}

#[tokio::test]
async fn unknown_token_is_unauthenticated() {
    let t = test_app();
    let resp = t
        .app
        .oneshot(request("DELETE", "/bots/b", Some("nope"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn member_without_delete_flag_is_forbidden() {
    let t = test_app();
    t.store.add_user("u", "token-u");
    t.store.add_team("t1", "Team One");
    t.store.add_member(
        "t1",
        TeamMember::new("u", vec!["bot.add".into(), "bot.edit".into()]),
    );
    let bot = EntityRef::new(TargetType::Bot, "b");
    t.store.add_entity(&bot, EntityOwner::Team("t1".into()));

    let resp = t
        .app
        .clone()
        .oneshot(request("DELETE", "/bots/b", Some("token-u"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        t.store.entity_owner(&bot).await.unwrap(),
        Some(EntityOwner::Team("t1".into()))
    );

    let resp = t
        .app
        .oneshot(request(
            "GET",
            "/users/u/entity/bots/b/perms",
            Some("token-u"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["perms"], json!(["bot.add", "bot.edit"]));
}

#[tokio::test]
async fn transfer_between_teams_emits_audit() {
    let t = test_app();
    t.store.add_user("u", "token-u");
    t.store.add_team("t1", "Source");
    t.store.add_team("t2", "Destination");
    t.store
        .add_member("t1", TeamMember::new("u", vec!["bot.delete".into()]));
    t.store
        .add_member("t2", TeamMember::new("u", vec!["bot.add".into()]));
    let bot = EntityRef::new(TargetType::Bot, "b");
    t.store.add_entity(&bot, EntityOwner::Team("t1".into()));

    let resp = t
        .app
        .oneshot(request(
            "PATCH",
            "/bots/b/team",
            Some("token-u"),
            Some(json!({"team_id": "t2"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        t.store.entity_owner(&bot).await.unwrap(),
        Some(EntityOwner::Team("t2".into()))
    );

    let events = t.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Bot Transferred");
    assert_eq!(events[0].actor, "u");
}

#[tokio::test]
async fn add_member_cannot_grant_unheld_flags() {
    let t = test_app();
    t.store.add_user("owner", "token-owner");
    t.store.add_user("mgr", "token-mgr");
    t.store.add_user("new", "token-new");
    t.store.add_team("t1", "Team");
    t.store
        .add_member("t1", TeamMember::new("owner", vec!["global.*".into()]));
    t.store.add_member(
        "t1",
        TeamMember::new("mgr", vec!["team_member.add".into(), "bot.add".into()]),
    );

    let resp = t
        .app
        .clone()
        .oneshot(request(
            "PUT",
            "/teams/t1/members",
            Some("token-mgr"),
            Some(json!({"user_id": "new", "flags": ["bot.delete"]})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = t
        .app
        .oneshot(request(
            "PUT",
            "/teams/t1/members",
            Some("token-mgr"),
            Some(json!({"user_id": "new", "flags": ["bot.add"]})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let members = t.store.members("t1").await.unwrap();
    assert!(members.iter().any(|m| m.user_id == "new" && m.flags == ["bot.add"]));
}

#[tokio::test]
async fn last_owner_cannot_leave() {
    let t = test_app();
    t.store.add_user("owner", "token-owner");
    t.store.add_user("other", "token-other");
    t.store.add_team("t1", "Team");
    t.store
        .add_member("t1", TeamMember::new("owner", vec!["global.*".into()]));
    t.store
        .add_member("t1", TeamMember::new("other", vec!["bot.add".into()]));

    let resp = t
        .app
        .oneshot(request(
            "DELETE",
            "/teams/t1/members/owner",
            Some("token-owner"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(t.store.members("t1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn token_rotation_invalidates_old_token() {
    let t = test_app();
    t.store.add_user("u", "old-token");

    let resp = t
        .app
        .clone()
        .oneshot(request("PATCH", "/users/other/token", Some("old-token"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = t
        .app
        .clone()
        .oneshot(request("PATCH", "/users/u/token", Some("old-token"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let token = body_json(resp).await["token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(token.len(), 128);
    assert_eq!(t.store.token_of("u").as_deref(), Some(token.as_str()));

    let resp = t
        .app
        .oneshot(request("PATCH", "/users/u/token", Some("old-token"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_bot_settings_list_fields() {
    let t = test_app();
    t.store.add_user("u", "token-u");
    t.store.add_entity(
        &EntityRef::new(TargetType::Bot, "b"),
        EntityOwner::User("u".into()),
    );

    let resp = t
        .app
        .oneshot(request(
            "PATCH",
            "/bots/b/settings",
            Some("token-u"),
            Some(json!({"short": "too short", "invite": "discord.gg/x"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["fields"], json!(["short", "invite"]));
    assert!(t.store.bot_settings("b").is_none());
}
