//! Route path constants.

/// GET /healthz — database liveness
pub const GET_HEALTHZ: &str = "/healthz";

/// GET /users/{uid}/entity/{tt}/{tid}/perms — effective permissions of a user
pub const GET_ENTITY_PERMS: &str = "/users/{uid}/entity/{tt}/{tid}/perms";

/// PATCH /users/{uid}/token — regenerate the API token
pub const PATCH_USER_TOKEN: &str = "/users/{uid}/token";

/// GET, PUT /users/{uid}/{tt}/{tid}/votes — vote eligibility, cast a vote
pub const USER_VOTES: &str = "/users/{uid}/{tt}/{tid}/votes";

/// DELETE /bots/{id} — delete a bot
pub const BOT: &str = "/bots/{id}";

/// PATCH /bots/{id}/settings — replace bot settings
pub const BOT_SETTINGS: &str = "/bots/{id}/settings";

/// PATCH /bots/{id}/team — transfer a bot to a team
pub const BOT_TEAM: &str = "/bots/{id}/team";

/// DELETE /teams/{tid} — delete a team
pub const TEAM: &str = "/teams/{tid}";

/// PUT /teams/{tid}/members — add a team member
pub const PUT_TEAM_MEMBERS: &str = "/teams/{tid}/members";

/// PATCH, DELETE /teams/{tid}/members/{uid} — edit or remove a team member
pub const TEAM_MEMBER: &str = "/teams/{tid}/members/{uid}";

/// GET, PATCH, DELETE /webhooks/{tt}/{tid} — list, upsert, clear webhooks
pub const WEBHOOKS: &str = "/webhooks/{tt}/{tid}";

/// GET, DELETE /webhooks/{tt}/{tid}/{wid} — one webhook
pub const WEBHOOK: &str = "/webhooks/{tt}/{tid}/{wid}";

/// GET /webhooks/{tt}/{tid}/logs — delivery log, paged
pub const GET_WEBHOOK_LOGS: &str = "/webhooks/{tt}/{tid}/logs";

/// POST /webhooks/test — synchronous test delivery
pub const POST_WEBHOOK_TEST: &str = "/webhooks/test";

/// POST /votes/{tt}/{tid}/redeem — collapse votes into credits
pub const POST_VOTE_REDEEM: &str = "/votes/{tt}/{tid}/redeem";

/// GET /votes/{tt}/{tid}/logs — vote delivery summary
pub const GET_VOTE_LOGS: &str = "/votes/{tt}/{tid}/logs";
