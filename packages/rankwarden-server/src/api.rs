//! REST API endpoints.
//!
//! Thin adapters from HTTP to the engine. Errors become JSON bodies with a
//! status chosen by [`ApiError`].

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use rankwarden_core::{Error, InviteEvent, Rank};

use crate::commands;
use crate::protocol::{
    CommandRequest, CountsResponse, ErrorResponse, LeaderboardItem, LeaderboardQuery,
    RanksResponse, ReconcileQuery, RemoveRankQuery, SetRankRequest,
};
use crate::state::ServerState;

/// Error wrapper that knows its HTTP status.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_recoverable() => StatusCode::SERVICE_UNAVAILABLE,
            Error::CommandNotFound(_) => StatusCode::NOT_FOUND,
            e if e.requires_user_action() => StatusCode::BAD_REQUEST,
            Error::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match status {
            StatusCode::SERVICE_UNAVAILABLE => tracing::warn!("{}", self.0),
            StatusCode::INTERNAL_SERVER_ERROR => tracing::error!("{}", self.0),
            _ => tracing::debug!("{}", self.0),
        }
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the application router.
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/events", post(ingest_event))
        .route("/commands", post(run_command))
        .route("/communities/:community_id/invites/:user_id", get(get_counts))
        .route("/communities/:community_id/leaderboard", get(get_leaderboard))
        .route(
            "/communities/:community_id/members/:user_id/reconcile",
            post(reconcile_member),
        )
        .route(
            "/communities/:community_id/ranks",
            get(list_ranks).put(set_rank).delete(remove_rank),
        )
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Append a platform event to the invite log.
///
/// POST /events
/// Body: { "type": "invite_used", "community_id": "...", ... }
async fn ingest_event(
    State(state): State<ServerState>,
    Json(event): Json<InviteEvent>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.engine.ingest(event).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

// ── Counts ────────────────────────────────────────────────────────────────────

/// GET /communities/:community_id/invites/:user_id
async fn get_counts(
    State(state): State<ServerState>,
    Path((community_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<CountsResponse>> {
    let counts = state
        .engine
        .get_invite_counts(&community_id, &user_id)
        .await?;
    Ok(Json(CountsResponse::new(&community_id, &user_id, counts)))
}

/// GET /communities/:community_id/leaderboard?limit=10
async fn get_leaderboard(
    State(state): State<ServerState>,
    Path(community_id): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(state.config.leaderboard_size);
    let entries = state.engine.top_inviters(&community_id, limit).await?;
    let items: Vec<LeaderboardItem> = entries.into_iter().map(LeaderboardItem::from).collect();
    Ok(Json(json!({ "community_id": community_id, "entries": items })))
}

// ── Reconciliation ────────────────────────────────────────────────────────────

/// Compute and apply a member's rank roles.
///
/// POST /communities/:community_id/members/:user_id/reconcile?dry_run=true
async fn reconcile_member(
    State(state): State<ServerState>,
    Path((community_id, user_id)): Path<(String, String)>,
    Query(query): Query<ReconcileQuery>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .engine
        .reconcile_member(&community_id, &user_id, !query.dry_run)
        .await?;
    Ok(Json(result))
}

// ── Ranks ─────────────────────────────────────────────────────────────────────

/// GET /communities/:community_id/ranks
async fn list_ranks(
    State(state): State<ServerState>,
    Path(community_id): Path<String>,
) -> ApiResult<Json<RanksResponse>> {
    let ranks = state.engine.list_ranks(&community_id).await?;
    Ok(Json(RanksResponse {
        community_id,
        ranks,
    }))
}

/// PUT /communities/:community_id/ranks
/// Body: { "num_invites": 10, "role_id": "...", "name": "Bronze" }
async fn set_rank(
    State(state): State<ServerState>,
    Path(community_id): Path<String>,
    Json(request): Json<SetRankRequest>,
) -> ApiResult<Json<Rank>> {
    let name = request.name.unwrap_or_else(|| request.role_id.clone());
    let rank = Rank::new(request.num_invites, request.role_id, name)?;
    Ok(Json(state.engine.set_rank(&community_id, rank).await?))
}

/// DELETE /communities/:community_id/ranks?num_invites=10
async fn remove_rank(
    State(state): State<ServerState>,
    Path(community_id): Path<String>,
    Query(query): Query<RemoveRankQuery>,
) -> ApiResult<Response> {
    if state
        .engine
        .remove_rank(&community_id, query.num_invites)
        .await?
    {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No rank at that threshold" })),
        )
            .into_response())
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Execute a chat command line and return the rendered reply.
///
/// POST /commands
/// Body: { "community_id": "...", "invoker_id": "...", "line": "!invites" }
async fn run_command(
    State(state): State<ServerState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<impl IntoResponse> {
    let reply = commands::execute(&state, &request).await?;
    Ok(Json(reply))
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "rankwarden-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Server info endpoint.
async fn info_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let engine = state.engine.config();
    Json(json!({
        "service": "rankwarden-server",
        "version": env!("CARGO_PKG_VERSION"),
        "core": rankwarden_core::build_info(),
        "commands": state.registry.commands(),
        "dangerous_permissions": engine.dangerous_permissions.names(),
        "rank_cache_ttl_secs": engine.rank_cache_ttl.as_secs(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rankwarden_core::platform::InMemoryMembership;
    use rankwarden_core::storage::Database;
    use rankwarden_core::{Engine, MemberSnapshot};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::i18n::Translator;
    use crate::state::ServerConfig;

    fn app() -> (Router, Arc<InMemoryMembership>) {
        let config = ServerConfig::default();
        let platform = Arc::new(InMemoryMembership::new());
        let engine = Engine::new(
            Arc::new(Database::open(None).unwrap()),
            platform.clone(),
            config.engine_config().unwrap(),
        );
        let state = ServerState::new(engine, Translator::english(), config).unwrap();
        (router(state), platform)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(v) => request.body(Body::from(v.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "rankwarden-server");
    }

    #[tokio::test]
    async fn test_event_ingestion_and_counts() {
        let (app, _) = app();
        for member in ["m1", "m2"] {
            let (status, body) = call(
                &app,
                "POST",
                "/events",
                Some(json!({
                    "type": "invite_used",
                    "community_id": "guild",
                    "inviter_id": "alice",
                    "member_id": member,
                    "source": "regular",
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["outcome"], "credited");
        }
        call(
            &app,
            "POST",
            "/events",
            Some(json!({ "type": "member_left", "community_id": "guild", "member_id": "m1" })),
        )
        .await;

        let (status, body) = call(&app, "GET", "/communities/guild/invites/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["regular"], 2);
        assert_eq!(body["leave"], 1);
        assert_eq!(body["total"], 1);

        let (_, body) = call(&app, "GET", "/communities/guild/leaderboard", None).await;
        assert_eq!(body["entries"][0]["user_id"], "alice");
        assert_eq!(body["entries"][0]["total"], 1);
    }

    #[tokio::test]
    async fn test_invalid_event_is_bad_request() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "POST",
            "/events",
            Some(json!({ "type": "member_left", "community_id": "", "member_id": "m1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn test_rank_crud() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "PUT",
            "/communities/guild/ranks",
            Some(json!({ "num_invites": 10, "role_id": "r10", "name": "Bronze" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Bronze");

        let (status, _) = call(
            &app,
            "PUT",
            "/communities/guild/ranks",
            Some(json!({ "num_invites": -1, "role_id": "r" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(&app, "GET", "/communities/guild/ranks", None).await;
        assert_eq!(body["ranks"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", "/communities/guild/ranks?num_invites=10", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "DELETE", "/communities/guild/ranks?num_invites=10", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reconcile_endpoint() {
        let (app, platform) = app();
        platform.upsert_member("guild", MemberSnapshot::new("alice", Vec::<String>::new()));
        call(
            &app,
            "PUT",
            "/communities/guild/ranks",
            Some(json!({ "num_invites": 0, "role_id": "r0" })),
        )
        .await;

        let (status, body) = call(
            &app,
            "POST",
            "/communities/guild/members/alice/reconcile?dry_run=true",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "planned");
        assert_eq!(body["plan"]["should_have"][0]["role_id"], "r0");
        assert!(body["applied"].is_null());
        assert!(!platform.member("guild", "alice").unwrap().has_role("r0"));

        let (_, body) = call(&app, "POST", "/communities/guild/members/alice/reconcile", None).await;
        assert_eq!(body["applied"]["granted"][0], "r0");

        let (_, body) = call(&app, "POST", "/communities/guild/members/ghost/reconcile", None).await;
        assert_eq!(body["status"], "skipped");
        assert_eq!(body["reason"], "not_member");
    }

    #[tokio::test]
    async fn test_platform_outage_is_503() {
        let (app, platform) = app();
        platform.set_offline(true);
        let (status, body) = call(&app, "POST", "/communities/guild/members/alice/reconcile", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn test_command_endpoint() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "POST",
            "/commands",
            Some(json!({ "community_id": "guild", "invoker_id": "alice", "line": "!ranks" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["command"], "ranks");
        assert_eq!(body["reply"], "No ranks have been configured.");
    }
}
