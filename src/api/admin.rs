//! Admin API endpoints
//!
//! Outbound follow management for local users.
//! All routes require the configured bearer token.

use axum::{
    Router,
    extract::{Path, Query, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::data::{RelationshipKind, RelationshipRecord, RelationshipStore, UserStore};
use crate::error::AppError;
use crate::federation::{Iri, LocalActor, model};

/// Create admin router
///
/// Routes:
/// - POST /api/users/:id/follow - Follow a remote actor
/// - POST /api/users/:id/unfollow - Withdraw a follow
/// - GET /api/users/:id/relationships - List followers and following
/// - GET /api/users/search?id=@user@host - Look up a remote actor
pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users/search", get(search))
        .route("/users/:id/follow", post(follow))
        .route("/users/:id/unfollow", post(unfollow))
        .route("/users/:id/relationships", get(relationships))
        .route_layer(middleware::from_fn_with_state(state, require_api_token))
}

fn extract_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Compare without short-circuiting on the first differing byte
fn token_matches(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Middleware to require the admin bearer token
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/users/:id/follow", ...)
///     .route_layer(middleware::from_fn_with_state(state, require_api_token));
/// ```
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;
    if !token_matches(token, &state.config.admin.api_token) {
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// Follow/unfollow request body
#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    /// Actor IRI or `@user@host` address
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct UnfollowResponse {
    pub target: String,
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct RelationshipsResponse {
    pub followers: Vec<RelationshipRecord>,
    pub following: Vec<RelationshipRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Actor IRI or `@user@host` address
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Actor document, `null` when nothing answers for the address
    pub user: Option<Value>,
}

async fn local_actor(state: &AppState, id: &str) -> Result<LocalActor, AppError> {
    let user = state.users.find_user(id).await?.ok_or(AppError::NotFound)?;
    Ok(state.local_actor(user))
}

/// Turn the request target into an actor IRI, via WebFinger for addresses
async fn resolve_target(
    state: &AppState,
    cancel: &CancellationToken,
    target: &str,
) -> Result<Iri, AppError> {
    let target = target.trim();
    if target.starts_with("https://") || target.starts_with("http://") {
        return Ok(Iri::from(target));
    }
    state.client.resolve_account(cancel, target).await
}

/// POST /api/users/:id/follow
///
/// Sends a Follow; the record stays pending until the remote side accepts.
async fn follow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FollowRequest>,
) -> Result<Json<RelationshipRecord>, AppError> {
    let local = local_actor(&state, &id).await?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let target = resolve_target(&state, &cancel, &request.target).await?;
    let record = state
        .relationship_service
        .follow(&cancel, &local, &target)
        .await?;
    Ok(Json(record))
}

/// POST /api/users/:id/unfollow
async fn unfollow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FollowRequest>,
) -> Result<Json<UnfollowResponse>, AppError> {
    let local = local_actor(&state, &id).await?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let target = resolve_target(&state, &cancel, &request.target).await?;
    let removed = state
        .relationship_service
        .unfollow(&cancel, &local, &target)
        .await?;
    Ok(Json(UnfollowResponse {
        target: target.into_string(),
        removed,
    }))
}

/// GET /api/users/:id/relationships
async fn relationships(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RelationshipsResponse>, AppError> {
    let local = local_actor(&state, &id).await?;
    let user_id = &local.user.id;

    Ok(Json(RelationshipsResponse {
        followers: state
            .relationships
            .list_relationships(user_id, RelationshipKind::Follower)
            .await?,
        following: state
            .relationships
            .list_relationships(user_id, RelationshipKind::Following)
            .await?,
    }))
}

/// GET /api/users/search?id=@user@host
///
/// Resolves the address and fetches the actor with the system actor's key.
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let resolved = async {
        let iri = resolve_target(&state, &cancel, &query.id).await?;
        state
            .client
            .resolve_actor(&cancel, state.client.system_signer(), iri.as_str())
            .await
    }
    .await;

    match resolved {
        Ok(actor) => Ok(Json(SearchResponse {
            user: Some(model::encode_actor(&actor)?),
        })),
        Err(AppError::UnreachableActor(reason)) => {
            tracing::debug!(query = %query.id, %reason, "Search found no actor");
            Ok(Json(SearchResponse { user: None }))
        }
        Err(e) => Err(e),
    }
}
