//! ActivityPub endpoints
//!
//! - Actor profile
//! - Inbox (activity receiving)
//! - Followers/Following/Outbox/Liked collections
//! - System actor

use axum::body::Bytes;
use axum::{
    Router,
    extract::{OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::data::{LocalUser, RelationshipKind, RelationshipStatus, RelationshipStore, UserStore};
use crate::error::AppError;
use crate::federation::model::{self, OrderedCollection};
use crate::federation::{
    ACTIVITY_JSON, Activity, InboxOutcome, Iri, LD_JSON, ObjectOrLink, key_id_matches_actor,
};
use crate::metrics::FEDERATION_REQUESTS_TOTAL;

/// Create ActivityPub router
///
/// Routes:
/// - GET /users/:id - Actor profile
/// - POST /users/:id/inbox - Personal inbox
/// - POST /inbox - Shared inbox
/// - GET /users/:id/outbox - Outbox
/// - GET /users/:id/followers - Followers collection
/// - GET /users/:id/following - Following collection
/// - GET /users/:id/liked - Liked collection
/// - GET /actor - System actor
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/users/:id", get(actor))
        .route("/users/:id/inbox", post(inbox))
        .route("/inbox", post(shared_inbox))
        .route("/users/:id/outbox", get(outbox))
        .route("/users/:id/followers", get(followers))
        .route("/users/:id/following", get(following))
        .route("/users/:id/liked", get(liked))
        .route("/actor", get(system_actor))
}

/// Look up a local user by stable id
///
/// A username in place of the id answers with a redirect to the canonical
/// path (`suffix` is appended).
async fn find_local_user(state: &AppState, id: &str, suffix: &str) -> Result<LocalUser, AppError> {
    if let Some(user) = state.users.find_user(id).await? {
        return Ok(user);
    }

    match state.users.find_user_by_username(id).await? {
        Some(user) => Err(AppError::MovedPermanently(format!(
            "{}/users/{}{}",
            state.base_url(),
            user.id,
            suffix
        ))),
        None => Err(AppError::NotFound),
    }
}

/// Check the Accept header of a document GET
///
/// A missing header counts as `*/*`.
fn negotiate(headers: &HeaderMap) -> Result<(), AppError> {
    let Some(accept) = headers.get(header::ACCEPT) else {
        return Ok(());
    };
    let accept = accept.to_str().map_err(|_| AppError::NotAcceptable)?;

    let acceptable = accept.split(',').any(|item| {
        let media_type = item.split(';').next().unwrap_or_default().trim();
        media_type.eq_ignore_ascii_case(ACTIVITY_JSON)
            || media_type.eq_ignore_ascii_case(LD_JSON)
            || media_type.eq_ignore_ascii_case("application/json")
            || media_type == "application/*"
            || media_type == "*/*"
    });

    if acceptable {
        Ok(())
    } else {
        Err(AppError::NotAcceptable)
    }
}

/// Inbox bodies must be activity+json, or ld+json with the ActivityStreams profile
fn require_activity_json(headers: &HeaderMap) -> Result<(), AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::UnsupportedMediaType)?;
    let media_type = content_type.split(';').next().unwrap_or_default().trim();

    if media_type.eq_ignore_ascii_case(ACTIVITY_JSON) || media_type.eq_ignore_ascii_case(LD_JSON) {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType)
    }
}

/// Serve a top-level document as `application/activity+json`
fn activity_json(document: serde_json::Value) -> Response {
    ([(header::CONTENT_TYPE, ACTIVITY_JSON)], axum::Json(document)).into_response()
}

/// GET /users/:id
///
/// Returns ActivityPub Actor document.
///
/// Content-Type: application/activity+json
async fn actor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    negotiate(&headers)?;
    let user = find_local_user(&state, &id, "").await?;
    Ok(activity_json(model::encode_actor(
        &state.local_actor(user).to_actor(),
    )?))
}

/// GET /actor
///
/// The instance actor that owns the key for signed fetches.
async fn system_actor(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    negotiate(&headers)?;
    Ok(activity_json(model::encode_actor(&crate::federation::system_actor(
        &state.base_url(),
        &state.config.server.domain,
        &state.keys,
    ))?))
}

/// POST /users/:id/inbox
///
/// Receives incoming ActivityPub activities.
///
/// # Steps
/// 1. Check the content type
/// 2. Verify HTTP Signature (digest first, then key fetch)
/// 3. Decode the activity and check its actor owns the key
/// 4. Dispatch to the relationship state machine
async fn inbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let user = find_local_user(&state, &id, "/inbox").await?;
    require_activity_json(&headers)?;

    // Client disconnect drops this future and cancels outbound calls
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let activity = verify_and_decode(&state, &cancel, request_path(&uri), &headers, &body).await?;
    deliver_to_user(&state, &cancel, user, &activity).await
}

/// POST /inbox
///
/// Shared inbox for all users on this instance. The addressed user is read
/// from the activity: the Follow target, or the local actor named by the
/// wrapped Follow.
async fn shared_inbox(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    require_activity_json(&headers)?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let activity = verify_and_decode(&state, &cancel, request_path(&uri), &headers, &body).await?;

    let user = match addressed_user_id(&state.base_url(), &activity) {
        Some(id) => state.users.find_user(&id).await?,
        None => None,
    };
    let Some(user) = user else {
        tracing::debug!(
            activity_type = %activity.kind,
            "Shared inbox activity addresses no local user"
        );
        return Ok(StatusCode::OK);
    };

    deliver_to_user(&state, &cancel, user, &activity).await
}

fn request_path(uri: &axum::http::Uri) -> &str {
    uri.path_and_query()
        .map(|path| path.as_str())
        .unwrap_or_else(|| uri.path())
}

async fn verify_and_decode(
    state: &AppState,
    cancel: &CancellationToken,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Activity, AppError> {
    let verified = state
        .client
        .verify_request(cancel, "POST", path, headers, body)
        .await
        .inspect_err(|error| {
            FEDERATION_REQUESTS_TOTAL
                .with_label_values(&["inbound", "unauthorized"])
                .inc();
            tracing::warn!(%error, path, "Inbound signature rejected");
        })?;

    let activity = model::decode(body)?;
    let actor = activity
        .actor_id()
        .ok_or_else(|| AppError::MalformedPayload("activity actor has no id".to_string()))?;
    // Compare the dereferenced key owner; keyIds may be `#main-key` or `/main-key`
    if !key_id_matches_actor(verified.owner.as_str(), actor) {
        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&["inbound", "unauthorized"])
            .inc();
        tracing::warn!(
            key_id = %verified.key_id,
            owner = %verified.owner,
            actor,
            "Signer is not the activity actor"
        );
        return Err(AppError::VerificationFailed(
            "signing key does not belong to the activity actor".to_string(),
        ));
    }

    Ok(activity)
}

async fn deliver_to_user(
    state: &AppState,
    cancel: &CancellationToken,
    user: LocalUser,
    activity: &Activity,
) -> Result<StatusCode, AppError> {
    let local = state.local_actor(user);
    let outcome = state
        .relationship_service
        .dispatch(cancel, &local, activity)
        .await?;

    let status = match outcome {
        InboxOutcome::Handled => "success",
        InboxOutcome::Ignored => "ignored",
    };
    FEDERATION_REQUESTS_TOTAL
        .with_label_values(&["inbound", status])
        .inc();
    Ok(StatusCode::OK)
}

/// First local user id among the IRIs an activity refers to
///
/// Looks at the object, the wrapped activity's actor and object, then the
/// audience.
fn addressed_user_id(base_url: &str, activity: &Activity) -> Option<String> {
    let prefix = format!("{}/users/", base_url.trim_end_matches('/'));
    let inner = activity.object_activity();

    let candidates = activity
        .object_id()
        .into_iter()
        .chain(inner.and_then(Activity::actor_id))
        .chain(inner.and_then(Activity::object_id))
        .chain(activity.to.iter().filter_map(ObjectOrLink::id));

    candidates
        .filter_map(|iri| iri.strip_prefix(&prefix))
        .filter_map(|rest| rest.split(['/', '#', '?']).next())
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

/// Collection query parameters
#[derive(Debug, Default, Deserialize)]
struct CollectionQuery {
    page: Option<String>,
}

impl CollectionQuery {
    fn wants_page(&self) -> bool {
        self.page.as_deref().is_some_and(|page| page == "true")
    }
}

fn collection(id: Iri, items: Vec<ObjectOrLink>, query: &CollectionQuery) -> OrderedCollection {
    if query.wants_page() {
        OrderedCollection::single_page(&id, items)
    } else {
        OrderedCollection::inline(id, items)
    }
}

async fn relationship_collection(
    state: &AppState,
    id: &str,
    kind: RelationshipKind,
    query: &CollectionQuery,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    negotiate(headers)?;
    let suffix = match kind {
        RelationshipKind::Follower => "followers",
        RelationshipKind::Following => "following",
    };
    let user = find_local_user(state, id, &format!("/{suffix}")).await?;
    let local = state.local_actor(user);

    let items = state
        .relationships
        .list_relationships(&local.user.id, kind)
        .await?
        .into_iter()
        .filter(|record| record.status == RelationshipStatus::Completed)
        .map(|record| ObjectOrLink::Iri(Iri::from(record.remote_actor_id)))
        .collect();

    Ok(activity_json(model::encode_collection(&collection(
        local.id.join(suffix),
        items,
        query,
    ))?))
}

/// GET /users/:id/followers
async fn followers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CollectionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    relationship_collection(&state, &id, RelationshipKind::Follower, &query, &headers).await
}

/// GET /users/:id/following
///
/// Only accepted follows are listed.
async fn following(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CollectionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    relationship_collection(&state, &id, RelationshipKind::Following, &query, &headers).await
}

async fn empty_collection(
    state: &AppState,
    id: &str,
    suffix: &str,
    query: &CollectionQuery,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    negotiate(headers)?;
    let user = find_local_user(state, id, &format!("/{suffix}")).await?;
    let local = state.local_actor(user);
    Ok(activity_json(model::encode_collection(&collection(
        local.id.join(suffix),
        Vec::new(),
        query,
    ))?))
}

/// GET /users/:id/outbox
///
/// Always empty: no posts are published.
async fn outbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CollectionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    empty_collection(&state, &id, "outbox", &query, &headers).await
}

/// GET /users/:id/liked
async fn liked(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CollectionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    empty_collection(&state, &id, "liked", &query, &headers).await
}
