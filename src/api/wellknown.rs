//! Well-known endpoints
//!
//! - /.well-known/webfinger
//! - /.well-known/host-meta

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::data::{LocalUser, UserStore};
use crate::error::AppError;
use crate::federation::generate_webfinger_response;

/// Create well-known router
///
/// Routes:
/// - GET /.well-known/webfinger
/// - GET /.well-known/host-meta
pub fn wellknown_router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/webfinger", get(webfinger))
        .route("/.well-known/host-meta", get(host_meta))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: String,
}

/// Find the local user a WebFinger resource names
///
/// Accepts `acct:user@domain` and the user's actor IRI.
async fn lookup_resource(state: &AppState, resource: &str) -> Result<LocalUser, AppError> {
    if let Some(acct) = resource.strip_prefix("acct:") {
        let (username, domain) = acct
            .split_once('@')
            .ok_or_else(|| AppError::Validation("Invalid acct format".to_string()))?;

        // Verify domain matches local domain
        if !domain.eq_ignore_ascii_case(&state.config.server.domain) {
            return Err(AppError::NotFound);
        }

        return state
            .users
            .find_user_by_username(username)
            .await?
            .ok_or(AppError::NotFound);
    }

    let prefix = format!("{}/users/", state.base_url());
    match resource.strip_prefix(&prefix) {
        Some(id) if !id.contains('/') => state.users.find_user(id).await?.ok_or(AppError::NotFound),
        Some(_) => Err(AppError::NotFound),
        None => Err(AppError::Validation(
            "Resource must be an acct: URI or a local actor".to_string(),
        )),
    }
}

/// GET /.well-known/webfinger
///
/// Responds to WebFinger queries for local accounts.
///
/// Query: ?resource=acct:user@domain
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
) -> Result<Response, AppError> {
    let user = lookup_resource(&state, &query.resource).await?;
    let local = state.local_actor(user);

    let jrd = generate_webfinger_response(
        &local.user.preferred_username,
        &state.config.server.domain,
        &local.id,
        &local.profile_url(),
    );

    Ok((
        [(header::CONTENT_TYPE, "application/jrd+json")],
        axum::Json(jrd),
    )
        .into_response())
}

/// GET /.well-known/host-meta
///
/// Returns host-meta XML for WebFinger discovery.
async fn host_meta(State(state): State<AppState>) -> impl IntoResponse {
    let base_url = state.config.server.base_url();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<XRD xmlns="http://docs.oasis-open.org/ns/xri/xrd-1.0">
  <Link rel="lrdd" template="{}/.well-known/webfinger?resource={{uri}}"/>
</XRD>"#,
        base_url
    );

    ([(header::CONTENT_TYPE, "application/xrd+xml")], xml)
}
