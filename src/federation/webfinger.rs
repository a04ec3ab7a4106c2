//! WebFinger protocol implementation
//!
//! Serves JRD documents for local accounts and reads the `self` link out of
//! remote ones so `@user@host` addresses can be followed.

use serde::{Deserialize, Serialize};

use super::model::{ACTIVITY_JSON, Iri, LD_JSON};
use crate::error::{AppError, Result};

/// WebFinger JRD response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerResponse {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Generate the JRD for a local account
///
/// # Arguments
/// * `username` - Local username, used in the subject
/// * `domain` - Instance domain
/// * `actor_id` - Actor IRI the `self` link points at
/// * `profile_url` - HTML profile page
pub fn generate_webfinger_response(
    username: &str,
    domain: &str,
    actor_id: &Iri,
    profile_url: &str,
) -> WebFingerResponse {
    WebFingerResponse {
        subject: format!("acct:{}@{}", username, domain),
        aliases: Some(vec![actor_id.to_string(), profile_url.to_string()]),
        links: vec![
            WebFingerLink {
                rel: "self".to_string(),
                link_type: Some(ACTIVITY_JSON.to_string()),
                href: Some(actor_id.to_string()),
                template: None,
            },
            WebFingerLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                link_type: Some("text/html".to_string()),
                href: Some(profile_url.to_string()),
                template: None,
            },
        ],
    }
}

/// Split an account address into (user, host)
///
/// Accepts `@user@host`, `user@host` and `acct:user@host`.
pub fn parse_account(account: &str) -> Result<(&str, &str)> {
    let trimmed = account.trim();
    let address = trimmed
        .strip_prefix("acct:")
        .unwrap_or(trimmed)
        .trim_start_matches('@');

    match address.split_once('@') {
        Some((user, host))
            if !user.is_empty() && !host.is_empty() && !host.contains(['@', '/']) =>
        {
            Ok((user, host))
        }
        _ => Err(AppError::Validation(format!(
            "invalid account address: {account}"
        ))),
    }
}

/// The ActivityPub actor IRI advertised by a JRD
pub fn actor_link(response: &WebFingerResponse) -> Option<Iri> {
    response
        .links
        .iter()
        .filter(|link| link.rel == "self")
        .find(|link| {
            link.link_type.as_deref().is_some_and(|kind| {
                kind == ACTIVITY_JSON || kind.starts_with(LD_JSON)
            })
        })
        .and_then(|link| link.href.clone())
        .map(Iri::from)
}
