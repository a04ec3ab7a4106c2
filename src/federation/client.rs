//! Authenticated outbound federation calls
//!
//! Every request is signed, carries the ActivityPub content type, and is
//! bounded by both the configured timeout and the caller's cancellation
//! token.

use std::future::Future;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use http::header::{ACCEPT, CONTENT_TYPE, DATE};
use tokio_util::sync::CancellationToken;

use super::model::{self, ACTIVITY_JSON, Activity, Actor, Iri, PublicKey};
use super::signature::{self, Signer};
use super::webfinger::{self, WebFingerResponse};
use crate::error::{AppError, Result};
use crate::metrics::{
    ACTIVITIES_SENT, FEDERATION_REQUEST_DURATION_SECONDS, FEDERATION_REQUESTS_TOTAL,
};

/// Tunables for outbound calls
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_agent: String,
    pub timeout: Duration,
    /// Accepted Date skew when verifying inbound signatures
    pub signature_max_skew: Option<Duration>,
    /// Permit loopback and private destinations
    pub allow_private_addresses: bool,
}

impl ClientSettings {
    pub fn from_config(config: &crate::config::FederationConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.request_timeout(),
            signature_max_skew: config.signature_max_skew(),
            allow_private_addresses: config.allow_private_addresses,
        }
    }
}

/// Outcome of a verified inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRequest {
    pub key_id: String,
    /// Actor that owns the signing key
    pub owner: Iri,
}

/// Signed HTTP client for talking to remote servers
///
/// `system_signer` signs the GETs made on the instance's own behalf, such as
/// key lookups during inbound verification.
#[derive(Debug, Clone)]
pub struct FederationClient {
    http: reqwest::Client,
    system_signer: Signer,
    settings: ClientSettings,
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .trim_matches(['[', ']'])
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

fn parse_remote_url(raw: &str) -> std::result::Result<url::Url, String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("invalid URL {raw}: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!("unsupported URL scheme {scheme}")),
    }
}

impl FederationClient {
    pub fn new(system_signer: Signer, settings: ClientSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            http,
            system_signer,
            settings,
        })
    }

    pub fn system_signer(&self) -> &Signer {
        &self.system_signer
    }

    /// Run `fut` under the timeout and the cancellation token
    async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T>>,
        on_timeout: impl FnOnce() -> AppError,
    ) -> Result<T> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = tokio::time::timeout(self.settings.timeout, fut) => {
                result.unwrap_or_else(|_| Err(on_timeout()))
            }
        }
    }

    /// Reject destinations on local or private networks
    async fn check_destination(&self, url: &url::Url) -> std::result::Result<(), String> {
        if self.settings.allow_private_addresses {
            return Ok(());
        }

        let host = url.host_str().ok_or("missing host")?;
        if is_disallowed_host(host) {
            return Err(format!("refusing to contact local address {host}"));
        }

        let port = url.port_or_known_default().ok_or("missing port")?;
        let mut resolved_any = false;
        let lookup = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| format!("failed to resolve {host}: {e}"))?;
        for addr in lookup {
            resolved_any = true;
            if is_disallowed_ip(addr.ip()) {
                return Err(format!("{host} resolves to a local address"));
            }
        }

        if !resolved_any {
            return Err(format!("no DNS records for {host}"));
        }
        Ok(())
    }

    async fn signed_get(
        &self,
        signer: &Signer,
        url: &url::Url,
    ) -> std::result::Result<reqwest::Response, String> {
        self.check_destination(url).await?;
        let signed = signer
            .sign_request("GET", url, None)
            .map_err(|e| e.to_string())?;

        self.http
            .get(url.clone())
            .header(ACCEPT, ACTIVITY_JSON)
            .header(CONTENT_TYPE, ACTIVITY_JSON)
            .header(DATE, signed.date)
            .header("Signature", signed.signature)
            .send()
            .await
            .map_err(|e| e.to_string())
    }

    /// Fetch a remote actor document
    ///
    /// The IRI's fragment is dropped before fetching, so a key id resolves
    /// to its owner's document.
    ///
    /// # Errors
    /// `UnreachableActor` on transport failure, timeout, non-2xx status, or
    /// a body that is not an actor. `Cancelled` if `cancel` fires first.
    pub async fn resolve_actor(
        &self,
        cancel: &CancellationToken,
        signer: &Signer,
        iri: &str,
    ) -> Result<Actor> {
        let document = iri.split('#').next().unwrap_or(iri);
        let url = parse_remote_url(document).map_err(AppError::UnreachableActor)?;
        let started = Instant::now();

        let result = self
            .bounded(
                cancel,
                async {
                    let response = self
                        .signed_get(signer, &url)
                        .await
                        .map_err(|e| AppError::UnreachableActor(format!("{document}: {e}")))?;

                    let status = response.status();
                    if !status.is_success() {
                        return Err(AppError::UnreachableActor(format!(
                            "{document}: HTTP {status}"
                        )));
                    }

                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| AppError::UnreachableActor(format!("{document}: {e}")))?;
                    serde_json::from_slice::<Actor>(&body).map_err(|e| {
                        AppError::UnreachableActor(format!("{document}: not an actor: {e}"))
                    })
                },
                || AppError::UnreachableActor(format!("{document}: timed out")),
            )
            .await;

        record_request("fetch", started, &result);
        result
    }

    /// POST an activity to a remote inbox
    ///
    /// 200, 201 and 202 count as success. There is no retry.
    ///
    /// # Errors
    /// `DeliveryFailed` with the response status, or without one when the
    /// request never completed. `Cancelled` if `cancel` fires first.
    pub async fn deliver(
        &self,
        cancel: &CancellationToken,
        signer: &Signer,
        inbox: &Iri,
        activity: &Activity,
    ) -> Result<()> {
        let failed = |status: Option<u16>| AppError::DeliveryFailed {
            inbox: inbox.to_string(),
            status,
        };

        let body = model::encode(activity)?;
        let url = parse_remote_url(inbox.as_str()).map_err(|reason| {
            tracing::warn!(inbox = %inbox, %reason, "Refusing delivery");
            failed(None)
        })?;
        let started = Instant::now();

        let result = self
            .bounded(
                cancel,
                async {
                    if let Err(reason) = self.check_destination(&url).await {
                        tracing::warn!(inbox = %inbox, %reason, "Refusing delivery");
                        return Err(failed(None));
                    }

                    let signed = signer.sign_request("POST", &url, Some(&body))?;
                    let mut request = self
                        .http
                        .post(url.clone())
                        .header(CONTENT_TYPE, ACTIVITY_JSON)
                        .header(ACCEPT, ACTIVITY_JSON)
                        .header(DATE, signed.date)
                        .header("Signature", signed.signature);
                    if let Some(digest) = signed.digest {
                        request = request.header("Digest", digest);
                    }

                    let response = request.body(body.clone()).send().await.map_err(|e| {
                        tracing::warn!(inbox = %inbox, error = %e, "Delivery request failed");
                        failed(None)
                    })?;

                    match response.status().as_u16() {
                        200..=202 => Ok(()),
                        code => Err(failed(Some(code))),
                    }
                },
                || failed(None),
            )
            .await;

        record_request("deliver", started, &result);
        match &result {
            Ok(()) => {
                ACTIVITIES_SENT
                    .with_label_values(&[activity.kind.as_str()])
                    .inc();
                tracing::info!(
                    inbox = %inbox,
                    activity_type = %activity.kind,
                    "Delivered activity"
                );
            }
            Err(error) => tracing::warn!(
                inbox = %inbox,
                activity_type = %activity.kind,
                %error,
                "Delivery failed"
            ),
        }
        result
    }

    /// Dereference a key id to the public key it names
    ///
    /// # Errors
    /// `VerificationFailed` if the owner cannot be fetched or does not
    /// publish that key
    pub async fn fetch_public_key(
        &self,
        cancel: &CancellationToken,
        key_id: &str,
    ) -> Result<PublicKey> {
        let actor = self
            .resolve_actor(cancel, &self.system_signer, key_id)
            .await
            .map_err(|error| match error {
                AppError::Cancelled => AppError::Cancelled,
                other => AppError::VerificationFailed(format!("unreachable signer key: {other}")),
            })?;

        let public_key = actor.public_key.ok_or_else(|| {
            AppError::VerificationFailed(format!("{} publishes no public key", actor.id))
        })?;

        if public_key.id.as_str() != key_id && actor.id.as_str() != key_id {
            return Err(AppError::VerificationFailed(
                "keyId does not match the actor's public key id".to_string(),
            ));
        }
        if !signature::key_id_matches_actor(public_key.owner.as_str(), actor.id.as_str()) {
            return Err(AppError::VerificationFailed(
                "public key owner does not match the actor".to_string(),
            ));
        }

        Ok(public_key)
    }

    /// Verify an inbound signed POST
    ///
    /// The digest is compared with the body before any network access; the
    /// key is then fetched and the signature checked.
    pub async fn verify_request(
        &self,
        cancel: &CancellationToken,
        method: &str,
        path: &str,
        headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<VerifiedRequest> {
        let parsed = signature::signature_from_headers(headers)?;
        signature::verify_digest(headers, body)?;

        let public_key = self.fetch_public_key(cancel, &parsed.key_id).await?;
        signature::verify_signature(
            method,
            path,
            headers,
            Some(body),
            &public_key.public_key_pem,
            self.settings.signature_max_skew,
        )?;

        Ok(VerifiedRequest {
            key_id: parsed.key_id,
            owner: public_key.owner,
        })
    }

    /// Resolve `@user@host` to the actor IRI advertised by WebFinger
    pub async fn resolve_account(&self, cancel: &CancellationToken, account: &str) -> Result<Iri> {
        let (user, host) = webfinger::parse_account(account)?;
        let resource = format!("acct:{user}@{host}");
        let mut url = parse_remote_url(&format!("https://{host}/.well-known/webfinger"))
            .map_err(AppError::UnreachableActor)?;
        url.query_pairs_mut().append_pair("resource", &resource);

        self.bounded(
            cancel,
            async {
                self.check_destination(&url)
                    .await
                    .map_err(AppError::UnreachableActor)?;
                let response = self
                    .http
                    .get(url.clone())
                    .header(ACCEPT, "application/jrd+json, application/json")
                    .send()
                    .await
                    .map_err(|e| AppError::UnreachableActor(format!("{resource}: {e}")))?;

                if !response.status().is_success() {
                    return Err(AppError::UnreachableActor(format!(
                        "{resource}: HTTP {}",
                        response.status()
                    )));
                }

                let jrd: WebFingerResponse = response
                    .json()
                    .await
                    .map_err(|e| AppError::UnreachableActor(format!("{resource}: {e}")))?;
                webfinger::actor_link(&jrd).ok_or_else(|| {
                    AppError::UnreachableActor(format!("{resource}: no ActivityPub actor link"))
                })
            },
            || AppError::UnreachableActor(format!("{resource}: timed out")),
        )
        .await
    }
}

fn record_request<T>(direction: &str, started: Instant, result: &Result<T>) {
    let status = match result {
        Ok(_) => "success",
        Err(AppError::Cancelled) => "cancelled",
        Err(_) => "error",
    };
    FEDERATION_REQUESTS_TOTAL
        .with_label_values(&[direction, status])
        .inc();
    FEDERATION_REQUEST_DURATION_SECONDS
        .with_label_values(&[direction])
        .observe(started.elapsed().as_secs_f64());
}
