//! HTTP Signatures for ActivityPub
//!
//! Draft-cavage signatures with RSA-SHA256, the scheme Mastodon and most
//! other servers speak:
//! https://docs.joinmastodon.org/spec/security/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::model::Iri;
use crate::error::{AppError, Result};

/// Date header format (IMF-fixdate)
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Values of the signed headers, as sent on the wire
#[derive(Debug, Clone, Copy)]
pub struct SigningHeaders<'a> {
    pub host: &'a str,
    pub date: &'a str,
    /// Present for requests with a body
    pub digest: Option<&'a str>,
}

/// Build the canonical signing string
///
/// Line order is fixed: `(request-target)`, `host`, `date`, `digest`.
pub fn canonical_string(method: &str, path: &str, headers: &SigningHeaders<'_>) -> String {
    let mut lines = vec![
        format!("(request-target): {} {}", method.to_lowercase(), path),
        format!("host: {}", headers.host),
        format!("date: {}", headers.date),
    ];
    if let Some(digest) = headers.digest {
        lines.push(format!("digest: {digest}"));
    }
    lines.join("\n")
}

/// Header names covered by a canonical string, in order
fn covered_headers(canonical: &str) -> String {
    canonical
        .lines()
        .filter_map(|line| line.split_once(": ").map(|(name, _)| name))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sign a canonical string and render the `Signature` header value
///
/// # Errors
/// Returns `AppError::Internal` if the RSA operation fails
pub fn sign(private_key: &RsaPrivateKey, key_id: &str, canonical: &str) -> Result<String> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand::thread_rng();
    let signature = signing_key
        .try_sign_with_rng(&mut rng, canonical.as_bytes())
        .map_err(|e| anyhow::anyhow!("RSA signing failed: {e}"))?;

    Ok(format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key_id,
        covered_headers(canonical),
        BASE64.encode(signature.to_bytes())
    ))
}

/// `SHA-256=<base64>` digest of a request body
pub fn digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Private key plus the public half published in actor documents
#[derive(Clone)]
pub struct KeyPair {
    private_key: Arc<RsaPrivateKey>,
    public_key_pem: String,
}

impl KeyPair {
    /// Load a PKCS#8 PEM private key
    ///
    /// Surrounding quotes are trimmed and literal `\n` sequences become
    /// newlines, so the key can be passed through a single-line
    /// environment variable.
    pub fn from_pem(raw: &str) -> Result<Self> {
        let normalized = raw.trim().trim_matches('"').replace("\\n", "\n");
        let private_key = RsaPrivateKey::from_pkcs8_pem(&normalized)
            .map_err(|e| AppError::Config(format!("invalid RSA private key: {e}")))?;
        Self::from_private_key(private_key)
    }

    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self> {
        let public_key_pem = RsaPublicKey::from(&private_key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::Config(format!("failed to encode public key: {e}")))?;

        Ok(Self {
            private_key: Arc::new(private_key),
            public_key_pem,
        })
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// Signer publishing this key under `key_id`
    pub fn signer(&self, key_id: Iri) -> Signer {
        Signer {
            key_id,
            private_key: Arc::clone(&self.private_key),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}

/// A key id bound to the private key that signs for it
#[derive(Clone)]
pub struct Signer {
    key_id: Iri,
    private_key: Arc<RsaPrivateKey>,
}

impl Signer {
    pub fn key_id(&self) -> &Iri {
        &self.key_id
    }

    /// Sign an outgoing request
    ///
    /// # Returns
    /// Header values to send: Host, Date, Digest (if body present) and Signature
    pub fn sign_request(
        &self,
        method: &str,
        url: &url::Url,
        body: Option<&[u8]>,
    ) -> Result<SignatureHeaders> {
        let host = request_host(url)?;
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let date = Utc::now().format(HTTP_DATE_FORMAT).to_string();
        let digest = body.map(digest);

        let canonical = canonical_string(
            method,
            &path,
            &SigningHeaders {
                host: &host,
                date: &date,
                digest: digest.as_deref(),
            },
        );
        let signature = sign(&self.private_key, self.key_id.as_str(), &canonical)?;

        Ok(SignatureHeaders {
            host,
            date,
            digest,
            signature,
        })
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Host header value for a URL; non-default ports are included
fn request_host(url: &url::Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| AppError::Validation(format!("missing host in URL {url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Headers to add for signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    pub host: String,
    /// Date header value (RFC 7231)
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
    /// Signature header value
    pub signature: String,
}

/// Parsed Signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm, when the sender named one
    pub algorithm: Option<String>,
    /// Signed header names, lowercased
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

fn rejected(reason: impl Into<String>) -> AppError {
    AppError::VerificationFailed(reason.into())
}

/// Parse Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');

        match key.trim() {
            "keyId" => key_id = Some(value.to_string()),
            "algorithm" => algorithm = Some(value.to_string()),
            "headers" => {
                headers = Some(
                    value
                        .split_whitespace()
                        .map(|name| name.to_ascii_lowercase())
                        .collect(),
                )
            }
            "signature" => signature = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(ParsedSignature {
        key_id: key_id.ok_or_else(|| rejected("missing keyId"))?,
        algorithm,
        // Draft default when the list is omitted
        headers: headers.unwrap_or_else(|| vec!["date".to_string()]),
        signature: signature.ok_or_else(|| rejected("missing signature"))?,
    })
}

fn header_str<'a>(headers: &'a http::HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .ok_or_else(|| rejected(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| rejected(format!("invalid {name} header")))
}

/// Read and parse the Signature header of a request
pub fn signature_from_headers(headers: &http::HeaderMap) -> Result<ParsedSignature> {
    parse_signature_header(header_str(headers, "signature")?)
}

/// Compare the Digest header against the received body bytes
pub fn verify_digest(headers: &http::HeaderMap, body: &[u8]) -> Result<()> {
    let received = header_str(headers, "digest")?;
    if received != digest(body) {
        return Err(rejected("digest mismatch"));
    }
    Ok(())
}

fn decode_public_key(public_key_pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(public_key_pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_key_pem))
        .map_err(|e| rejected(format!("invalid public key: {e}")))
}

/// Verify an HTTP request signature
///
/// The canonical string is rebuilt from the received headers in the order
/// the Signature header lists them.
///
/// # Arguments
/// * `method` - HTTP method
/// * `path` - Request path and query
/// * `headers` - All request headers
/// * `body` - Request body (for digest verification)
/// * `public_key_pem` - Signer's public key (SPKI or PKCS#1 PEM)
/// * `max_skew` - Accepted Date distance from now, `None` to skip
///
/// # Errors
/// `VerificationFailed` for any mismatch
pub fn verify_signature(
    method: &str,
    path: &str,
    headers: &http::HeaderMap,
    body: Option<&[u8]>,
    public_key_pem: &str,
    max_skew: Option<Duration>,
) -> Result<()> {
    let parsed = signature_from_headers(headers)?;

    if let Some(algorithm) = parsed.algorithm.as_deref() {
        if algorithm != "rsa-sha256" && algorithm != "hs2019" {
            return Err(rejected(format!("unsupported algorithm {algorithm}")));
        }
    }

    for required in ["(request-target)", "host", "date"] {
        if !parsed.headers.iter().any(|h| h == required) {
            return Err(rejected(format!("signed headers must include {required}")));
        }
    }

    if let Some(body) = body {
        if !parsed.headers.iter().any(|h| h == "digest") {
            return Err(rejected("signed headers must include digest"));
        }
        verify_digest(headers, body)?;
    }

    if let Some(max_skew) = max_skew {
        let date = DateTime::parse_from_rfc2822(header_str(headers, "date")?)
            .map_err(|_| rejected("invalid Date format"))?;
        let skew = (Utc::now().timestamp() - date.timestamp()).unsigned_abs();
        if skew > max_skew.as_secs() {
            return Err(rejected("Date header outside the accepted window"));
        }
    }

    let mut lines = Vec::with_capacity(parsed.headers.len());
    for name in &parsed.headers {
        let value = match name.as_str() {
            "(request-target)" => format!("{} {}", method.to_lowercase(), path),
            other => header_str(headers, other)?.to_string(),
        };
        lines.push(format!("{name}: {value}"));
    }
    let canonical = lines.join("\n");

    let signature_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|_| rejected("invalid signature encoding"))?;
    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| rejected(format!("invalid signature format: {e}")))?;

    let verifier = VerifyingKey::<Sha256>::new(decode_public_key(public_key_pem)?);
    verifier
        .verify(canonical.as_bytes(), &signature)
        .map_err(|_| rejected("signature mismatch"))
}

/// Validate that signature keyId points to the same actor as the activity actor.
pub fn key_id_matches_actor(key_id: &str, actor_id: &str) -> bool {
    let key_actor = key_id.split('#').next().unwrap_or(key_id);
    let actor = actor_id.split('#').next().unwrap_or(actor_id);
    key_actor == actor
}
