//! Common test utilities for E2E tests
//!
//! `TestServer` runs the full router over a temporary SQLite database.
//! `RemoteServer` plays a remote instance: it serves actor documents, signs
//! requests for its actors and records what lands in their inboxes.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use followbox::federation::model::{
    self, Activity, ActivityType, Actor, ActorType, Iri, ObjectOrLink, PublicKey,
};
use followbox::federation::{ACTIVITY_JSON, KeyPair, Signer};
use followbox::{AppState, config};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use serde_json::Map;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const API_TOKEN: &str = "test-admin-token-0123456789";
pub const LOCAL_USER_ID: &str = "u1";
pub const LOCAL_USERNAME: &str = "alice";

/// Actors served by [`RemoteServer`]; other names answer 404
pub const REMOTE_USERS: [&str; 3] = ["bob", "carol", "dave"];

/// Publishes its key at `<actor>/main-key` instead of `<actor>#main-key`
pub const PATH_KEY_USER: &str = "dave";

fn key_id(actor_id: &Iri, name: &str) -> Iri {
    if name == PATH_KEY_USER {
        actor_id.join("main-key")
    } else {
        Iri::new(format!("{actor_id}#main-key"))
    }
}

fn private_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Bind first so actor IRIs carry the real port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let private_key_pem = private_key().to_pkcs8_pem(LineEnding::LF).unwrap();

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                domain: addr.to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            federation: config::FederationConfig {
                private_key_pem: Some(private_key_pem.to_string()),
                private_key_path: None,
                user_agent: "followbox-test".to_string(),
                request_timeout_secs: 5,
                signature_max_skew_secs: 300,
                allow_private_addresses: true,
            },
            admin: config::AdminConfig {
                api_token: API_TOKEN.to_string(),
            },
            users: vec![config::LocalUserConfig {
                id: LOCAL_USER_ID.to_string(),
                username: LOCAL_USERNAME.to_string(),
                name: Some("Alice".to_string()),
                summary: Some("Test account".to_string()),
                icon_url: None,
                icon_media_type: None,
            }],
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        config.validate().unwrap();

        followbox::metrics::init_metrics();

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Redirects are asserted, not followed
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        let app = followbox::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            addr: format!("http://{addr}"),
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// IRI of the seeded local actor
    pub fn actor_id(&self) -> Iri {
        Iri::new(self.url(&format!("/users/{LOCAL_USER_ID}")))
    }

    pub fn inbox_url(&self) -> String {
        self.url(&format!("/users/{LOCAL_USER_ID}/inbox"))
    }

    /// Authorized admin API request
    pub fn admin_post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(API_TOKEN)
    }

    pub fn admin_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(API_TOKEN)
    }
}

/// One request received by a remote inbox
#[derive(Debug, Clone)]
pub struct Delivery {
    pub user: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Delivery {
    pub fn activity(&self) -> Activity {
        model::decode(&self.body).unwrap()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Clone)]
struct RemoteState {
    base: String,
    keys: KeyPair,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

/// A remote instance hosting [`REMOTE_USERS`]
pub struct RemoteServer {
    pub base: String,
    pub keys: KeyPair,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    client: reqwest::Client,
}

impl RemoteServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let keys = KeyPair::from_private_key(private_key()).unwrap();
        let deliveries = Arc::new(Mutex::new(Vec::new()));

        let state = RemoteState {
            base: base.clone(),
            keys: keys.clone(),
            deliveries: Arc::clone(&deliveries),
        };
        let app = Router::new()
            .route("/users/:name", get(serve_actor))
            .route("/users/:name/main-key", get(serve_actor))
            .route("/users/:name/inbox", post(record_delivery))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base,
            keys,
            deliveries,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
        }
    }

    pub fn actor_id(&self, name: &str) -> Iri {
        Iri::new(format!("{}/users/{name}", self.base))
    }

    pub fn signer(&self, name: &str) -> Signer {
        self.keys.signer(key_id(&self.actor_id(name), name))
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Wait until `count` deliveries arrived
    pub async fn wait_for_deliveries(&self, count: usize) -> Vec<Delivery> {
        for _ in 0..50 {
            let deliveries = self.deliveries();
            if deliveries.len() >= count {
                return deliveries;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.deliveries()
    }

    /// Follow activity from `name` to `target`
    pub fn follow(&self, name: &str, target: &Iri) -> Activity {
        let actor = self.actor_id(name);
        Activity::new(
            ActivityType::Follow,
            actor.join("follows/1"),
            actor,
            ObjectOrLink::Iri(target.clone()),
        )
    }

    /// Activity from `name` wrapping `inner`
    pub fn wrap(&self, name: &str, kind: ActivityType, suffix: &str, inner: Activity) -> Activity {
        let actor = self.actor_id(name);
        Activity::new(kind, actor.join(suffix), actor, inner.into())
    }

    /// POST `body` to `url`, signed with the key of `signer_name`
    pub async fn post_signed(&self, signer_name: &str, url: &str, body: Vec<u8>) -> reqwest::Response {
        let parsed = url::Url::parse(url).unwrap();
        let signed = self
            .signer(signer_name)
            .sign_request("POST", &parsed, Some(&body))
            .unwrap();

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", ACTIVITY_JSON)
            .header("Date", signed.date)
            .header("Signature", signed.signature);
        if let Some(digest) = signed.digest {
            request = request.header("Digest", digest);
        }
        request.body(body).send().await.unwrap()
    }

    /// Send `activity` to `url`, signed by its own actor
    pub async fn deliver(&self, name: &str, url: &str, activity: &Activity) -> reqwest::Response {
        self.post_signed(name, url, model::encode(activity).unwrap())
            .await
    }
}

pub fn remote_actor(base: &str, name: &str, keys: &KeyPair) -> Actor {
    let id = Iri::new(format!("{base}/users/{name}"));
    Actor {
        inbox: id.join("inbox"),
        kind: ActorType::Person,
        outbox: None,
        followers: None,
        following: None,
        preferred_username: Some(name.to_string()),
        name: None,
        summary: None,
        url: None,
        published: None,
        icon: None,
        public_key: Some(PublicKey {
            id: key_id(&id, name),
            owner: id.clone(),
            public_key_pem: keys.public_key_pem().to_string(),
        }),
        endpoints: None,
        discoverable: None,
        manually_approves_followers: None,
        attachment: Vec::new(),
        extra: Map::new(),
        id,
    }
}

async fn serve_actor(State(state): State<RemoteState>, Path(name): Path<String>) -> Response {
    if !REMOTE_USERS.contains(&name.as_str()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let actor = remote_actor(&state.base, &name, &state.keys);
    Json(model::to_document(&actor).unwrap()).into_response()
}

async fn record_delivery(
    State(state): State<RemoteState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.deliveries.lock().unwrap().push(Delivery {
        user: name,
        headers,
        body,
    });
    StatusCode::ACCEPTED
}
