//! Fixtures shared by federation unit tests: throwaway keys and a remote
//! server that serves actors and records inbox deliveries.

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
use rsa::RsaPrivateKey;
use serde_json::Map;
use tokio::net::TcpListener;

use super::client::{ClientSettings, FederationClient};
use super::model::{self, Actor, ActorType, Iri, PublicKey};
use super::signature::{KeyPair, Signer};

/// Actors served by [`RemoteServer`]; other names answer 404
pub const REMOTE_USERS: [&str; 2] = ["bob", "carol"];

pub fn key_pair() -> KeyPair {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    KeyPair::from_private_key(private_key).unwrap()
}

pub fn client(keys: &KeyPair, allow_private_addresses: bool) -> FederationClient {
    FederationClient::new(
        keys.signer(Iri::from("https://local.example/actor#main-key")),
        ClientSettings {
            user_agent: "followbox-test".to_string(),
            timeout: Duration::from_secs(5),
            signature_max_skew: Some(Duration::from_secs(300)),
            allow_private_addresses,
        },
    )
    .unwrap()
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub user: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Delivery {
    pub fn activity(&self) -> model::Activity {
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
    inbox_status: StatusCode,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

pub struct RemoteServer {
    pub base: String,
    pub keys: KeyPair,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl RemoteServer {
    /// Bind on an ephemeral port; every inbox answers `inbox_status`
    pub async fn spawn(inbox_status: StatusCode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let keys = key_pair();
        let deliveries = Arc::new(Mutex::new(Vec::new()));

        let state = RemoteState {
            base: base.clone(),
            keys: keys.clone(),
            inbox_status,
            deliveries: Arc::clone(&deliveries),
        };
        let app = Router::new()
            .route("/users/:name", get(serve_actor))
            .route("/users/:name/inbox", post(record_delivery))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "late"
                }),
            )
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base,
            keys,
            deliveries,
        }
    }

    pub fn actor_id(&self, name: &str) -> Iri {
        Iri::new(format!("{}/users/{name}", self.base))
    }

    pub fn inbox(&self, name: &str) -> Iri {
        self.actor_id(name).join("inbox")
    }

    pub fn signer(&self, name: &str) -> Signer {
        self.keys
            .signer(Iri::new(format!("{}#main-key", self.actor_id(name))))
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
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
            id: Iri::new(format!("{id}#main-key")),
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
    state.inbox_status
}
