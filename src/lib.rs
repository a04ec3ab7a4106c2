//! followbox - ActivityPub follow relationships for a handful of local actors
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - ActivityPub endpoints (actor, inbox, collections)        │
//! │  - WebFinger                                                │
//! │  - Admin follow API, metrics                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Federation Layer                           │
//! │  - HTTP Signatures, signed client                           │
//! │  - Follow relationship state machine                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - In-memory store                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `federation`: ActivityPub documents, signatures, client, state machine
//! - `data`: User and relationship stores
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;

use data::{LocalUser, RelationshipStore, UserStore};
use federation::{ClientSettings, FederationClient, KeyPair, LocalActor, RelationshipService};

/// Request bodies above this size are refused before reaching a handler
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across all handlers
///
/// Cloned for each request; everything except the stores is immutable
/// after startup.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Instance key pair signing for every local actor
    pub keys: KeyPair,

    pub users: Arc<dyn UserStore>,

    pub relationships: Arc<dyn RelationshipStore>,

    /// Signed HTTP client for federation
    pub client: Arc<FederationClient>,

    pub relationship_service: Arc<RelationshipService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Load the signing key
    /// 2. Connect to SQLite database
    /// 3. Seed configured users and build the federation client
    ///
    /// # Errors
    /// Returns error if any initialization step fails. A key that does not
    /// parse aborts startup.
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Load the signing key
        let keys = KeyPair::from_pem(&config.federation.private_key_source()?)?;
        tracing::info!("Signing key loaded");

        // 2. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 3. Seed users, build client
        Self::with_stores(config, keys, db.clone(), db).await
    }

    /// Build state over existing stores, seeding the configured users
    pub async fn with_stores(
        config: config::AppConfig,
        keys: KeyPair,
        users: Arc<dyn UserStore>,
        relationships: Arc<dyn RelationshipStore>,
    ) -> Result<Self, error::AppError> {
        Self::seed_users(users.as_ref(), &config).await?;

        let base_url = config.server.base_url();
        let client = Arc::new(FederationClient::new(
            federation::system_signer(&base_url, &keys),
            ClientSettings::from_config(&config.federation),
        )?);
        let relationship_service = Arc::new(RelationshipService::new(
            Arc::clone(&relationships),
            Arc::clone(&client),
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            keys,
            users,
            relationships,
            client,
            relationship_service,
        })
    }

    /// Create or refresh configured users
    ///
    /// Profile fields follow the configuration; `created_at` is kept.
    async fn seed_users(
        users: &dyn UserStore,
        config: &config::AppConfig,
    ) -> Result<(), error::AppError> {
        for entry in &config.users {
            let mut user = LocalUser::new(entry.id.clone(), entry.username.clone());
            user.name = entry.name.clone();
            user.summary = entry.summary.clone();
            user.icon_url = entry.icon_url.clone();
            user.icon_media_type = entry.icon_media_type.clone();

            users.upsert_user(&user).await?;
            tracing::info!(id = %user.id, username = %user.preferred_username, "Local user ready");
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        self.config.server.base_url()
    }

    pub fn local_actor(&self, user: LocalUser) -> LocalActor {
        LocalActor::new(user, &self.base_url(), self.keys.clone())
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router())
        .nest("/api", api::admin_router(state.clone()))
        .layer(axum::middleware::from_fn(api::metrics::track_requests))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
