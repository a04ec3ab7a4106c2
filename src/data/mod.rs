//! Data layer module
//!
//! Storage is reached through two traits so the federation logic does not
//! care where records live:
//! - `UserStore`: local accounts
//! - `RelationshipStore`: follower/following records
//!
//! `Database` (SQLite) is the production backend, `MemoryStore` backs tests
//! and throwaway instances.

mod database;
mod memory;
mod models;

pub use database::Database;
pub use memory::MemoryStore;
pub use models::*;

use async_trait::async_trait;

use crate::error::AppError;

/// Local account directory
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by the stable id used in actor IRIs
    async fn find_user(&self, id: &str) -> Result<Option<LocalUser>, AppError>;

    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<LocalUser>, AppError>;

    /// Insert or refresh profile fields; `created_at` of an existing user is kept
    async fn upsert_user(&self, user: &LocalUser) -> Result<(), AppError>;
}

/// Durable follower/following records
///
/// Records are keyed by (user, kind, remote actor). Every write is a single
/// atomic keyed operation, so concurrent deliveries for the same pair never
/// produce duplicates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Create the record or overwrite its status, preserving `created_at`
    async fn upsert_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
        status: RelationshipStatus,
    ) -> Result<RelationshipRecord, AppError>;

    async fn find_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<Option<RelationshipRecord>, AppError>;

    /// Move a pending record to completed
    ///
    /// Returns false when there is no pending record for the key.
    async fn complete_pending(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<bool, AppError>;

    /// Returns whether a record was removed
    async fn delete_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<bool, AppError>;

    /// Records of one kind, oldest first
    async fn list_relationships(
        &self,
        user_id: &str,
        kind: RelationshipKind,
    ) -> Result<Vec<RelationshipRecord>, AppError>;
}

/// Named operations over `RelationshipStore`
#[async_trait]
pub trait RelationshipStoreExt: RelationshipStore {
    async fn upsert_follower(
        &self,
        user_id: &str,
        remote_actor_id: &str,
        status: RelationshipStatus,
    ) -> Result<RelationshipRecord, AppError> {
        self.upsert_relationship(user_id, RelationshipKind::Follower, remote_actor_id, status)
            .await
    }

    async fn upsert_following(
        &self,
        user_id: &str,
        remote_actor_id: &str,
        status: RelationshipStatus,
    ) -> Result<RelationshipRecord, AppError> {
        self.upsert_relationship(user_id, RelationshipKind::Following, remote_actor_id, status)
            .await
    }

    async fn delete_follower(&self, user_id: &str, remote_actor_id: &str) -> Result<bool, AppError> {
        self.delete_relationship(user_id, RelationshipKind::Follower, remote_actor_id)
            .await
    }

    async fn delete_following(
        &self,
        user_id: &str,
        remote_actor_id: &str,
    ) -> Result<bool, AppError> {
        self.delete_relationship(user_id, RelationshipKind::Following, remote_actor_id)
            .await
    }
}

impl<T: RelationshipStore + ?Sized> RelationshipStoreExt for T {}
