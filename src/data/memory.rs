//! In-memory storage backend
//!
//! Keeps users and relationships in hashmaps behind async locks.
//! Data is lost on restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::models::*;
use super::{RelationshipStore, UserStore};
use crate::error::AppError;

type RelationshipKey = (String, RelationshipKind, String);

fn key(user_id: &str, kind: RelationshipKind, remote_actor_id: &str) -> RelationshipKey {
    (user_id.to_string(), kind, remote_actor_id.to_string())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, LocalUser>>,
    relationships: RwLock<HashMap<RelationshipKey, RelationshipRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<LocalUser>, AppError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalUser>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.preferred_username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn upsert_user(&self, user: &LocalUser) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let created_at = users
            .get(&user.id)
            .map(|existing| existing.created_at)
            .unwrap_or(user.created_at);
        users.insert(
            user.id.clone(),
            LocalUser {
                created_at,
                ..user.clone()
            },
        );
        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for MemoryStore {
    async fn upsert_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
        status: RelationshipStatus,
    ) -> Result<RelationshipRecord, AppError> {
        let now = Utc::now();
        let mut relationships = self.relationships.write().await;
        let record = relationships
            .entry(key(user_id, kind, remote_actor_id))
            .and_modify(|record| {
                record.status = status;
                record.updated_at = now;
            })
            .or_insert_with(|| RelationshipRecord {
                id: EntityId::new().0,
                user_id: user_id.to_string(),
                kind,
                remote_actor_id: remote_actor_id.to_string(),
                status,
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn find_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<Option<RelationshipRecord>, AppError> {
        let relationships = self.relationships.read().await;
        Ok(relationships
            .get(&key(user_id, kind, remote_actor_id))
            .cloned())
    }

    async fn complete_pending(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<bool, AppError> {
        let mut relationships = self.relationships.write().await;
        match relationships.get_mut(&key(user_id, kind, remote_actor_id)) {
            Some(record) if record.status == RelationshipStatus::Pending => {
                record.status = RelationshipStatus::Completed;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<bool, AppError> {
        let mut relationships = self.relationships.write().await;
        Ok(relationships
            .remove(&key(user_id, kind, remote_actor_id))
            .is_some())
    }

    async fn list_relationships(
        &self,
        user_id: &str,
        kind: RelationshipKind,
    ) -> Result<Vec<RelationshipRecord>, AppError> {
        let relationships = self.relationships.read().await;
        let mut records: Vec<_> = relationships
            .values()
            .filter(|record| record.user_id == user_id && record.kind == kind)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}
