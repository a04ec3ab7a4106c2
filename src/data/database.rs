//! SQLite database operations
//!
//! All database access goes through this module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use super::{RelationshipStore, UserStore};
use crate::error::AppError;

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

const RELATIONSHIP_COLUMNS: &str =
    "id, user_id, kind, remote_actor_id, status, created_at, updated_at";

/// Row shape of `relationships`; enums are stored as text
#[derive(sqlx::FromRow)]
struct RelationshipRow {
    id: String,
    user_id: String,
    kind: String,
    remote_actor_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RelationshipRow> for RelationshipRecord {
    type Error = AppError;

    fn try_from(row: RelationshipRow) -> Result<Self, Self::Error> {
        Ok(RelationshipRecord {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind.parse()?,
            remote_actor_id: row.remote_actor_id,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Database {
    /// Connect to the SQLite file at `path`, creating it if needed, and run migrations
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .inspect_err(|e| tracing::error!("Migration failed: {}", e))?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStore for Database {
    async fn find_user(&self, id: &str) -> Result<Option<LocalUser>, AppError> {
        let user = sqlx::query_as::<_, LocalUser>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalUser>, AppError> {
        let user = sqlx::query_as::<_, LocalUser>(
            "SELECT * FROM users WHERE preferred_username = ? COLLATE NOCASE",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn upsert_user(&self, user: &LocalUser) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, preferred_username, name, summary, icon_url, icon_media_type,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                preferred_username = excluded.preferred_username,
                name = excluded.name,
                summary = excluded.summary,
                icon_url = excluded.icon_url,
                icon_media_type = excluded.icon_media_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.preferred_username)
        .bind(&user.name)
        .bind(&user.summary)
        .bind(&user.icon_url)
        .bind(&user.icon_media_type)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for Database {
    async fn upsert_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
        status: RelationshipStatus,
    ) -> Result<RelationshipRecord, AppError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, RelationshipRow>(&format!(
            r#"
            INSERT INTO relationships (
                id, user_id, kind, remote_actor_id, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, kind, remote_actor_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            RETURNING {RELATIONSHIP_COLUMNS}
            "#
        ))
        .bind(EntityId::new().0)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(remote_actor_id)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<Option<RelationshipRecord>, AppError> {
        let row = sqlx::query_as::<_, RelationshipRow>(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships \
             WHERE user_id = ? AND kind = ? AND remote_actor_id = ?"
        ))
        .bind(user_id)
        .bind(kind.as_str())
        .bind(remote_actor_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RelationshipRecord::try_from).transpose()
    }

    async fn complete_pending(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE relationships SET status = ?, updated_at = ?
            WHERE user_id = ? AND kind = ? AND remote_actor_id = ? AND status = ?
            "#,
        )
        .bind(RelationshipStatus::Completed.as_str())
        .bind(Utc::now())
        .bind(user_id)
        .bind(kind.as_str())
        .bind(remote_actor_id)
        .bind(RelationshipStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_relationship(
        &self,
        user_id: &str,
        kind: RelationshipKind,
        remote_actor_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM relationships WHERE user_id = ? AND kind = ? AND remote_actor_id = ?",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(remote_actor_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_relationships(
        &self,
        user_id: &str,
        kind: RelationshipKind,
    ) -> Result<Vec<RelationshipRecord>, AppError> {
        let rows = sqlx::query_as::<_, RelationshipRow>(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships \
             WHERE user_id = ? AND kind = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RelationshipRecord::try_from).collect()
    }
}
