//! Data models
//!
//! Rust structs representing stored entities.
//! Records use ULID for IDs and chrono for timestamps.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Local users
// =============================================================================

/// A local account published as an actor
///
/// `id` is the stable handle in every actor IRI; `preferred_username`
/// is the display handle and can change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocalUser {
    pub id: String,
    pub preferred_username: String,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub icon_url: Option<String>,
    pub icon_media_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalUser {
    pub fn new(id: impl Into<String>, preferred_username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            preferred_username: preferred_username.into(),
            name: None,
            summary: None,
            icon_url: None,
            icon_media_type: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Relationships
// =============================================================================

/// Direction of a relationship, seen from the local user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Remote actor follows the local user
    Follower,
    /// Local user follows the remote actor
    Following,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Follower => "follower",
            RelationshipKind::Following => "following",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "follower" => Ok(RelationshipKind::Follower),
            "following" => Ok(RelationshipKind::Following),
            other => Err(AppError::Storage(format!(
                "unknown relationship kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    /// Follow sent, Accept not yet received
    Pending,
    Completed,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Pending => "pending",
            RelationshipStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(RelationshipStatus::Pending),
            "completed" => Ok(RelationshipStatus::Completed),
            other => Err(AppError::Storage(format!(
                "unknown relationship status: {other}"
            ))),
        }
    }
}

/// Follower or following entry of a local user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: String,
    /// Local user the record belongs to
    pub user_id: String,
    pub kind: RelationshipKind,
    /// IRI of the remote actor
    pub remote_actor_id: String,
    pub status: RelationshipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
