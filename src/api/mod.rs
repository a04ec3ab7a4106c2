//! API layer
//!
//! HTTP handlers for:
//! - ActivityPub (for federation)
//! - WebFinger
//! - Admin API
//! - Metrics (Prometheus)

mod activitypub;
mod admin;
pub mod metrics;
mod wellknown;

pub use activitypub::activitypub_router;
pub use admin::{FollowRequest, RelationshipsResponse, UnfollowResponse, admin_router};
pub use metrics::metrics_router;
pub use wellknown::wellknown_router;
