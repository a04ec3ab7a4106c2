//! ActivityPub federation module
//!
//! Handles:
//! - ActivityStreams documents (model)
//! - HTTP Signatures
//! - Signed outbound calls (client)
//! - Local actor documents
//! - Follow relationship transitions
//! - WebFinger

mod client;
mod local;
pub mod model;
mod relationship;
pub mod signature;
mod webfinger;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ClientSettings, FederationClient, VerifiedRequest};
pub use local::{LocalActor, actor_id, system_actor, system_actor_id, system_signer};
pub use model::{ACTIVITY_JSON, Activity, ActivityType, Actor, Iri, LD_JSON, ObjectOrLink};
pub use relationship::{
    InboxOutcome, RelationshipService, accept_activity_id, follow_activity_id, undo_activity_id,
};
pub use signature::{KeyPair, Signer, key_id_matches_actor};
pub use webfinger::{WebFingerResponse, generate_webfinger_response, parse_account};
