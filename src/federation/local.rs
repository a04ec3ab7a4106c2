//! Local actors as seen from the network

use serde_json::Map;

use super::model::{Actor, ActorType, Endpoints, Image, Iri, PublicKey};
use super::signature::{KeyPair, Signer};
use crate::data::LocalUser;

/// Fragment naming an actor's signing key
pub const MAIN_KEY_FRAGMENT: &str = "main-key";

/// Actor id of a local user; always keyed by the stable id, never the username
pub fn actor_id(base_url: &str, user_id: &str) -> Iri {
    Iri::new(format!("{}/users/{}", base_url.trim_end_matches('/'), user_id))
}

/// Actor id of the instance-wide application actor
pub fn system_actor_id(base_url: &str) -> Iri {
    Iri::new(format!("{}/actor", base_url.trim_end_matches('/')))
}

/// Inbox shared by every local actor
pub fn shared_inbox(base_url: &str) -> Iri {
    Iri::new(format!("{}/inbox", base_url.trim_end_matches('/')))
}

pub fn key_id(actor_id: &Iri) -> Iri {
    Iri::new(format!("{actor_id}#{MAIN_KEY_FRAGMENT}"))
}

/// A local user bound to the instance key
#[derive(Debug, Clone)]
pub struct LocalActor {
    pub user: LocalUser,
    pub id: Iri,
    base_url: String,
    keys: KeyPair,
}

impl LocalActor {
    pub fn new(user: LocalUser, base_url: &str, keys: KeyPair) -> Self {
        Self {
            id: actor_id(base_url, &user.id),
            base_url: base_url.trim_end_matches('/').to_string(),
            user,
            keys,
        }
    }

    pub fn inbox(&self) -> Iri {
        self.id.join("inbox")
    }

    pub fn followers(&self) -> Iri {
        self.id.join("followers")
    }

    pub fn following(&self) -> Iri {
        self.id.join("following")
    }

    pub fn profile_url(&self) -> String {
        format!("{}/@{}", self.base_url, self.user.preferred_username)
    }

    /// Signer for requests made on this user's behalf
    pub fn signer(&self) -> Signer {
        self.keys.signer(key_id(&self.id))
    }

    /// The Person document served at the actor id
    pub fn to_actor(&self) -> Actor {
        let icon = self.user.icon_url.as_ref().map(|url| Image {
            kind: "Image".to_string(),
            media_type: self.user.icon_media_type.clone(),
            url: url.clone(),
        });

        Actor {
            id: self.id.clone(),
            kind: ActorType::Person,
            inbox: self.inbox(),
            outbox: Some(self.id.join("outbox")),
            followers: Some(self.followers()),
            following: Some(self.following()),
            preferred_username: Some(self.user.preferred_username.clone()),
            name: Some(
                self.user
                    .name
                    .clone()
                    .unwrap_or_else(|| self.user.preferred_username.clone()),
            ),
            summary: self.user.summary.clone(),
            url: Some(self.profile_url()),
            published: Some(self.user.created_at),
            icon,
            public_key: Some(PublicKey {
                id: key_id(&self.id),
                owner: self.id.clone(),
                public_key_pem: self.keys.public_key_pem().to_string(),
            }),
            endpoints: Some(Endpoints {
                shared_inbox: Some(shared_inbox(&self.base_url)),
            }),
            discoverable: Some(true),
            manually_approves_followers: Some(false),
            attachment: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// The Application actor that signs instance-level fetches
pub fn system_actor(base_url: &str, domain: &str, keys: &KeyPair) -> Actor {
    let id = system_actor_id(base_url);
    let base = base_url.trim_end_matches('/');

    Actor {
        inbox: shared_inbox(base),
        kind: ActorType::Application,
        outbox: None,
        followers: None,
        following: None,
        preferred_username: Some(domain.to_string()),
        name: None,
        summary: None,
        url: Some(format!("{base}/about")),
        published: None,
        icon: None,
        public_key: Some(PublicKey {
            id: key_id(&id),
            owner: id.clone(),
            public_key_pem: keys.public_key_pem().to_string(),
        }),
        endpoints: Some(Endpoints {
            shared_inbox: Some(shared_inbox(base)),
        }),
        discoverable: None,
        manually_approves_followers: Some(false),
        attachment: Vec::new(),
        extra: Map::new(),
        id,
    }
}

/// Signer for the application actor
pub fn system_signer(base_url: &str, keys: &KeyPair) -> Signer {
    keys.signer(key_id(&system_actor_id(base_url)))
}
