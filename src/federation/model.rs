//! ActivityStreams wire model
//!
//! Typed views of the documents exchanged with remote servers. Object
//! references are a sum type: a bare string is an IRI, an embedded object
//! decodes to the richest type its `type` names, and anything else is kept
//! as an opaque map so it re-serializes unchanged.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::{AppError, Result};

/// Media type for ActivityPub payloads
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// JSON-LD media type some servers send instead of activity+json
pub const LD_JSON: &str = "application/ld+json";

/// `@context` written at the top of every outgoing document
pub fn context() -> Value {
    json!([
        "https://www.w3.org/ns/activitystreams",
        "https://w3id.org/security/v1",
        {
            "manuallyApprovesFollowers": "as:manuallyApprovesFollowers",
            "sensitive": "as:sensitive",
            "Hashtag": "as:Hashtag",
            "quoteUrl": "as:quoteUrl",
            "toot": "http://joinmastodon.org/ns#",
            "discoverable": "toot:discoverable",
            "Emoji": "toot:Emoji",
            "featured": "toot:featured",
            "misskey": "https://misskey-hub.net/ns#",
            "schema": "http://schema.org#",
            "PropertyValue": "schema:PropertyValue",
            "value": "schema:value"
        }
    ])
}

/// Opaque dereferenceable identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The document part of the IRI (`https://a/users/b#main-key` -> `https://a/users/b`)
    pub fn without_fragment(&self) -> &str {
        self.0.split('#').next().unwrap_or(&self.0)
    }

    /// Append a path segment
    pub fn join(&self, segment: impl fmt::Display) -> Iri {
        Iri(format!("{}/{}", self.0.trim_end_matches('/'), segment))
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Iri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Iri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Activity vocabulary
///
/// Names outside the known set are carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivityType {
    Follow,
    Undo,
    Accept,
    Reject,
    Create,
    Update,
    Delete,
    Announce,
    Add,
    Remove,
    Other(String),
}

impl ActivityType {
    const KNOWN: [ActivityType; 10] = [
        ActivityType::Follow,
        ActivityType::Undo,
        ActivityType::Accept,
        ActivityType::Reject,
        ActivityType::Create,
        ActivityType::Update,
        ActivityType::Delete,
        ActivityType::Announce,
        ActivityType::Add,
        ActivityType::Remove,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ActivityType::Follow => "Follow",
            ActivityType::Undo => "Undo",
            ActivityType::Accept => "Accept",
            ActivityType::Reject => "Reject",
            ActivityType::Create => "Create",
            ActivityType::Update => "Update",
            ActivityType::Delete => "Delete",
            ActivityType::Announce => "Announce",
            ActivityType::Add => "Add",
            ActivityType::Remove => "Remove",
            ActivityType::Other(name) => name,
        }
    }

    pub fn is_known(name: &str) -> bool {
        Self::KNOWN.iter().any(|kind| kind.as_str() == name)
    }
}

impl From<&str> for ActivityType {
    fn from(name: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|kind| kind.as_str() == name)
            .cloned()
            .unwrap_or_else(|| ActivityType::Other(name.to_string()))
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActivityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(ActivityType::from(name.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    Person,
    Service,
    Application,
    Group,
    Organization,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Person => "Person",
            ActorType::Service => "Service",
            ActorType::Application => "Application",
            ActorType::Group => "Group",
            ActorType::Organization => "Organization",
        }
    }

    pub fn is_actor_type(name: &str) -> bool {
        matches!(
            name,
            "Person" | "Service" | "Application" | "Group" | "Organization"
        )
    }
}

/// Identity document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: Iri,
    #[serde(rename = "type")]
    pub kind: ActorType,
    pub inbox: Iri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub published: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub icon: Option<Image>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub public_key: Option<PublicKey>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub endpoints: Option<Endpoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manually_approves_followers: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment: Vec<Attachment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub id: Iri,
    pub owner: Iri,
    pub public_key_pem: String,
}

/// Instance-wide endpoints of an actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox: Option<Iri>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(rename = "type", default = "image_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub url: String,
}

fn image_type() -> String {
    "Image".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValueType {
    PropertyValue,
}

/// schema.org name/value pair shown as a profile field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    #[serde(rename = "type")]
    pub kind: PropertyValueType,
    pub name: String,
    pub value: String,
}

impl PropertyValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: PropertyValueType::PropertyValue,
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attachment {
    PropertyValue(PropertyValue),
    Other(Value),
}

/// A protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Iri>,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub actor: ObjectOrLink,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectOrLink>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub published: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub to: Vec<ObjectOrLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    pub fn new(kind: ActivityType, id: Iri, actor: Iri, object: ObjectOrLink) -> Self {
        Self {
            id: Some(id),
            kind,
            actor: ObjectOrLink::Iri(actor),
            object: Some(object),
            published: None,
            to: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_to(mut self, to: Vec<Iri>) -> Self {
        self.to = to.into_iter().map(ObjectOrLink::Iri).collect();
        self
    }

    pub fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor.id()
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object.as_ref().and_then(ObjectOrLink::id)
    }

    /// `type` of the embedded object; `None` for bare IRIs
    pub fn object_type(&self) -> Option<&str> {
        self.object.as_ref().and_then(ObjectOrLink::type_name)
    }

    pub fn object_activity(&self) -> Option<&Activity> {
        self.object.as_ref().and_then(ObjectOrLink::as_activity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionType {
    OrderedCollection,
    OrderedCollectionPage,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::OrderedCollection => "OrderedCollection",
            CollectionType::OrderedCollectionPage => "OrderedCollectionPage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCollection {
    pub id: Iri,
    #[serde(rename = "type")]
    pub kind: CollectionType,
    pub total_items: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of: Option<Iri>,
    #[serde(default)]
    pub ordered_items: Vec<ObjectOrLink>,
}

impl OrderedCollection {
    /// Unpaginated collection with every item inline
    pub fn inline(id: Iri, items: Vec<ObjectOrLink>) -> Self {
        Self {
            id,
            kind: CollectionType::OrderedCollection,
            total_items: items.len() as u64,
            first: None,
            last: None,
            part_of: None,
            ordered_items: items,
        }
    }

    /// The single `?page=true` page of a collection
    pub fn single_page(collection_id: &Iri, items: Vec<ObjectOrLink>) -> Self {
        Self {
            id: Iri::new(format!("{collection_id}?page=true")),
            kind: CollectionType::OrderedCollectionPage,
            total_items: items.len() as u64,
            first: None,
            last: None,
            part_of: Some(collection_id.clone()),
            ordered_items: items,
        }
    }
}

/// Reference to an object: either a link or an embedded document
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectOrLink {
    Iri(Iri),
    Actor(Box<Actor>),
    Activity(Box<Activity>),
    Collection(Box<OrderedCollection>),
    Unknown(Map<String, Value>),
}

impl ObjectOrLink {
    pub fn from_value(value: Value) -> std::result::Result<Self, serde_json::Error> {
        let map = match value {
            Value::String(iri) => return Ok(ObjectOrLink::Iri(Iri::from(iri))),
            Value::Object(map) => map,
            other => {
                return Err(de::Error::custom(format!(
                    "expected IRI or object, found {other}"
                )));
            }
        };

        let kind = map.get("type").and_then(Value::as_str).unwrap_or_default();
        let typed = if ActorType::is_actor_type(kind) {
            serde_json::from_value::<Actor>(Value::Object(map.clone()))
                .ok()
                .map(|actor| ObjectOrLink::Actor(Box::new(actor)))
        } else if ActivityType::is_known(kind) {
            serde_json::from_value::<Activity>(Value::Object(map.clone()))
                .ok()
                .map(|activity| ObjectOrLink::Activity(Box::new(activity)))
        } else if matches!(kind, "OrderedCollection" | "OrderedCollectionPage") {
            serde_json::from_value::<OrderedCollection>(Value::Object(map.clone()))
                .ok()
                .map(|collection| ObjectOrLink::Collection(Box::new(collection)))
        } else {
            None
        };

        Ok(typed.unwrap_or(ObjectOrLink::Unknown(map)))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ObjectOrLink::Iri(iri) => Some(iri.as_str()),
            ObjectOrLink::Actor(actor) => Some(actor.id.as_str()),
            ObjectOrLink::Activity(activity) => activity.id.as_ref().map(Iri::as_str),
            ObjectOrLink::Collection(collection) => Some(collection.id.as_str()),
            ObjectOrLink::Unknown(map) => map.get("id").and_then(Value::as_str),
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            ObjectOrLink::Iri(_) => None,
            ObjectOrLink::Actor(actor) => Some(actor.kind.as_str()),
            ObjectOrLink::Activity(activity) => Some(activity.kind.as_str()),
            ObjectOrLink::Collection(collection) => Some(collection.kind.as_str()),
            ObjectOrLink::Unknown(map) => map.get("type").and_then(Value::as_str),
        }
    }

    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            ObjectOrLink::Activity(activity) => Some(activity),
            _ => None,
        }
    }
}

impl From<Iri> for ObjectOrLink {
    fn from(iri: Iri) -> Self {
        ObjectOrLink::Iri(iri)
    }
}

impl From<Activity> for ObjectOrLink {
    fn from(activity: Activity) -> Self {
        ObjectOrLink::Activity(Box::new(activity))
    }
}

impl Serialize for ObjectOrLink {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ObjectOrLink::Iri(iri) => iri.serialize(serializer),
            ObjectOrLink::Actor(actor) => actor.serialize(serializer),
            ObjectOrLink::Activity(activity) => activity.serialize(serializer),
            ObjectOrLink::Collection(collection) => collection.serialize(serializer),
            ObjectOrLink::Unknown(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ObjectOrLink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ObjectOrLink::from_value(value).map_err(de::Error::custom)
    }
}

/// Optional fields from remote documents: a value that does not fit is dropped
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Audience fields may be a single reference or a list
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<ObjectOrLink>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(ObjectOrLink::from_value)
            .collect::<std::result::Result<_, _>>()
            .map_err(de::Error::custom),
        single => Ok(vec![
            ObjectOrLink::from_value(single).map_err(de::Error::custom)?,
        ]),
    }
}

/// Decode an inbound activity
///
/// # Errors
/// `MalformedPayload` when the body is not a JSON object, or lacks a
/// string `type` or an `actor`
pub fn decode(bytes: &[u8]) -> Result<Activity> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| AppError::MalformedPayload(format!("invalid JSON: {e}")))?;

    let Value::Object(mut map) = value else {
        return Err(AppError::MalformedPayload(
            "activity must be a JSON object".to_string(),
        ));
    };

    match map.get("type") {
        Some(Value::String(_)) => {}
        Some(_) => {
            return Err(AppError::MalformedPayload(
                "activity type must be a string".to_string(),
            ));
        }
        None => {
            return Err(AppError::MalformedPayload(
                "missing activity type".to_string(),
            ));
        }
    }

    if !map.contains_key("actor") {
        return Err(AppError::MalformedPayload("missing actor".to_string()));
    }

    map.remove("@context");
    serde_json::from_value(Value::Object(map))
        .map_err(|e| AppError::MalformedPayload(e.to_string()))
}

/// Encode an activity with the full `@context`
pub fn encode(activity: &Activity) -> Result<Vec<u8>> {
    let document = to_document(activity)?;
    Ok(serde_json::to_vec(&document).map_err(anyhow::Error::from)?)
}

/// Actor document as served from the actor endpoints
pub fn encode_actor(actor: &Actor) -> Result<Value> {
    to_document(actor)
}

pub fn encode_collection(collection: &OrderedCollection) -> Result<Value> {
    to_document(collection)
}

/// Serialize any top-level document and attach the `@context`
pub fn to_document<T: Serialize>(document: &T) -> Result<Value> {
    let mut value = serde_json::to_value(document).map_err(anyhow::Error::from)?;
    if let Value::Object(map) = &mut value {
        map.insert("@context".to_string(), context());
    }
    Ok(value)
}
