//! Follow relationship state machine
//!
//! States per (local user, remote actor): `NonExistent -> Pending ->
//! Completed` for outbound follows, `NonExistent -> Completed` for inbound
//! ones. Reject and Undo return the pair to `NonExistent`.
//!
//! Outbound operations deliver first and write the store only on success.
//! Inbound follows write the store first and then deliver the Accept.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::client::FederationClient;
use super::local::LocalActor;
use super::model::{Activity, ActivityType, Iri, ObjectOrLink};
use crate::data::{
    RelationshipKind, RelationshipRecord, RelationshipStatus, RelationshipStore,
    RelationshipStoreExt,
};
use crate::error::{AppError, Result};
use crate::metrics::ACTIVITIES_RECEIVED;

/// How an inbound activity was treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxOutcome {
    /// A relationship transition ran
    Handled,
    /// Acknowledged without effect
    Ignored,
}

/// Id of the Follow a local actor sends to `target`
///
/// Derived from the pair alone so an Undo can rebuild the same Follow.
pub fn follow_activity_id(local: &Iri, target: &Iri) -> Iri {
    local.join(format!("follow/{target}"))
}

pub fn undo_activity_id(local: &Iri, target: &Iri, unix_seconds: i64) -> Iri {
    follow_activity_id(local, target).join(format!("undo/{unix_seconds}"))
}

pub fn accept_activity_id(local: &Iri, unix_millis: i64) -> Iri {
    local.join(format!("accept/{unix_millis}"))
}

fn follow_activity(local: &Iri, target: &Iri) -> Activity {
    Activity::new(
        ActivityType::Follow,
        follow_activity_id(local, target),
        local.clone(),
        ObjectOrLink::Iri(target.clone()),
    )
}

fn sender(activity: &Activity) -> Result<Iri> {
    activity
        .actor_id()
        .map(Iri::from)
        .ok_or_else(|| AppError::MalformedPayload("activity actor has no id".to_string()))
}

/// Drives relationship transitions for local users
pub struct RelationshipService {
    store: Arc<dyn RelationshipStore>,
    client: Arc<FederationClient>,
}

impl RelationshipService {
    pub fn new(store: Arc<dyn RelationshipStore>, client: Arc<FederationClient>) -> Self {
        Self { store, client }
    }

    /// Follow a remote actor
    ///
    /// Resolution or delivery failures return before the store is touched.
    pub async fn follow(
        &self,
        cancel: &CancellationToken,
        local: &LocalActor,
        target: &Iri,
    ) -> Result<RelationshipRecord> {
        let signer = local.signer();
        let remote = self.client.resolve_actor(cancel, &signer, target.as_str()).await?;

        let follow = follow_activity(&local.id, &remote.id);
        self.client
            .deliver(cancel, &signer, &remote.inbox, &follow)
            .await?;

        let record = self
            .store
            .upsert_following(&local.user.id, remote.id.as_str(), RelationshipStatus::Pending)
            .await?;
        tracing::info!(user = %local.user.id, target = %remote.id, "Follow requested");
        Ok(record)
    }

    /// Withdraw a follow with an Undo wrapping the original Follow
    ///
    /// Returns whether a following record existed.
    pub async fn unfollow(
        &self,
        cancel: &CancellationToken,
        local: &LocalActor,
        target: &Iri,
    ) -> Result<bool> {
        let signer = local.signer();
        let remote = self.client.resolve_actor(cancel, &signer, target.as_str()).await?;

        let undo = Activity::new(
            ActivityType::Undo,
            undo_activity_id(&local.id, &remote.id, Utc::now().timestamp()),
            local.id.clone(),
            follow_activity(&local.id, &remote.id).into(),
        );
        self.client
            .deliver(cancel, &signer, &remote.inbox, &undo)
            .await?;

        let removed = self
            .store
            .delete_following(&local.user.id, remote.id.as_str())
            .await?;
        tracing::info!(user = %local.user.id, target = %remote.id, removed, "Unfollowed");
        Ok(removed)
    }

    /// Accept an inbound Follow
    ///
    /// The follower record is written before the Accept goes out, so a
    /// failed delivery still leaves the follower in place.
    pub async fn on_follow(
        &self,
        cancel: &CancellationToken,
        local: &LocalActor,
        activity: &Activity,
    ) -> Result<()> {
        if activity.object_id() != Some(local.id.as_str()) {
            return Err(AppError::MalformedPayload(format!(
                "Follow does not target {}",
                local.id
            )));
        }
        let requester = sender(activity)?;

        self.store
            .upsert_follower(&local.user.id, requester.as_str(), RelationshipStatus::Completed)
            .await?;
        tracing::info!(user = %local.user.id, actor = %requester, "Follower added");

        self.reply_accept(cancel, local, &requester, activity).await
    }

    /// Remove a follower after an inbound `Undo(Follow)` and acknowledge it
    pub async fn on_unfollow(
        &self,
        cancel: &CancellationToken,
        local: &LocalActor,
        activity: &Activity,
    ) -> Result<()> {
        let requester = sender(activity)?;
        let follow = activity.object_activity().ok_or_else(|| {
            AppError::MalformedPayload("Undo does not embed the Follow".to_string())
        })?;
        if let Some(follow_actor) = follow.actor_id() {
            if follow_actor != requester.as_str() {
                return Err(AppError::MalformedPayload(
                    "Undo wraps a Follow sent by another actor".to_string(),
                ));
            }
        }
        if follow.object_id() != Some(local.id.as_str()) {
            return Err(AppError::MalformedPayload(format!(
                "undone Follow does not target {}",
                local.id
            )));
        }

        let removed = self
            .store
            .delete_follower(&local.user.id, requester.as_str())
            .await?;
        tracing::info!(user = %local.user.id, actor = %requester, removed, "Follower removed");

        self.reply_accept(cancel, local, &requester, activity).await
    }

    /// Complete a pending follow after the remote side accepted it
    ///
    /// Returns false when there was no pending record for the sender.
    pub async fn on_accept_follow(
        &self,
        _cancel: &CancellationToken,
        local: &LocalActor,
        activity: &Activity,
    ) -> Result<bool> {
        let remote = sender(activity)?;
        if !self.references_own_follow(local, &remote, activity) {
            tracing::debug!(user = %local.user.id, actor = %remote, "Accept for another actor's Follow");
            return Ok(false);
        }

        let completed = self
            .store
            .complete_pending(&local.user.id, RelationshipKind::Following, remote.as_str())
            .await?;
        if completed {
            tracing::info!(user = %local.user.id, actor = %remote, "Follow accepted");
        } else {
            tracing::info!(user = %local.user.id, actor = %remote, "Accept without a pending follow");
        }
        Ok(completed)
    }

    /// Drop a following record after the remote side rejected it
    pub async fn on_reject_follow(
        &self,
        _cancel: &CancellationToken,
        local: &LocalActor,
        activity: &Activity,
    ) -> Result<bool> {
        let remote = sender(activity)?;
        if !self.references_own_follow(local, &remote, activity) {
            tracing::debug!(user = %local.user.id, actor = %remote, "Reject for another actor's Follow");
            return Ok(false);
        }

        let removed = self
            .store
            .delete_following(&local.user.id, remote.as_str())
            .await?;
        tracing::info!(user = %local.user.id, actor = %remote, removed, "Follow rejected");
        Ok(removed)
    }

    /// Route an inbound activity to its transition
    ///
    /// Accept and Reject are told apart by the type of their object.
    /// Everything without a transition is acknowledged and ignored.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        local: &LocalActor,
        activity: &Activity,
    ) -> Result<InboxOutcome> {
        ACTIVITIES_RECEIVED
            .with_label_values(&[activity.kind.as_str()])
            .inc();
        tracing::info!(
            user = %local.user.id,
            actor = activity.actor_id().unwrap_or_default(),
            activity_type = %activity.kind,
            "Inbound activity"
        );

        let names_follow = self.names_follow(local, activity);
        match activity.kind {
            ActivityType::Follow => self.on_follow(cancel, local, activity).await?,
            ActivityType::Undo if activity.object_type() == Some("Follow") => {
                self.on_unfollow(cancel, local, activity).await?
            }
            ActivityType::Accept if names_follow => {
                self.on_accept_follow(cancel, local, activity).await?;
            }
            ActivityType::Reject if names_follow => {
                self.on_reject_follow(cancel, local, activity).await?;
            }
            _ => {
                tracing::debug!(
                    activity_type = %activity.kind,
                    object_type = activity.object_type().unwrap_or("link"),
                    "Ignoring activity"
                );
                return Ok(InboxOutcome::Ignored);
            }
        }
        Ok(InboxOutcome::Handled)
    }

    /// Whether an Accept/Reject object is a Follow, embedded or by our id
    fn names_follow(&self, local: &LocalActor, activity: &Activity) -> bool {
        match &activity.object {
            Some(ObjectOrLink::Iri(iri)) => activity
                .actor_id()
                .is_some_and(|remote| *iri == follow_activity_id(&local.id, &Iri::from(remote))),
            Some(object) => object.type_name() == Some("Follow"),
            None => false,
        }
    }

    /// The Follow under an Accept/Reject was sent by `local` to `remote`
    fn references_own_follow(&self, local: &LocalActor, remote: &Iri, activity: &Activity) -> bool {
        match &activity.object {
            Some(ObjectOrLink::Iri(iri)) => *iri == follow_activity_id(&local.id, remote),
            Some(ObjectOrLink::Activity(follow)) => {
                follow.actor_id().is_none_or(|actor| actor == local.id.as_str())
            }
            Some(other) => other.type_name() == Some("Follow"),
            None => false,
        }
    }

    async fn reply_accept(
        &self,
        cancel: &CancellationToken,
        local: &LocalActor,
        requester: &Iri,
        activity: &Activity,
    ) -> Result<()> {
        let signer = local.signer();
        let remote = self
            .client
            .resolve_actor(cancel, &signer, requester.as_str())
            .await?;

        let now = Utc::now();
        let accept = Activity::new(
            ActivityType::Accept,
            accept_activity_id(&local.id, now.timestamp_millis()),
            local.id.clone(),
            activity.clone().into(),
        )
        .with_to(vec![requester.clone()])
        .with_published(now);

        self.client
            .deliver(cancel, &signer, &remote.inbox, &accept)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LocalUser, MemoryStore, MockRelationshipStore};
    use crate::federation::signature::KeyPair;
    use crate::federation::test_support::{RemoteServer, client, key_pair};
    use axum::http::StatusCode;

    const LOCAL_BASE: &str = "https://local.example";

    struct Fixture {
        remote: RemoteServer,
        store: Arc<MemoryStore>,
        service: RelationshipService,
        alice: LocalActor,
    }

    fn alice(keys: KeyPair) -> LocalActor {
        LocalActor::new(LocalUser::new("u1", "alice"), LOCAL_BASE, keys)
    }

    async fn fixture(inbox_status: StatusCode) -> Fixture {
        let remote = RemoteServer::spawn(inbox_status).await;
        let keys = key_pair();
        let store = Arc::new(MemoryStore::new());
        let service = RelationshipService::new(store.clone(), Arc::new(client(&keys, true)));
        Fixture {
            remote,
            store,
            service,
            alice: alice(keys),
        }
    }

    fn inbound(kind: ActivityType, actor: &Iri, object: ObjectOrLink) -> Activity {
        Activity::new(kind, actor.join("activities/1"), actor.clone(), object)
    }

    fn inbound_follow(remote: &RemoteServer, local: &LocalActor) -> Activity {
        inbound(
            ActivityType::Follow,
            &remote.actor_id("bob"),
            ObjectOrLink::Iri(local.id.clone()),
        )
    }

    #[test]
    fn activity_ids_are_deterministic() {
        let local = Iri::from("https://local.example/users/u1");
        let target = Iri::from("https://remote.example/users/bob");
        assert_eq!(
            follow_activity_id(&local, &target).as_str(),
            "https://local.example/users/u1/follow/https://remote.example/users/bob"
        );
        assert_eq!(
            undo_activity_id(&local, &target, 1_700_000_000).as_str(),
            "https://local.example/users/u1/follow/https://remote.example/users/bob/undo/1700000000"
        );
        assert_eq!(
            accept_activity_id(&local, 42).as_str(),
            "https://local.example/users/u1/accept/42"
        );
    }

    #[tokio::test]
    async fn follow_delivers_then_records_pending() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let bob = f.remote.actor_id("bob");

        let record = f
            .service
            .follow(&CancellationToken::new(), &f.alice, &bob)
            .await
            .unwrap();
        assert_eq!(record.status, RelationshipStatus::Pending);
        assert_eq!(record.kind, RelationshipKind::Following);

        let deliveries = f.remote.deliveries();
        assert_eq!(deliveries.len(), 1);
        let follow = deliveries[0].activity();
        assert_eq!(follow.kind, ActivityType::Follow);
        assert_eq!(follow.id, Some(follow_activity_id(&f.alice.id, &bob)));
        assert_eq!(follow.actor_id(), Some(f.alice.id.as_str()));
        assert_eq!(follow.object_id(), Some(bob.as_str()));
    }

    #[tokio::test]
    async fn failed_follow_delivery_leaves_no_record() {
        let remote = RemoteServer::spawn(StatusCode::INTERNAL_SERVER_ERROR).await;
        let keys = key_pair();
        let mut store = MockRelationshipStore::new();
        store.expect_upsert_relationship().never();
        let service = RelationshipService::new(Arc::new(store), Arc::new(client(&keys, true)));

        let err = service
            .follow(&CancellationToken::new(), &alice(keys), &remote.actor_id("bob"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::DeliveryFailed {
                status: Some(500),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn follow_of_unreachable_actor_fails_before_delivery() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let ghost = f.remote.actor_id("ghost");

        let err = f
            .service
            .follow(&CancellationToken::new(), &f.alice, &ghost)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnreachableActor(_)));
        assert!(f.remote.deliveries().is_empty());
        assert!(
            f.store
                .find_relationship("u1", RelationshipKind::Following, ghost.as_str())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn on_follow_records_follower_then_accepts() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let bob = f.remote.actor_id("bob");
        let follow = inbound_follow(&f.remote, &f.alice);

        let outcome = f
            .service
            .dispatch(&CancellationToken::new(), &f.alice, &follow)
            .await
            .unwrap();
        assert_eq!(outcome, InboxOutcome::Handled);

        let record = f
            .store
            .find_relationship("u1", RelationshipKind::Follower, bob.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, RelationshipStatus::Completed);

        let deliveries = f.remote.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].user, "bob");
        let accept = deliveries[0].json();
        assert_eq!(accept["type"], "Accept");
        assert_eq!(accept["actor"], f.alice.id.as_str());
        assert_eq!(accept["to"], serde_json::json!([bob.as_str()]));
        assert_eq!(accept["object"]["type"], "Follow");
        assert_eq!(accept["object"]["id"], follow.id.as_ref().unwrap().as_str());
        assert!(accept["published"].is_string());
        assert!(
            accept["id"]
                .as_str()
                .unwrap()
                .starts_with("https://local.example/users/u1/accept/")
        );
    }

    #[tokio::test]
    async fn on_follow_store_failure_aborts_before_delivery() {
        let remote = RemoteServer::spawn(StatusCode::ACCEPTED).await;
        let keys = key_pair();
        let mut store = MockRelationshipStore::new();
        store
            .expect_upsert_relationship()
            .times(1)
            .returning(|_, _, _, _| Err(AppError::Storage("store offline".to_string())));
        let service = RelationshipService::new(Arc::new(store), Arc::new(client(&keys, true)));
        let local = alice(keys);

        let err = service
            .on_follow(
                &CancellationToken::new(),
                &local,
                &inbound_follow(&remote, &local),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(remote.deliveries().is_empty());
    }

    #[tokio::test]
    async fn accept_delivery_failure_keeps_follower() {
        let f = fixture(StatusCode::FORBIDDEN).await;
        let follow = inbound_follow(&f.remote, &f.alice);

        let err = f
            .service
            .on_follow(&CancellationToken::new(), &f.alice, &follow)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailed { .. }));
        assert!(
            f.store
                .find_relationship(
                    "u1",
                    RelationshipKind::Follower,
                    f.remote.actor_id("bob").as_str()
                )
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn follow_aimed_elsewhere_is_malformed() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let follow = inbound(
            ActivityType::Follow,
            &f.remote.actor_id("bob"),
            ObjectOrLink::Iri(Iri::from("https://local.example/users/someone-else")),
        );

        let err = f
            .service
            .dispatch(&CancellationToken::new(), &f.alice, &follow)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
        assert!(
            f.store
                .list_relationships("u1", RelationshipKind::Follower)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn follow_then_undo_leaves_no_follower() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let cancel = CancellationToken::new();
        let bob = f.remote.actor_id("bob");
        let follow = inbound_follow(&f.remote, &f.alice);

        f.service.dispatch(&cancel, &f.alice, &follow).await.unwrap();
        let undo = inbound(ActivityType::Undo, &bob, follow.into());
        let outcome = f.service.dispatch(&cancel, &f.alice, &undo).await.unwrap();
        assert_eq!(outcome, InboxOutcome::Handled);

        assert!(
            f.store
                .list_relationships("u1", RelationshipKind::Follower)
                .await
                .unwrap()
                .is_empty()
        );
        let deliveries = f.remote.deliveries();
        assert_eq!(deliveries.len(), 2);
        let second = deliveries[1].json();
        assert_eq!(second["type"], "Accept");
        assert_eq!(second["object"]["type"], "Undo");
    }

    #[tokio::test]
    async fn undo_of_someone_elses_follow_is_rejected() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let follow = inbound(
            ActivityType::Follow,
            &f.remote.actor_id("carol"),
            ObjectOrLink::Iri(f.alice.id.clone()),
        );
        let undo = inbound(ActivityType::Undo, &f.remote.actor_id("bob"), follow.into());

        let err = f
            .service
            .dispatch(&CancellationToken::new(), &f.alice, &undo)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn undo_of_follow_for_another_user_keeps_follower() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let cancel = CancellationToken::new();
        let bob = f.remote.actor_id("bob");
        f.service
            .dispatch(&cancel, &f.alice, &inbound_follow(&f.remote, &f.alice))
            .await
            .unwrap();

        let other_follow = inbound(
            ActivityType::Follow,
            &bob,
            ObjectOrLink::Iri(Iri::from("https://local.example/users/u2")),
        );
        let undo = inbound(ActivityType::Undo, &bob, other_follow.into());

        let err = f.service.dispatch(&cancel, &f.alice, &undo).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
        assert!(
            f.store
                .find_relationship("u1", RelationshipKind::Follower, bob.as_str())
                .await
                .unwrap()
                .is_some()
        );
        // Only the Accept for the original Follow went out
        assert_eq!(f.remote.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn accept_completes_pending_follow() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let cancel = CancellationToken::new();
        let bob = f.remote.actor_id("bob");
        f.service.follow(&cancel, &f.alice, &bob).await.unwrap();

        let sent = f.remote.deliveries()[0].activity();
        let accept = inbound(ActivityType::Accept, &bob, sent.into());
        let outcome = f.service.dispatch(&cancel, &f.alice, &accept).await.unwrap();
        assert_eq!(outcome, InboxOutcome::Handled);

        let record = f
            .store
            .find_relationship("u1", RelationshipKind::Following, bob.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, RelationshipStatus::Completed);
    }

    #[tokio::test]
    async fn accept_by_bare_follow_id_counts() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let cancel = CancellationToken::new();
        let bob = f.remote.actor_id("bob");
        f.service.follow(&cancel, &f.alice, &bob).await.unwrap();

        let accept = inbound(
            ActivityType::Accept,
            &bob,
            ObjectOrLink::Iri(follow_activity_id(&f.alice.id, &bob)),
        );
        assert_eq!(
            f.service.dispatch(&cancel, &f.alice, &accept).await.unwrap(),
            InboxOutcome::Handled
        );
        assert!(
            f.service
                .on_accept_follow(&cancel, &f.alice, &accept)
                .await
                .is_ok_and(|completed| !completed)
        );
    }

    #[tokio::test]
    async fn accept_without_pending_follow_is_noop() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let bob = f.remote.actor_id("bob");
        let accept = inbound(
            ActivityType::Accept,
            &bob,
            follow_activity(&f.alice.id, &bob).into(),
        );

        let completed = f
            .service
            .on_accept_follow(&CancellationToken::new(), &f.alice, &accept)
            .await
            .unwrap();
        assert!(!completed);
        assert!(
            f.store
                .find_relationship("u1", RelationshipKind::Following, bob.as_str())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn reject_removes_following() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let cancel = CancellationToken::new();
        let bob = f.remote.actor_id("bob");
        f.service.follow(&cancel, &f.alice, &bob).await.unwrap();

        let reject = inbound(
            ActivityType::Reject,
            &bob,
            follow_activity(&f.alice.id, &bob).into(),
        );
        assert_eq!(
            f.service.dispatch(&cancel, &f.alice, &reject).await.unwrap(),
            InboxOutcome::Handled
        );
        assert!(
            f.store
                .find_relationship("u1", RelationshipKind::Following, bob.as_str())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unfollow_sends_undo_wrapping_original_follow() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let cancel = CancellationToken::new();
        let bob = f.remote.actor_id("bob");
        f.service.follow(&cancel, &f.alice, &bob).await.unwrap();

        assert!(f.service.unfollow(&cancel, &f.alice, &bob).await.unwrap());

        let deliveries = f.remote.deliveries();
        let original = deliveries[0].activity();
        let undo = deliveries[1].activity();
        assert_eq!(undo.kind, ActivityType::Undo);
        assert!(
            undo.id
                .as_ref()
                .unwrap()
                .as_str()
                .starts_with(&format!("{}/undo/", follow_activity_id(&f.alice.id, &bob)))
        );
        assert_eq!(undo.object_activity(), Some(&original));
        assert!(
            f.store
                .find_relationship("u1", RelationshipKind::Following, bob.as_str())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unsupported_activities_are_ignored() {
        let f = fixture(StatusCode::ACCEPTED).await;
        let cancel = CancellationToken::new();
        let bob = f.remote.actor_id("bob");

        let create = inbound(
            ActivityType::Create,
            &bob,
            ObjectOrLink::Iri(Iri::from("https://remote.example/notes/1")),
        );
        let odd_accept = inbound(
            ActivityType::Accept,
            &bob,
            ObjectOrLink::Iri(Iri::from("https://remote.example/offers/1")),
        );
        let custom = inbound(
            ActivityType::Other("EmojiReact".to_string()),
            &bob,
            ObjectOrLink::Iri(f.alice.id.clone()),
        );

        for activity in [create, odd_accept, custom] {
            assert_eq!(
                f.service.dispatch(&cancel, &f.alice, &activity).await.unwrap(),
                InboxOutcome::Ignored
            );
        }
        assert!(f.remote.deliveries().is_empty());
    }
}
