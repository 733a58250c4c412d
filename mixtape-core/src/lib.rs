mod auth;
mod db;
mod downloads;
mod events;
mod jobs;
mod metrics;
mod queues;
mod rooms;
mod sessions;
mod tokens;
mod util;

pub use auth::*;
pub use db::*;
pub use downloads::*;
pub use events::*;
pub use jobs::*;
pub use metrics::*;
pub use queues::*;
pub use rooms::*;
pub use sessions::*;
pub use tokens::*;

use std::sync::Arc;

use log::warn;

/// The mixtape engine, facilitating room lifecycle, the shared queue, and
/// vote metrics.
///
/// Every component receives its collaborators at construction; the engine
/// keeps no durable state of its own between calls.
pub struct Mixtape<S> {
    pub auth: Auth<S>,
    pub sessions: SessionGuard<S>,
    pub rooms: RoomRegistry<S>,
    pub queues: QueueManager<S>,
    pub metrics: MetricsAggregator<S>,

    context: MixtapeContext<S>,
    events: EventReceiver,
}

/// A type passed to the engine's components, to access the store, queue side
/// effects, and emit events.
pub struct MixtapeContext<S> {
    pub store: Arc<S>,
    pub issuer: Arc<dyn TokenIssuer>,
    pub effects: SideEffects,

    events: EventSender,
}

impl<S> Mixtape<S>
where
    S: RoomStore,
{
    /// Builds the engine around a store, a token issuer, and a downloader.
    /// Side effect failures are drained to the log.
    pub fn new(store: S, issuer: Arc<dyn TokenIssuer>, downloader: Arc<dyn Downloader>) -> Self {
        let store = Arc::new(store);

        let (effects, mut failures) = SideEffects::spawn(store.clone(), downloader);
        let (event_sender, event_receiver) = event_channel();

        tokio::spawn(async move {
            while let Some(failure) = failures.recv().await {
                warn!("{} failed: {}", failure.effect, failure.reason);
            }
        });

        let context = MixtapeContext {
            store: store.clone(),
            issuer,
            effects,
            events: event_sender,
        };

        Self {
            auth: Auth::new(&store),
            sessions: SessionGuard::new(&store),
            rooms: RoomRegistry::new(&context),
            queues: QueueManager::new(&context),
            metrics: MetricsAggregator::new(&context),
            events: event_receiver,
            context,
        }
    }

    /// The engine's notification stream. Events are single-shot; slow or
    /// absent consumers never block the engine.
    pub fn events(&self) -> EventReceiver {
        self.events.clone()
    }

    pub fn issuer(&self) -> Arc<dyn TokenIssuer> {
        self.context.issuer.clone()
    }

    pub fn store(&self) -> Arc<S> {
        self.context.store.clone()
    }
}

impl<S> MixtapeContext<S>
where
    S: RoomStore,
{
    pub(crate) fn emit(&self, event: RoomEvent) {
        let _ = self.events.send(event);
    }
}

impl<S> Clone for MixtapeContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            issuer: self.issuer.clone(),
            effects: self.effects.clone(),
            events: self.events.clone(),
        }
    }
}

// Realistically, the context is always created by the facade. However, in a
// test, that would drag the whole engine into scope.
#[cfg(test)]
impl MixtapeContext<MemoryStore> {
    pub(crate) fn mock() -> Self {
        let store = Arc::new(MemoryStore::new());
        let (effects, _failures) = SideEffects::spawn(store.clone(), Arc::new(NullDownloader));
        let (events, _) = event_channel();

        Self {
            store,
            issuer: Arc::new(OpaqueTokenIssuer::new()),
            effects,
            events,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn a_full_room_session_runs_end_to_end() {
        let engine = Mixtape::new(
            MemoryStore::new(),
            Arc::new(OpaqueTokenIssuer::new()),
            Arc::new(NullDownloader),
        );

        engine
            .auth
            .register(NewPlainUser {
                username: "alice".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap();

        let created = engine
            .rooms
            .create_room(NewRoom {
                host_username: "alice".to_string(),
                room_name: "friday night".to_string(),
                lifetime_minutes: 60,
                max_users: 2,
                is_public: true,
            })
            .await
            .unwrap();

        let room_id = created.properties.room_id.clone();
        let token = created.access_token.token.clone();

        let room = engine.store().room_by_id(&room_id).await.unwrap();
        assert_eq!(room.users_joined, vec!["alice".to_string()]);
        assert!(engine.issuer().verify(&token).is_ok());

        let mut ids = vec![];
        for (title, added_by) in [("a", "bob"), ("b", "carol"), ("c", "dave")] {
            let entry = engine
                .queues
                .add_song(
                    &room_id,
                    NewSong {
                        title: title.to_string(),
                        artist: "unknown artist".to_string(),
                        album: "unknown album".to_string(),
                        added_by: added_by.to_string(),
                    },
                )
                .await
                .unwrap();

            ids.push(entry.song_id);
        }

        let room = engine.store().room_by_id(&room_id).await.unwrap();
        assert_eq!(room.song_count, 3);

        let new_order = vec![ids[2].clone(), ids[0].clone(), ids[1].clone()];
        let reordered = engine.queues.update_queue(&room_id, &new_order).await.unwrap();

        let titles: Vec<_> = reordered.iter().map(|e| e.stats.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
        assert!(reordered
            .iter()
            .all(|e| e.metadata.likes == 0 && e.metadata.dislikes == 0));

        for _ in 0..2 {
            engine
                .metrics
                .song_operation(&room_id, &ids[2], "bob", "like")
                .await
                .unwrap();
        }
        engine
            .metrics
            .song_operation(&room_id, &ids[0], "carol", "dislike")
            .await
            .unwrap();

        let metrics = engine.metrics.room_metrics(&room_id).await.unwrap();
        assert_eq!(metrics.most_liked_songs[0].song_id, ids[2]);
        assert_eq!(metrics.user_with_most_likes, "dave");
        assert_eq!(metrics.room_size, 1);
        assert_eq!(metrics.queue_length, 3);

        assert!(matches!(
            engine.rooms.add_user_to_room(&room_id, "wrong", "bob").await,
            Err(RoomError::InvalidPassword)
        ));

        assert!(matches!(
            engine.rooms.delete_room("wrong", "alice", &room_id).await,
            Err(RoomError::InvalidAccessToken)
        ));

        engine.queues.next_song(&room_id).await.unwrap();

        let report = engine
            .rooms
            .delete_room(&token, "alice", &room_id)
            .await
            .unwrap();

        assert_eq!(report.most_liked_song.song_id, ids[2]);
        assert_eq!(report.most_liked_user.username, "dave");
        assert_eq!(report.most_liked_user.count, 2);
    }
}
