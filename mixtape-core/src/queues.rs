use std::collections::HashSet;

use log::info;
use thiserror::Error;

use crate::{
    util::random_string, DownloadRequest, MixtapeContext, NewSongEntry, QueueEntry, RoomEvent,
    RoomStore, SideEffect, SongId, StoreError,
};

const SONG_ID_LENGTH: usize = 16;

/// Queue mutation: append, reorder, and playback advancement
pub struct QueueManager<S> {
    context: MixtapeContext<S>,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Room does not exist")]
    RoomNotFound,
    #[error("The queue is empty")]
    QueueIsEmpty,
    #[error("New order is not a permutation of the current queue")]
    NotAPermutation,
    #[error(transparent)]
    Store(StoreError),
}

/// A song submission as it arrives from a member
#[derive(Debug, Clone)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub added_by: String,
}

impl<S> QueueManager<S>
where
    S: RoomStore,
{
    pub fn new(context: &MixtapeContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Appends a song to the end of the queue. Appending is the only
    /// insertion point; the entry's position comes from the room's song
    /// counter and never changes afterwards.
    pub async fn add_song(&self, room_id: &str, new_song: NewSong) -> Result<QueueEntry, QueueError> {
        let entry = self
            .context
            .store
            .append_song(
                room_id,
                NewSongEntry {
                    song_id: random_string(SONG_ID_LENGTH),
                    title: new_song.title,
                    artist: new_song.artist,
                    album: new_song.album,
                    added_by: new_song.added_by,
                },
            )
            .await
            .map_err(room_not_found)?;

        info!(
            "Song {} queued at position {} in room {room_id}",
            entry.stats.title, entry.position
        );

        // Retrieval happens off the request path; the append has already
        // succeeded whatever becomes of the dispatch.
        self.context
            .effects
            .queue(SideEffect::DispatchDownload(DownloadRequest {
                song_id: entry.song_id.clone(),
                title: entry.stats.title.clone(),
                artist: entry.stats.artist.clone(),
                album: entry.stats.album.clone(),
            }));

        self.context.emit(RoomEvent::SongQueued {
            room_id: room_id.to_string(),
            entry: entry.clone(),
        });

        Ok(entry)
    }

    /// The live queue in play order
    pub async fn current_queue(&self, room_id: &str) -> Result<Vec<QueueEntry>, QueueError> {
        self.context
            .store
            .current_queue(room_id)
            .await
            .map_err(room_not_found)
    }

    /// Reorders the live queue. `new_order` must be a permutation of the
    /// current song ids; anything else is rejected before the store is
    /// touched, so a malformed payload can never punch gaps into the queue.
    pub async fn update_queue(
        &self,
        room_id: &str,
        new_order: &[SongId],
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let current = self.current_queue(room_id).await?;

        if new_order.len() != current.len() {
            return Err(QueueError::NotAPermutation);
        }

        let current_ids: HashSet<&str> = current.iter().map(|e| e.song_id.as_str()).collect();
        let mut seen = HashSet::new();

        for song_id in new_order {
            if !current_ids.contains(song_id.as_str()) || !seen.insert(song_id.as_str()) {
                return Err(QueueError::NotAPermutation);
            }
        }

        self.context
            .store
            .replace_queue_order(room_id, new_order)
            .await
            .map_err(room_not_found)
    }

    /// Moves the head of the queue into the play history. The head is the
    /// implicit now-playing entry, so this is the sole queued → played
    /// transition.
    pub async fn next_song(&self, room_id: &str) -> Result<QueueEntry, QueueError> {
        let advanced = self
            .context
            .store
            .advance_queue(room_id)
            .await
            .map_err(room_not_found)?;

        let entry = advanced.ok_or(QueueError::QueueIsEmpty)?;

        info!("Room {room_id} advanced past {}", entry.stats.title);

        self.context.emit(RoomEvent::PlaybackAdvanced {
            room_id: room_id.to_string(),
            entry: entry.clone(),
        });

        Ok(entry)
    }
}

fn room_not_found(e: StoreError) -> QueueError {
    if e.is_missing("room") {
        QueueError::RoomNotFound
    } else {
        QueueError::Store(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{MemoryStore, RoomDocument};

    async fn manager_with_room(room_id: &str) -> QueueManager<MemoryStore> {
        let context = MixtapeContext::mock();

        context
            .store
            .insert_room(RoomDocument::mock(room_id, "alice", 4))
            .await
            .unwrap();

        QueueManager::new(&context)
    }

    fn song(title: &str) -> NewSong {
        NewSong {
            title: title.to_string(),
            artist: "unknown artist".to_string(),
            album: "unknown album".to_string(),
            added_by: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn added_songs_get_stable_positions() {
        let manager = manager_with_room("r1").await;

        for title in ["a", "b", "c"] {
            let entry = manager.add_song("r1", song(title)).await.unwrap();

            assert_eq!(entry.metadata.likes, 0);
            assert_eq!(entry.metadata.dislikes, 0);
            assert!(!entry.already_played);
        }

        let positions: Vec<_> = manager
            .current_queue("r1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.position)
            .collect();

        assert_eq!(positions, vec![0, 1, 2]);

        assert!(matches!(
            manager.add_song("nowhere", song("d")).await,
            Err(QueueError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn reorders_apply_without_touching_metadata() {
        let manager = manager_with_room("r1").await;

        let mut ids = vec![];
        for title in ["a", "b", "c"] {
            ids.push(manager.add_song("r1", song(title)).await.unwrap().song_id);
        }

        let new_order = vec![ids[2].clone(), ids[0].clone(), ids[1].clone()];
        let reordered = manager.update_queue("r1", &new_order).await.unwrap();

        let titles: Vec<_> = reordered.iter().map(|e| e.stats.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);

        // Positions follow their entries through the reorder
        let positions: Vec<_> = reordered.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn malformed_orders_are_rejected() {
        let manager = manager_with_room("r1").await;

        let mut ids = vec![];
        for title in ["a", "b"] {
            ids.push(manager.add_song("r1", song(title)).await.unwrap().song_id);
        }

        // Too short
        assert!(matches!(
            manager.update_queue("r1", &[ids[0].clone()]).await,
            Err(QueueError::NotAPermutation)
        ));

        // Duplicated id
        assert!(matches!(
            manager
                .update_queue("r1", &[ids[0].clone(), ids[0].clone()])
                .await,
            Err(QueueError::NotAPermutation)
        ));

        // Unknown id
        assert!(matches!(
            manager
                .update_queue("r1", &[ids[0].clone(), "ghost".to_string()])
                .await,
            Err(QueueError::NotAPermutation)
        ));

        // The queue is untouched after every rejection
        let titles: Vec<_> = manager
            .current_queue("r1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.stats.title)
            .collect();
        assert_eq!(titles, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn advancing_moves_exactly_one_song_into_history() {
        let manager = manager_with_room("r1").await;

        assert!(matches!(
            manager.next_song("r1").await,
            Err(QueueError::QueueIsEmpty)
        ));

        manager.add_song("r1", song("a")).await.unwrap();
        manager.add_song("r1", song("b")).await.unwrap();

        let played = manager.next_song("r1").await.unwrap();
        assert_eq!(played.stats.title, "a");
        assert!(played.already_played);

        let queue = manager.current_queue("r1").await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].stats.title, "b");

        let history = manager.context.store.played_songs("r1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].already_played);
    }
}
