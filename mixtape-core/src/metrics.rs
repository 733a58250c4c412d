use log::info;
use thiserror::Error;

use crate::{MixtapeContext, QueueEntry, RoomStore, SideEffect, StoreError, VoteKind};

/// How many songs the top lists carry
const TOP_LIST_LENGTH: usize = 5;

/// Vote mutation and derived statistics over a room's queue
pub struct MetricsAggregator<S> {
    context: MixtapeContext<S>,
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Room does not exist")]
    RoomNotFound,
    #[error("Song is not in the queue")]
    SongNotFound,
    #[error("[{0}] is not a valid song action | Valid actions are [like, un-like, dislike, un-dislike]")]
    InvalidOperation(String),
    #[error(transparent)]
    Store(StoreError),
}

/// A vote mutation against one song
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongAction {
    Like,
    Dislike,
    UnLike,
    UnDislike,
}

impl SongAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "like" => Some(Self::Like),
            "dislike" => Some(Self::Dislike),
            "un-like" => Some(Self::UnLike),
            "un-dislike" => Some(Self::UnDislike),
            _ => None,
        }
    }

    fn vote(self) -> (VoteKind, i64) {
        match self {
            Self::Like => (VoteKind::Likes, 1),
            Self::Dislike => (VoteKind::Dislikes, 1),
            Self::UnLike => (VoteKind::Likes, -1),
            Self::UnDislike => (VoteKind::Dislikes, -1),
        }
    }

    /// The taste set a host's action lands in, if any
    fn taste(self) -> Option<VoteKind> {
        match self {
            Self::Like => Some(VoteKind::Likes),
            Self::Dislike => Some(VoteKind::Dislikes),
            _ => None,
        }
    }
}

/// Aggregate statistics over a room's live queue
#[derive(Debug, Clone)]
pub struct RoomMetrics {
    pub most_liked_songs: Vec<QueueEntry>,
    pub most_disliked_songs: Vec<QueueEntry>,
    /// Users sharing the maximum aggregate likes, comma separated.
    /// Empty when the maximum is zero.
    pub user_with_most_likes: String,
    pub user_with_most_dislikes: String,
    pub room_size: usize,
    pub queue_length: usize,
}

/// Both playlist views handed to the notification layer
#[derive(Debug, Clone)]
pub struct RoomPlaylist {
    pub by_likes: Vec<QueueEntry>,
    pub in_order: Vec<QueueEntry>,
}

impl<S> MetricsAggregator<S>
where
    S: RoomStore,
{
    pub fn new(context: &MixtapeContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Applies a vote action to one song as a targeted counter update. A
    /// host's own like or dislike also lands in their taste sets, off the
    /// request path.
    pub async fn song_operation(
        &self,
        room_id: &str,
        song_id: &str,
        user_id: &str,
        action: &str,
    ) -> Result<(), MetricsError> {
        let action = SongAction::parse(action)
            .ok_or_else(|| MetricsError::InvalidOperation(action.to_string()))?;

        let room = self
            .context
            .store
            .room_by_id(room_id)
            .await
            .map_err(map_store)?;

        if user_id == room.host_id {
            if let Some(kind) = action.taste() {
                self.context.effects.queue(SideEffect::RecordHostTaste {
                    username: user_id.to_string(),
                    song_id: song_id.to_string(),
                    kind,
                });
            }
        }

        info!("{user_id} performed {action:?} on {song_id} in room {room_id}");

        let (kind, delta) = action.vote();

        self.context
            .store
            .adjust_vote(room_id, song_id, kind, delta)
            .await
            .map_err(map_store)
    }

    /// Derived statistics over the live queue. The play history does not
    /// participate.
    pub async fn room_metrics(&self, room_id: &str) -> Result<RoomMetrics, MetricsError> {
        let room = self
            .context
            .store
            .room_by_id(room_id)
            .await
            .map_err(map_store)?;

        let queue = room.current_queue;

        // Stable sorts keep stored order between equal counters
        let mut by_likes = queue.clone();
        by_likes.sort_by(|a, b| b.metadata.likes.cmp(&a.metadata.likes));
        by_likes.truncate(TOP_LIST_LENGTH);

        let mut by_dislikes = queue.clone();
        by_dislikes.sort_by(|a, b| b.metadata.dislikes.cmp(&a.metadata.dislikes));
        by_dislikes.truncate(TOP_LIST_LENGTH);

        let mut likes_by_user: Vec<(String, i64)> = Vec::new();
        let mut dislikes_by_user: Vec<(String, i64)> = Vec::new();

        for entry in &queue {
            if entry.metadata.added_by.is_empty() {
                continue;
            }

            tally(
                &mut likes_by_user,
                &entry.metadata.added_by,
                entry.metadata.likes,
            );
            tally(
                &mut dislikes_by_user,
                &entry.metadata.added_by,
                entry.metadata.dislikes,
            );
        }

        Ok(RoomMetrics {
            most_liked_songs: by_likes,
            most_disliked_songs: by_dislikes,
            user_with_most_likes: tied_leaders(&likes_by_user),
            user_with_most_dislikes: tied_leaders(&dislikes_by_user),
            room_size: room.users_joined.len(),
            queue_length: queue.len(),
        })
    }

    /// The play history, append order = play order
    pub async fn queue_history(&self, room_id: &str) -> Result<Vec<QueueEntry>, MetricsError> {
        self.context
            .store
            .played_songs(room_id)
            .await
            .map_err(map_store)
    }

    /// The played songs sorted by likes, alongside their stored order
    pub async fn rooms_playlist(&self, room_id: &str) -> Result<RoomPlaylist, MetricsError> {
        let played = self
            .context
            .store
            .played_songs(room_id)
            .await
            .map_err(map_store)?;

        let mut by_likes = played.clone();
        by_likes.sort_by(|a, b| b.metadata.likes.cmp(&a.metadata.likes));

        Ok(RoomPlaylist {
            by_likes,
            in_order: played,
        })
    }
}

/// Folds an amount into per-user totals, keeping first-seen order so later
/// tie-breaks are stable
pub(crate) fn tally(totals: &mut Vec<(String, i64)>, key: &str, amount: i64) {
    match totals.iter_mut().find(|(k, _)| k.as_str() == key) {
        Some((_, total)) => *total += amount,
        None => totals.push((key.to_string(), amount)),
    }
}

/// All users sharing the maximum, joined in first-seen order. Nobody leads
/// when the maximum is zero.
fn tied_leaders(totals: &[(String, i64)]) -> String {
    let max = totals.iter().map(|(_, total)| *total).max().unwrap_or(0);

    if max <= 0 {
        return String::new();
    }

    let leaders: Vec<_> = totals
        .iter()
        .filter(|(_, total)| *total == max)
        .map(|(user, _)| user.as_str())
        .collect();

    leaders.join(", ")
}

fn map_store(e: StoreError) -> MetricsError {
    if e.is_missing("room") {
        MetricsError::RoomNotFound
    } else if e.is_missing("song") {
        MetricsError::SongNotFound
    } else {
        MetricsError::Store(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{MemoryStore, NewSong, QueueManager, RoomDocument};

    struct Fixture {
        metrics: MetricsAggregator<MemoryStore>,
        queues: QueueManager<MemoryStore>,
    }

    async fn fixture(room_id: &str) -> Fixture {
        let context = MixtapeContext::mock();

        context
            .store
            .insert_room(RoomDocument::mock(room_id, "alice", 4))
            .await
            .unwrap();

        Fixture {
            metrics: MetricsAggregator::new(&context),
            queues: QueueManager::new(&context),
        }
    }

    fn song(title: &str, added_by: &str) -> NewSong {
        NewSong {
            title: title.to_string(),
            artist: "unknown artist".to_string(),
            album: "unknown album".to_string(),
            added_by: added_by.to_string(),
        }
    }

    #[tokio::test]
    async fn likes_round_trip_and_clamp_at_zero() {
        let f = fixture("r1").await;
        let entry = f.queues.add_song("r1", song("a", "bob")).await.unwrap();

        f.metrics
            .song_operation("r1", &entry.song_id, "bob", "like")
            .await
            .unwrap();
        f.metrics
            .song_operation("r1", &entry.song_id, "bob", "un-like")
            .await
            .unwrap();
        f.metrics
            .song_operation("r1", &entry.song_id, "bob", "un-like")
            .await
            .unwrap();

        let queue = f.queues.current_queue("r1").await.unwrap();
        assert_eq!(queue[0].metadata.likes, 0);

        assert!(matches!(
            f.metrics
                .song_operation("r1", &entry.song_id, "bob", "skip")
                .await,
            Err(MetricsError::InvalidOperation(_))
        ));

        assert!(matches!(
            f.metrics
                .song_operation("r1", "ghost", "bob", "like")
                .await,
            Err(MetricsError::SongNotFound)
        ));

        assert!(matches!(
            f.metrics
                .song_operation("nowhere", &entry.song_id, "bob", "like")
                .await,
            Err(MetricsError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn top_lists_are_capped_sorted_and_tie_stable() {
        let f = fixture("r1").await;

        let mut ids = vec![];
        for title in ["a", "b", "c", "d", "e", "f", "g"] {
            ids.push(f.queues.add_song("r1", song(title, "bob")).await.unwrap().song_id);
        }

        // g gets 3 likes, c and e tie at 2, the rest stay at 0
        for _ in 0..3 {
            f.metrics
                .song_operation("r1", &ids[6], "bob", "like")
                .await
                .unwrap();
        }
        for id in [&ids[2], &ids[4]] {
            for _ in 0..2 {
                f.metrics.song_operation("r1", id, "bob", "like").await.unwrap();
            }
        }

        let report = f.metrics.room_metrics("r1").await.unwrap();

        assert_eq!(report.most_liked_songs.len(), 5);

        let titles: Vec<_> = report
            .most_liked_songs
            .iter()
            .map(|e| e.stats.title.as_str())
            .collect();

        // Ties at 2 and at 0 keep stored order
        assert_eq!(titles, vec!["g", "c", "e", "a", "b"]);

        assert_eq!(report.queue_length, 7);
        assert_eq!(report.room_size, 1);
    }

    #[tokio::test]
    async fn vote_leaders_join_ties_and_vanish_at_zero() {
        let f = fixture("r1").await;

        let a = f.queues.add_song("r1", song("a", "bob")).await.unwrap();
        let b = f.queues.add_song("r1", song("b", "carol")).await.unwrap();

        let report = f.metrics.room_metrics("r1").await.unwrap();
        assert_eq!(report.user_with_most_likes, "");
        assert_eq!(report.user_with_most_dislikes, "");

        f.metrics
            .song_operation("r1", &a.song_id, "dave", "like")
            .await
            .unwrap();
        f.metrics
            .song_operation("r1", &b.song_id, "dave", "like")
            .await
            .unwrap();

        let report = f.metrics.room_metrics("r1").await.unwrap();
        assert_eq!(report.user_with_most_likes, "bob, carol");
    }

    #[tokio::test]
    async fn playlist_views_cover_the_history() {
        let f = fixture("r1").await;

        let a = f.queues.add_song("r1", song("a", "bob")).await.unwrap();
        let b = f.queues.add_song("r1", song("b", "carol")).await.unwrap();

        f.metrics
            .song_operation("r1", &b.song_id, "dave", "like")
            .await
            .unwrap();

        f.queues.next_song("r1").await.unwrap();
        f.queues.next_song("r1").await.unwrap();

        let history = f.metrics.queue_history("r1").await.unwrap();
        let titles: Vec<_> = history.iter().map(|e| e.stats.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);

        let playlist = f.metrics.rooms_playlist("r1").await.unwrap();

        let by_likes: Vec<_> = playlist
            .by_likes
            .iter()
            .map(|e| e.stats.title.as_str())
            .collect();
        assert_eq!(by_likes, vec!["b", "a"]);

        let in_order: Vec<_> = playlist
            .in_order
            .iter()
            .map(|e| e.stats.title.as_str())
            .collect();
        assert_eq!(in_order, vec!["a", "b"]);

        let _ = a;
    }
}
