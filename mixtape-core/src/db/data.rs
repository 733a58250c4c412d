use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type used to identify rooms.
pub type RoomId = String;
/// The type used to identify songs within a room.
pub type SongId = String;

/// A mixtape account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub username: String,
    pub password: String,
}

/// Per-account bookkeeping that outlives any single room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoData {
    pub username: String,
    /// True while the user is hosting a room
    pub in_session: bool,
    pub join_date: DateTime<Utc>,
    /// Ids of rooms this user has hosted, append-only
    pub previous_sessions: Vec<RoomId>,
    pub liked_songs: Vec<SongId>,
    pub disliked_songs: Vec<SongId>,
}

/// A room: one host, a password-gated membership list, a live queue,
/// and a play history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDocument {
    pub room_id: RoomId,
    pub host_id: String,
    /// Opaque credential required for destructive room operations,
    /// matched exactly against what the caller presents
    pub access_token: String,
    pub settings: RoomSettings,
    /// Join order is preserved; a user appears at most once
    pub users_joined: Vec<String>,
    /// Number of songs ever added to the room. Never decreases, and is the
    /// source of every entry's `position`.
    pub song_count: u32,
    pub current_queue: Vec<QueueEntry>,
    pub played_songs: Vec<QueueEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    pub name: String,
    /// How long the room lives, in minutes. Immutable after creation.
    pub lifetime_minutes: i64,
    pub max_users: u32,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    /// The secret guests must present to join
    pub room_password: String,
}

/// One song submission with vote counters and play status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub song_id: SongId,
    pub stats: SongStats,
    pub metadata: SongMetadata,
    /// Flips to true exactly once, when the entry moves into the history
    pub already_played: bool,
    /// The value of `song_count` when this entry was added.
    /// Stable across reorders of the live queue.
    pub position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongStats {
    pub title: String,
    pub artist: String,
    pub album: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongMetadata {
    pub added_by: String,
    pub likes: i64,
    pub dislikes: i64,
}

/// A new account record. The password is expected to be hashed already.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

/// A song submission before the store assigns its position
#[derive(Debug, Clone)]
pub struct NewSongEntry {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub added_by: String,
}

/// Settings fields a host may change after creation
#[derive(Debug)]
pub struct UpdatedRoomSettings {
    pub room_id: RoomId,
    pub name: String,
    pub max_users: u32,
    pub is_public: bool,
}

/// Outcome of the conditional member append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAdd {
    Added,
    AlreadyInRoom,
    RoomFull,
}

/// Which counter a vote targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Likes,
    Dislikes,
}

impl QueueEntry {
    pub(crate) fn from_new(new_entry: NewSongEntry, position: u32) -> Self {
        Self {
            song_id: new_entry.song_id,
            stats: SongStats {
                title: new_entry.title,
                artist: new_entry.artist,
                album: new_entry.album,
            },
            metadata: SongMetadata {
                added_by: new_entry.added_by,
                likes: 0,
                dislikes: 0,
            },
            already_played: false,
            position,
        }
    }
}

#[cfg(test)]
impl NewSongEntry {
    pub fn mock(title: &str, added_by: &str) -> Self {
        Self {
            song_id: format!("song-{title}"),
            title: title.to_string(),
            artist: "unknown artist".to_string(),
            album: "unknown album".to_string(),
            added_by: added_by.to_string(),
        }
    }
}

#[cfg(test)]
impl RoomDocument {
    pub fn mock(room_id: &str, host: &str, max_users: u32) -> Self {
        Self {
            room_id: room_id.to_string(),
            host_id: host.to_string(),
            access_token: "token".to_string(),
            settings: RoomSettings {
                name: "test room".to_string(),
                lifetime_minutes: 60,
                max_users,
                is_public: true,
                created_at: Utc::now(),
                room_password: "secret".to_string(),
            },
            users_joined: vec![host.to_string()],
            song_count: 0,
            current_queue: vec![],
            played_songs: vec![],
        }
    }
}
