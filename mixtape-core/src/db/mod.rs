use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An unknown or internal error happened with the store
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A store round-trip exceeded its deadline
    #[error("Store call timed out")]
    Timeout,
    /// A record already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    /// A record doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl StoreError {
    /// True when this is a NotFound for the given resource
    pub fn is_missing(&self, wanted: &str) -> bool {
        matches!(self, Self::NotFound { resource, .. } if *resource == wanted)
    }
}

/// Represents a type that can persist mixtape accounts and rooms.
///
/// Methods that re-validate state before writing (`try_begin_session`,
/// `add_member_if_open`, `append_song`, `advance_queue`, `adjust_vote`) must
/// execute as a single conditional update against the store. That durable
/// primitive, not any in-process lock, is the unit of atomicity the engine
/// relies on.
#[async_trait]
pub trait RoomStore: Send + Sync + 'static {
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn create_user_info(&self, username: &str) -> Result<UserInfoData>;
    async fn user_info_by_username(&self, username: &str) -> Result<UserInfoData>;

    async fn set_in_session(&self, username: &str, in_session: bool) -> Result<()>;
    /// Flips `in_session` from false to true in one round-trip.
    /// Returns false when the flag was already set.
    async fn try_begin_session(&self, username: &str) -> Result<bool>;
    async fn append_previous_session(&self, username: &str, room_id: &str) -> Result<()>;
    /// Adds the song to the user's liked or disliked set, ignoring duplicates
    async fn record_song_taste(&self, username: &str, song_id: &str, kind: VoteKind)
        -> Result<()>;

    async fn insert_room(&self, room: RoomDocument) -> Result<()>;
    async fn room_by_id(&self, room_id: &str) -> Result<RoomDocument>;
    async fn room_by_host(&self, host_id: &str) -> Result<RoomDocument>;
    async fn room_exists(&self, room_id: &str) -> Result<bool>;
    async fn update_room_settings(&self, update: UpdatedRoomSettings) -> Result<RoomDocument>;
    async fn delete_room(&self, room_id: &str) -> Result<()>;

    /// Appends a member unless they are already in the room or the room is at
    /// capacity, re-validating both against the stored record.
    async fn add_member_if_open(&self, room_id: &str, username: &str) -> Result<MemberAdd>;

    /// Appends the entry to the live queue with `position` taken from the
    /// room's song counter, incrementing the counter in the same unit.
    async fn append_song(&self, room_id: &str, new_entry: NewSongEntry) -> Result<QueueEntry>;
    async fn current_queue(&self, room_id: &str) -> Result<Vec<QueueEntry>>;
    async fn played_songs(&self, room_id: &str) -> Result<Vec<QueueEntry>>;
    /// Rewrites the live queue's order in place. Callers must pass a
    /// permutation of the stored song ids; entries are otherwise untouched.
    async fn replace_queue_order(&self, room_id: &str, order: &[SongId])
        -> Result<Vec<QueueEntry>>;
    /// Dequeues the head of the live queue into the play history, marking it
    /// played, as one unit. Returns None when the queue is empty.
    async fn advance_queue(&self, room_id: &str) -> Result<Option<QueueEntry>>;
    /// Applies an increment to one live entry's vote counter without
    /// rewriting the rest of the record. Counters never go below zero.
    async fn adjust_vote(
        &self,
        room_id: &str,
        song_id: &str,
        kind: VoteKind,
        delta: i64,
    ) -> Result<()>;
}

/// Helper trait to reduce boilerplate
pub trait IntoStoreError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> StoreError;
    fn any(self) -> StoreError;
}

/// Helper trait to reduce boilerplate
pub trait StoreResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> StoreResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(StoreError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
