use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use thiserror::Error;

use crate::{
    util::random_string, IssuedToken, MemberAdd, MixtapeContext, QueueEntry, RoomDocument,
    RoomEvent, RoomSettings, RoomStore, SessionGuard, StoreError, UpdatedRoomSettings,
};

pub const MIN_LIFETIME_MINUTES: i64 = 1;
pub const MAX_LIFETIME_MINUTES: i64 = 300;

const ROOM_ID_LENGTH: usize = 16;
const ROOM_PASSWORD_LENGTH: usize = 16;

/// Room lifecycle: creation, settings, membership, and deletion
pub struct RoomRegistry<S> {
    context: MixtapeContext<S>,
    guard: SessionGuard<S>,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Cannot create a room while already hosting one")]
    AlreadyHosting,
    #[error("Room does not exist")]
    RoomNotFound,
    #[error("Room password is incorrect")]
    InvalidPassword,
    #[error("User is already in this room")]
    AlreadyInRoom,
    #[error("Room is full")]
    RoomFull,
    #[error("Access token does not match this room")]
    InvalidAccessToken,
    #[error("No songs have been played in this room yet")]
    NoSongsPlayed,
    #[error("Lifetime must be between 1 and 300 minutes")]
    InvalidLifetime,
    #[error("A room must allow at least one user")]
    InvalidCapacity,
    #[error(transparent)]
    Store(StoreError),
}

/// A new room as requested by its host
#[derive(Debug)]
pub struct NewRoom {
    pub host_username: String,
    pub room_name: String,
    pub lifetime_minutes: i64,
    pub max_users: u32,
    pub is_public: bool,
}

/// Settings a host may change after creation. The lifetime is absent on
/// purpose; it cannot be extended mid-session.
#[derive(Debug)]
pub struct UpdateRoomSettings {
    pub host_username: String,
    pub access_token: String,
    pub room_name: String,
    pub max_users: u32,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct RoomProperties {
    pub room_id: String,
    pub room_password: String,
    pub host_id: String,
    pub room_name: String,
    pub max_users: u32,
    pub is_public: bool,
    /// Minutes left of the room's lifetime. Computed on settings reads.
    pub time_left: Option<i64>,
}

/// A created room: its properties, the host's access token, and the creation
/// timestamp
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub properties: RoomProperties,
    pub access_token: IssuedToken,
    pub timestamp: DateTime<Utc>,
}

/// The end-of-room report computed from the play history
#[derive(Debug, Clone)]
pub struct RoomReport {
    pub most_liked_user: VoteLeader,
    pub most_disliked_user: VoteLeader,
    pub most_liked_song: QueueEntry,
    pub most_disliked_song: QueueEntry,
}

#[derive(Debug, Clone)]
pub struct VoteLeader {
    pub username: String,
    pub count: i64,
}

/// A snapshot for clients: the implicit now-playing head, the rest of the
/// queue, and the public settings
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: String,
    pub current_song: Option<QueueEntry>,
    pub queue: Vec<QueueEntry>,
    pub user_count: usize,
    pub name: String,
    pub max_users: u32,
    pub is_public: bool,
}

impl<S> RoomRegistry<S>
where
    S: RoomStore,
{
    pub fn new(context: &MixtapeContext<S>) -> Self {
        Self {
            context: context.clone(),
            guard: SessionGuard::new(&context.store),
        }
    }

    /// Creates a new room with the host as its first member
    pub async fn create_room(&self, new_room: NewRoom) -> Result<CreatedRoom, RoomError> {
        if !(MIN_LIFETIME_MINUTES..=MAX_LIFETIME_MINUTES).contains(&new_room.lifetime_minutes) {
            return Err(RoomError::InvalidLifetime);
        }

        if new_room.max_users == 0 {
            return Err(RoomError::InvalidCapacity);
        }

        // Claiming the hosting slot first means two concurrent creates for
        // the same host cannot both pass the check.
        let began = self
            .guard
            .begin(&new_room.host_username)
            .await
            .map_err(RoomError::Store)?;

        if !began {
            return Err(RoomError::AlreadyHosting);
        }

        let room_id = random_string(ROOM_ID_LENGTH);
        let room_password = random_string(ROOM_PASSWORD_LENGTH);

        let access_token = self.context.issuer.issue(
            &new_room.host_username,
            &room_id,
            Duration::minutes(new_room.lifetime_minutes),
        );

        let room = RoomDocument {
            room_id: room_id.clone(),
            host_id: new_room.host_username.clone(),
            access_token: access_token.token.clone(),
            settings: RoomSettings {
                name: new_room.room_name.clone(),
                lifetime_minutes: new_room.lifetime_minutes,
                max_users: new_room.max_users,
                is_public: new_room.is_public,
                created_at: Utc::now(),
                room_password: room_password.clone(),
            },
            users_joined: vec![new_room.host_username.clone()],
            song_count: 0,
            current_queue: vec![],
            played_songs: vec![],
        };

        if let Err(e) = self.context.store.insert_room(room).await {
            // Give the slot back so a failed insert doesn't wedge the host
            if let Err(release) = self.guard.end(&new_room.host_username).await {
                warn!(
                    "Failed to release hosting slot for {}: {release}",
                    new_room.host_username
                );
            }

            return Err(RoomError::Store(e));
        }

        info!("Room {room_id} created by {}", new_room.host_username);

        Ok(CreatedRoom {
            properties: RoomProperties {
                room_id,
                room_password,
                host_id: new_room.host_username,
                room_name: new_room.room_name,
                max_users: new_room.max_users,
                is_public: new_room.is_public,
                time_left: None,
            },
            access_token,
            timestamp: Utc::now(),
        })
    }

    /// Updates the settings of the room the user is hosting
    pub async fn update_settings(
        &self,
        update: UpdateRoomSettings,
    ) -> Result<RoomProperties, RoomError> {
        if update.max_users == 0 {
            return Err(RoomError::InvalidCapacity);
        }

        let room = self
            .context
            .store
            .room_by_host(&update.host_username)
            .await
            .map_err(room_not_found)?;

        if room.access_token != update.access_token {
            return Err(RoomError::InvalidAccessToken);
        }

        let updated = self
            .context
            .store
            .update_room_settings(UpdatedRoomSettings {
                room_id: room.room_id,
                name: update.room_name,
                max_users: update.max_users,
                is_public: update.is_public,
            })
            .await
            .map_err(room_not_found)?;

        let time_left = time_left(&updated.settings);
        Ok(properties_of(&updated, Some(time_left)))
    }

    /// Adds a user to a room. Checks run in order: room existence, the room
    /// password, duplicate membership, capacity. The last two are
    /// re-validated by the store inside the append itself.
    pub async fn add_user_to_room(
        &self,
        room_id: &str,
        room_password: &str,
        username: &str,
    ) -> Result<(), RoomError> {
        let room = self
            .context
            .store
            .room_by_id(room_id)
            .await
            .map_err(room_not_found)?;

        // Plain equality against the per-room secret, never the account
        // password
        if room.settings.room_password != room_password {
            return Err(RoomError::InvalidPassword);
        }

        let outcome = self
            .context
            .store
            .add_member_if_open(room_id, username)
            .await
            .map_err(room_not_found)?;

        match outcome {
            MemberAdd::Added => {
                info!("{username} joined room {room_id}");

                self.context.emit(RoomEvent::UserJoined {
                    room_id: room_id.to_string(),
                    username: username.to_string(),
                });

                Ok(())
            }
            MemberAdd::AlreadyInRoom => Err(RoomError::AlreadyInRoom),
            MemberAdd::RoomFull => Err(RoomError::RoomFull),
        }
    }

    /// Deletes a room and returns its end-of-room report. Requires the
    /// stored access token verbatim.
    pub async fn delete_room(
        &self,
        access_token: &str,
        host_username: &str,
        room_id: &str,
    ) -> Result<RoomReport, RoomError> {
        let room = self
            .context
            .store
            .room_by_id(room_id)
            .await
            .map_err(room_not_found)?;

        if room.host_id != host_username {
            return Err(RoomError::RoomNotFound);
        }

        if room.access_token != access_token {
            return Err(RoomError::InvalidAccessToken);
        }

        if room.played_songs.is_empty() {
            return Err(RoomError::NoSongsPlayed);
        }

        let report = end_of_room_report(&room.played_songs);

        self.context
            .store
            .delete_room(room_id)
            .await
            .map_err(room_not_found)?;

        // The deletion is the operation of record; bookkeeping failures
        // after it are logged, never surfaced.
        if let Err(e) = self.guard.end(host_username).await {
            warn!("Failed to clear the hosting flag for {host_username}: {e}");
        }

        if let Err(e) = self
            .context
            .store
            .append_previous_session(host_username, room_id)
            .await
        {
            warn!("Failed to record {room_id} in {host_username}'s session history: {e}");
        }

        info!("Room {room_id} deleted by {host_username}");

        self.context.emit(RoomEvent::RoomClosed {
            room_id: room_id.to_string(),
            host_id: host_username.to_string(),
        });

        Ok(report)
    }

    /// A read-only snapshot of a room. The head of the queue is the implicit
    /// now-playing entry.
    pub async fn room_state(&self, room_id: &str) -> Result<RoomState, RoomError> {
        let room = self
            .context
            .store
            .room_by_id(room_id)
            .await
            .map_err(room_not_found)?;

        let mut queue = room.current_queue;

        let current_song = if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        };

        Ok(RoomState {
            room_id: room.room_id,
            current_song,
            queue,
            user_count: room.users_joined.len(),
            name: room.settings.name,
            max_users: room.settings.max_users,
            is_public: room.settings.is_public,
        })
    }
}

fn room_not_found(e: StoreError) -> RoomError {
    if e.is_missing("room") {
        RoomError::RoomNotFound
    } else {
        RoomError::Store(e)
    }
}

fn properties_of(room: &RoomDocument, time_left: Option<i64>) -> RoomProperties {
    RoomProperties {
        room_id: room.room_id.clone(),
        room_password: room.settings.room_password.clone(),
        host_id: room.host_id.clone(),
        room_name: room.settings.name.clone(),
        max_users: room.settings.max_users,
        is_public: room.settings.is_public,
        time_left,
    }
}

fn time_left(settings: &RoomSettings) -> i64 {
    let elapsed = (Utc::now() - settings.created_at).num_minutes();
    settings.lifetime_minutes - elapsed
}

/// Totals per contributing user and per song over the play history. Ties are
/// broken by stored iteration order: the first entry to reach the maximum
/// keeps it.
fn end_of_room_report(played: &[QueueEntry]) -> RoomReport {
    let mut likes_by_user: Vec<(String, i64)> = Vec::new();
    let mut dislikes_by_user: Vec<(String, i64)> = Vec::new();

    for entry in played {
        crate::metrics::tally(
            &mut likes_by_user,
            &entry.metadata.added_by,
            entry.metadata.likes,
        );
        crate::metrics::tally(
            &mut dislikes_by_user,
            &entry.metadata.added_by,
            entry.metadata.dislikes,
        );
    }

    RoomReport {
        most_liked_user: leader(&likes_by_user),
        most_disliked_user: leader(&dislikes_by_user),
        most_liked_song: extreme_by(played, |e| e.metadata.likes).clone(),
        most_disliked_song: extreme_by(played, |e| e.metadata.dislikes).clone(),
    }
}

/// The first element holding the maximum wins
fn leader(totals: &[(String, i64)]) -> VoteLeader {
    let mut best = &totals[0];

    for candidate in &totals[1..] {
        if candidate.1 > best.1 {
            best = candidate;
        }
    }

    VoteLeader {
        username: best.0.clone(),
        count: best.1,
    }
}

fn extreme_by(entries: &[QueueEntry], count: impl Fn(&QueueEntry) -> i64) -> &QueueEntry {
    let mut best = &entries[0];

    for candidate in &entries[1..] {
        if count(candidate) > count(best) {
            best = candidate;
        }
    }

    best
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{MemoryStore, NewSongEntry, NewUser, TokenIssuer, VoteKind};

    async fn context_with_user(username: &str) -> MixtapeContext<MemoryStore> {
        let context = MixtapeContext::mock();
        add_user(&context, username).await;
        context
    }

    async fn add_user(context: &MixtapeContext<MemoryStore>, username: &str) {
        context
            .store
            .create_user(NewUser {
                username: username.to_string(),
                password: "hash".to_string(),
            })
            .await
            .unwrap();

        context.store.create_user_info(username).await.unwrap();
    }

    fn new_room(host: &str) -> NewRoom {
        NewRoom {
            host_username: host.to_string(),
            room_name: "friday night".to_string(),
            lifetime_minutes: 60,
            max_users: 2,
            is_public: true,
        }
    }

    #[tokio::test]
    async fn created_rooms_start_with_the_host() {
        let context = context_with_user("alice").await;
        let registry = RoomRegistry::new(&context);

        let created = registry.create_room(new_room("alice")).await.unwrap();

        let room = context
            .store
            .room_by_id(&created.properties.room_id)
            .await
            .unwrap();

        assert_eq!(room.users_joined, vec!["alice".to_string()]);
        assert_eq!(room.host_id, "alice");
        assert_eq!(room.song_count, 0);

        let claims = context
            .issuer
            .verify(&created.access_token.token)
            .expect("token is valid");
        assert_eq!(claims.room_id, created.properties.room_id);

        assert!(matches!(
            registry.create_room(new_room("alice")).await,
            Err(RoomError::AlreadyHosting)
        ));
    }

    #[tokio::test]
    async fn creation_input_is_validated() {
        let context = context_with_user("alice").await;
        let registry = RoomRegistry::new(&context);

        let mut short = new_room("alice");
        short.lifetime_minutes = 0;
        assert!(matches!(
            registry.create_room(short).await,
            Err(RoomError::InvalidLifetime)
        ));

        let mut long = new_room("alice");
        long.lifetime_minutes = 301;
        assert!(matches!(
            registry.create_room(long).await,
            Err(RoomError::InvalidLifetime)
        ));

        let mut empty = new_room("alice");
        empty.max_users = 0;
        assert!(matches!(
            registry.create_room(empty).await,
            Err(RoomError::InvalidCapacity)
        ));
    }

    #[tokio::test]
    async fn joins_are_checked_in_order() {
        let context = context_with_user("alice").await;
        let registry = RoomRegistry::new(&context);

        let created = registry.create_room(new_room("alice")).await.unwrap();
        let room_id = created.properties.room_id.clone();
        let password = created.properties.room_password.clone();

        assert!(matches!(
            registry.add_user_to_room("nowhere", &password, "bob").await,
            Err(RoomError::RoomNotFound)
        ));

        assert!(matches!(
            registry.add_user_to_room(&room_id, "wrong", "bob").await,
            Err(RoomError::InvalidPassword)
        ));

        registry
            .add_user_to_room(&room_id, &password, "bob")
            .await
            .unwrap();

        assert!(matches!(
            registry.add_user_to_room(&room_id, &password, "bob").await,
            Err(RoomError::AlreadyInRoom)
        ));

        // The host counts towards capacity, so the room is now full
        assert!(matches!(
            registry.add_user_to_room(&room_id, &password, "carol").await,
            Err(RoomError::RoomFull)
        ));
    }

    #[tokio::test]
    async fn deletion_requires_the_exact_token_and_a_played_song() {
        let context = context_with_user("alice").await;
        let registry = RoomRegistry::new(&context);

        let created = registry.create_room(new_room("alice")).await.unwrap();
        let room_id = created.properties.room_id.clone();
        let token = created.access_token.token.clone();

        assert!(matches!(
            registry.delete_room("wrong", "alice", &room_id).await,
            Err(RoomError::InvalidAccessToken)
        ));

        assert!(matches!(
            registry.delete_room(&token, "alice", &room_id).await,
            Err(RoomError::NoSongsPlayed)
        ));

        for title in ["a", "b"] {
            context
                .store
                .append_song(&room_id, NewSongEntry::mock(title, "bob"))
                .await
                .unwrap();
        }

        context
            .store
            .adjust_vote(&room_id, "song-a", VoteKind::Likes, 1)
            .await
            .unwrap();
        context
            .store
            .adjust_vote(&room_id, "song-b", VoteKind::Dislikes, 1)
            .await
            .unwrap();

        context.store.advance_queue(&room_id).await.unwrap();
        context.store.advance_queue(&room_id).await.unwrap();

        let report = registry
            .delete_room(&token, "alice", &room_id)
            .await
            .unwrap();

        assert_eq!(report.most_liked_song.song_id, "song-a");
        assert_eq!(report.most_disliked_song.song_id, "song-b");
        assert_eq!(report.most_liked_user.username, "bob");
        assert_eq!(report.most_liked_user.count, 1);

        assert!(matches!(
            registry.delete_room(&token, "alice", &room_id).await,
            Err(RoomError::RoomNotFound)
        ));

        let info = context.store.user_info_by_username("alice").await.unwrap();
        assert!(!info.in_session);
        assert_eq!(info.previous_sessions, vec![room_id]);
    }

    #[tokio::test]
    async fn report_ties_break_in_stored_order() {
        let mut first = crate::QueueEntry::from_new(NewSongEntry::mock("a", "alice"), 0);
        let mut second = crate::QueueEntry::from_new(NewSongEntry::mock("b", "bob"), 1);

        first.metadata.likes = 2;
        second.metadata.likes = 2;
        first.metadata.dislikes = 1;
        second.metadata.dislikes = 3;

        let report = end_of_room_report(&[first, second]);

        assert_eq!(report.most_liked_user.username, "alice");
        assert_eq!(report.most_liked_song.song_id, "song-a");
        assert_eq!(report.most_disliked_user.username, "bob");
        assert_eq!(report.most_disliked_song.song_id, "song-b");
    }

    #[tokio::test]
    async fn settings_updates_leave_the_lifetime_alone() {
        let context = context_with_user("alice").await;
        let registry = RoomRegistry::new(&context);

        let created = registry.create_room(new_room("alice")).await.unwrap();
        let token = created.access_token.token.clone();

        assert!(matches!(
            registry
                .update_settings(UpdateRoomSettings {
                    host_username: "alice".to_string(),
                    access_token: "wrong".to_string(),
                    room_name: "renamed".to_string(),
                    max_users: 5,
                    is_public: false,
                })
                .await,
            Err(RoomError::InvalidAccessToken)
        ));

        let properties = registry
            .update_settings(UpdateRoomSettings {
                host_username: "alice".to_string(),
                access_token: token,
                room_name: "renamed".to_string(),
                max_users: 5,
                is_public: false,
            })
            .await
            .unwrap();

        assert_eq!(properties.room_name, "renamed");
        assert_eq!(properties.max_users, 5);
        assert!(!properties.is_public);

        let time_left = properties.time_left.expect("time left is computed");
        assert!(time_left <= 60 && time_left > 0);

        let room = context
            .store
            .room_by_id(&created.properties.room_id)
            .await
            .unwrap();
        assert_eq!(room.settings.lifetime_minutes, 60);
    }
}
