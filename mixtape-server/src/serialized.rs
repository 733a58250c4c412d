//! All schemas that are exposed from endpoints are defined here
//! along with the conversion impls

use serde::Serialize;
use utoipa::ToSchema;

use mixtape_core::{
    CreatedRoom, IssuedToken, QueueEntry as CoreQueueEntry, RoomMetrics as CoreRoomMetrics,
    RoomPlaylist as CoreRoomPlaylist, RoomProperties as CoreRoomProperties,
    RoomReport as CoreRoomReport, RoomState as CoreRoomState, UserData,
    VoteLeader as CoreVoteLeader,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    username: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomProperties {
    room_id: String,
    room_password: String,
    host_id: String,
    room_name: String,
    max_users: u32,
    is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_left: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    token: String,
    /// Unix timestamp of the token's expiry
    expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    room_properties: RoomProperties,
    access_token: AccessToken,
    time_stamp: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoined {
    username: String,
    room_id: String,
    message: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    song_id: String,
    stats: SongStats,
    metadata: SongMetadata,
    already_played: bool,
    position: u32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SongStats {
    title: String,
    artist: String,
    album: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SongMetadata {
    added_by: String,
    likes: i64,
    dislikes: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteLeader {
    username: String,
    count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomReport {
    most_liked_user: VoteLeader,
    most_disliked_user: VoteLeader,
    most_liked_song: QueueEntry,
    most_disliked_song: QueueEntry,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetrics {
    most_liked_songs: Vec<QueueEntry>,
    most_disliked_songs: Vec<QueueEntry>,
    user_with_most_likes: String,
    user_with_most_dislikes: String,
    room_size: usize,
    queue_length: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    room_id: String,
    current_song: Option<QueueEntry>,
    queue: Vec<QueueEntry>,
    number_of_users: usize,
    room_name: String,
    max_users: u32,
    is_public: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlaylist {
    by_likes: Vec<QueueEntry>,
    in_order: Vec<QueueEntry>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    // The password hash stays behind the boundary
    fn to_serialized(&self) -> User {
        User {
            username: self.username.clone(),
        }
    }
}

impl ToSerialized<QueueEntry> for CoreQueueEntry {
    fn to_serialized(&self) -> QueueEntry {
        QueueEntry {
            song_id: self.song_id.clone(),
            stats: SongStats {
                title: self.stats.title.clone(),
                artist: self.stats.artist.clone(),
                album: self.stats.album.clone(),
            },
            metadata: SongMetadata {
                added_by: self.metadata.added_by.clone(),
                likes: self.metadata.likes,
                dislikes: self.metadata.dislikes,
            },
            already_played: self.already_played,
            position: self.position,
        }
    }
}

impl ToSerialized<RoomProperties> for CoreRoomProperties {
    fn to_serialized(&self) -> RoomProperties {
        RoomProperties {
            room_id: self.room_id.clone(),
            room_password: self.room_password.clone(),
            host_id: self.host_id.clone(),
            room_name: self.room_name.clone(),
            max_users: self.max_users,
            is_public: self.is_public,
            time_left: self.time_left,
        }
    }
}

impl ToSerialized<AccessToken> for IssuedToken {
    fn to_serialized(&self) -> AccessToken {
        AccessToken {
            token: self.token.clone(),
            expires_in: self.expires_at.timestamp(),
        }
    }
}

impl ToSerialized<RoomCreated> for CreatedRoom {
    fn to_serialized(&self) -> RoomCreated {
        RoomCreated {
            room_properties: self.properties.to_serialized(),
            access_token: self.access_token.to_serialized(),
            time_stamp: self.timestamp.timestamp(),
        }
    }
}

impl ToSerialized<VoteLeader> for CoreVoteLeader {
    fn to_serialized(&self) -> VoteLeader {
        VoteLeader {
            username: self.username.clone(),
            count: self.count,
        }
    }
}

impl ToSerialized<RoomReport> for CoreRoomReport {
    fn to_serialized(&self) -> RoomReport {
        RoomReport {
            most_liked_user: self.most_liked_user.to_serialized(),
            most_disliked_user: self.most_disliked_user.to_serialized(),
            most_liked_song: self.most_liked_song.to_serialized(),
            most_disliked_song: self.most_disliked_song.to_serialized(),
        }
    }
}

impl ToSerialized<RoomMetrics> for CoreRoomMetrics {
    fn to_serialized(&self) -> RoomMetrics {
        RoomMetrics {
            most_liked_songs: self.most_liked_songs.to_serialized(),
            most_disliked_songs: self.most_disliked_songs.to_serialized(),
            user_with_most_likes: self.user_with_most_likes.clone(),
            user_with_most_dislikes: self.user_with_most_dislikes.clone(),
            room_size: self.room_size,
            queue_length: self.queue_length,
        }
    }
}

impl ToSerialized<RoomState> for CoreRoomState {
    fn to_serialized(&self) -> RoomState {
        RoomState {
            room_id: self.room_id.clone(),
            current_song: self.current_song.as_ref().map(|e| e.to_serialized()),
            queue: self.queue.to_serialized(),
            number_of_users: self.user_count,
            room_name: self.name.clone(),
            max_users: self.max_users,
            is_public: self.is_public,
        }
    }
}

impl ToSerialized<RoomPlaylist> for CoreRoomPlaylist {
    fn to_serialized(&self) -> RoomPlaylist {
        RoomPlaylist {
            by_likes: self.by_likes.to_serialized(),
            in_order: self.in_order.to_serialized(),
        }
    }
}

impl RoomJoined {
    pub fn new(username: &str, room_id: &str) -> Self {
        Self {
            username: username.to_string(),
            room_id: room_id.to_string(),
            message: "Successfully joined room".to_string(),
        }
    }
}
