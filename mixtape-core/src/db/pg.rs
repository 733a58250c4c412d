use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError, FromRow, PgPool,
};

use super::{
    IntoStoreError, MemberAdd, NewSongEntry, NewUser, QueueEntry, Result, RoomDocument,
    RoomSettings, RoomStore, SongId, SongMetadata, SongStats, StoreError, StoreResult,
    UpdatedRoomSettings, UserData, UserInfoData, VoteKind,
};

/// A postgres store implementation for mixtape.
///
/// Rooms and accounts are rows; queue entries live in their own table so vote
/// increments, the member append, reorders, and the head advance each execute
/// as one conditional statement.
pub struct PgStore {
    pool: PgPool,
}

const ENTRY_COLUMNS: &str =
    "song_id, title, artist, album, added_by, likes, dislikes, already_played, position";

impl PgStore {
    /// Bound on waiting for a connection, so a saturated pool surfaces as
    /// [StoreError::Timeout] instead of hanging the request
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn ensure_room(&self, room_id: &str) -> Result<()> {
        if !self.room_exists(room_id).await? {
            return Err(StoreError::NotFound {
                resource: "room",
                identifier: "room_id",
            });
        }

        Ok(())
    }

    async fn ensure_user_info(&self, username: &str) -> Result<()> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM user_info WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if count == 0 {
            return Err(StoreError::NotFound {
                resource: "user info",
                identifier: "username",
            });
        }

        Ok(())
    }

    async fn entries(&self, room_id: &str, played: bool) -> Result<Vec<QueueEntry>> {
        let sql = if played {
            format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries
                 WHERE room_id = $1 AND already_played
                 ORDER BY play_order"
            )
        } else {
            format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries
                 WHERE room_id = $1 AND NOT already_played
                 ORDER BY queue_index"
            )
        };

        let rows = query_as::<_, EntryRow>(&sql)
            .bind(room_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl RoomStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        query("INSERT INTO users (username, password) VALUES ($1, $2)")
            .bind(&new_user.username)
            .bind(&new_user.password)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(UserData {
            username: new_user.username,
            password: new_user.password,
        })
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT username, password FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn create_user_info(&self, username: &str) -> Result<UserInfoData> {
        let join_date = Utc::now();

        query("INSERT INTO user_info (username, join_date) VALUES ($1, $2)")
            .bind(username)
            .bind(join_date)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.user_info_by_username(username).await
    }

    async fn user_info_by_username(&self, username: &str) -> Result<UserInfoData> {
        query_as::<_, UserInfoRow>(
            "SELECT username, in_session, join_date, previous_sessions, liked_songs, disliked_songs
             FROM user_info WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("user info", "username"))
    }

    async fn set_in_session(&self, username: &str, in_session: bool) -> Result<()> {
        let result = query("UPDATE user_info SET in_session = $2 WHERE username = $1")
            .bind(username)
            .bind(in_session)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                resource: "user info",
                identifier: "username",
            });
        }

        Ok(())
    }

    async fn try_begin_session(&self, username: &str) -> Result<bool> {
        let result =
            query("UPDATE user_info SET in_session = TRUE WHERE username = $1 AND in_session = FALSE")
                .bind(username)
                .execute(&self.pool)
                .await
                .map_err(|e| e.any())?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // The update matching nothing means either the flag was already set
        // or the user is unknown.
        self.ensure_user_info(username).await?;
        Ok(false)
    }

    async fn append_previous_session(&self, username: &str, room_id: &str) -> Result<()> {
        let result = query(
            "UPDATE user_info SET previous_sessions = array_append(previous_sessions, $2)
             WHERE username = $1",
        )
        .bind(username)
        .bind(room_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                resource: "user info",
                identifier: "username",
            });
        }

        Ok(())
    }

    async fn record_song_taste(
        &self,
        username: &str,
        song_id: &str,
        kind: VoteKind,
    ) -> Result<()> {
        let sql = match kind {
            VoteKind::Likes => {
                "UPDATE user_info SET liked_songs = array_append(liked_songs, $2)
                 WHERE username = $1 AND NOT ($2 = ANY(liked_songs))"
            }
            VoteKind::Dislikes => {
                "UPDATE user_info SET disliked_songs = array_append(disliked_songs, $2)
                 WHERE username = $1 AND NOT ($2 = ANY(disliked_songs))"
            }
        };

        let result = query(sql)
            .bind(username)
            .bind(song_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            // Either the song is already in the set, or the user is unknown
            self.ensure_user_info(username).await?;
        }

        Ok(())
    }

    async fn insert_room(&self, room: RoomDocument) -> Result<()> {
        self.room_by_id(&room.room_id)
            .await
            .conflict_or_ok("room", "room_id", &room.room_id)?;

        query(
            "INSERT INTO rooms
                (room_id, host_id, access_token, name, lifetime_minutes, max_users,
                 is_public, created_at, room_password, users_joined, song_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&room.room_id)
        .bind(&room.host_id)
        .bind(&room.access_token)
        .bind(&room.settings.name)
        .bind(room.settings.lifetime_minutes)
        .bind(room.settings.max_users as i64)
        .bind(room.settings.is_public)
        .bind(room.settings.created_at)
        .bind(&room.settings.room_password)
        .bind(&room.users_joined)
        .bind(room.song_count as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(())
    }

    async fn room_by_id(&self, room_id: &str) -> Result<RoomDocument> {
        let row = query_as::<_, RoomRow>("SELECT * FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "room_id"))?;

        let current_queue = self.entries(room_id, false).await?;
        let played_songs = self.entries(room_id, true).await?;

        Ok(row.into_document(current_queue, played_songs))
    }

    async fn room_by_host(&self, host_id: &str) -> Result<RoomDocument> {
        let row = query_as::<_, RoomRow>("SELECT * FROM rooms WHERE host_id = $1")
            .bind(host_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "host_id"))?;

        let current_queue = self.entries(&row.room_id, false).await?;
        let played_songs = self.entries(&row.room_id, true).await?;

        Ok(row.into_document(current_queue, played_songs))
    }

    async fn room_exists(&self, room_id: &str) -> Result<bool> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(count > 0)
    }

    async fn update_room_settings(&self, update: UpdatedRoomSettings) -> Result<RoomDocument> {
        let result = query(
            "UPDATE rooms SET name = $2, max_users = $3, is_public = $4 WHERE room_id = $1",
        )
        .bind(&update.room_id)
        .bind(&update.name)
        .bind(update.max_users as i64)
        .bind(update.is_public)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                resource: "room",
                identifier: "room_id",
            });
        }

        self.room_by_id(&update.room_id).await
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        self.ensure_room(room_id).await?;

        // Queue entries go with the room via the cascade
        query("DELETE FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn add_member_if_open(&self, room_id: &str, username: &str) -> Result<MemberAdd> {
        let result = query(
            "UPDATE rooms SET users_joined = array_append(users_joined, $2)
             WHERE room_id = $1
               AND NOT ($2 = ANY(users_joined))
               AND cardinality(users_joined) < max_users",
        )
        .bind(room_id)
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 1 {
            return Ok(MemberAdd::Added);
        }

        // Re-read to tell the refusals apart; the append itself already
        // re-validated against the stored row.
        let room = self.room_by_id(room_id).await?;

        if room.users_joined.iter().any(|u| u == username) {
            Ok(MemberAdd::AlreadyInRoom)
        } else {
            Ok(MemberAdd::RoomFull)
        }
    }

    async fn append_song(&self, room_id: &str, new_entry: NewSongEntry) -> Result<QueueEntry> {
        let row = query_as::<_, EntryRow>(&format!(
            "WITH bump AS (
                UPDATE rooms SET song_count = song_count + 1
                WHERE room_id = $1
                RETURNING song_count - 1 AS assigned
            )
            INSERT INTO queue_entries
                (room_id, song_id, title, artist, album, added_by, position, queue_index)
            SELECT $1, $2, $3, $4, $5, $6, assigned, assigned FROM bump
            RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(room_id)
        .bind(&new_entry.song_id)
        .bind(&new_entry.title)
        .bind(&new_entry.artist)
        .bind(&new_entry.album)
        .bind(&new_entry.added_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        row.map(Into::into).ok_or(StoreError::NotFound {
            resource: "room",
            identifier: "room_id",
        })
    }

    async fn current_queue(&self, room_id: &str) -> Result<Vec<QueueEntry>> {
        self.ensure_room(room_id).await?;
        self.entries(room_id, false).await
    }

    async fn played_songs(&self, room_id: &str) -> Result<Vec<QueueEntry>> {
        self.ensure_room(room_id).await?;
        self.entries(room_id, true).await
    }

    async fn replace_queue_order(
        &self,
        room_id: &str,
        order: &[SongId],
    ) -> Result<Vec<QueueEntry>> {
        self.ensure_room(room_id).await?;

        query(
            "UPDATE queue_entries SET queue_index = source.ord
             FROM (SELECT * FROM unnest($2::text[]) WITH ORDINALITY AS s (song_id, ord))
                AS source
             WHERE queue_entries.room_id = $1
               AND queue_entries.song_id = source.song_id
               AND NOT queue_entries.already_played",
        )
        .bind(room_id)
        .bind(order.to_vec())
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.entries(room_id, false).await
    }

    async fn advance_queue(&self, room_id: &str) -> Result<Option<QueueEntry>> {
        self.ensure_room(room_id).await?;

        let row = query_as::<_, EntryRow>(&format!(
            "UPDATE queue_entries
             SET already_played = TRUE,
                 play_order = (
                    SELECT COALESCE(MAX(play_order), -1) + 1 FROM queue_entries
                    WHERE room_id = $1 AND already_played
                 )
             WHERE room_id = $1 AND song_id = (
                SELECT song_id FROM queue_entries
                WHERE room_id = $1 AND NOT already_played
                ORDER BY queue_index LIMIT 1
             )
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(row.map(Into::into))
    }

    async fn adjust_vote(
        &self,
        room_id: &str,
        song_id: &str,
        kind: VoteKind,
        delta: i64,
    ) -> Result<()> {
        let sql = match kind {
            VoteKind::Likes => {
                "UPDATE queue_entries SET likes = GREATEST(likes + $3, 0)
                 WHERE room_id = $1 AND song_id = $2 AND NOT already_played"
            }
            VoteKind::Dislikes => {
                "UPDATE queue_entries SET dislikes = GREATEST(dislikes + $3, 0)
                 WHERE room_id = $1 AND song_id = $2 AND NOT already_played"
            }
        };

        let result = query(sql)
            .bind(room_id)
            .bind(song_id)
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            self.ensure_room(room_id).await?;

            return Err(StoreError::NotFound {
                resource: "song",
                identifier: "song_id",
            });
        }

        Ok(())
    }
}

#[derive(FromRow)]
struct UserRow {
    username: String,
    password: String,
}

#[derive(FromRow)]
struct UserInfoRow {
    username: String,
    in_session: bool,
    join_date: DateTime<Utc>,
    previous_sessions: Vec<String>,
    liked_songs: Vec<String>,
    disliked_songs: Vec<String>,
}

#[derive(FromRow)]
struct RoomRow {
    room_id: String,
    host_id: String,
    access_token: String,
    name: String,
    lifetime_minutes: i64,
    max_users: i64,
    is_public: bool,
    created_at: DateTime<Utc>,
    room_password: String,
    users_joined: Vec<String>,
    song_count: i64,
}

#[derive(FromRow)]
struct EntryRow {
    song_id: String,
    title: String,
    artist: String,
    album: String,
    added_by: String,
    likes: i64,
    dislikes: i64,
    already_played: bool,
    position: i64,
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            username: row.username,
            password: row.password,
        }
    }
}

impl From<UserInfoRow> for UserInfoData {
    fn from(row: UserInfoRow) -> Self {
        Self {
            username: row.username,
            in_session: row.in_session,
            join_date: row.join_date,
            previous_sessions: row.previous_sessions,
            liked_songs: row.liked_songs,
            disliked_songs: row.disliked_songs,
        }
    }
}

impl RoomRow {
    fn into_document(
        self,
        current_queue: Vec<QueueEntry>,
        played_songs: Vec<QueueEntry>,
    ) -> RoomDocument {
        RoomDocument {
            room_id: self.room_id,
            host_id: self.host_id,
            access_token: self.access_token,
            settings: RoomSettings {
                name: self.name,
                lifetime_minutes: self.lifetime_minutes,
                max_users: self.max_users as u32,
                is_public: self.is_public,
                created_at: self.created_at,
                room_password: self.room_password,
            },
            users_joined: self.users_joined,
            song_count: self.song_count as u32,
            current_queue,
            played_songs,
        }
    }
}

impl From<EntryRow> for QueueEntry {
    fn from(row: EntryRow) -> Self {
        Self {
            song_id: row.song_id,
            stats: SongStats {
                title: row.title,
                artist: row.artist,
                album: row.album,
            },
            metadata: SongMetadata {
                added_by: row.added_by,
                likes: row.likes,
                dislikes: row.dislikes,
            },
            already_played: row.already_played,
            position: row.position as u32,
        }
    }
}

impl IntoStoreError for SqlxError {
    fn any(self) -> StoreError {
        match self {
            SqlxError::PoolTimedOut => StoreError::Timeout,
            e => StoreError::Internal(Box::new(e)),
        }
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> StoreError {
        match self {
            SqlxError::RowNotFound => StoreError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
