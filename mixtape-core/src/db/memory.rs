use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

use super::{
    MemberAdd, NewSongEntry, NewUser, QueueEntry, Result, RoomDocument, RoomStore, SongId,
    StoreError, UpdatedRoomSettings, UserData, UserInfoData, VoteKind,
};

/// An in-process store.
///
/// Every primitive runs while holding the map entry it touches, so the
/// conditional updates are atomic the same way their durable counterparts
/// are. Components take this store in tests, and it serves small standalone
/// deployments that can live without persistence.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, UserData>,
    user_info: DashMap<String, UserInfoData>,
    rooms: DashMap<String, RoomDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        match self.users.entry(new_user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            }),
            Entry::Vacant(entry) => {
                let user = UserData {
                    username: new_user.username,
                    password: new_user.password,
                };

                entry.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.users
            .get(username)
            .map(|u| u.clone())
            .ok_or(StoreError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn create_user_info(&self, username: &str) -> Result<UserInfoData> {
        let info = UserInfoData {
            username: username.to_string(),
            in_session: false,
            join_date: Utc::now(),
            previous_sessions: vec![],
            liked_songs: vec![],
            disliked_songs: vec![],
        };

        self.user_info.insert(username.to_string(), info.clone());
        Ok(info)
    }

    async fn user_info_by_username(&self, username: &str) -> Result<UserInfoData> {
        self.user_info
            .get(username)
            .map(|i| i.clone())
            .ok_or(StoreError::NotFound {
                resource: "user info",
                identifier: "username",
            })
    }

    async fn set_in_session(&self, username: &str, in_session: bool) -> Result<()> {
        let mut info = self
            .user_info
            .get_mut(username)
            .ok_or(StoreError::NotFound {
                resource: "user info",
                identifier: "username",
            })?;

        info.in_session = in_session;
        Ok(())
    }

    async fn try_begin_session(&self, username: &str) -> Result<bool> {
        let mut info = self
            .user_info
            .get_mut(username)
            .ok_or(StoreError::NotFound {
                resource: "user info",
                identifier: "username",
            })?;

        if info.in_session {
            return Ok(false);
        }

        info.in_session = true;
        Ok(true)
    }

    async fn append_previous_session(&self, username: &str, room_id: &str) -> Result<()> {
        let mut info = self
            .user_info
            .get_mut(username)
            .ok_or(StoreError::NotFound {
                resource: "user info",
                identifier: "username",
            })?;

        info.previous_sessions.push(room_id.to_string());
        Ok(())
    }

    async fn record_song_taste(
        &self,
        username: &str,
        song_id: &str,
        kind: VoteKind,
    ) -> Result<()> {
        let mut info = self
            .user_info
            .get_mut(username)
            .ok_or(StoreError::NotFound {
                resource: "user info",
                identifier: "username",
            })?;

        let set = match kind {
            VoteKind::Likes => &mut info.liked_songs,
            VoteKind::Dislikes => &mut info.disliked_songs,
        };

        if !set.iter().any(|s| s == song_id) {
            set.push(song_id.to_string());
        }

        Ok(())
    }

    async fn insert_room(&self, room: RoomDocument) -> Result<()> {
        match self.rooms.entry(room.room_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                resource: "room",
                field: "room_id",
                value: room.room_id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(room);
                Ok(())
            }
        }
    }

    async fn room_by_id(&self, room_id: &str) -> Result<RoomDocument> {
        self.rooms
            .get(room_id)
            .map(|r| r.clone())
            .ok_or(StoreError::NotFound {
                resource: "room",
                identifier: "room_id",
            })
    }

    async fn room_by_host(&self, host_id: &str) -> Result<RoomDocument> {
        self.rooms
            .iter()
            .find(|r| r.host_id == host_id)
            .map(|r| r.clone())
            .ok_or(StoreError::NotFound {
                resource: "room",
                identifier: "host_id",
            })
    }

    async fn room_exists(&self, room_id: &str) -> Result<bool> {
        Ok(self.rooms.contains_key(room_id))
    }

    async fn update_room_settings(&self, update: UpdatedRoomSettings) -> Result<RoomDocument> {
        let mut room = self
            .rooms
            .get_mut(&update.room_id)
            .ok_or(StoreError::NotFound {
                resource: "room",
                identifier: "room_id",
            })?;

        room.settings.name = update.name;
        room.settings.max_users = update.max_users;
        room.settings.is_public = update.is_public;

        Ok(room.clone())
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        self.rooms
            .remove(room_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                resource: "room",
                identifier: "room_id",
            })
    }

    async fn add_member_if_open(&self, room_id: &str, username: &str) -> Result<MemberAdd> {
        let mut room = self.rooms.get_mut(room_id).ok_or(StoreError::NotFound {
            resource: "room",
            identifier: "room_id",
        })?;

        if room.users_joined.iter().any(|u| u == username) {
            return Ok(MemberAdd::AlreadyInRoom);
        }

        if room.users_joined.len() >= room.settings.max_users as usize {
            return Ok(MemberAdd::RoomFull);
        }

        room.users_joined.push(username.to_string());
        Ok(MemberAdd::Added)
    }

    async fn append_song(&self, room_id: &str, new_entry: NewSongEntry) -> Result<QueueEntry> {
        let mut room = self.rooms.get_mut(room_id).ok_or(StoreError::NotFound {
            resource: "room",
            identifier: "room_id",
        })?;

        let entry = QueueEntry::from_new(new_entry, room.song_count);

        room.current_queue.push(entry.clone());
        room.song_count += 1;

        Ok(entry)
    }

    async fn current_queue(&self, room_id: &str) -> Result<Vec<QueueEntry>> {
        self.room_by_id(room_id).await.map(|r| r.current_queue)
    }

    async fn played_songs(&self, room_id: &str) -> Result<Vec<QueueEntry>> {
        self.room_by_id(room_id).await.map(|r| r.played_songs)
    }

    async fn replace_queue_order(
        &self,
        room_id: &str,
        order: &[SongId],
    ) -> Result<Vec<QueueEntry>> {
        let mut room = self.rooms.get_mut(room_id).ok_or(StoreError::NotFound {
            resource: "room",
            identifier: "room_id",
        })?;

        let target_index = |entry: &QueueEntry| {
            order
                .iter()
                .position(|id| *id == entry.song_id)
                .unwrap_or(usize::MAX)
        };

        room.current_queue.sort_by_key(target_index);
        Ok(room.current_queue.clone())
    }

    async fn advance_queue(&self, room_id: &str) -> Result<Option<QueueEntry>> {
        let mut room = self.rooms.get_mut(room_id).ok_or(StoreError::NotFound {
            resource: "room",
            identifier: "room_id",
        })?;

        if room.current_queue.is_empty() {
            return Ok(None);
        }

        let mut entry = room.current_queue.remove(0);
        entry.already_played = true;

        room.played_songs.push(entry.clone());
        Ok(Some(entry))
    }

    async fn adjust_vote(
        &self,
        room_id: &str,
        song_id: &str,
        kind: VoteKind,
        delta: i64,
    ) -> Result<()> {
        let mut room = self.rooms.get_mut(room_id).ok_or(StoreError::NotFound {
            resource: "room",
            identifier: "room_id",
        })?;

        let entry = room
            .current_queue
            .iter_mut()
            .find(|e| e.song_id == song_id)
            .ok_or(StoreError::NotFound {
                resource: "song",
                identifier: "song_id",
            })?;

        let counter = match kind {
            VoteKind::Likes => &mut entry.metadata.likes,
            VoteKind::Dislikes => &mut entry.metadata.dislikes,
        };

        *counter = (*counter + delta).max(0);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn store_with_user(username: &str) -> MemoryStore {
        let store = MemoryStore::new();

        store
            .create_user(NewUser {
                username: username.to_string(),
                password: "hash".to_string(),
            })
            .await
            .expect("user is created");

        store
            .create_user_info(username)
            .await
            .expect("user info is created");

        store
    }

    #[tokio::test]
    async fn session_flag_flips_only_once() {
        let store = store_with_user("alice").await;

        assert!(store.try_begin_session("alice").await.unwrap());
        assert!(!store.try_begin_session("alice").await.unwrap());

        store.set_in_session("alice", false).await.unwrap();
        assert!(store.try_begin_session("alice").await.unwrap());
    }

    #[tokio::test]
    async fn member_append_revalidates_capacity() {
        let store = MemoryStore::new();
        store.insert_room(RoomDocument::mock("r1", "alice", 2)).await.unwrap();

        assert_eq!(
            store.add_member_if_open("r1", "bob").await.unwrap(),
            MemberAdd::Added
        );
        assert_eq!(
            store.add_member_if_open("r1", "bob").await.unwrap(),
            MemberAdd::AlreadyInRoom
        );
        assert_eq!(
            store.add_member_if_open("r1", "carol").await.unwrap(),
            MemberAdd::RoomFull
        );
    }

    #[tokio::test]
    async fn votes_clamp_at_zero() {
        let store = MemoryStore::new();
        store.insert_room(RoomDocument::mock("r1", "alice", 4)).await.unwrap();

        let entry = store
            .append_song("r1", NewSongEntry::mock("strawberries", "alice"))
            .await
            .unwrap();

        store
            .adjust_vote("r1", &entry.song_id, VoteKind::Likes, -1)
            .await
            .unwrap();

        let queue = store.current_queue("r1").await.unwrap();
        assert_eq!(queue[0].metadata.likes, 0);
    }

    #[tokio::test]
    async fn positions_come_from_the_song_counter() {
        let store = MemoryStore::new();
        store.insert_room(RoomDocument::mock("r1", "alice", 4)).await.unwrap();

        for title in ["a", "b", "c"] {
            store
                .append_song("r1", NewSongEntry::mock(title, "alice"))
                .await
                .unwrap();
        }

        let positions: Vec<_> = store
            .current_queue("r1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.position)
            .collect();

        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(store.room_by_id("r1").await.unwrap().song_count, 3);
    }
}
