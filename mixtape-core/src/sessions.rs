use std::sync::Arc;

use crate::{Result, RoomStore};

/// Enforces the one-active-room-per-host rule through the per-user
/// `in_session` flag.
pub struct SessionGuard<S> {
    store: Arc<S>,
}

impl<S> SessionGuard<S>
where
    S: RoomStore,
{
    pub fn new(store: &Arc<S>) -> Self {
        Self {
            store: store.clone(),
        }
    }

    pub async fn is_in_session(&self, username: &str) -> Result<bool> {
        let info = self.store.user_info_by_username(username).await?;
        Ok(info.in_session)
    }

    pub async fn set_in_session(&self, username: &str, in_session: bool) -> Result<()> {
        self.store.set_in_session(username, in_session).await
    }

    /// Claims the hosting slot for the user. The flag flip is one conditional
    /// update, so two concurrent claims cannot both succeed.
    pub async fn begin(&self, username: &str) -> Result<bool> {
        self.store.try_begin_session(username).await
    }

    /// Releases the hosting slot
    pub async fn end(&self, username: &str) -> Result<()> {
        self.store.set_in_session(username, false).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{MemoryStore, NewUser};

    #[tokio::test]
    async fn only_one_claim_wins() {
        let store = Arc::new(MemoryStore::new());

        store
            .create_user(NewUser {
                username: "alice".to_string(),
                password: "hash".to_string(),
            })
            .await
            .unwrap();
        store.create_user_info("alice").await.unwrap();

        let guard = SessionGuard::new(&store);

        assert!(!guard.is_in_session("alice").await.unwrap());
        assert!(guard.begin("alice").await.unwrap());
        assert!(!guard.begin("alice").await.unwrap());
        assert!(guard.is_in_session("alice").await.unwrap());

        guard.end("alice").await.unwrap();
        assert!(!guard.is_in_session("alice").await.unwrap());
    }
}
