use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;

use crate::{NewUser, RoomStore, StoreError, UserData};

/// Account signup and credential checks
pub struct Auth<S> {
    store: Arc<S>,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Something else went wrong with the store
    #[error(transparent)]
    Store(StoreError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl<S> Auth<S>
where
    S: RoomStore,
{
    pub fn new(store: &Arc<S>) -> Self {
        Self {
            store: store.clone(),
            argon: Argon2::default(),
        }
    }

    /// Creates an account along with its bookkeeping record
    pub async fn register(&self, new_user: NewPlainUser) -> Result<UserData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        let user = self
            .store
            .create_user(NewUser {
                username: new_user.username,
                password: hashed_password,
            })
            .await
            .map_err(AuthError::Store)?;

        self.store
            .create_user_info(&user.username)
            .await
            .map_err(AuthError::Store)?;

        Ok(user)
    }

    /// Checks credentials, returning the account when they match
    pub async fn login(&self, credentials: Credentials) -> Result<UserData, AuthError> {
        let user = self
            .store
            .user_by_username(&credentials.username)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Store(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        Ok(user)
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewPlainUser {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemoryStore;

    fn plain_user(username: &str) -> NewPlainUser {
        NewPlainUser {
            username: username.to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[tokio::test]
    async fn registered_users_can_log_in() {
        let store = Arc::new(MemoryStore::new());
        let auth = Auth::new(&store);

        auth.register(plain_user("alice")).await.unwrap();

        let user = auth
            .login(Credentials {
                username: "alice".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .expect("credentials match");

        assert_eq!(user.username, "alice");

        assert!(matches!(
            auth.login(Credentials {
                username: "alice".to_string(),
                password: "wrong horse".to_string(),
            })
            .await,
            Err(AuthError::InvalidCredentials)
        ));

        assert!(matches!(
            auth.login(Credentials {
                username: "bob".to_string(),
                password: "correct horse".to_string(),
            })
            .await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let store = Arc::new(MemoryStore::new());
        let auth = Auth::new(&store);

        auth.register(plain_user("alice")).await.unwrap();

        assert!(matches!(
            auth.register(plain_user("alice")).await,
            Err(AuthError::Store(StoreError::Conflict { .. }))
        ));
    }
}
