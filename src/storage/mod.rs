mod json_storage;
mod user_storage;

pub use json_storage::JsonUserStorage;
pub use user_storage::{InMemoryUserStorage, UserStorage};

use std::collections::HashMap;

use chrono::NaiveTime;
use teloxide::types::ChatId;
use thiserror::Error;

use crate::user::User;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Contract violation: handlers create the user on first contact, so a
    /// lookup miss on a mutation path is a bug, not a user mistake.
    #[error("user {0} is not registered")]
    UserNotFound(ChatId),
    #[error("user {0} is already registered")]
    UserExists(ChatId),
    #[error("notification time {} is already set", .0.format("%H:%M"))]
    DuplicateNotifyTime(NaiveTime),
    #[error("notification time {} is not set", .0.format("%H:%M"))]
    NotifyTimeNotFound(NaiveTime),
    #[error("failed to read or write user data: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode user data: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Plain user map shared by the storage backends. Backends wrap it in a
/// `RwLock` and decide what to do after each mutation.
#[derive(Debug, Default)]
struct UserTable {
    users: HashMap<ChatId, User>,
}

impl UserTable {
    fn from_users(users: Vec<User>) -> Self {
        Self {
            users: users.into_iter().map(|user| (user.id, user)).collect(),
        }
    }

    fn get(&self, id: ChatId) -> Option<User> {
        self.users.get(&id).cloned()
    }

    fn get_mut(&mut self, id: ChatId) -> Result<&mut User, StorageError> {
        self.users
            .get_mut(&id)
            .ok_or(StorageError::UserNotFound(id))
    }

    fn create(&mut self, id: ChatId) -> Result<User, StorageError> {
        if self.users.contains_key(&id) {
            return Err(StorageError::UserExists(id));
        }
        let user = User::new(id);
        self.users.insert(id, user.clone());
        Ok(user)
    }

    fn delete(&mut self, id: ChatId) -> Result<(), StorageError> {
        self.users
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::UserNotFound(id))
    }

    /// Users ordered by id, so serialized snapshots are stable.
    fn snapshot(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by_key(|user| user.id.0);
        users
    }
}
