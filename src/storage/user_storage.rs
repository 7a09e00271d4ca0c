use async_trait::async_trait;
use chrono::NaiveTime;
use teloxide::types::ChatId;
use tokio::sync::RwLock;

use crate::user::{GeoPoint, StoredDialog, User};

use super::{StorageError, UserTable};

#[async_trait]
pub trait UserStorage: Send + Sync {
    async fn get(&self, id: ChatId) -> Result<Option<User>, StorageError>;
    async fn get_all(&self) -> Result<Vec<User>, StorageError>;
    /// Creates a fresh record; a second call for the same id is rejected
    /// with [`StorageError::UserExists`].
    async fn create(&self, id: ChatId) -> Result<User, StorageError>;
    async fn set_location(
        &self,
        id: ChatId,
        location: GeoPoint,
        city: String,
        tz_shift: i32,
    ) -> Result<(), StorageError>;
    async fn add_notify_time(&self, id: ChatId, time: NaiveTime) -> Result<(), StorageError>;
    async fn remove_notify_time(&self, id: ChatId, time: NaiveTime) -> Result<(), StorageError>;
    async fn set_dialog(&self, id: ChatId, dialog: Option<StoredDialog>)
    -> Result<(), StorageError>;
    /// Removes the user together with all associated state.
    async fn delete(&self, id: ChatId) -> Result<(), StorageError>;
}

pub struct InMemoryUserStorage {
    table: RwLock<UserTable>,
}

impl InMemoryUserStorage {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(UserTable::default()),
        }
    }
}

impl Default for InMemoryUserStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStorage for InMemoryUserStorage {
    async fn get(&self, id: ChatId) -> Result<Option<User>, StorageError> {
        Ok(self.table.read().await.get(id))
    }

    async fn get_all(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.table.read().await.snapshot())
    }

    async fn create(&self, id: ChatId) -> Result<User, StorageError> {
        self.table.write().await.create(id)
    }

    async fn set_location(
        &self,
        id: ChatId,
        location: GeoPoint,
        city: String,
        tz_shift: i32,
    ) -> Result<(), StorageError> {
        let mut table = self.table.write().await;
        let user = table.get_mut(id)?;
        user.location = Some(location);
        user.city = Some(city);
        user.tz_shift = Some(tz_shift);
        Ok(())
    }

    async fn add_notify_time(&self, id: ChatId, time: NaiveTime) -> Result<(), StorageError> {
        self.table.write().await.get_mut(id)?.add_notify_time(time)
    }

    async fn remove_notify_time(&self, id: ChatId, time: NaiveTime) -> Result<(), StorageError> {
        self.table
            .write()
            .await
            .get_mut(id)?
            .remove_notify_time(time)
    }

    async fn set_dialog(
        &self,
        id: ChatId,
        dialog: Option<StoredDialog>,
    ) -> Result<(), StorageError> {
        self.table.write().await.get_mut(id)?.dialog = dialog;
        Ok(())
    }

    async fn delete(&self, id: ChatId) -> Result<(), StorageError> {
        self.table.write().await.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn creating_a_user_twice_keeps_a_single_record() {
        let storage = InMemoryUserStorage::new();
        storage.create(ChatId(7)).await.unwrap();

        let second = storage.create(ChatId(7)).await;

        assert!(matches!(second, Err(StorageError::UserExists(ChatId(7)))));
        assert_eq!(storage.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleted_user_is_reported_as_not_found() {
        let storage = InMemoryUserStorage::new();
        storage.create(ChatId(7)).await.unwrap();

        storage.delete(ChatId(7)).await.unwrap();

        assert!(storage.get(ChatId(7)).await.unwrap().is_none());
        assert!(matches!(
            storage.delete(ChatId(7)).await,
            Err(StorageError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_notify_time_is_rejected_through_the_trait() {
        let storage = InMemoryUserStorage::new();
        storage.create(ChatId(1)).await.unwrap();
        storage.add_notify_time(ChatId(1), time(8, 30)).await.unwrap();

        let second = storage.add_notify_time(ChatId(1), time(8, 30)).await;

        assert!(matches!(
            second,
            Err(StorageError::DuplicateNotifyTime(_))
        ));
        let user = storage.get(ChatId(1)).await.unwrap().unwrap();
        assert_eq!(user.notify_times.len(), 1);
    }

    #[tokio::test]
    async fn mutating_a_missing_user_propagates_the_contract_violation() {
        let storage = InMemoryUserStorage::new();

        let result = storage
            .set_location(ChatId(404), GeoPoint::new(37.62, 55.75), "Москва".into(), 0)
            .await;

        assert!(matches!(result, Err(StorageError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn location_fields_are_stored_together() {
        let storage = InMemoryUserStorage::new();
        storage.create(ChatId(1)).await.unwrap();

        storage
            .set_location(ChatId(1), GeoPoint::new(37.62, 55.75), "Москва".into(), 0)
            .await
            .unwrap();

        let user = storage.get(ChatId(1)).await.unwrap().unwrap();
        assert_eq!(user.location, Some(GeoPoint::new(37.62, 55.75)));
        assert_eq!(user.city.as_deref(), Some("Москва"));
        assert_eq!(user.tz_shift, Some(0));
    }
}
