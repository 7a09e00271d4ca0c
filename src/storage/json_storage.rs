use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveTime;
use teloxide::types::ChatId;
use tokio::sync::RwLock;

use crate::user::{GeoPoint, StoredDialog, User};

use super::{StorageError, UserStorage, UserTable};

/// File-backed user storage. The whole table lives in memory and is written
/// out after every mutation, which is plenty for one record per chat.
pub struct JsonUserStorage {
    table: RwLock<UserTable>,
    path: PathBuf,
}

impl JsonUserStorage {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let table = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => UserTable::default(),
            Ok(content) => match serde_json::from_str::<Vec<User>>(&content) {
                Ok(users) => UserTable::from_users(users),
                Err(error) => {
                    // Keep the unreadable file around instead of overwriting it.
                    let backup = path.with_extension("json.backup");
                    tokio::fs::copy(&path, &backup).await?;
                    log::error!(
                        "user data file is unreadable ({error}), starting empty; backup kept at {}",
                        backup.display()
                    );
                    UserTable::default()
                }
            },
            Err(error) if error.kind() == ErrorKind::NotFound => {
                log::info!(
                    "user data file {} not found, starting empty",
                    path.display()
                );
                UserTable::default()
            }
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            table: RwLock::new(table),
            path,
        })
    }

    async fn persist(&self, table: &UserTable) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&table.snapshot())?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStorage for JsonUserStorage {
    async fn get(&self, id: ChatId) -> Result<Option<User>, StorageError> {
        Ok(self.table.read().await.get(id))
    }

    async fn get_all(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.table.read().await.snapshot())
    }

    async fn create(&self, id: ChatId) -> Result<User, StorageError> {
        let mut table = self.table.write().await;
        let user = table.create(id)?;
        self.persist(&table).await?;
        Ok(user)
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
        self.persist(&table).await
    }

    async fn add_notify_time(&self, id: ChatId, time: NaiveTime) -> Result<(), StorageError> {
        let mut table = self.table.write().await;
        table.get_mut(id)?.add_notify_time(time)?;
        self.persist(&table).await
    }

    async fn remove_notify_time(&self, id: ChatId, time: NaiveTime) -> Result<(), StorageError> {
        let mut table = self.table.write().await;
        table.get_mut(id)?.remove_notify_time(time)?;
        self.persist(&table).await
    }

    async fn set_dialog(
        &self,
        id: ChatId,
        dialog: Option<StoredDialog>,
    ) -> Result<(), StorageError> {
        let mut table = self.table.write().await;
        table.get_mut(id)?.dialog = dialog;
        self.persist(&table).await
    }

    async fn delete(&self, id: ChatId) -> Result<(), StorageError> {
        let mut table = self.table.write().await;
        table.delete(id)?;
        self.persist(&table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("zefirka-{name}-{}.json", std::process::id()))
    }

    #[tokio::test]
    async fn missing_file_starts_an_empty_table() {
        let path = temp_path("missing");
        let _ = tokio::fs::remove_file(&path).await;

        let storage = JsonUserStorage::load(&path).await.unwrap();

        assert!(storage.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mutations_survive_a_reload() {
        let path = temp_path("reload");
        let _ = tokio::fs::remove_file(&path).await;

        {
            let storage = JsonUserStorage::load(&path).await.unwrap();
            storage.create(ChatId(5)).await.unwrap();
            storage
                .set_location(ChatId(5), GeoPoint::new(37.62, 55.75), "Москва".into(), 0)
                .await
                .unwrap();
            storage
                .add_notify_time(ChatId(5), NaiveTime::from_hms_opt(8, 30, 0).unwrap())
                .await
                .unwrap();
        }

        let reloaded = JsonUserStorage::load(&path).await.unwrap();
        let user = reloaded.get(ChatId(5)).await.unwrap().unwrap();
        assert_eq!(user.city.as_deref(), Some("Москва"));
        assert_eq!(
            user.notify_times,
            vec![NaiveTime::from_hms_opt(8, 30, 0).unwrap()]
        );

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn deleting_a_user_removes_it_from_the_file() {
        let path = temp_path("delete");
        let _ = tokio::fs::remove_file(&path).await;

        {
            let storage = JsonUserStorage::load(&path).await.unwrap();
            storage.create(ChatId(1)).await.unwrap();
            storage.create(ChatId(2)).await.unwrap();
            storage.delete(ChatId(1)).await.unwrap();
        }

        let reloaded = JsonUserStorage::load(&path).await.unwrap();
        assert!(reloaded.get(ChatId(1)).await.unwrap().is_none());
        assert!(reloaded.get(ChatId(2)).await.unwrap().is_some());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn corrupt_file_is_backed_up_and_replaced() {
        let path = temp_path("corrupt");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let storage = JsonUserStorage::load(&path).await.unwrap();

        assert!(storage.get_all().await.unwrap().is_empty());
        let backup = path.with_extension("json.backup");
        assert!(tokio::fs::metadata(&backup).await.is_ok());

        let _ = tokio::fs::remove_file(&path).await;
        let _ = tokio::fs::remove_file(&backup).await;
    }
}
