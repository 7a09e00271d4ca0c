use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;

use crate::storage::StorageError;

/// The notification list is capped in the UI, as the picker keyboard has to
/// fit every entry on one row.
pub const MAX_NOTIFY_TIMES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Which screen a location dialog was entered from, and therefore where the
/// user lands once coordinates are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnTo {
    Settings,
    Forecast,
    Notify,
}

/// Serializable mirror of the in-flight dialog, persisted with the user so
/// every dialog survives a process restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredDialog {
    AwaitingLocation {
        return_to: ReturnTo,
        prompt_msg_id: Option<i32>,
    },
    AwaitingNotifyTime {
        hour: u32,
        minute: u32,
        prompt_msg_id: Option<i32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: ChatId,
    pub location: Option<GeoPoint>,
    /// Resolved city name, cached from the geocoder.
    pub city: Option<String>,
    /// Whole hours between the user's timezone and the reference timezone.
    pub tz_shift: Option<i32>,
    pub notify_times: Vec<NaiveTime>,
    pub dialog: Option<StoredDialog>,
}

impl User {
    pub fn new(id: ChatId) -> Self {
        Self {
            id,
            location: None,
            city: None,
            tz_shift: None,
            notify_times: Vec::new(),
            dialog: None,
        }
    }

    /// Adds a daily notification time. Seconds are dropped so that times
    /// entered through the picker and through free text compare equal.
    pub fn add_notify_time(&mut self, time: NaiveTime) -> Result<(), StorageError> {
        let time = normalize(time);
        if self.notify_times.contains(&time) {
            return Err(StorageError::DuplicateNotifyTime(time));
        }
        self.notify_times.push(time);
        Ok(())
    }

    pub fn remove_notify_time(&mut self, time: NaiveTime) -> Result<(), StorageError> {
        let time = normalize(time);
        let position = self
            .notify_times
            .iter()
            .position(|existing| *existing == time)
            .ok_or(StorageError::NotifyTimeNotFound(time))?;
        self.notify_times.remove(position);
        Ok(())
    }

    pub fn sorted_notify_times(&self) -> Vec<NaiveTime> {
        let mut times = self.notify_times.clone();
        times.sort();
        times
    }
}

fn normalize(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|time| time.with_nanosecond(0))
        .expect("zeroing seconds never fails")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn adding_the_same_time_twice_is_rejected_and_keeps_one_entry() {
        let mut user = User::new(ChatId(1));
        user.add_notify_time(time(8, 30)).unwrap();

        let second_attempt = user.add_notify_time(time(8, 30));

        assert!(matches!(
            second_attempt,
            Err(StorageError::DuplicateNotifyTime(_))
        ));
        assert_eq!(user.notify_times.len(), 1);
    }

    #[test]
    fn times_differing_only_in_seconds_count_as_duplicates() {
        let mut user = User::new(ChatId(1));
        user.add_notify_time(NaiveTime::from_hms_opt(8, 30, 15).unwrap())
            .unwrap();

        let second_attempt = user.add_notify_time(NaiveTime::from_hms_opt(8, 30, 59).unwrap());

        assert!(second_attempt.is_err());
        assert_eq!(user.notify_times, vec![time(8, 30)]);
    }

    #[test]
    fn removing_an_absent_time_reports_not_found() {
        let mut user = User::new(ChatId(1));
        user.add_notify_time(time(9, 0)).unwrap();

        let result = user.remove_notify_time(time(10, 0));

        assert!(matches!(result, Err(StorageError::NotifyTimeNotFound(_))));
        assert_eq!(user.notify_times.len(), 1);
    }

    #[test]
    fn removing_a_present_time_shrinks_the_set_by_one() {
        let mut user = User::new(ChatId(1));
        user.add_notify_time(time(9, 0)).unwrap();
        user.add_notify_time(time(18, 45)).unwrap();

        user.remove_notify_time(time(9, 0)).unwrap();

        assert_eq!(user.notify_times, vec![time(18, 45)]);
    }

    #[test]
    fn sorted_notify_times_does_not_reorder_the_stored_list() {
        let mut user = User::new(ChatId(1));
        user.add_notify_time(time(18, 0)).unwrap();
        user.add_notify_time(time(7, 15)).unwrap();

        assert_eq!(user.sorted_notify_times(), vec![time(7, 15), time(18, 0)]);
        assert_eq!(user.notify_times, vec![time(18, 0), time(7, 15)]);
    }
}
