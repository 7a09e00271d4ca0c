use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::WeatherClient;
use crate::converters;
use crate::storage::UserStorage;
use crate::telegram::{keyboards, texts};
use crate::user::{GeoPoint, User};

/// Minute-by-minute sweep over all users: whoever has a notification time
/// matching the current minute in their local timezone gets a forecast.
/// Missed minutes are never replayed.
pub struct WeatherNotifier {
    bot: Bot,
    storage: Arc<dyn UserStorage>,
    weather: WeatherClient,
}

impl WeatherNotifier {
    pub fn new(bot: Bot, storage: Arc<dyn UserStorage>, weather: WeatherClient) -> Self {
        Self {
            bot,
            storage,
            weather,
        }
    }

    pub fn spawn(self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancellation_token).await })
    }

    async fn run(self, cancellation_token: CancellationToken) {
        loop {
            let delay = next_minute_delay(converters::reference_now());
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    log::info!("Stopping the weather notification sweep");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            self.sweep(converters::reference_now()).await;
        }
    }

    async fn sweep(&self, reference_now: NaiveDateTime) {
        let users = match self.storage.get_all().await {
            Ok(users) => users,
            Err(error) => {
                log::warn!("notification sweep could not list users: {error}");
                return;
            }
        };

        for user in users {
            let (Some(geo), Some(tz_shift)) = (user.location, user.tz_shift) else {
                continue;
            };
            let due = user
                .notify_times
                .iter()
                .any(|time| is_due(*time, tz_shift, reference_now));
            if !due {
                continue;
            }

            // One recipient failing must not break the sweep for the rest.
            if let Err(error) = self.deliver(&user, geo, reference_now).await {
                log::warn!("skipping the weather notification for {}: {error:#}", user.id);
            }
        }
    }

    async fn deliver(
        &self,
        user: &User,
        geo: GeoPoint,
        reference_now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let (current, sun) = self.weather.current(geo).await?;

        let greeting = texts::greeting(user.tz_shift, reference_now);
        let forecast = texts::forecast_text(
            user.city.as_deref(),
            &current,
            &texts::ForecastTone::daily(),
        );
        let sun_line = texts::sun_text(&sun, reference_now);

        self.bot
            .send_message(user.id, format!("{greeting}! 🔔\n\n{forecast}\n\n{sun_line}"))
            .reply_markup(keyboards::thanks())
            .await?;
        log::info!("Delivered a weather notification to {}", user.id);
        Ok(())
    }
}

/// Whether `fire_at` matches the current minute of the user's local clock.
pub(crate) fn is_due(fire_at: NaiveTime, tz_shift: i32, reference_now: NaiveDateTime) -> bool {
    let local = reference_now + Duration::hours(tz_shift.into());
    (local.hour(), local.minute()) == (fire_at.hour(), fire_at.minute())
}

/// Time left until the next wall-clock minute boundary.
pub(crate) fn next_minute_delay(now: NaiveDateTime) -> std::time::Duration {
    let next = (now + Duration::minutes(1))
        .with_second(0)
        .and_then(|next| next.with_nanosecond(0))
        .expect("zeroing seconds never fails");
    (next - now)
        .to_std()
        .expect("the next minute boundary is always in the future")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use proptest::prelude::*;
    use proptest_arbitrary_interop::arb;

    fn reference(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 31)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn matching_minute_in_the_reference_timezone_is_due() {
        assert!(is_due(time(8, 30), 0, reference(8, 30)));
        assert!(!is_due(time(8, 30), 0, reference(8, 31)));
        assert!(!is_due(time(8, 30), 0, reference(9, 30)));
    }

    #[test]
    fn shift_moves_the_matching_wall_clock() {
        // 06:30 reference with a +2 shift is 08:30 local.
        assert!(is_due(time(8, 30), 2, reference(6, 30)));
        // 10:30 reference with a -2 shift is 08:30 local.
        assert!(is_due(time(8, 30), -2, reference(10, 30)));
    }

    #[test]
    fn shift_wraps_across_midnight() {
        // 23:30 reference with a +1 shift is 00:30 local, next day.
        assert!(is_due(time(0, 30), 1, reference(23, 30)));
        // 00:30 reference with a -1 shift is 23:30 local, previous day.
        assert!(is_due(time(23, 30), -1, reference(0, 30)));
    }

    #[test]
    fn delay_reaches_the_next_minute_boundary() {
        let now = NaiveDate::from_ymd_opt(2025, 5, 31)
            .unwrap()
            .and_hms_opt(12, 0, 42)
            .unwrap();

        assert_eq!(next_minute_delay(now), std::time::Duration::from_secs(18));
    }

    proptest! {
        #[test]
        fn delay_always_lands_on_a_minute_boundary(now in arb::<NaiveDateTime>()) {
            let now = now.with_nanosecond(0).unwrap();
            // Keep clear of the representable range ends, where adding a
            // minute would overflow.
            prop_assume!((NaiveDateTime::MAX - now).num_days() > 2);
            prop_assume!((now - NaiveDateTime::MIN).num_days() > 2);
            let delay = next_minute_delay(now);

            prop_assert!(delay > std::time::Duration::ZERO);
            prop_assert!(delay <= std::time::Duration::from_secs(60));

            let target = now + Duration::from_std(delay).unwrap();
            prop_assert_eq!(target.second(), 0);
        }

        #[test]
        fn due_times_are_exactly_the_local_minute(
            now in arb::<NaiveDateTime>(),
            fire_at in arb::<NaiveTime>(),
            shift in -12i32..=14
        ) {
            let now = now.with_nanosecond(0).unwrap();
            prop_assume!((NaiveDateTime::MAX - now).num_days() > 2);
            prop_assume!((now - NaiveDateTime::MIN).num_days() > 2);
            let fire_at = fire_at.with_second(0).unwrap().with_nanosecond(0).unwrap();

            let local = now + Duration::hours(shift.into());
            let expected = local.hour() == fire_at.hour() && local.minute() == fire_at.minute();
            prop_assert_eq!(is_due(fire_at, shift, now), expected);
        }
    }
}
