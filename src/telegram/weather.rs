use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use dptree::case;
use teloxide::dispatching::UpdateHandler;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::api::{
    ApiError, CurrentWeather, FORECAST_SLOTS_5_DAYS, ForecastSlot, WeatherClient,
};
use crate::converters;
use crate::storage::{StorageError, UserStorage};
use crate::user::{GeoPoint, ReturnTo};

use super::callback::{CallbackAction, DayPart};
use super::{GlobalDialogue, HandlerResult, keyboards, location, texts, util};

/// Slots covering today and tomorrow, for the time-of-day aggregation.
const FORECAST_SLOTS_2_DAYS: u8 = 16;

const DATE_FORMAT: &str = "%d.%m.%Y";
const BLANK: &str = "ㅤ";

pub(super) fn schema() -> UpdateHandler<anyhow::Error> {
    Update::filter_callback_query()
        .filter_map(|query: CallbackQuery| query.data.as_deref().and_then(CallbackAction::parse))
        .branch(case![CallbackAction::WeatherNow].endpoint(forecast_now))
        .branch(case![CallbackAction::ForecastAt(at)].endpoint(forecast_at))
        .branch(case![CallbackAction::TomorrowForecast(part)].endpoint(tomorrow_forecast))
        .branch(case![CallbackAction::Ack].endpoint(acknowledge))
        .branch(case![CallbackAction::Noop].endpoint(acknowledge))
}

async fn forecast_now(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    weather: WeatherClient,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;

    let chat_id = dialogue.chat_id();
    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;

    // No coordinates yet: detour through the location dialog and show the
    // forecast once it completes.
    let Some(geo) = user.location else {
        if let Some((chat_id, message_id)) = origin {
            util::delete_message_silently(&bot, chat_id, message_id).await;
        }
        return location::begin(&bot, &dialogue, &storage, ReturnTo::Forecast).await;
    };

    let now = converters::reference_now();
    match current_view(&weather, geo, user.city.as_deref(), now).await {
        Ok((text, board)) => util::send_or_edit(&bot, origin, chat_id, &text, board).await,
        Err(error) => show_error(&bot, origin, chat_id, &error).await,
    }
}

async fn forecast_at(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    weather: WeatherClient,
    at: NaiveDateTime,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;

    let chat_id = dialogue.chat_id();
    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;
    let Some(geo) = user.location else {
        return location::begin(&bot, &dialogue, &storage, ReturnTo::Forecast).await;
    };

    let now = converters::reference_now();
    match slot_view(&weather, geo, user.city.as_deref(), at, now).await {
        Ok((text, board)) => util::send_or_edit(&bot, origin, chat_id, &text, board).await,
        Err(error) => show_error(&bot, origin, chat_id, &error).await,
    }
}

async fn tomorrow_forecast(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    weather: WeatherClient,
    part: DayPart,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;

    let chat_id = dialogue.chat_id();
    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;
    let Some(geo) = user.location else {
        return location::begin(&bot, &dialogue, &storage, ReturnTo::Forecast).await;
    };

    let now = converters::reference_now();
    match tomorrow_view(&weather, geo, user.city.as_deref(), part, now).await {
        Ok((text, board)) => util::send_or_edit(&bot, origin, chat_id, &text, board).await,
        Err(error) => show_error(&bot, origin, chat_id, &error).await,
    }
}

/// Handles both the "thanks" button on notifications and the blank filler
/// buttons on navigation rows.
async fn acknowledge(bot: Bot, query: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(query.id).await?;
    Ok(())
}

/// Sends the current forecast as a new message, optionally prefixed (used
/// right after the location dialog completes).
pub(super) async fn send_current(
    bot: &Bot,
    storage: &Arc<dyn UserStorage>,
    weather: &WeatherClient,
    chat_id: ChatId,
    prefix: Option<String>,
) -> HandlerResult {
    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;
    let Some(geo) = user.location else {
        return Ok(());
    };

    let now = converters::reference_now();
    match current_view(weather, geo, user.city.as_deref(), now).await {
        Ok((text, board)) => {
            let text = match prefix {
                Some(prefix) => format!("{prefix}\n\n{text}"),
                None => text,
            };
            bot.send_message(chat_id, text).reply_markup(board).await?;
        }
        Err(error) => {
            bot.send_message(chat_id, texts::forecast_error_text(&error))
                .reply_markup(keyboards::home())
                .await?;
        }
    }
    Ok(())
}

async fn current_view(
    weather: &WeatherClient,
    geo: GeoPoint,
    city: Option<&str>,
    now: NaiveDateTime,
) -> Result<(String, InlineKeyboardMarkup), ApiError> {
    let (current, sun) = weather.current(geo).await?;
    let mut text = texts::forecast_text(city, &current, &texts::ForecastTone::now());
    text.push_str("\n\n");
    text.push_str(&texts::sun_text(&sun, now));
    Ok((text, current_nav_board(now)))
}

fn current_nav_board(now: NaiveDateTime) -> InlineKeyboardMarkup {
    let next_at = next_slot_start(now);
    let tomorrow_morning = (now.date() + Duration::days(1))
        .and_hms_opt(9, 0, 0)
        .expect("09:00 is a valid time");

    InlineKeyboardMarkup::new(vec![
        vec![
            noop_button(BLANK),
            noop_button("Прямо сейчас"),
            button(
                format!("{:02}:00 ➡️", next_at.hour()),
                CallbackAction::ForecastAt(next_at),
            ),
        ],
        vec![
            noop_button(BLANK),
            noop_button(now.format(DATE_FORMAT).to_string()),
            button(
                format!("{} ⏩", tomorrow_morning.format(DATE_FORMAT)),
                CallbackAction::ForecastAt(tomorrow_morning),
            ),
        ],
        vec![button(
            "🔹 Завтра 🔹",
            CallbackAction::TomorrowForecast(DayPart::Day),
        )],
        keyboards::back_row(CallbackAction::MainMenu),
    ])
}

async fn slot_view(
    weather: &WeatherClient,
    geo: GeoPoint,
    city: Option<&str>,
    at: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<(String, InlineKeyboardMarkup), ApiError> {
    let slots = weather.forecast(geo, FORECAST_SLOTS_5_DAYS).await?;
    let slot = slots
        .iter()
        .find(|slot| slot.at == at)
        .ok_or(ApiError::NotFound)?;

    let tone = match (at.date() - now.date()).num_days() {
        0 => texts::ForecastTone::today_at(at.time()),
        1 => texts::ForecastTone::tomorrow(),
        _ => texts::ForecastTone::some_day(),
    };
    let text = texts::forecast_text(city, &slot.weather, &tone);
    Ok((text, slot_nav_board(at, now, &slots)))
}

/// Hour and day navigation around one forecast slot, clamped to the window
/// the provider actually returned.
fn slot_nav_board(
    at: NaiveDateTime,
    now: NaiveDateTime,
    slots: &[ForecastSlot],
) -> InlineKeyboardMarkup {
    let window_end = slots.last().map(|slot| slot.at).unwrap_or(at);

    let prev_slot = at - Duration::hours(3);
    let prev_button = if prev_slot > now {
        button(
            format!("⬅️ {}", prev_slot.format("%H:%M")),
            CallbackAction::ForecastAt(prev_slot),
        )
    } else {
        button("⬅️ Сейчас", CallbackAction::WeatherNow)
    };

    let next_slot = at + Duration::hours(3);
    let next_button = if next_slot <= window_end {
        button(
            format!("{} ➡️", next_slot.format("%H:%M")),
            CallbackAction::ForecastAt(next_slot),
        )
    } else {
        noop_button(BLANK)
    };

    let prev_day = morning_of(at.date() - Duration::days(1));
    let prev_day_button = if prev_day > now {
        button(
            format!("⏪ {}", prev_day.format(DATE_FORMAT)),
            CallbackAction::ForecastAt(prev_day),
        )
    } else {
        button("⏪ Сейчас", CallbackAction::WeatherNow)
    };

    let next_day = morning_of(at.date() + Duration::days(1));
    let next_day_button = if next_day <= window_end {
        button(
            format!("{} ⏩", next_day.format(DATE_FORMAT)),
            CallbackAction::ForecastAt(next_day),
        )
    } else {
        noop_button(BLANK)
    };

    InlineKeyboardMarkup::new(vec![
        vec![
            prev_button,
            noop_button(at.format("%H:%M").to_string()),
            next_button,
        ],
        vec![
            prev_day_button,
            noop_button(at.format(DATE_FORMAT).to_string()),
            next_day_button,
        ],
        vec![
            button("⏮️ Сейчас", CallbackAction::WeatherNow),
            button("🔹 Завтра 🔹", CallbackAction::TomorrowForecast(DayPart::Day)),
        ],
        keyboards::back_row(CallbackAction::MainMenu),
    ])
}

async fn tomorrow_view(
    weather: &WeatherClient,
    geo: GeoPoint,
    city: Option<&str>,
    part: DayPart,
    now: NaiveDateTime,
) -> Result<(String, InlineKeyboardMarkup), ApiError> {
    let slots = weather.forecast(geo, FORECAST_SLOTS_2_DAYS).await?;
    let tomorrow = now.date() + Duration::days(1);
    let bucket: Vec<&CurrentWeather> = slots
        .iter()
        .filter(|slot| slot.at.date() == tomorrow && part.contains_hour(slot.at.hour()))
        .map(|slot| &slot.weather)
        .collect();
    if bucket.is_empty() {
        return Err(ApiError::NotFound);
    }

    let aggregated = aggregate(&bucket);
    let icon = match part {
        DayPart::Night => "🌃",
        DayPart::Morning => "🌅",
        DayPart::Evening => "🌇",
        DayPart::Day => converters::condition_icon(aggregated.condition_id),
    };
    let text = texts::forecast_text_with_icon(
        icon,
        city,
        &aggregated,
        &texts::ForecastTone::tomorrow_part(part.label()),
    );
    Ok((text, tomorrow_board(tomorrow)))
}

/// Averages a time-of-day bucket; the most frequent condition description
/// (and its slot) represents the non-numeric fields.
fn aggregate(bucket: &[&CurrentWeather]) -> CurrentWeather {
    let len = bucket.len() as f64;
    let description = converters::most_common(bucket.iter().map(|w| w.description.as_str()))
        .unwrap_or_default()
        .to_string();
    let representative = bucket
        .iter()
        .find(|w| w.description == description)
        .unwrap_or(&bucket[0]);

    let avg = |total: f64| (total / len * 100.0).round() / 100.0;
    CurrentWeather {
        condition_id: representative.condition_id,
        description,
        temp: avg(bucket.iter().map(|w| w.temp).sum()),
        feels_like: avg(bucket.iter().map(|w| w.feels_like).sum()),
        pressure_mmhg: avg(bucket.iter().map(|w| w.pressure_mmhg).sum()),
        humidity: (bucket.iter().map(|w| w.humidity).sum::<f64>() / len).round(),
        wind_deg: representative.wind_deg,
        wind_speed: avg(bucket.iter().map(|w| w.wind_speed).sum()),
        clouds: (bucket.iter().map(|w| w.clouds).sum::<f64>() / len).round(),
    }
}

fn tomorrow_board(tomorrow: NaiveDate) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("🌃 Ночью", CallbackAction::TomorrowForecast(DayPart::Night)),
            button("🌅 Утром", CallbackAction::TomorrowForecast(DayPart::Morning)),
        ],
        vec![
            button("🏙️ Днём", CallbackAction::TomorrowForecast(DayPart::Day)),
            button("🌇 Вечером", CallbackAction::TomorrowForecast(DayPart::Evening)),
        ],
        vec![
            button("⬅️ Сейчас", CallbackAction::WeatherNow),
            noop_button(tomorrow.format(DATE_FORMAT).to_string()),
        ],
        keyboards::back_row(CallbackAction::MainMenu),
    ])
}

async fn show_error(
    bot: &Bot,
    origin: Option<(ChatId, teloxide::types::MessageId)>,
    chat_id: ChatId,
    error: &ApiError,
) -> HandlerResult {
    if !error.is_not_found() {
        log::warn!("weather lookup for {chat_id} failed: {error}");
    }
    util::send_or_edit(
        bot,
        origin,
        chat_id,
        texts::forecast_error_text(error),
        keyboards::home(),
    )
    .await
}

/// Start of the next 3-hour forecast slot after `now`.
fn next_slot_start(now: NaiveDateTime) -> NaiveDateTime {
    let next_hour = (now.hour() / 3 + 1) * 3;
    let (date, hour) = if next_hour >= 24 {
        (now.date() + Duration::days(1), 0)
    } else {
        (now.date(), next_hour)
    };
    date.and_hms_opt(hour, 0, 0)
        .expect("slot hours are always valid")
}

fn morning_of(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(9, 0, 0).expect("09:00 is a valid time")
}

fn button(text: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text.into(), action.encode())
}

fn noop_button(text: impl Into<String>) -> InlineKeyboardButton {
    button(text, CallbackAction::Noop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datetime(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample_weather(description: &str, temp: f64) -> CurrentWeather {
        CurrentWeather {
            condition_id: 800,
            description: description.to_string(),
            temp,
            feels_like: temp - 2.0,
            pressure_mmhg: 750.0,
            humidity: 50.0,
            wind_deg: 90.0,
            wind_speed: 3.0,
            clouds: 10.0,
        }
    }

    #[test]
    fn next_slot_lands_on_a_three_hour_boundary() {
        assert_eq!(next_slot_start(datetime(1, 10)), datetime(1, 12));
        assert_eq!(next_slot_start(datetime(1, 12)), datetime(1, 15));
        assert_eq!(next_slot_start(datetime(1, 23)), datetime(2, 0));
    }

    #[test]
    fn aggregate_averages_numbers_and_votes_on_description() {
        let first = sample_weather("ясно", 10.0);
        let second = sample_weather("ясно", 14.0);
        let third = sample_weather("дождь", 12.0);
        let bucket = vec![&first, &second, &third];

        let aggregated = aggregate(&bucket);

        assert_eq!(aggregated.description, "ясно");
        assert_eq!(aggregated.temp, 12.0);
        assert_eq!(aggregated.humidity, 50.0);
    }

    #[test]
    fn slot_navigation_hides_steps_outside_the_window() {
        let now = datetime(1, 10);
        let slots: Vec<ForecastSlot> = (0..4)
            .map(|i| ForecastSlot {
                at: datetime(1, 12) + Duration::hours(3 * i),
                weather: sample_weather("ясно", 10.0),
            })
            .collect();
        // Last slot of the window: 21:00 on day one.
        let board = slot_nav_board(datetime(1, 21), now, &slots);

        let data: Vec<String> = board
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|button| match &button.kind {
                teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => {
                    Some(data.clone())
                }
                _ => None,
            })
            .collect();

        // The next-slot and next-day buttons degrade to blanks.
        let beyond = CallbackAction::ForecastAt(datetime(2, 0)).encode();
        assert!(!data.contains(&beyond));
        // The previous slot at 18:00 is still reachable.
        let prev = CallbackAction::ForecastAt(datetime(1, 18)).encode();
        assert!(data.contains(&prev));
    }
}
