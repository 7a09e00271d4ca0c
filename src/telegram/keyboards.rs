use chrono::NaiveTime;
use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

use crate::converters;
use crate::user::{MAX_NOTIFY_TIMES, ReturnTo};

use super::callback::CallbackAction;

/// Reply-keyboard label that backs out of the location dialog.
pub const BACK_LABEL: &str = "🔙 Назад";

fn button(text: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text.into(), action.encode())
}

pub fn back_row(action: CallbackAction) -> Vec<InlineKeyboardButton> {
    vec![button(BACK_LABEL, action)]
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("Прогноз погоды", CallbackAction::WeatherNow)],
        vec![button("Настройки", CallbackAction::Settings)],
    ])
}

pub fn home() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button(
        "В главное меню 🏠",
        CallbackAction::MainMenu,
    )]])
}

pub fn settings() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(
            "🗺️ Обновить местоположение",
            CallbackAction::SendLocation(ReturnTo::Settings),
        )],
        vec![button("🔔 Настроить уведомления", CallbackAction::NotifySettings)],
        vec![button("🗑️ Удалить мои данные", CallbackAction::DeleteData)],
        back_row(CallbackAction::MainMenu),
    ])
}

pub fn location_request() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new("🗺️ Отправить своё местоположение").request(ButtonRequest::Location)],
        vec![KeyboardButton::new(BACK_LABEL)],
    ])
    .resize_keyboard()
    .one_time_keyboard()
}

pub fn notify_list(times: &[NaiveTime]) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if !times.is_empty() {
        rows.push(
            times
                .iter()
                .map(|time| {
                    button(
                        format!("❌ {}", converters::format_hhmm(*time)),
                        CallbackAction::DelNotify(*time),
                    )
                })
                .collect(),
        );
    }
    if times.len() < MAX_NOTIFY_TIMES {
        rows.push(vec![button(
            "➕ Добавить новое уведомление",
            CallbackAction::AddNotify,
        )]);
    }
    rows.push(back_row(CallbackAction::Settings));
    InlineKeyboardMarkup::new(rows)
}

/// Collapsed picker: current choice plus a confirm button.
pub fn time_picker(hour: u32, minute: u32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button(format!("Час: {hour:02}"), CallbackAction::ShowHours),
            button(format!("Минута: {minute:02}"), CallbackAction::ShowMinutes),
        ],
        vec![button(
            format!("✅ Добавить {hour:02}:{minute:02}"),
            CallbackAction::ConfirmNotify,
        )],
        back_row(CallbackAction::NotifySettings),
    ])
}

pub fn hour_picker(hour: u32, minute: u32) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = (0..24u32)
        .collect::<Vec<_>>()
        .chunks(6)
        .map(|chunk| {
            chunk
                .iter()
                .map(|h| {
                    let label = if *h == hour {
                        format!("• {h:02} •")
                    } else {
                        format!("{h:02}")
                    };
                    button(label, CallbackAction::PickHour(*h))
                })
                .collect()
        })
        .collect();
    rows.push(vec![button(
        format!("Свернуть ({hour:02}:{minute:02})"),
        CallbackAction::CollapsePicker,
    )]);
    rows.push(back_row(CallbackAction::NotifySettings));
    InlineKeyboardMarkup::new(rows)
}

pub fn minute_picker(hour: u32, minute: u32) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = (0..60u32)
        .step_by(5)
        .collect::<Vec<_>>()
        .chunks(6)
        .map(|chunk| {
            chunk
                .iter()
                .map(|m| {
                    let label = if *m == minute {
                        format!("• {m:02} •")
                    } else {
                        format!("{m:02}")
                    };
                    button(label, CallbackAction::PickMinute(*m))
                })
                .collect()
        })
        .collect();
    rows.push(vec![button(
        format!("Свернуть ({hour:02}:{minute:02})"),
        CallbackAction::CollapsePicker,
    )]);
    rows.push(back_row(CallbackAction::NotifySettings));
    InlineKeyboardMarkup::new(rows)
}

pub fn thanks() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("Спасибо 🫂", CallbackAction::Ack)]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_data(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|button| match &button.kind {
                teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => {
                    Some(data.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn every_notify_list_button_parses_back() {
        let times = vec![
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        ];

        for data in flat_data(&notify_list(&times)) {
            assert!(
                CallbackAction::parse(&data).is_some(),
                "unparseable callback data: {data}"
            );
        }
    }

    #[test]
    fn add_button_disappears_when_the_list_is_full() {
        let times: Vec<NaiveTime> = (0..MAX_NOTIFY_TIMES as u32)
            .map(|hour| NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
            .collect();

        let add = CallbackAction::AddNotify.encode();
        assert!(!flat_data(&notify_list(&times)).contains(&add));
        assert!(flat_data(&notify_list(&times[..1])).contains(&add));
    }

    #[test]
    fn pickers_emit_only_valid_actions() {
        for markup in [
            time_picker(8, 30),
            hour_picker(8, 30),
            minute_picker(8, 30),
        ] {
            for data in flat_data(&markup) {
                assert!(
                    CallbackAction::parse(&data).is_some(),
                    "unparseable callback data: {data}"
                );
            }
        }
    }
}
