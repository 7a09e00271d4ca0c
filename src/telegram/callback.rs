use chrono::{NaiveDateTime, NaiveTime};

use crate::converters;
use crate::user::ReturnTo;

const DATETIME_FORMAT: &str = "%d.%m.%Y-%H:%M";

/// Time-of-day bucket for the tomorrow forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPart {
    Night,
    Morning,
    Day,
    Evening,
}

impl DayPart {
    pub fn label(self) -> &'static str {
        match self {
            DayPart::Night => "ночью",
            DayPart::Morning => "утром",
            DayPart::Day => "днём",
            DayPart::Evening => "вечером",
        }
    }

    pub fn contains_hour(self, hour: u32) -> bool {
        match self {
            DayPart::Night => hour < 5,
            DayPart::Morning => (5..=11).contains(&hour),
            DayPart::Day => (12..=17).contains(&hour),
            DayPart::Evening => hour >= 18,
        }
    }

    fn encode(self) -> &'static str {
        match self {
            DayPart::Night => "night",
            DayPart::Morning => "morning",
            DayPart::Day => "day",
            DayPart::Evening => "evening",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "night" => Some(DayPart::Night),
            "morning" => Some(DayPart::Morning),
            "day" => Some(DayPart::Day),
            "evening" => Some(DayPart::Evening),
            _ => None,
        }
    }
}

/// Everything an inline button can ask the bot to do. Callback-query data is
/// parsed into this once, so handlers never poke at raw strings.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    MainMenu,
    Settings,
    SendLocation(ReturnTo),
    NotifySettings,
    DeleteData,
    WeatherNow,
    ForecastAt(NaiveDateTime),
    TomorrowForecast(DayPart),
    AddNotify,
    DelNotify(NaiveTime),
    ShowHours,
    ShowMinutes,
    CollapsePicker,
    PickHour(u32),
    PickMinute(u32),
    ConfirmNotify,
    Ack,
    Noop,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            CallbackAction::MainMenu => "menu".to_string(),
            CallbackAction::Settings => "settings".to_string(),
            CallbackAction::SendLocation(return_to) => {
                format!("send_location {}", encode_return_to(*return_to))
            }
            CallbackAction::NotifySettings => "notify_settings".to_string(),
            CallbackAction::DeleteData => "delete_data".to_string(),
            CallbackAction::WeatherNow => "weather_now".to_string(),
            CallbackAction::ForecastAt(at) => format!("forecast {}", at.format(DATETIME_FORMAT)),
            CallbackAction::TomorrowForecast(part) => format!("tomorrow {}", part.encode()),
            CallbackAction::AddNotify => "add_notify".to_string(),
            CallbackAction::DelNotify(time) => {
                format!("del_notify {}", converters::format_hhmm(*time))
            }
            CallbackAction::ShowHours => "show_h".to_string(),
            CallbackAction::ShowMinutes => "show_m".to_string(),
            CallbackAction::CollapsePicker => "hide_picker".to_string(),
            CallbackAction::PickHour(hour) => format!("set_h {hour}"),
            CallbackAction::PickMinute(minute) => format!("set_m {minute}"),
            CallbackAction::ConfirmNotify => "create_notify".to_string(),
            CallbackAction::Ack => "ok".to_string(),
            CallbackAction::Noop => "empty".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (head, tail) = match data.split_once(' ') {
            Some((head, tail)) => (head, Some(tail)),
            None => (data, None),
        };

        match (head, tail) {
            ("menu", None) => Some(CallbackAction::MainMenu),
            ("settings", None) => Some(CallbackAction::Settings),
            ("send_location", Some(tail)) => {
                parse_return_to(tail).map(CallbackAction::SendLocation)
            }
            ("notify_settings", None) => Some(CallbackAction::NotifySettings),
            ("delete_data", None) => Some(CallbackAction::DeleteData),
            ("weather_now", None) => Some(CallbackAction::WeatherNow),
            ("forecast", Some(tail)) => NaiveDateTime::parse_from_str(tail, DATETIME_FORMAT)
                .ok()
                .map(CallbackAction::ForecastAt),
            ("tomorrow", Some(tail)) => DayPart::parse(tail).map(CallbackAction::TomorrowForecast),
            ("add_notify", None) => Some(CallbackAction::AddNotify),
            ("del_notify", Some(tail)) => {
                converters::parse_hhmm(tail).map(CallbackAction::DelNotify)
            }
            ("show_h", None) => Some(CallbackAction::ShowHours),
            ("show_m", None) => Some(CallbackAction::ShowMinutes),
            ("hide_picker", None) => Some(CallbackAction::CollapsePicker),
            ("set_h", Some(tail)) => tail
                .parse()
                .ok()
                .filter(|hour| *hour < 24)
                .map(CallbackAction::PickHour),
            ("set_m", Some(tail)) => tail
                .parse()
                .ok()
                .filter(|minute| *minute < 60)
                .map(CallbackAction::PickMinute),
            ("create_notify", None) => Some(CallbackAction::ConfirmNotify),
            ("ok", None) => Some(CallbackAction::Ack),
            ("empty", None) => Some(CallbackAction::Noop),
            _ => None,
        }
    }
}

fn encode_return_to(return_to: ReturnTo) -> &'static str {
    match return_to {
        ReturnTo::Settings => "settings",
        ReturnTo::Forecast => "forecast",
        ReturnTo::Notify => "notify",
    }
}

fn parse_return_to(text: &str) -> Option<ReturnTo> {
    match text {
        "settings" => Some(ReturnTo::Settings),
        "forecast" => Some(ReturnTo::Forecast),
        "notify" => Some(ReturnTo::Notify),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn every_action_survives_an_encode_parse_roundtrip() {
        let at = NaiveDate::from_ymd_opt(2023, 11, 21)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        let actions = [
            CallbackAction::MainMenu,
            CallbackAction::Settings,
            CallbackAction::SendLocation(ReturnTo::Settings),
            CallbackAction::SendLocation(ReturnTo::Notify),
            CallbackAction::NotifySettings,
            CallbackAction::DeleteData,
            CallbackAction::WeatherNow,
            CallbackAction::ForecastAt(at),
            CallbackAction::TomorrowForecast(DayPart::Evening),
            CallbackAction::AddNotify,
            CallbackAction::DelNotify(NaiveTime::from_hms_opt(8, 30, 0).unwrap()),
            CallbackAction::ShowHours,
            CallbackAction::ShowMinutes,
            CallbackAction::CollapsePicker,
            CallbackAction::PickHour(23),
            CallbackAction::PickMinute(55),
            CallbackAction::ConfirmNotify,
            CallbackAction::Ack,
            CallbackAction::Noop,
        ];

        for action in actions {
            let parsed = CallbackAction::parse(&action.encode());
            assert_eq!(parsed, Some(action));
        }
    }

    #[test]
    fn garbage_data_does_not_parse() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("forecast yesterday"), None);
        assert_eq!(CallbackAction::parse("set_h 24"), None);
        assert_eq!(CallbackAction::parse("set_m 61"), None);
        assert_eq!(CallbackAction::parse("del_notify 99:99"), None);
        assert_eq!(CallbackAction::parse("send_location nowhere"), None);
    }

    #[test]
    fn day_part_buckets_split_the_day() {
        assert!(DayPart::Night.contains_hour(4));
        assert!(!DayPart::Night.contains_hour(5));
        assert!(DayPart::Morning.contains_hour(5));
        assert!(DayPart::Morning.contains_hour(11));
        assert!(DayPart::Day.contains_hour(12));
        assert!(DayPart::Day.contains_hour(17));
        assert!(DayPart::Evening.contains_hour(18));
        assert!(DayPart::Evening.contains_hour(23));
    }
}
