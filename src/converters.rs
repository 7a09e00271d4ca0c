use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// All wall-clock arithmetic in the bot happens in this timezone; per-user
/// `tz_shift` values are relative to it.
pub const REFERENCE_TZ: Tz = chrono_tz::Europe::Moscow;

/// Hours between the reference timezone and UTC.
pub const REFERENCE_UTC_OFFSET_HOURS: i64 = 3;

pub fn reference_now() -> NaiveDateTime {
    Utc::now().with_timezone(&REFERENCE_TZ).naive_local()
}

/// Converts a provider unix timestamp into reference-timezone wall clock.
pub fn reference_datetime(unix: i64) -> Option<NaiveDateTime> {
    let utc: DateTime<Utc> = Utc.timestamp_opt(unix, 0).single()?;
    Some(utc.with_timezone(&REFERENCE_TZ).naive_local())
}

/// Parses user-entered `HH:MM`. Accepts a single-digit hour the same way the
/// time keyboard does; anything out of range is rejected.
pub fn parse_hhmm(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").ok()
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn degrees_to_side(deg: f64) -> &'static str {
    let deg = deg.rem_euclid(360.0);
    match deg {
        d if !(22.5..337.5).contains(&d) => "северный",
        d if d < 67.5 => "северо-восточный",
        d if d < 112.5 => "восточный",
        d if d < 157.5 => "юго-восточный",
        d if d < 202.5 => "южный",
        d if d < 247.5 => "юго-западный",
        d if d < 292.5 => "западный",
        _ => "северо-западный",
    }
}

/// Maps an OpenWeatherMap condition id onto an emoji icon.
pub fn condition_icon(id: i64) -> &'static str {
    match id / 100 {
        2 => "⛈️",
        3 => "🌦️",
        5 => "🌧️",
        6 => "🌨️",
        7 => match id % 100 / 10 {
            3 | 5 | 6 => "💨",
            _ => "🌫️",
        },
        _ => match id % 10 {
            0 => "☀️",
            1 => "🌤️",
            2 => "⛅",
            _ => "🌥️",
        },
    }
}

pub fn hpa_to_mmhg(hpa: f64) -> f64 {
    (hpa * 0.750064 * 100.0).round() / 100.0
}

/// Most frequent element; the earliest seen wins a tie.
pub fn most_common<'a>(items: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (item, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((item, count));
        }
    }
    best.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_digit_hours_format_back_zero_padded() {
        let parsed = parse_hhmm("8:30").unwrap();
        assert_eq!(format_hhmm(parsed), "08:30");
    }

    #[test]
    fn out_of_range_times_are_rejected() {
        assert!(parse_hhmm("24:00").is_none());
        assert!(parse_hhmm("07:60").is_none());
        assert!(parse_hhmm("believe me, eight thirty").is_none());
    }

    proptest! {
        // Every string the `HH:MM` input pattern accepts must survive a
        // parse/format roundtrip as its zero-padded form.
        #[test]
        fn hhmm_roundtrips_zero_padded(hour in 0u32..24, minute in 0u32..60, pad in proptest::bool::ANY) {
            let text = if pad || hour > 9 {
                format!("{hour:02}:{minute:02}")
            } else {
                format!("{hour}:{minute:02}")
            };

            let parsed = parse_hhmm(&text).expect("pattern-valid input must parse");
            prop_assert_eq!(format_hhmm(parsed), format!("{:02}:{:02}", hour, minute));
        }
    }

    #[test]
    fn wind_sides_cover_the_rose() {
        assert_eq!(degrees_to_side(0.0), "северный");
        assert_eq!(degrees_to_side(350.0), "северный");
        assert_eq!(degrees_to_side(45.0), "северо-восточный");
        assert_eq!(degrees_to_side(90.0), "восточный");
        assert_eq!(degrees_to_side(180.0), "южный");
        assert_eq!(degrees_to_side(270.0), "западный");
        assert_eq!(degrees_to_side(315.0), "северо-западный");
    }

    #[test]
    fn condition_icons_match_provider_groups() {
        assert_eq!(condition_icon(211), "⛈️");
        assert_eq!(condition_icon(301), "🌦️");
        assert_eq!(condition_icon(502), "🌧️");
        assert_eq!(condition_icon(601), "🌨️");
        assert_eq!(condition_icon(731), "💨");
        assert_eq!(condition_icon(741), "🌫️");
        assert_eq!(condition_icon(800), "☀️");
        assert_eq!(condition_icon(801), "🌤️");
        assert_eq!(condition_icon(802), "⛅");
        assert_eq!(condition_icon(804), "🌥️");
    }

    #[test]
    fn pressure_converts_to_mmhg() {
        assert_eq!(hpa_to_mmhg(1000.0), 750.06);
    }

    #[test]
    fn most_common_prefers_the_earliest_on_ties() {
        let winner = most_common(["ясно", "дождь", "дождь", "ясно"]);
        assert_eq!(winner, Some("ясно"));
    }

    #[test]
    fn most_common_of_nothing_is_none() {
        assert_eq!(most_common(std::iter::empty::<&str>()), None);
    }
}
