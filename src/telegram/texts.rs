//! Every user-facing line of text the bot produces.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use rand::seq::SliceRandom;

use crate::api::{ApiError, CurrentWeather, SunTimes};
use crate::converters;

pub const LOCATION: &str =
    "Отправь своё местоположение кнопкой ниже или напиши название города текстом. 🗺️";
pub const LOCATION_ERROR: &str = "Не нашёл такой город. 😔 Проверь название и попробуй ещё раз.";
pub const SERVICE_UNAVAILABLE: &str = "Сервис сейчас недоступен. 🙈 Попробуй ещё раз чуть позже.";
pub const NO_LOCATION_FORECAST: &str =
    "Чтобы показать прогноз погоды, мне нужно знать твоё местоположение.";
pub const NO_LOCATION_NOTIFY: &str =
    "Чтобы присылать уведомления с прогнозом, мне нужно знать твоё местоположение.";
pub const FORECAST_SLOT_GONE: &str =
    "Этот кусочек прогноза уже недоступен. 🙈 Попробуй открыть прогноз заново.";
pub const NEW_NOTIFY: &str =
    "Выбери время для ежедневного уведомления или отправь его текстом в формате ЧЧ:ММ.";
pub const NOTIFY_ERROR: &str = "Не понял время. 🤔 Отправь его в формате ЧЧ:ММ, например 08:30.";
pub const NOTIFY_SUCCESS: &str = "Уведомление добавлено! 🔔";
pub const NOTIFY_DUPLICATE: &str = "Такое уведомление уже есть. 🔔";
pub const NOTIFY_MISSING: &str = "Такого уведомления уже нет.";
pub const NO_NOTIFIES: &str = "🔔 Уведомлений пока нет. Самое время добавить первое!";
pub const DATA_DELETED: &str =
    "Я всё забыл! 🙈 Твои данные удалены. Возвращайся, когда захочешь.";
pub const CANCELLED: &str = "Хорошо, отменил. 👌";
pub const UNKNOWN_INPUT: &str =
    "Я не понял сообщение. 🙈 Нажми /start, чтобы открыть главное меню.";
pub const UNKNOWN_QUERY: &str =
    "Не смог обработать нажатие. Попробуй ещё раз или нажми /start.";
pub const RESTARTED: &str = "Бот перезапущен 🚀 /start";

pub fn start_text(greeting: &str, name: Option<&str>, first_time: bool) -> String {
    let hello = match (first_time, name) {
        (true, Some(name)) => {
            format!("{greeting}! Я Зефирка 🖖🏼 А ты, кажется, {name}? Приятно познакомиться! 🤝")
        }
        (true, None) => format!("{greeting}! Я Зефирка 🖖🏼 Приятно познакомиться! 🤝"),
        (false, Some(name)) => format!("{greeting}, {name}! 🖖🏼"),
        (false, None) => format!("{greeting}! 🖖🏼"),
    };
    format!(
        "{hello}\n\nС помощью ветров знаний и сил солнца, неба и дождя я предсказываю погоду на каждый день! \
         Нажми на кнопку «Прогноз погоды», чтобы узнать прогноз на сегодня, на завтра и даже на несколько дней вперёд. ⛅\n\n\
         В «Настройках» можно указать своё местоположение и время, когда ты хочешь получать уведомления. 🔔"
    )
}

pub fn settings_text(city: Option<&str>) -> String {
    let base = "⚙️ Настройки\n\nЗдесь можно обновить местоположение, настроить уведомления или удалить свои данные.";
    match city {
        Some(city) => format!("{base}\n\n📍 Текущее местоположение: {city}."),
        None => base.to_string(),
    }
}

pub fn current_location(city: &str) -> String {
    format!("📍 Сейчас твоё местоположение: {city}.")
}

pub fn location_set(city: &str) -> String {
    format!("Отлично, запомнил: {city}! 📍")
}

pub fn current_notifies(times: &[NaiveTime]) -> String {
    let list = times
        .iter()
        .map(|time| converters::format_hhmm(*time))
        .collect::<Vec<_>>()
        .join(", ");
    format!("🔔 Твои уведомления: {list}.\n\nНажми на время, чтобы удалить его.")
}

/// "City not recognized" versus "service unavailable", per the adapter
/// error taxonomy.
pub fn location_error_text(error: &ApiError) -> &'static str {
    if error.is_not_found() {
        LOCATION_ERROR
    } else {
        SERVICE_UNAVAILABLE
    }
}

pub fn forecast_error_text(error: &ApiError) -> &'static str {
    if error.is_not_found() {
        FORECAST_SLOT_GONE
    } else {
        SERVICE_UNAVAILABLE
    }
}

/// Grammatical wrapping of a forecast: "сейчас облачно" versus "завтра будет
/// облачно" versus "сегодня в 15:00 будет облачно".
pub struct ForecastTone {
    adverb: String,
    verb: &'static str,
    feels_verb: &'static str,
}

impl ForecastTone {
    pub fn now() -> Self {
        Self {
            adverb: "сейчас".to_string(),
            verb: "",
            feels_verb: "ощущается",
        }
    }

    pub fn today_at(time: NaiveTime) -> Self {
        Self {
            adverb: format!("сегодня в {}", converters::format_hhmm(time)),
            verb: "будет ",
            feels_verb: "ощутится",
        }
    }

    pub fn tomorrow() -> Self {
        Self {
            adverb: "завтра".to_string(),
            verb: "будет ",
            feels_verb: "ощутится",
        }
    }

    pub fn tomorrow_part(part: &str) -> Self {
        Self {
            adverb: format!("завтра {part}"),
            verb: "будет ",
            feels_verb: "ощутится",
        }
    }

    pub fn some_day() -> Self {
        Self {
            adverb: "в этот день".to_string(),
            verb: "будет ",
            feels_verb: "ощутится",
        }
    }

    pub fn daily() -> Self {
        Self {
            adverb: "сегодня".to_string(),
            verb: "будет ",
            feels_verb: "ощущается",
        }
    }
}

pub fn forecast_text(city: Option<&str>, weather: &CurrentWeather, tone: &ForecastTone) -> String {
    forecast_text_with_icon(
        converters::condition_icon(weather.condition_id),
        city,
        weather,
        tone,
    )
}

pub fn forecast_text_with_icon(
    icon: &str,
    city: Option<&str>,
    weather: &CurrentWeather,
    tone: &ForecastTone,
) -> String {
    let place = city.map(|city| format!("{city}. ")).unwrap_or_default();
    let adverb = capitalize(&tone.adverb);
    format!(
        "{icon} {place}{adverb} {verb}{desc}.\n\n\
         🌡 Температура: {temp:.1}°C, {feels_verb} как {feels:.1}°C\n\
         💨 Ветер {side}, {speed:.1} м/с\n\
         🔸 Давление: {pressure:.0} мм рт. ст.\n\
         💧 Влажность: {humidity:.0}%\n\
         ☁️ Облачность: {clouds:.0}%",
        verb = tone.verb,
        desc = weather.description,
        temp = weather.temp,
        feels_verb = tone.feels_verb,
        feels = weather.feels_like,
        side = converters::degrees_to_side(weather.wind_deg),
        speed = weather.wind_speed,
        pressure = weather.pressure_mmhg,
        humidity = weather.humidity,
        clouds = weather.clouds,
    )
}

pub fn sun_text(sun: &SunTimes, now: NaiveDateTime) -> String {
    let sunrise_verb = if now > sun.sunrise { "был" } else { "будет" };
    let sunset_verb = if now > sun.sunset { "был" } else { "будет" };
    format!(
        "🌅 Восход {sunrise_verb} в {}, закат {sunset_verb} в {}.",
        converters::format_hhmm(sun.sunrise.time()),
        converters::format_hhmm(sun.sunset.time()),
    )
}

/// Greeting that follows the user's local clock; falls back to a neutral one
/// while the timezone is still unknown.
pub fn greeting(tz_shift: Option<i32>, reference_now: NaiveDateTime) -> String {
    let Some(shift) = tz_shift else {
        return pick(&["Привет", "Приветик", "Приветствую", "Хэллоу", "Салют"]).to_string();
    };

    let local_hour = (reference_now + Duration::hours(shift.into())).hour();
    let options: &[&str] = match local_hour {
        5..=11 => &[
            "Доброе утро",
            "Доброго утра",
            "Утро доброе",
            "Добрейшее утречко",
        ],
        12..=16 => &["Добрый день", "Доброго дня", "День добрый", "Добрый денёк"],
        17..=22 => &[
            "Добрый вечер",
            "Доброго вечера",
            "Вечер добрый",
            "Добрый вечерок",
        ],
        _ => &["Доброй ночи", "Спокойной ночи", "Привет глубокой ночью"],
    };
    pick(options).to_string()
}

fn pick<'a>(options: &[&'a str]) -> &'a str {
    options
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Привет")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn greeting_follows_the_local_clock() {
        let morning = [
            "Доброе утро",
            "Доброго утра",
            "Утро доброе",
            "Добрейшее утречко",
        ];
        // 05:00 reference, shift +3 puts the user at 08:00 local.
        assert!(morning.contains(&greeting(Some(3), at(5)).as_str()));

        let night = ["Доброй ночи", "Спокойной ночи", "Привет глубокой ночью"];
        assert!(night.contains(&greeting(Some(0), at(3)).as_str()));
    }

    #[test]
    fn greeting_without_timezone_stays_neutral() {
        let neutral = ["Привет", "Приветик", "Приветствую", "Хэллоу", "Салют"];
        assert!(neutral.contains(&greeting(None, at(8)).as_str()));
    }

    #[test]
    fn forecast_text_mentions_city_and_condition() {
        let weather = CurrentWeather {
            condition_id: 804,
            description: "пасмурно".to_string(),
            temp: -3.2,
            feels_like: -8.0,
            pressure_mmhg: 759.81,
            humidity: 87.0,
            wind_deg: 250.0,
            wind_speed: 4.5,
            clouds: 100.0,
        };

        let text = forecast_text(Some("Москва"), &weather, &ForecastTone::now());

        assert!(text.starts_with("🌥️ Москва. Сейчас пасмурно."));
        assert!(text.contains("Температура: -3.2°C"));
        assert!(text.contains("Ветер западный, 4.5 м/с"));
        assert!(text.contains("Давление: 760 мм рт. ст."));
    }

    #[test]
    fn sun_verbs_depend_on_the_current_time() {
        let sun = SunTimes {
            sunrise: at(8),
            sunset: at(17),
        };

        let midday = sun_text(&sun, at(12));
        assert!(midday.contains("Восход был в 08:00"));
        assert!(midday.contains("закат будет в 17:00"));
    }
}
