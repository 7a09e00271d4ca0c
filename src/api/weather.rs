use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;

use crate::converters;
use crate::user::GeoPoint;

use super::ApiError;

const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// 3-hour slots covering the full 5-day forecast window.
pub const FORECAST_SLOTS_5_DAYS: u8 = 40;

#[derive(Clone)]
pub struct WeatherClient {
    http: Client,
    api_key: String,
}

/// One weather observation, already converted to the units the bot shows.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeather {
    pub condition_id: i64,
    pub description: String,
    pub temp: f64,
    pub feels_like: f64,
    pub pressure_mmhg: f64,
    pub humidity: f64,
    pub wind_deg: f64,
    pub wind_speed: f64,
    pub clouds: f64,
}

/// Sunrise and sunset in reference-timezone wall clock.
#[derive(Debug, Clone, Copy)]
pub struct SunTimes {
    pub sunrise: NaiveDateTime,
    pub sunset: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct ForecastSlot {
    /// Slot start in reference-timezone wall clock.
    pub at: NaiveDateTime,
    pub weather: CurrentWeather,
}

impl WeatherClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
        }
    }

    pub async fn current(&self, geo: GeoPoint) -> Result<(CurrentWeather, SunTimes), ApiError> {
        let response = self
            .http
            .get(CURRENT_URL)
            .query(&[
                ("lon", geo.lon.to_string()),
                ("lat", geo.lat.to_string()),
                ("units", "metric".to_string()),
                ("lang", "ru".to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::BadStatus(response.status()));
        }

        let body: CurrentResponse = response.json().await?;
        // The provider duplicates its status inside the body; HTTP 200 with a
        // non-200 `cod` means the coordinates resolved to nothing.
        if body.cod != 200 {
            return Err(ApiError::NotFound);
        }
        let condition = body.weather.first().ok_or(ApiError::MalformedPayload)?;

        let sunrise =
            converters::reference_datetime(body.sys.sunrise).ok_or(ApiError::MalformedPayload)?;
        let sunset =
            converters::reference_datetime(body.sys.sunset).ok_or(ApiError::MalformedPayload)?;

        Ok((
            build_weather(condition, &body.main, &body.wind, &body.clouds),
            SunTimes { sunrise, sunset },
        ))
    }

    /// 3-hour forecast slots, `slots` of them (40 covers five days).
    pub async fn forecast(&self, geo: GeoPoint, slots: u8) -> Result<Vec<ForecastSlot>, ApiError> {
        let response = self
            .http
            .get(FORECAST_URL)
            .query(&[
                ("lon", geo.lon.to_string()),
                ("lat", geo.lat.to_string()),
                ("units", "metric".to_string()),
                ("lang", "ru".to_string()),
                ("cnt", slots.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::BadStatus(response.status()));
        }

        let body: ForecastResponse = response.json().await?;
        if body.list.is_empty() {
            return Err(ApiError::NotFound);
        }

        let slots = body
            .list
            .iter()
            .filter_map(|item| {
                let condition = item.weather.first()?;
                let at = converters::reference_datetime(item.dt)?;
                Some(ForecastSlot {
                    at,
                    weather: build_weather(condition, &item.main, &item.wind, &item.clouds),
                })
            })
            .collect();

        Ok(slots)
    }
}

fn build_weather(
    condition: &ConditionInfo,
    main: &MainInfo,
    wind: &WindInfo,
    clouds: &CloudsInfo,
) -> CurrentWeather {
    CurrentWeather {
        condition_id: condition.id,
        description: condition.description.clone(),
        temp: main.temp,
        feels_like: main.feels_like,
        pressure_mmhg: converters::hpa_to_mmhg(main.pressure),
        humidity: main.humidity,
        wind_deg: wind.deg,
        wind_speed: wind.speed,
        clouds: clouds.all,
    }
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    cod: i64,
    weather: Vec<ConditionInfo>,
    main: MainInfo,
    wind: WindInfo,
    clouds: CloudsInfo,
    sys: SysInfo,
}

#[derive(Debug, Deserialize)]
struct ConditionInfo {
    id: i64,
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainInfo {
    temp: f64,
    feels_like: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct WindInfo {
    speed: f64,
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct CloudsInfo {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct SysInfo {
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastItem>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    main: MainInfo,
    weather: Vec<ConditionInfo>,
    wind: WindInfo,
    clouds: CloudsInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_payload_parses_and_converts_units() {
        let payload = r#"{
            "cod": 200,
            "weather": [{"id": 804, "description": "пасмурно"}],
            "main": {"temp": -3.2, "feels_like": -8.0, "pressure": 1013.0, "humidity": 87.0},
            "wind": {"speed": 4.5, "deg": 250.0},
            "clouds": {"all": 100.0},
            "sys": {"sunrise": 1700540000, "sunset": 1700570000}
        }"#;

        let body: CurrentResponse = serde_json::from_str(payload).unwrap();
        let weather = build_weather(&body.weather[0], &body.main, &body.wind, &body.clouds);

        assert_eq!(weather.condition_id, 804);
        assert_eq!(weather.description, "пасмурно");
        assert_eq!(weather.pressure_mmhg, converters::hpa_to_mmhg(1013.0));
        assert_eq!(weather.clouds, 100.0);
    }

    #[test]
    fn forecast_payload_parses_slot_list() {
        let payload = r#"{
            "cod": "200",
            "list": [
                {
                    "dt": 1700550000,
                    "main": {"temp": 1.0, "feels_like": -2.0, "pressure": 1000.0, "humidity": 70.0},
                    "weather": [{"id": 600, "description": "небольшой снег"}],
                    "wind": {"speed": 3.0, "deg": 90.0},
                    "clouds": {"all": 75.0}
                }
            ]
        }"#;

        let body: ForecastResponse = serde_json::from_str(payload).unwrap();

        assert_eq!(body.list.len(), 1);
        assert_eq!(body.list[0].weather[0].id, 600);
    }
}
