mod geocode;
mod timezone;
mod weather;

pub use geocode::GeocodeClient;
pub use timezone::TimezoneClient;
pub use weather::{CurrentWeather, FORECAST_SLOTS_5_DAYS, ForecastSlot, SunTimes, WeatherClient};

use thiserror::Error;

/// Failure taxonomy shared by the HTTP adapters. Callers distinguish
/// [`ApiError::NotFound`] (show "city not recognized") from everything else
/// (show "service unavailable").
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("the provider returned no results")]
    NotFound,
    #[error("the provider rejected the request: HTTP {0}")]
    BadStatus(reqwest::StatusCode),
    #[error("the provider returned a payload we could not use")]
    MalformedPayload,
    #[error("could not reach the provider: {0}")]
    Request(#[from] reqwest::Error),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }
}
