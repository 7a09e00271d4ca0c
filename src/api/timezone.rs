use reqwest::Client;
use serde::Deserialize;

use crate::converters::REFERENCE_UTC_OFFSET_HOURS;
use crate::user::GeoPoint;

use super::ApiError;

const TIMEZONEDB_URL: &str = "http://api.timezonedb.com/v2.1/get-time-zone";

#[derive(Clone)]
pub struct TimezoneClient {
    http: Client,
    api_key: String,
}

impl TimezoneClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
        }
    }

    /// Offset of the location's timezone in whole hours relative to the
    /// bot's reference timezone. Sub-hour offsets round toward UTC.
    pub async fn tz_shift(&self, geo: GeoPoint) -> Result<i32, ApiError> {
        let response = self
            .http
            .get(TIMEZONEDB_URL)
            .query(&[
                ("key", self.api_key.clone()),
                ("format", "json".to_string()),
                ("by", "position".to_string()),
                ("lng", geo.lon.to_string()),
                ("lat", geo.lat.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::BadStatus(response.status()));
        }

        let body: TimezoneResponse = response.json().await?;
        if body.status != "OK" {
            return Err(ApiError::NotFound);
        }

        Ok(shift_from_gmt_offset(body.gmt_offset))
    }
}

fn shift_from_gmt_offset(gmt_offset_seconds: i64) -> i32 {
    (gmt_offset_seconds.div_euclid(3600) - REFERENCE_UTC_OFFSET_HOURS) as i32
}

#[derive(Debug, Deserialize)]
struct TimezoneResponse {
    status: String,
    #[serde(rename = "gmtOffset")]
    gmt_offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_relative_to_the_reference_timezone() {
        // Yekaterinburg, UTC+5.
        assert_eq!(shift_from_gmt_offset(5 * 3600), 2);
        // Moscow itself.
        assert_eq!(shift_from_gmt_offset(3 * 3600), 0);
        // Kaliningrad, UTC+2.
        assert_eq!(shift_from_gmt_offset(2 * 3600), -1);
        // New York in winter, UTC-5; floor division keeps whole hours.
        assert_eq!(shift_from_gmt_offset(-5 * 3600), -8);
    }

    #[test]
    fn payload_status_field_is_checked_verbatim() {
        let payload = r#"{"status": "FAILED", "gmtOffset": 0}"#;
        let body: TimezoneResponse = serde_json::from_str(payload).unwrap();
        assert_ne!(body.status, "OK");
    }
}
