use reqwest::Client;
use serde::Deserialize;

use crate::user::GeoPoint;

use super::ApiError;

const GEOCODER_URL: &str = "https://geocode-maps.yandex.ru/1.x";

#[derive(Clone)]
pub struct GeocodeClient {
    http: Client,
    api_key: String,
}

impl GeocodeClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
        }
    }

    /// Resolves free-form city text into coordinates and the canonical name.
    pub async fn geocode(&self, city: &str) -> Result<(GeoPoint, String), ApiError> {
        let body = self
            .request(&[
                ("geocode", city.to_string()),
                ("apikey", self.api_key.clone()),
                ("format", "json".to_string()),
            ])
            .await?;

        let object = body.into_first_object().ok_or(ApiError::NotFound)?;
        let geo = object
            .point
            .as_ref()
            .and_then(Point::parse)
            .ok_or(ApiError::MalformedPayload)?;
        Ok((geo, object.name))
    }

    /// Resolves coordinates into the name of the locality they belong to.
    pub async fn reverse_geocode(&self, geo: GeoPoint) -> Result<String, ApiError> {
        let body = self
            .request(&[
                ("geocode", format!("{}, {}", geo.lon, geo.lat)),
                ("kind", "locality".to_string()),
                ("apikey", self.api_key.clone()),
                ("format", "json".to_string()),
            ])
            .await?;

        let object = body.into_first_object().ok_or(ApiError::NotFound)?;
        Ok(object.name)
    }

    async fn request(&self, params: &[(&str, String)]) -> Result<GeocoderResponse, ApiError> {
        let response = self.http.get(GEOCODER_URL).query(params).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::BadStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct GeocoderResponse {
    response: GeocoderInner,
}

impl GeocoderResponse {
    fn into_first_object(self) -> Option<GeoObject> {
        self.response
            .collection
            .members
            .into_iter()
            .next()
            .map(|member| member.geo_object)
    }
}

#[derive(Debug, Deserialize)]
struct GeocoderInner {
    #[serde(rename = "GeoObjectCollection")]
    collection: GeoObjectCollection,
}

#[derive(Debug, Deserialize)]
struct GeoObjectCollection {
    #[serde(rename = "featureMember")]
    members: Vec<FeatureMember>,
}

#[derive(Debug, Deserialize)]
struct FeatureMember {
    #[serde(rename = "GeoObject")]
    geo_object: GeoObject,
}

#[derive(Debug, Deserialize)]
struct GeoObject {
    name: String,
    #[serde(rename = "Point")]
    point: Option<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
    /// Space-separated "lon lat".
    pos: String,
}

impl Point {
    fn parse(&self) -> Option<GeoPoint> {
        let mut parts = self.pos.split_whitespace();
        let lon = parts.next()?.parse().ok()?;
        let lat = parts.next()?.parse().ok()?;
        Some(GeoPoint::new(lon, lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "response": {
            "GeoObjectCollection": {
                "featureMember": [
                    {
                        "GeoObject": {
                            "name": "Москва",
                            "Point": {"pos": "37.617635 55.755814"}
                        }
                    }
                ]
            }
        }
    }"#;

    #[test]
    fn first_member_carries_name_and_coordinates() {
        let body: GeocoderResponse = serde_json::from_str(PAYLOAD).unwrap();

        let object = body.into_first_object().unwrap();
        let geo = object.point.as_ref().and_then(Point::parse).unwrap();

        assert_eq!(object.name, "Москва");
        assert_eq!(geo, GeoPoint::new(37.617635, 55.755814));
    }

    #[test]
    fn empty_member_list_means_not_found() {
        let payload = r#"{"response": {"GeoObjectCollection": {"featureMember": []}}}"#;
        let body: GeocoderResponse = serde_json::from_str(payload).unwrap();

        assert!(body.into_first_object().is_none());
    }

    #[test]
    fn malformed_pos_is_rejected() {
        let point = Point {
            pos: "тридцать семь".to_string(),
        };
        assert!(point.parse().is_none());
    }
}
