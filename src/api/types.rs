//! Domain records served by the reviews API.

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Map coordinates of a restaurant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
  pub lat: f64,
  pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
  #[serde(deserialize_with = "lenient_number")]
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub neighborhood: String,
  #[serde(default)]
  pub cuisine_type: String,
  #[serde(default)]
  pub address: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub photograph: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub latlng: Option<LatLng>,
  /// Day name -> opening hours text
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub operating_hours: BTreeMap<String, String>,
  /// Fields this client doesn't model, kept so snapshots round-trip intact
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  /// Assigned by the server on create
  #[serde(
    default,
    deserialize_with = "lenient_optional_number",
    skip_serializing_if = "Option::is_none"
  )]
  pub id: Option<u64>,
  #[serde(deserialize_with = "lenient_number")]
  pub restaurant_id: u64,
  pub name: String,
  #[serde(deserialize_with = "lenient_number")]
  pub rating: u8,
  #[serde(default)]
  pub comments: String,
  #[serde(
    rename = "createdAt",
    default,
    deserialize_with = "lenient_timestamp",
    skip_serializing_if = "Option::is_none"
  )]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(
    rename = "updatedAt",
    default,
    deserialize_with = "lenient_timestamp",
    skip_serializing_if = "Option::is_none"
  )]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Review {
  /// A review not yet known to the server.
  pub fn draft(restaurant_id: u64, name: &str, rating: u8, comments: &str) -> Self {
    Self {
      id: None,
      restaurant_id,
      name: name.to_string(),
      rating,
      comments: comments.to_string(),
      created_at: None,
      updated_at: None,
      extra: Map::new(),
    }
  }
}

// ============================================================================
// Lenient field decoding
// ============================================================================

// The API echoes form-encoded writes back with numbers as strings, and uses
// epoch milliseconds for some timestamps and RFC 3339 for others.

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
  Number(T),
  Text(String),
}

fn lenient_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de> + FromStr,
  T::Err: Display,
{
  match NumberOrString::<T>::deserialize(deserializer)? {
    NumberOrString::Number(n) => Ok(n),
    NumberOrString::Text(s) => s.trim().parse().map_err(de::Error::custom),
  }
}

fn lenient_optional_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de> + FromStr,
  T::Err: Display,
{
  match Option::<NumberOrString<T>>::deserialize(deserializer)? {
    None => Ok(None),
    Some(NumberOrString::Number(n)) => Ok(Some(n)),
    Some(NumberOrString::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
  }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<NumberOrString<i64>>::deserialize(deserializer)? {
    None => Ok(None),
    Some(NumberOrString::Number(millis)) => Utc
      .timestamp_millis_opt(millis)
      .single()
      .map(Some)
      .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", millis))),
    Some(NumberOrString::Text(s)) => DateTime::parse_from_rfc3339(&s)
      .map(|dt| Some(dt.with_timezone(&Utc)))
      .map_err(de::Error::custom),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_restaurant_keeps_unknown_fields() {
    let restaurant: Restaurant = serde_json::from_value(json!({
      "id": 1,
      "name": "Mission Chinese Food",
      "neighborhood": "Manhattan",
      "cuisine_type": "Asian",
      "latlng": { "lat": 40.713829, "lng": -73.989667 },
      "operating_hours": { "Monday": "5:30 pm - 11:00 pm" },
      "is_favorite": "false"
    }))
    .unwrap();

    assert_eq!(restaurant.id, 1);
    assert_eq!(restaurant.extra.get("is_favorite"), Some(&json!("false")));

    let back = serde_json::to_value(&restaurant).unwrap();
    assert_eq!(back["is_favorite"], json!("false"));
    assert_eq!(back["operating_hours"]["Monday"], json!("5:30 pm - 11:00 pm"));
  }

  #[test]
  fn test_review_accepts_stringly_numbers_and_millis() {
    let review: Review = serde_json::from_value(json!({
      "id": "31",
      "restaurant_id": "2",
      "name": "Morgan",
      "rating": "4",
      "comments": "Great pizza",
      "createdAt": 1504095567183i64,
      "updatedAt": "2017-08-30T12:19:27.183Z"
    }))
    .unwrap();

    assert_eq!(review.id, Some(31));
    assert_eq!(review.restaurant_id, 2);
    assert_eq!(review.rating, 4);
    assert_eq!(review.created_at, review.updated_at);
  }

  #[test]
  fn test_draft_serializes_without_id() {
    let draft = Review::draft(3, "Olive", 5, "Lovely");
    let value = serde_json::to_value(&draft).unwrap();
    assert!(value.get("id").is_none());
    assert!(value.get("createdAt").is_none());
    assert_eq!(value["restaurant_id"], json!(3));
  }
}
