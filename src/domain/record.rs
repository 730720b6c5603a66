use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire form of [`FieldValue::Unavailable`] in every export format
pub const UNAVAILABLE_MARKER: &str = "N/A";

/// Value of an optional product field.
///
/// `Unavailable` means no extraction strategy matched. It is distinct from an
/// empty string, which extractors never produce. A page that literally prints
/// the marker is treated as a miss, so `Present` never holds it and the wire
/// form stays unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FieldValue {
    Present(String),
    #[default]
    Unavailable,
}

impl FieldValue {
    /// Wrap a raw match, treating blank input and the marker as no match
    pub fn from_match(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || Self::is_marker(trimmed) {
            Self::Unavailable
        } else {
            Self::Present(trimmed.to_string())
        }
    }

    /// Scraped text that only repeats the unavailable marker
    pub fn is_marker(raw: &str) -> bool {
        raw.trim().eq_ignore_ascii_case(UNAVAILABLE_MARKER)
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Present(value) => Some(value.as_str()),
            Self::Unavailable => None,
        }
    }

    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Present(value) => Some(value),
            Self::Unavailable => None,
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Unavailable, |v| Self::from_match(&v))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_deref().unwrap_or(UNAVAILABLE_MARKER))
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_deref().unwrap_or(UNAVAILABLE_MARKER))
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_match(&raw))
    }
}

/// Canonical product record emitted by every site.
///
/// Field order here is the export field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub source: String,
    pub name: String,
    pub price: FieldValue,
    pub rating: FieldValue,
    pub review_count: FieldValue,
    pub image_url: FieldValue,
    pub detail_url: FieldValue,
    pub retrieved_at: DateTime<Utc>,
}

impl Record {
    /// Column names in serialization order
    pub const FIELD_NAMES: [&'static str; 8] = [
        "source",
        "name",
        "price",
        "rating",
        "review_count",
        "image_url",
        "detail_url",
        "retrieved_at",
    ];

    pub fn key(&self) -> RecordKey {
        match &self.detail_url {
            FieldValue::Present(url) => RecordKey::ByUrl {
                source: self.source.clone(),
                detail_url: url.clone(),
            },
            FieldValue::Unavailable => RecordKey::ByContent {
                source: self.source.clone(),
                name: self.name.clone(),
                price: self.price.clone(),
            },
        }
    }
}

/// Dedup identity of a record inside one result set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    ByUrl { source: String, detail_url: String },
    /// Best-effort identity when no detail link could be extracted
    ByContent {
        source: String,
        name: String,
        price: FieldValue,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(detail_url: FieldValue) -> Record {
        Record {
            source: "ebay".to_string(),
            name: "Blue Shirt".to_string(),
            price: FieldValue::Present("$12.00".to_string()),
            rating: FieldValue::Unavailable,
            review_count: FieldValue::Unavailable,
            image_url: FieldValue::Unavailable,
            detail_url,
            retrieved_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn blank_match_is_unavailable() {
        assert_eq!(FieldValue::from_match("   \n"), FieldValue::Unavailable);
        assert_eq!(
            FieldValue::from_match("  $9.99 "),
            FieldValue::Present("$9.99".to_string())
        );
    }

    #[test]
    fn literal_marker_is_unavailable() {
        assert_eq!(FieldValue::from_match(" n/a "), FieldValue::Unavailable);
        assert_eq!(FieldValue::from(Some("N/A".to_string())), FieldValue::Unavailable);
        assert_eq!(
            FieldValue::from_match("N/A in store"),
            FieldValue::Present("N/A in store".to_string())
        );
    }

    #[test]
    fn unavailable_serializes_as_marker() {
        let json = serde_json::to_value(record(FieldValue::Unavailable)).unwrap();
        assert_eq!(json["rating"], "N/A");
        assert_eq!(json["detail_url"], "N/A");
        assert_eq!(json["retrieved_at"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn json_keeps_field_order() {
        let json = serde_json::to_string(&record(FieldValue::Unavailable)).unwrap();
        let positions: Vec<usize> = Record::FIELD_NAMES
            .iter()
            .map(|name| json.find(&format!("\"{name}\"")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn key_falls_back_to_name_and_price() {
        let with_url = record(FieldValue::Present("http://a/1".to_string()));
        assert!(matches!(with_url.key(), RecordKey::ByUrl { .. }));

        let without_url = record(FieldValue::Unavailable);
        assert_eq!(
            without_url.key(),
            RecordKey::ByContent {
                source: "ebay".to_string(),
                name: "Blue Shirt".to_string(),
                price: FieldValue::Present("$12.00".to_string()),
            }
        );
    }

    #[test]
    fn marker_round_trips_to_unavailable() {
        let value: FieldValue = serde_json::from_str("\"N/A\"").unwrap();
        assert_eq!(value, FieldValue::Unavailable);
    }
}
