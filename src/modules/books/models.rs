use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use crate::utils::PageWindow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub published_year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Partial update; `None` leaves the stored value alone.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.genre.is_none()
            && self.description.is_none()
            && self.published_year.is_none()
            && self.image.is_none()
    }
}

/// Mean review rating, or "N/A" on the wire when a book has no reviews.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AverageRating {
    Rated(f64),
    Unrated,
}

pub const UNRATED: &str = "N/A";

/// Largest magnitude at which every integer is an exact f64.
const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

impl Serialize for AverageRating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Whole means go out as integers: 4, not 4.0.
            AverageRating::Rated(value) if value.fract() == 0.0 && value.abs() <= MAX_EXACT => {
                serializer.serialize_i64(*value as i64)
            }
            AverageRating::Rated(value) => serializer.serialize_f64(*value),
            AverageRating::Unrated => serializer.serialize_str(UNRATED),
        }
    }
}

impl<'de> Deserialize<'de> for AverageRating {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(number) => number
                .as_f64()
                .map(AverageRating::Rated)
                .ok_or_else(|| de::Error::custom("average rating out of range")),
            serde_json::Value::Null => Ok(AverageRating::Unrated),
            serde_json::Value::String(text) if text == UNRATED => Ok(AverageRating::Unrated),
            other => Err(de::Error::custom(format!("unexpected average rating {other}"))),
        }
    }
}

/// One row of the catalog listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookListing {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub published_year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub average_rating: AverageRating,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPage {
    pub books: Vec<BookListing>,
    pub total_books: u64,
    #[serde(flatten)]
    pub window: PageWindow,
}

/// Query string of the listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub search: Option<String>,
}

/// Title and author embedded in a single review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub author: String,
}

/// Title embedded in a user's review listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTitle {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn average_rating_wire_format() {
        assert_eq!(
            serde_json::to_string(&AverageRating::Rated(4.0)).unwrap(),
            "4"
        );
        assert_eq!(
            serde_json::to_string(&AverageRating::Rated(3.5)).unwrap(),
            "3.5"
        );
        assert_eq!(serde_json::to_value(AverageRating::Unrated).unwrap(), json!("N/A"));
        assert_eq!(
            serde_json::from_value::<AverageRating>(json!("N/A")).unwrap(),
            AverageRating::Unrated
        );
        assert_eq!(
            serde_json::from_value::<AverageRating>(json!(3)).unwrap(),
            AverageRating::Rated(3.0)
        );
        assert!(serde_json::from_value::<AverageRating>(json!("great")).is_err());
    }

    #[test]
    fn patch_skips_absent_fields() {
        let patch = BookPatch {
            title: Some("Dune Messiah".into()),
            ..BookPatch::default()
        };
        assert!(!patch.is_empty());
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "title": "Dune Messiah" })
        );
        assert!(BookPatch::default().is_empty());
    }

    #[test]
    fn page_echoes_window() {
        let page = BookPage {
            books: vec![],
            total_books: 0,
            window: PageWindow { limit: 20, offset: 0 },
        };
        assert_eq!(
            serde_json::to_value(page).unwrap(),
            json!({ "books": [], "totalBooks": 0, "limit": 20, "offset": 0 })
        );
    }
}
