use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: String,
    /// Author id
    pub user: String,
    /// Reviewed book id
    pub book: String,
    pub rating: u8,
    pub review_text: String,
    /// Bumped on every edit; edits must name the version they read.
    #[serde(default = "first_version")]
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn first_version() -> u64 {
    1
}

/// A review with its `user` and `book` references resolved to `U` and `B`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView<U, B> {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: U,
    pub book: B,
    pub rating: u8,
    pub review_text: String,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Review {
    pub fn populate<U, B>(self, user: U, book: B) -> ReviewView<U, B> {
        ReviewView {
            id: self.id,
            user,
            book,
            rating: self.rating,
            review_text: self.review_text,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewPage<T> {
    pub total: u64,
    pub reviews: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub book_id: Option<String>,
    pub review_text: Option<String>,
    pub rating: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewChanges {
    pub review_text: Option<String>,
    pub rating: Option<serde_json::Value>,
    /// Version the client last saw; the stored one is assumed when omitted.
    pub version: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReviewPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
