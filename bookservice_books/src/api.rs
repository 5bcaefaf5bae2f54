use chrono::{DateTime, NaiveDate, Utc};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type BookId = i32;
pub type AuthorId = i32;
pub type CategoryId = i32;
pub type UserId = i32;
pub type BorrowingRecordId = i32;
pub type RecommendationId = i32;

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Book as seen by the clients of the service. Stock is server internal and never leaves it.
/// Author and category must always be present in a request body
pub struct Book {
    /// Ignored when the book is created, required when it is updated
    #[serde(default)]
    pub id: BookId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub isbn: String,
    pub author_id: AuthorId,
    pub category_id: CategoryId,
    /// Required when the book is created, must not be in the future.
    /// When missing in an update the stored date is kept
    #[serde(default)]
    pub publish_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct BooksResponse {
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Body of borrow and return requests
pub struct BorrowRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct BorrowingRecord {
    pub id: BorrowingRecordId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// None while the book is still borrowed
    pub returned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct BorrowingRecordsResponse {
    pub borrowing_records: Vec<BorrowingRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub book_id: BookId,
    pub recommended_book_id: BookId,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Precomputed recommendation added for the book given in the path
pub struct NewRecommendation {
    pub recommended_book_id: BookId,
    /// Conventionally between 0.0 and 1.0
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
