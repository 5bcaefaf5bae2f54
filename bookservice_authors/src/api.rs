use chrono::NaiveDate;
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type AuthorId = i32;

/// Page size used when the list request does not name one
pub const DEFAULT_LIST_LIMIT: i64 = 20;

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
#[serde(default)]
pub struct Author {
    /// Ignored when the author is created, required when it is updated
    pub id: AuthorId,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub nationality: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct AuthorsResponse {
    pub authors: Vec<Author>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Query of the author list. Name filters match case-insensitive substrings
/// and an author matching either of them is returned
pub struct ListAuthorsQuery {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
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
