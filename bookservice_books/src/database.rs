use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio_postgres::error::SqlState;

pub use in_memory_database::InMemoryBooksDatabase;
pub use postgres_database::PostgresBooksDatabase;

use crate::api::{AuthorId, BookId, BorrowingRecordId, CategoryId, RecommendationId, UserId};

mod in_memory_database;
mod postgres_database;

/// Every loan is due exactly this many hours after it was opened
pub const LOAN_PERIOD_HOURS: i64 = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Book row as it is persisted
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub isbn: String,
    pub author_id: AuthorId,
    pub category_id: CategoryId,
    pub stock: i32,
    pub published_date: NaiveDate,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub isbn: String,
    pub author_id: AuthorId,
    pub category_id: CategoryId,
    pub stock: i32,
    pub published_date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Descriptive columns of a book. Stock is changed only by borrow and return
pub struct BookUpdate {
    pub id: BookId,
    pub title: String,
    pub isbn: String,
    pub author_id: AuthorId,
    pub category_id: CategoryId,
    /// None keeps the stored date
    pub published_date: Option<NaiveDate>,
    pub description: String,
}

impl From<&Book> for BookUpdate {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            isbn: book.isbn.clone(),
            author_id: book.author_id,
            category_id: book.category_id,
            published_date: Some(book.published_date),
            description: book.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowingRecord {
    pub id: BorrowingRecordId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl BorrowingRecord {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBorrowingRecord {
    pub book_id: BookId,
    pub user_id: UserId,
    pub borrowed_at: DateTime<Utc>,
}

impl NewBorrowingRecord {
    pub fn due_date(&self) -> DateTime<Utc> {
        self.borrowed_at + Duration::hours(LOAN_PERIOD_HOURS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Identifies the loan to close, the oldest open one of the pair is picked
pub struct BookReturn {
    pub book_id: BookId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookRecommendation {
    pub id: RecommendationId,
    pub book_id: BookId,
    pub recommended_book_id: BookId,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBookRecommendation {
    pub book_id: BookId,
    pub recommended_book_id: BookId,
    pub score: f32,
}

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("book {0} not found")]
    BookNotFound(BookId),

    #[error("book {0} is not available")]
    BookUnavailable(BookId),

    #[error("borrowing record of book {book_id} for user {user_id} not found or already returned")]
    RecordNotFoundOrAlreadyReturned { book_id: BookId, user_id: UserId },

    #[error("{context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to get connection from pool: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
}

impl DatabaseError {
    /// True when the backend aborted the transaction because of a concurrent one,
    /// the same call may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            DatabaseError::Backend { source, .. } => source.code().is_some_and(|code| {
                code == &SqlState::T_R_SERIALIZATION_FAILURE
                    || code == &SqlState::T_R_DEADLOCK_DETECTED
            }),
            _ => false,
        }
    }
}

pub(crate) trait BackendContext<T> {
    fn backend_context(self, context: &'static str) -> Result<T, DatabaseError>;
}

impl<T> BackendContext<T> for Result<T, tokio_postgres::Error> {
    fn backend_context(self, context: &'static str) -> Result<T, DatabaseError> {
        self.map_err(|source| DatabaseError::Backend { context, source })
    }
}

/// Storage of books, their loans and recommendations.
///
/// Dropping a returned future cancels the operation, a transaction that did not reach
/// its commit is rolled back.
#[async_trait::async_trait]
pub trait BooksDatabase: Send + Sync {
    /// Retrieves a single book, `BookNotFound` if there is no such row
    async fn get_book(&self, book_id: BookId) -> Result<Book, DatabaseError>;

    async fn load_all_books(&self) -> Result<Vec<Book>, DatabaseError>;

    /// Adds book to the database, returns an id assigned to the book
    async fn create_book(&self, book: NewBook) -> Result<BookId, DatabaseError>;

    /// Overwrites the descriptive columns in a single statement, stock is left as it is
    async fn update_book(&self, book: BookUpdate) -> Result<(), DatabaseError>;

    /// Deleting a missing book is not an error
    async fn delete_book(&self, book_id: BookId) -> Result<(), DatabaseError>;

    /// Takes one copy of the book out of stock and opens a borrowing record for the user
    async fn borrow_book(&self, record: NewBorrowingRecord) -> Result<(), DatabaseError>;

    /// Closes the oldest open borrowing record of the user for the book and puts the copy back
    async fn return_book(&self, book_return: BookReturn) -> Result<(), DatabaseError>;

    /// All borrowing records of the book, oldest first
    async fn get_borrowing_records(
        &self,
        book_id: BookId,
    ) -> Result<Vec<BorrowingRecord>, DatabaseError>;

    async fn get_recommendations(
        &self,
        book_id: BookId,
    ) -> Result<Vec<BookRecommendation>, DatabaseError>;

    async fn add_recommendation(
        &self,
        recommendation: NewBookRecommendation,
    ) -> Result<(), DatabaseError>;

    /// Releases pooled connections, calling it more than once is harmless
    fn close(&self);
}

/// Picks the database implementation based on the url scheme,
/// empty url means the in-memory one
pub async fn connect(database_url: &str) -> anyhow::Result<Arc<dyn BooksDatabase>> {
    if database_url.is_empty() {
        tracing::info!("Using in-memory database implementation");
        return Ok(Arc::new(InMemoryBooksDatabase::default()));
    }

    if database_url.starts_with("postgres://") {
        let database = PostgresBooksDatabase::init(database_url)
            .await
            .context("Failed to initialize PostgreSQL database connection")?;
        tracing::info!("Using PostgreSQL database implementation");
        return Ok(Arc::new(database));
    }

    bail!("Unsupported database url scheme: {}", database_url)
}

#[cfg(test)]
mod database_tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn due_date_is_three_days_after_borrowing() {
        let record = NewBorrowingRecord {
            book_id: 1,
            user_id: 123,
            borrowed_at: Utc.with_ymd_and_hms(2023, 10, 1, 10, 0, 0).unwrap(),
        };
        assert_eq!(
            record.due_date(),
            Utc.with_ymd_and_hms(2023, 10, 4, 10, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_connect_picks_implementation_by_url() {
        let database = connect("").await.expect("Failed to create in-memory database");
        assert!(database
            .load_all_books()
            .await
            .expect("Failed to load books")
            .is_empty());

        let unsupported = connect("mysql://localhost/books").await;
        assert!(unsupported.is_err());
    }

    #[test]
    fn domain_errors_are_not_retryable() {
        assert!(!DatabaseError::BookNotFound(1).is_retryable());
        assert!(!DatabaseError::BookUnavailable(1).is_retryable());
        assert!(!DatabaseError::RecordNotFoundOrAlreadyReturned {
            book_id: 1,
            user_id: 2
        }
        .is_retryable());
    }
}
