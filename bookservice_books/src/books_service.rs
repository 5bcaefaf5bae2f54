use std::sync::Arc;

use chrono::Utc;

use crate::api;
use crate::api::{BookId, UserId};
use crate::database::{
    self, BookReturn, BookUpdate, BooksDatabase, DatabaseError, NewBook, NewBookRecommendation,
    NewBorrowingRecord,
};

/// Number of copies every newly saved book starts with
pub const DEFAULT_STOCK: i32 = 12;

#[derive(thiserror::Error, Debug)]
#[error("{context}: {source}")]
pub struct BooksServiceError {
    context: &'static str,
    #[source]
    source: DatabaseError,
}

impl BooksServiceError {
    fn wrap(context: &'static str) -> impl FnOnce(DatabaseError) -> Self {
        move |source| Self { context, source }
    }

    pub fn database_error(&self) -> &DatabaseError {
        &self.source
    }
}

/// Translates between the transport representation of books and the stored one
#[derive(Clone)]
pub struct BooksService {
    database: Arc<dyn BooksDatabase>,
}

impl BooksService {
    pub fn new(database: Arc<dyn BooksDatabase>) -> Self {
        Self { database }
    }

    pub async fn get_books(&self) -> Result<Vec<api::Book>, BooksServiceError> {
        let books = self
            .database
            .load_all_books()
            .await
            .map_err(BooksServiceError::wrap("failed to load books"))?;
        Ok(books.into_iter().map(to_transport_book).collect())
    }

    pub async fn get_book(&self, book_id: BookId) -> Result<api::Book, BooksServiceError> {
        self.database
            .get_book(book_id)
            .await
            .map(to_transport_book)
            .map_err(BooksServiceError::wrap("failed to get book"))
    }

    /// Stores a validated book, it must carry a publish date
    pub async fn save_book(&self, book: api::Book) -> Result<BookId, BooksServiceError> {
        let published_date = book
            .publish_date
            .unwrap_or_else(|| Utc::now().date_naive());
        self.database
            .create_book(NewBook {
                title: book.title,
                isbn: book.isbn,
                author_id: book.author_id,
                category_id: book.category_id,
                stock: DEFAULT_STOCK,
                published_date,
                description: book.description,
            })
            .await
            .map_err(BooksServiceError::wrap("failed to save book"))
    }

    /// Overwrites the transport fields of a stored book, stock and audit fields stay untouched.
    /// A missing publish date keeps the stored one
    pub async fn update_book(&self, book: api::Book) -> Result<(), BooksServiceError> {
        self.database
            .update_book(BookUpdate {
                id: book.id,
                title: book.title,
                isbn: book.isbn,
                author_id: book.author_id,
                category_id: book.category_id,
                published_date: book.publish_date,
                description: book.description,
            })
            .await
            .map_err(BooksServiceError::wrap("failed to update book"))
    }

    pub async fn delete_book(&self, book_id: BookId) -> Result<(), BooksServiceError> {
        self.database
            .delete_book(book_id)
            .await
            .map_err(BooksServiceError::wrap("failed to delete book"))
    }

    pub async fn borrow_book(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> Result<(), BooksServiceError> {
        self.database
            .borrow_book(NewBorrowingRecord {
                book_id,
                user_id,
                borrowed_at: Utc::now(),
            })
            .await
            .map_err(BooksServiceError::wrap("failed to borrow book"))
    }

    pub async fn return_book(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> Result<(), BooksServiceError> {
        self.database
            .return_book(BookReturn { book_id, user_id })
            .await
            .map_err(BooksServiceError::wrap("failed to return book"))
    }

    pub async fn get_borrowing_records(
        &self,
        book_id: BookId,
    ) -> Result<Vec<api::BorrowingRecord>, BooksServiceError> {
        let records = self
            .database
            .get_borrowing_records(book_id)
            .await
            .map_err(BooksServiceError::wrap("failed to load borrowing records"))?;
        Ok(records
            .into_iter()
            .map(|record| api::BorrowingRecord {
                id: record.id,
                book_id: record.book_id,
                user_id: record.user_id,
                borrowed_at: record.borrowed_at,
                due_date: record.due_date,
                returned_at: record.returned_at,
            })
            .collect())
    }

    pub async fn get_recommendations(
        &self,
        book_id: BookId,
    ) -> Result<Vec<api::Recommendation>, BooksServiceError> {
        let recommendations = self
            .database
            .get_recommendations(book_id)
            .await
            .map_err(BooksServiceError::wrap("failed to load recommendations"))?;
        Ok(recommendations
            .into_iter()
            .map(|recommendation| api::Recommendation {
                id: recommendation.id,
                book_id: recommendation.book_id,
                recommended_book_id: recommendation.recommended_book_id,
                score: recommendation.score,
            })
            .collect())
    }

    pub async fn add_recommendation(
        &self,
        book_id: BookId,
        recommendation: api::NewRecommendation,
    ) -> Result<(), BooksServiceError> {
        self.database
            .add_recommendation(NewBookRecommendation {
                book_id,
                recommended_book_id: recommendation.recommended_book_id,
                score: recommendation.score,
            })
            .await
            .map_err(BooksServiceError::wrap("failed to add recommendation"))
    }

    pub fn close(&self) {
        self.database.close()
    }
}

fn to_transport_book(book: database::Book) -> api::Book {
    api::Book {
        id: book.id,
        title: book.title,
        isbn: book.isbn,
        author_id: book.author_id,
        category_id: book.category_id,
        publish_date: Some(book.published_date),
        description: book.description,
    }
}
