use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use chrono::Utc;

use crate::api::BookId;
use crate::database::{
    Book, BookRecommendation, BookReturn, BookUpdate, BooksDatabase, BorrowingRecord,
    DatabaseError, NewBook, NewBookRecommendation, NewBorrowingRecord,
};

#[derive(Default)]
struct Tables {
    books: BTreeMap<BookId, Book>,
    borrowing_records: Vec<BorrowingRecord>,
    recommendations: Vec<BookRecommendation>,
}

/// Keeps everything in process memory, meant for local development and tests.
/// All tables sit behind one lock so borrow and return are atomic.
pub struct InMemoryBooksDatabase {
    book_sequence_generator: AtomicI32,
    borrowing_record_sequence_generator: AtomicI32,
    recommendation_sequence_generator: AtomicI32,
    tables: parking_lot::RwLock<Tables>,
}

impl Default for InMemoryBooksDatabase {
    fn default() -> Self {
        Self {
            book_sequence_generator: AtomicI32::new(1),
            borrowing_record_sequence_generator: AtomicI32::new(1),
            recommendation_sequence_generator: AtomicI32::new(1),
            tables: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl BooksDatabase for InMemoryBooksDatabase {
    async fn get_book(&self, book_id: BookId) -> Result<Book, DatabaseError> {
        self.tables
            .read()
            .books
            .get(&book_id)
            .cloned()
            .ok_or(DatabaseError::BookNotFound(book_id))
    }

    async fn load_all_books(&self) -> Result<Vec<Book>, DatabaseError> {
        Ok(self.tables.read().books.values().cloned().collect())
    }

    async fn create_book(&self, book: NewBook) -> Result<BookId, DatabaseError> {
        let id = self.book_sequence_generator.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        self.tables.write().books.insert(
            id,
            Book {
                id,
                title: book.title,
                isbn: book.isbn,
                author_id: book.author_id,
                category_id: book.category_id,
                stock: book.stock,
                published_date: book.published_date,
                description: book.description,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_book(&self, book: BookUpdate) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write();
        let stored = tables
            .books
            .get_mut(&book.id)
            .ok_or(DatabaseError::BookNotFound(book.id))?;
        stored.title = book.title;
        stored.isbn = book.isbn;
        stored.author_id = book.author_id;
        stored.category_id = book.category_id;
        if let Some(published_date) = book.published_date {
            stored.published_date = published_date;
        }
        stored.description = book.description;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), DatabaseError> {
        self.tables.write().books.remove(&book_id);
        Ok(())
    }

    async fn borrow_book(&self, record: NewBorrowingRecord) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write();
        let book = tables
            .books
            .get_mut(&record.book_id)
            .ok_or(DatabaseError::BookNotFound(record.book_id))?;

        if book.stock <= 0 {
            return Err(DatabaseError::BookUnavailable(record.book_id));
        }
        book.stock -= 1;
        book.updated_at = Utc::now();

        let id = self
            .borrowing_record_sequence_generator
            .fetch_add(1, Ordering::Relaxed);
        tables.borrowing_records.push(BorrowingRecord {
            id,
            book_id: record.book_id,
            user_id: record.user_id,
            borrowed_at: record.borrowed_at,
            due_date: record.due_date(),
            returned_at: None,
        });
        Ok(())
    }

    async fn return_book(&self, book_return: BookReturn) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write();
        let now = Utc::now();

        let record = tables
            .borrowing_records
            .iter_mut()
            .filter(|record| {
                record.is_open()
                    && record.user_id == book_return.user_id
                    && record.book_id == book_return.book_id
            })
            .min_by_key(|record| (record.borrowed_at, record.id))
            .ok_or(DatabaseError::RecordNotFoundOrAlreadyReturned {
                book_id: book_return.book_id,
                user_id: book_return.user_id,
            })?;
        record.returned_at = Some(now.max(record.borrowed_at));

        if let Some(book) = tables.books.get_mut(&book_return.book_id) {
            book.stock += 1;
            book.updated_at = now;
        }
        Ok(())
    }

    async fn get_borrowing_records(
        &self,
        book_id: BookId,
    ) -> Result<Vec<BorrowingRecord>, DatabaseError> {
        let mut records: Vec<BorrowingRecord> = self
            .tables
            .read()
            .borrowing_records
            .iter()
            .filter(|record| record.book_id == book_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| (record.borrowed_at, record.id));
        Ok(records)
    }

    async fn get_recommendations(
        &self,
        book_id: BookId,
    ) -> Result<Vec<BookRecommendation>, DatabaseError> {
        let mut recommendations: Vec<BookRecommendation> = self
            .tables
            .read()
            .recommendations
            .iter()
            .filter(|recommendation| recommendation.book_id == book_id)
            .cloned()
            .collect();
        recommendations.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        Ok(recommendations)
    }

    async fn add_recommendation(
        &self,
        recommendation: NewBookRecommendation,
    ) -> Result<(), DatabaseError> {
        let id = self
            .recommendation_sequence_generator
            .fetch_add(1, Ordering::Relaxed);
        self.tables.write().recommendations.push(BookRecommendation {
            id,
            book_id: recommendation.book_id,
            recommended_book_id: recommendation.recommended_book_id,
            score: recommendation.score,
        });
        Ok(())
    }

    fn close(&self) {}
}
