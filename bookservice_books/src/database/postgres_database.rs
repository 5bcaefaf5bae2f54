use anyhow::Context;
use chrono::Utc;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{IsolationLevel, NoTls, Row};

use crate::api::BookId;
use crate::database::{
    BackendContext, Book, BookRecommendation, BookReturn, BookUpdate, BooksDatabase,
    BorrowingRecord, DatabaseError, NewBook, NewBookRecommendation, NewBorrowingRecord,
};

const BOOK_COLUMNS: &str = "id, title, isbn, author_id, category_id, stock, \
                            published_date, description, created_at, updated_at";

pub struct PostgresBooksDatabase {
    pool: Pool,
}

impl PostgresBooksDatabase {
    pub async fn init(database_url: &str) -> anyhow::Result<Self> {
        let mut config = Config::new();
        config.url = Some(database_url.to_string());
        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create postgres pool")?;

        let client = pool.get().await.context("Failed to connect to postgres")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS books (
            id              SERIAL PRIMARY KEY,
            title           TEXT NOT NULL,
            isbn            TEXT NOT NULL DEFAULT '',
            author_id       INTEGER NOT NULL,
            category_id     INTEGER NOT NULL,
            stock           INTEGER NOT NULL CHECK (stock >= 0),
            published_date  DATE NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS borrowing_records (
            id              SERIAL PRIMARY KEY,
            book_id         INTEGER NOT NULL,
            user_id         INTEGER NOT NULL,
            borrowed_at     TIMESTAMPTZ NOT NULL,
            due_date        TIMESTAMPTZ NOT NULL,
            returned_at     TIMESTAMPTZ
            );
        CREATE INDEX IF NOT EXISTS borrowing_records_open_loans
            ON borrowing_records (user_id, book_id) WHERE returned_at IS NULL;
        ",
            )
            .await
            .context("Failed to setup borrowing_records table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS book_recommendation (
            id                   SERIAL PRIMARY KEY,
            book_id              INTEGER NOT NULL,
            recommended_book_id  INTEGER NOT NULL,
            score                REAL NOT NULL
            )
        ",
            )
            .await
            .context("Failed to setup book_recommendation table")?;

        Ok(Self { pool })
    }
}

fn book_from_row(row: &Row) -> Result<Book, tokio_postgres::Error> {
    Ok(Book {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        isbn: row.try_get("isbn")?,
        author_id: row.try_get("author_id")?,
        category_id: row.try_get("category_id")?,
        stock: row.try_get("stock")?,
        published_date: row.try_get("published_date")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn borrowing_record_from_row(row: &Row) -> Result<BorrowingRecord, tokio_postgres::Error> {
    Ok(BorrowingRecord {
        id: row.try_get("id")?,
        book_id: row.try_get("book_id")?,
        user_id: row.try_get("user_id")?,
        borrowed_at: row.try_get("borrowed_at")?,
        due_date: row.try_get("due_date")?,
        returned_at: row.try_get("returned_at")?,
    })
}

fn recommendation_from_row(row: &Row) -> Result<BookRecommendation, tokio_postgres::Error> {
    Ok(BookRecommendation {
        id: row.try_get("id")?,
        book_id: row.try_get("book_id")?,
        recommended_book_id: row.try_get("recommended_book_id")?,
        score: row.try_get("score")?,
    })
}

#[async_trait::async_trait]
impl BooksDatabase for PostgresBooksDatabase {
    async fn get_book(&self, book_id: BookId) -> Result<Book, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
            .await
            .backend_context("unable to prepare book query")?;

        let row = client
            .query_opt(&stmt, &[&book_id])
            .await
            .backend_context("unable to query book")?
            .ok_or(DatabaseError::BookNotFound(book_id))?;

        book_from_row(&row).backend_context("unable to read book")
    }

    async fn load_all_books(&self) -> Result<Vec<Book>, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY id"))
            .await
            .backend_context("failed to prepare books query")?;

        let rows = client
            .query(&stmt, &[])
            .await
            .backend_context("failed to query books table")?;

        rows.iter()
            .map(|row| book_from_row(row).backend_context("failed to collect rows"))
            .collect()
    }

    async fn create_book(&self, book: NewBook) -> Result<BookId, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "INSERT INTO books (title, isbn, author_id, category_id, stock, published_date, description)
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
            )
            .await
            .backend_context("failed to prepare book insert")?;

        let row = client
            .query_one(
                &stmt,
                &[
                    &book.title,
                    &book.isbn,
                    &book.author_id,
                    &book.category_id,
                    &book.stock,
                    &book.published_date,
                    &book.description,
                ],
            )
            .await
            .backend_context("failed to insert book")?;

        row.try_get(0).backend_context("failed to read book id")
    }

    async fn update_book(&self, book: BookUpdate) -> Result<(), DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "UPDATE books
                 SET title = $1,
                     isbn = $2,
                     author_id = $3,
                     category_id = $4,
                     published_date = COALESCE($5, published_date),
                     description = $6,
                     updated_at = now()
                 WHERE id = $7",
            )
            .await
            .backend_context("failed to prepare book update")?;

        let updated = client
            .execute(
                &stmt,
                &[
                    &book.title,
                    &book.isbn,
                    &book.author_id,
                    &book.category_id,
                    &book.published_date,
                    &book.description,
                    &book.id,
                ],
            )
            .await
            .backend_context("failed to update book")?;

        if updated == 0 {
            return Err(DatabaseError::BookNotFound(book.id));
        }
        Ok(())
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), DatabaseError> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM books WHERE id = $1", &[&book_id])
            .await
            .backend_context("failed to delete book")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn borrow_book(&self, record: NewBorrowingRecord) -> Result<(), DatabaseError> {
        let mut pooled_client = self.pool.get().await?;
        let client: &mut tokio_postgres::Client = &mut pooled_client;

        // Dropping an uncommitted transaction rolls it back, so every early return is covered
        let transaction = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .start()
            .await
            .backend_context("failed to start transaction")?;

        let stock: i32 = transaction
            .query_opt(
                "SELECT stock FROM books WHERE id = $1 FOR UPDATE",
                &[&record.book_id],
            )
            .await
            .backend_context("failed to query book")?
            .ok_or(DatabaseError::BookNotFound(record.book_id))?
            .try_get(0)
            .backend_context("failed to read stock")?;

        if stock <= 0 {
            return Err(DatabaseError::BookUnavailable(record.book_id));
        }

        transaction
            .execute(
                "UPDATE books SET stock = $1, updated_at = now() WHERE id = $2",
                &[&(stock - 1), &record.book_id],
            )
            .await
            .backend_context("failed to decrement stock")?;

        transaction
            .execute(
                "INSERT INTO borrowing_records (user_id, book_id, borrowed_at, due_date)
                 VALUES ($1, $2, $3, $4)",
                &[
                    &record.user_id,
                    &record.book_id,
                    &record.borrowed_at,
                    &record.due_date(),
                ],
            )
            .await
            .backend_context("failed to insert borrowing record")?;

        transaction
            .commit()
            .await
            .backend_context("failed to commit transaction")?;

        tracing::info!(
            "Book {} borrowed by user {}, {} copies left",
            record.book_id,
            record.user_id,
            stock - 1
        );
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn return_book(&self, book_return: BookReturn) -> Result<(), DatabaseError> {
        let mut pooled_client = self.pool.get().await?;
        let client: &mut tokio_postgres::Client = &mut pooled_client;

        let transaction = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .start()
            .await
            .backend_context("failed to start transaction")?;

        let not_returned = || DatabaseError::RecordNotFoundOrAlreadyReturned {
            book_id: book_return.book_id,
            user_id: book_return.user_id,
        };

        let exists: bool = transaction
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM borrowing_records
                    WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL
                )",
                &[&book_return.user_id, &book_return.book_id],
            )
            .await
            .backend_context("failed to check borrowing record")?
            .try_get(0)
            .backend_context("failed to check borrowing record")?;

        if !exists {
            return Err(not_returned());
        }

        let closed = transaction
            .execute(
                "UPDATE borrowing_records
                 SET returned_at = GREATEST($1, borrowed_at)
                 WHERE id = (
                    SELECT id FROM borrowing_records
                    WHERE user_id = $2 AND book_id = $3 AND returned_at IS NULL
                    ORDER BY borrowed_at, id
                    LIMIT 1
                    FOR UPDATE
                 )",
                &[&Utc::now(), &book_return.user_id, &book_return.book_id],
            )
            .await
            .backend_context("failed to update borrowing record")?;

        if closed == 0 {
            return Err(not_returned());
        }

        // Stock grows by exactly the number of loans closed above
        transaction
            .execute(
                "UPDATE books SET stock = stock + $1, updated_at = now() WHERE id = $2",
                &[&(closed as i32), &book_return.book_id],
            )
            .await
            .backend_context("failed to increment book stock")?;

        transaction
            .commit()
            .await
            .backend_context("failed to commit transaction")?;

        tracing::info!(
            "Book {} returned by user {}",
            book_return.book_id,
            book_return.user_id
        );
        Ok(())
    }

    async fn get_borrowing_records(
        &self,
        book_id: BookId,
    ) -> Result<Vec<BorrowingRecord>, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "SELECT id, book_id, user_id, borrowed_at, due_date, returned_at
                 FROM borrowing_records WHERE book_id = $1 ORDER BY borrowed_at, id",
            )
            .await
            .backend_context("failed to prepare borrowing records query")?;

        let rows = client
            .query(&stmt, &[&book_id])
            .await
            .backend_context("failed to query borrowing records")?;

        rows.iter()
            .map(|row| borrowing_record_from_row(row).backend_context("failed to collect rows"))
            .collect()
    }

    async fn get_recommendations(
        &self,
        book_id: BookId,
    ) -> Result<Vec<BookRecommendation>, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "SELECT id, book_id, recommended_book_id, score
                 FROM book_recommendation WHERE book_id = $1 ORDER BY score DESC, id",
            )
            .await
            .backend_context("failed to prepare book recommendations query")?;

        let rows = client
            .query(&stmt, &[&book_id])
            .await
            .backend_context("failed to query book recommendations")?;

        rows.iter()
            .map(|row| recommendation_from_row(row).backend_context("failed to collect rows"))
            .collect()
    }

    async fn add_recommendation(
        &self,
        recommendation: NewBookRecommendation,
    ) -> Result<(), DatabaseError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO book_recommendation (book_id, recommended_book_id, score)
                 VALUES ($1, $2, $3)",
                &[
                    &recommendation.book_id,
                    &recommendation.recommended_book_id,
                    &recommendation.score,
                ],
            )
            .await
            .backend_context("failed to add recommended book")?;
        Ok(())
    }

    fn close(&self) {
        self.pool.close();
    }
}
