use anyhow::Context;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{NoTls, Row};

use crate::api::AuthorId;
use crate::database::{
    Author, AuthorFilter, AuthorsDatabase, BackendContext, DatabaseError, NewAuthor,
};

const AUTHOR_COLUMNS: &str =
    "author_id, first_name, last_name, birth_date, nationality, created_at, updated_at";

pub struct PostgresAuthorsDatabase {
    pool: Pool,
}

impl PostgresAuthorsDatabase {
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
        CREATE TABLE IF NOT EXISTS authors (
            author_id       SERIAL PRIMARY KEY,
            first_name      TEXT NOT NULL,
            last_name       TEXT NOT NULL,
            birth_date      DATE,
            nationality     TEXT NOT NULL DEFAULT '',
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
            )
        ",
            )
            .await
            .context("Failed to setup authors table")?;

        Ok(Self { pool })
    }
}

fn author_from_row(row: &Row) -> Result<Author, tokio_postgres::Error> {
    Ok(Author {
        id: row.try_get("author_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        birth_date: row.try_get("birth_date")?,
        nationality: row.try_get("nationality")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Turns a user supplied substring into an ILIKE pattern, wildcards in it match literally
fn substring_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait::async_trait]
impl AuthorsDatabase for PostgresAuthorsDatabase {
    async fn add_author(&self, author: NewAuthor) -> Result<AuthorId, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "INSERT INTO authors (first_name, last_name, birth_date, nationality)
                 VALUES ($1, $2, $3, $4) RETURNING author_id",
            )
            .await
            .backend_context("failed to prepare author insert")?;

        let row = client
            .query_one(
                &stmt,
                &[
                    &author.first_name,
                    &author.last_name,
                    &author.birth_date,
                    &author.nationality,
                ],
            )
            .await
            .backend_context("failed to insert author")?;

        row.try_get(0).backend_context("failed to read author id")
    }

    async fn update_author(&self, author: Author) -> Result<(), DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "UPDATE authors
                 SET first_name = $1,
                     last_name = $2,
                     birth_date = $3,
                     nationality = $4,
                     updated_at = now()
                 WHERE author_id = $5",
            )
            .await
            .backend_context("failed to prepare author update")?;

        let updated = client
            .execute(
                &stmt,
                &[
                    &author.first_name,
                    &author.last_name,
                    &author.birth_date,
                    &author.nationality,
                    &author.id,
                ],
            )
            .await
            .backend_context("failed to update author")?;

        if updated == 0 {
            return Err(DatabaseError::AuthorNotFound(author.id));
        }
        Ok(())
    }

    async fn delete_author(&self, author_id: AuthorId) -> Result<(), DatabaseError> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM authors WHERE author_id = $1", &[&author_id])
            .await
            .backend_context("failed to delete author")?;
        Ok(())
    }

    async fn get_author(&self, author_id: AuthorId) -> Result<Author, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {AUTHOR_COLUMNS} FROM authors WHERE author_id = $1"
            ))
            .await
            .backend_context("unable to prepare author query")?;

        let row = client
            .query_opt(&stmt, &[&author_id])
            .await
            .backend_context("unable to query author")?
            .ok_or(DatabaseError::AuthorNotFound(author_id))?;

        author_from_row(&row).backend_context("unable to read author")
    }

    async fn list_authors(
        &self,
        filter: AuthorFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Author>, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {AUTHOR_COLUMNS} FROM authors
                 WHERE ($1::TEXT IS NULL AND $2::TEXT IS NULL)
                    OR first_name ILIKE $1
                    OR last_name ILIKE $2
                 ORDER BY first_name, author_id
                 LIMIT $3 OFFSET $4"
            ))
            .await
            .backend_context("unable to prepare authors query")?;

        let first_name = filter.first_name.as_deref().map(substring_pattern);
        let last_name = filter.last_name.as_deref().map(substring_pattern);
        let rows = client
            .query(&stmt, &[&first_name, &last_name, &limit, &offset])
            .await
            .backend_context("unable to list authors")?;

        rows.iter()
            .map(|row| author_from_row(row).backend_context("failed to collect rows"))
            .collect()
    }

    fn close(&self) {
        self.pool.close();
    }
}
