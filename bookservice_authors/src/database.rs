use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};

pub use in_memory_database::InMemoryAuthorsDatabase;
pub use postgres_database::PostgresAuthorsDatabase;

use crate::api::AuthorId;

mod in_memory_database;
mod postgres_database;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Author row as it is persisted
pub struct Author {
    pub id: AuthorId,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub nationality: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthor {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub nationality: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Empty filter matches every author, set fields are OR-combined
pub struct AuthorFilter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl AuthorFilter {
    /// Case-insensitive substring match used by the in-memory store
    pub fn matches(&self, author: &Author) -> bool {
        fn contains(value: &str, pattern: &str) -> bool {
            value.to_lowercase().contains(&pattern.to_lowercase())
        }

        match (&self.first_name, &self.last_name) {
            (None, None) => true,
            (first_name, last_name) => {
                first_name
                    .as_deref()
                    .is_some_and(|pattern| contains(&author.first_name, pattern))
                    || last_name
                        .as_deref()
                        .is_some_and(|pattern| contains(&author.last_name, pattern))
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("author {0} not found")]
    AuthorNotFound(AuthorId),

    #[error("{context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to get connection from pool: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
}

pub(crate) trait BackendContext<T> {
    fn backend_context(self, context: &'static str) -> Result<T, DatabaseError>;
}

impl<T> BackendContext<T> for Result<T, tokio_postgres::Error> {
    fn backend_context(self, context: &'static str) -> Result<T, DatabaseError> {
        self.map_err(|source| DatabaseError::Backend { context, source })
    }
}

#[async_trait::async_trait]
pub trait AuthorsDatabase: Send + Sync {
    /// Adds author to the database, returns an id assigned to the author
    async fn add_author(&self, author: NewAuthor) -> Result<AuthorId, DatabaseError>;

    /// Overwrites names, birth date and nationality, `AuthorNotFound` if no row matches
    async fn update_author(&self, author: Author) -> Result<(), DatabaseError>;

    /// Deleting a missing author is not an error
    async fn delete_author(&self, author_id: AuthorId) -> Result<(), DatabaseError>;

    async fn get_author(&self, author_id: AuthorId) -> Result<Author, DatabaseError>;

    /// Filtered page of authors ordered by first name, then id
    async fn list_authors(
        &self,
        filter: AuthorFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Author>, DatabaseError>;

    fn close(&self);
}

/// Picks the database implementation based on the url scheme,
/// empty url means the in-memory one
pub async fn connect(database_url: &str) -> anyhow::Result<Arc<dyn AuthorsDatabase>> {
    if database_url.is_empty() {
        tracing::info!("Using in-memory database implementation");
        return Ok(Arc::new(InMemoryAuthorsDatabase::default()));
    }

    if database_url.starts_with("postgres://") {
        let database = PostgresAuthorsDatabase::init(database_url)
            .await
            .context("Failed to initialize PostgreSQL database connection")?;
        tracing::info!("Using PostgreSQL database implementation");
        return Ok(Arc::new(database));
    }

    bail!("Unsupported database url scheme: {}", database_url)
}
