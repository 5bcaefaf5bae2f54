use std::sync::Arc;

use crate::api;
use crate::api::{AuthorId, ListAuthorsQuery, DEFAULT_LIST_LIMIT};
use crate::database::{self, AuthorFilter, AuthorsDatabase, DatabaseError, NewAuthor};

#[derive(thiserror::Error, Debug)]
#[error("{context}: {source}")]
pub struct AuthorsServiceError {
    context: &'static str,
    #[source]
    source: DatabaseError,
}

impl AuthorsServiceError {
    fn wrap(context: &'static str) -> impl FnOnce(DatabaseError) -> Self {
        move |source| Self { context, source }
    }

    pub fn database_error(&self) -> &DatabaseError {
        &self.source
    }
}

#[derive(Clone)]
pub struct AuthorsService {
    database: Arc<dyn AuthorsDatabase>,
}

impl AuthorsService {
    pub fn new(database: Arc<dyn AuthorsDatabase>) -> Self {
        Self { database }
    }

    /// Applies the default page size, the handler rejects negative paging beforehand
    pub async fn list_authors(
        &self,
        query: ListAuthorsQuery,
    ) -> Result<Vec<api::Author>, AuthorsServiceError> {
        let filter = AuthorFilter {
            first_name: query.first_name.filter(|name| !name.is_empty()),
            last_name: query.last_name.filter(|name| !name.is_empty()),
        };
        let authors = self
            .database
            .list_authors(
                filter,
                query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
                query.offset.unwrap_or(0),
            )
            .await
            .map_err(AuthorsServiceError::wrap("failed to list authors"))?;
        Ok(authors.into_iter().map(to_transport_author).collect())
    }

    pub async fn get_author(
        &self,
        author_id: AuthorId,
    ) -> Result<api::Author, AuthorsServiceError> {
        self.database
            .get_author(author_id)
            .await
            .map(to_transport_author)
            .map_err(AuthorsServiceError::wrap("failed to get author"))
    }

    pub async fn add_author(&self, author: api::Author) -> Result<AuthorId, AuthorsServiceError> {
        self.database
            .add_author(NewAuthor {
                first_name: author.first_name,
                last_name: author.last_name,
                birth_date: author.birth_date,
                nationality: author.nationality,
            })
            .await
            .map_err(AuthorsServiceError::wrap("failed to add author"))
    }

    pub async fn update_author(&self, author: api::Author) -> Result<(), AuthorsServiceError> {
        let stored = self
            .database
            .get_author(author.id)
            .await
            .map_err(AuthorsServiceError::wrap("failed to update author"))?;

        self.database
            .update_author(database::Author {
                first_name: author.first_name,
                last_name: author.last_name,
                birth_date: author.birth_date,
                nationality: author.nationality,
                ..stored
            })
            .await
            .map_err(AuthorsServiceError::wrap("failed to update author"))
    }

    pub async fn delete_author(&self, author_id: AuthorId) -> Result<(), AuthorsServiceError> {
        self.database
            .delete_author(author_id)
            .await
            .map_err(AuthorsServiceError::wrap("failed to delete author"))
    }

    pub fn close(&self) {
        self.database.close()
    }
}

fn to_transport_author(author: database::Author) -> api::Author {
    api::Author {
        id: author.id,
        first_name: author.first_name,
        last_name: author.last_name,
        birth_date: author.birth_date,
        nationality: author.nationality,
    }
}

#[cfg(test)]
mod authors_service_tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::database::InMemoryAuthorsDatabase;

    fn author(first_name: &str, last_name: &str) -> api::Author {
        api::Author {
            id: 0,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            birth_date: NaiveDate::from_ymd_opt(1965, 7, 31),
            nationality: "British".to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_and_get_author() {
        let service = AuthorsService::new(Arc::new(InMemoryAuthorsDatabase::default()));
        let id = service.add_author(author("Jane", "Doe")).await.unwrap();

        assert_eq!(
            service.get_author(id).await.unwrap(),
            api::Author {
                id,
                ..author("Jane", "Doe")
            }
        );
    }

    #[tokio::test]
    async fn test_list_uses_default_limit() {
        let service = AuthorsService::new(Arc::new(InMemoryAuthorsDatabase::default()));
        for i in 0..(DEFAULT_LIST_LIMIT + 5) {
            service
                .add_author(author(&format!("Name{i:03}"), "Doe"))
                .await
                .unwrap();
        }

        let authors = service
            .list_authors(ListAuthorsQuery::default())
            .await
            .unwrap();
        assert_eq!(authors.len() as i64, DEFAULT_LIST_LIMIT);
        assert_eq!(authors[0].first_name, "Name000");

        let empty_filter_matches_all = service
            .list_authors(ListAuthorsQuery {
                first_name: Some("".to_string()),
                limit: Some(100),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(empty_filter_matches_all.len() as i64, DEFAULT_LIST_LIMIT + 5);
    }

    #[tokio::test]
    async fn test_update_missing_author_has_context() {
        let service = AuthorsService::new(Arc::new(InMemoryAuthorsDatabase::default()));
        let err = service
            .update_author(api::Author {
                id: 404,
                ..author("Jane", "Doe")
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.database_error(),
            DatabaseError::AuthorNotFound(404)
        ));
        assert_eq!(err.to_string(), "failed to update author: author 404 not found");
    }
}
