use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use chrono::Utc;

use crate::api::AuthorId;
use crate::database::{Author, AuthorFilter, AuthorsDatabase, DatabaseError, NewAuthor};

pub struct InMemoryAuthorsDatabase {
    sequence_generator: AtomicI32,
    authors: parking_lot::RwLock<HashMap<AuthorId, Author>>,
}

impl Default for InMemoryAuthorsDatabase {
    fn default() -> Self {
        Self {
            sequence_generator: AtomicI32::new(1),
            authors: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl AuthorsDatabase for InMemoryAuthorsDatabase {
    async fn add_author(&self, author: NewAuthor) -> Result<AuthorId, DatabaseError> {
        let id = self.sequence_generator.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        self.authors.write().insert(
            id,
            Author {
                id,
                first_name: author.first_name,
                last_name: author.last_name,
                birth_date: author.birth_date,
                nationality: author.nationality,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_author(&self, author: Author) -> Result<(), DatabaseError> {
        let mut authors = self.authors.write();
        let stored = authors
            .get_mut(&author.id)
            .ok_or(DatabaseError::AuthorNotFound(author.id))?;
        stored.first_name = author.first_name;
        stored.last_name = author.last_name;
        stored.birth_date = author.birth_date;
        stored.nationality = author.nationality;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_author(&self, author_id: AuthorId) -> Result<(), DatabaseError> {
        self.authors.write().remove(&author_id);
        Ok(())
    }

    async fn get_author(&self, author_id: AuthorId) -> Result<Author, DatabaseError> {
        self.authors
            .read()
            .get(&author_id)
            .cloned()
            .ok_or(DatabaseError::AuthorNotFound(author_id))
    }

    async fn list_authors(
        &self,
        filter: AuthorFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Author>, DatabaseError> {
        let mut authors: Vec<Author> = self
            .authors
            .read()
            .values()
            .filter(|author| filter.matches(author))
            .cloned()
            .collect();
        authors.sort_by(|a, b| a.first_name.cmp(&b.first_name).then(a.id.cmp(&b.id)));

        Ok(authors
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    fn close(&self) {}
}
