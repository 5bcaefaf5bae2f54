use anyhow::{bail, Context};
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_tracing::TracingMiddleware;

use crate::api::{Author, AuthorId, AuthorsResponse, ListAuthorsQuery};

pub struct AuthorsServiceClient {
    url: String,
    client: ClientWithMiddleware,
    retrying_client: ClientWithMiddleware,
}

impl AuthorsServiceClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client.clone())
            .with(TracingMiddleware::default())
            .build();
        // add_author is the only call that must not be repeated
        let retrying_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy(
                ExponentialBackoff::builder().build_with_max_retries(3),
            ))
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
            retrying_client,
        })
    }

    /// Calls POST /api/v1/authors endpoint
    /// Returns author_id taken from the location header
    pub async fn add_author(&self, author: Author) -> anyhow::Result<AuthorId> {
        let response = self
            .client
            .post(format!("{}/api/v1/authors", self.url))
            .json(&author)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to add author {}", response.text().await?)
        }

        response
            .headers()
            .get(LOCATION)
            .context("No location header")?
            .to_str()
            .context("Failed to convert header to str")?
            .strip_prefix("/api/v1/authors/")
            .context("Invalid location header")?
            .parse()
            .context("Failed to parse author id")
    }

    /// Calls GET /api/v1/authors/{author_id} endpoint
    pub async fn get_author(&self, author_id: AuthorId) -> anyhow::Result<Option<Author>> {
        let response = self
            .retrying_client
            .get(format!("{}/api/v1/authors/{}", self.url, author_id))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => bail!("Failed to get author {}", response.text().await?),
        }
    }

    /// Calls GET /api/v1/authors endpoint with the filter as query parameters
    pub async fn list_authors(&self, query: &ListAuthorsQuery) -> anyhow::Result<Vec<Author>> {
        let response = self
            .retrying_client
            .get(format!("{}/api/v1/authors", self.url))
            .query(query)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to list authors {}", response.text().await?)
        }
        Ok(response.json::<AuthorsResponse>().await?.authors)
    }

    /// Calls PUT /api/v1/authors endpoint
    pub async fn update_author(&self, author: Author) -> anyhow::Result<()> {
        let response = self
            .retrying_client
            .put(format!("{}/api/v1/authors", self.url))
            .json(&author)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to update author {}", response.text().await?)
        }
        Ok(())
    }

    /// Calls DELETE /api/v1/authors/{author_id} endpoint
    pub async fn delete_author(&self, author_id: AuthorId) -> anyhow::Result<()> {
        let response = self
            .retrying_client
            .delete(format!("{}/api/v1/authors/{}", self.url, author_id))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to delete author {}", response.text().await?)
        }
        Ok(())
    }
}
