use anyhow::{bail, Context};
use reqwest::header::LOCATION;
use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    Book, BookId, BooksResponse, BorrowRequest, BorrowingRecord, BorrowingRecordsResponse,
    ErrorResponse, NewRecommendation, Recommendation, RecommendationsResponse, UserId,
};

/// Outcome of borrow and return calls that the service refused for domain reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanOutcome {
    Done,
    /// Book does not exist, or there is no open loan to return
    NotFound,
    /// No copy left to borrow
    Unavailable,
}

pub struct BooksServiceClient {
    url: String,
    client: ClientWithMiddleware,
    /// Used only for reads, retrying a borrow could open a second loan
    retrying_client: ClientWithMiddleware,
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    response
        .json::<ErrorResponse>()
        .await
        .map(|error| error.error)
        .unwrap_or_else(|_| status.to_string())
}

impl BooksServiceClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client.clone())
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();
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

    /// Calls POST /api/v1/books endpoint
    /// Returns book_id taken from the location header
    pub async fn add_book(&self, book: Book) -> anyhow::Result<BookId> {
        let response = self
            .client
            .post(format!("{}/api/v1/books", self.url))
            .json(&book)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to add book {}", error_message(response).await)
        }

        let location_header = response
            .headers()
            .get(LOCATION)
            .context("No location header")?;

        location_header
            .to_str()
            .context("Failed to convert header to str")?
            .strip_prefix("/api/v1/books/")
            .context("Invalid location header")?
            .parse()
            .context("Failed to parse book id")
    }

    /// Calls GET /api/v1/books/{book_id} endpoint
    /// None if the book does not exist
    pub async fn get_book(&self, book_id: BookId) -> anyhow::Result<Option<Book>> {
        let response = self
            .retrying_client
            .get(format!("{}/api/v1/books/{}", self.url, book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to get book {}", error_message(response).await)
        }
    }

    /// Calls GET /api/v1/books endpoint
    pub async fn list_books(&self) -> anyhow::Result<Vec<Book>> {
        let response = self
            .retrying_client
            .get(format!("{}/api/v1/books", self.url))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json::<BooksResponse>().await?.books)
        } else {
            bail!("Failed to list books {}", error_message(response).await)
        }
    }

    /// Calls PUT /api/v1/books endpoint, the book must carry its id
    pub async fn update_book(&self, book: Book) -> anyhow::Result<()> {
        let response = self
            .client
            .put(format!("{}/api/v1/books", self.url))
            .json(&book)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to update book {}", error_message(response).await)
        }
        Ok(())
    }

    /// Calls DELETE /api/v1/books/{book_id} endpoint
    pub async fn delete_book(&self, book_id: BookId) -> anyhow::Result<()> {
        let response = self
            .client
            .delete(format!("{}/api/v1/books/{}", self.url, book_id))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to delete book {}", error_message(response).await)
        }
        Ok(())
    }

    async fn loan_call(&self, action: &str, book_id: BookId, user_id: UserId) -> anyhow::Result<LoanOutcome> {
        let response = self
            .client
            .post(format!("{}/api/v1/books/{}/{}", self.url, book_id, action))
            .json(&BorrowRequest { user_id })
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(LoanOutcome::NotFound),
            StatusCode::CONFLICT => Ok(LoanOutcome::Unavailable),
            status if status.is_success() => Ok(LoanOutcome::Done),
            _ => bail!("Failed to {} book {}", action, error_message(response).await),
        }
    }

    /// Calls POST /api/v1/books/{book_id}/borrow endpoint
    pub async fn borrow_book(&self, book_id: BookId, user_id: UserId) -> anyhow::Result<LoanOutcome> {
        self.loan_call("borrow", book_id, user_id).await
    }

    /// Calls POST /api/v1/books/{book_id}/return endpoint
    pub async fn return_book(&self, book_id: BookId, user_id: UserId) -> anyhow::Result<LoanOutcome> {
        self.loan_call("return", book_id, user_id).await
    }

    /// Calls GET /api/v1/books/{book_id}/borrowings endpoint
    pub async fn borrowing_records(&self, book_id: BookId) -> anyhow::Result<Vec<BorrowingRecord>> {
        let response = self
            .retrying_client
            .get(format!("{}/api/v1/books/{}/borrowings", self.url, book_id))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response
                .json::<BorrowingRecordsResponse>()
                .await?
                .borrowing_records)
        } else {
            bail!(
                "Failed to get borrowing records {}",
                error_message(response).await
            )
        }
    }

    /// Calls GET /api/v1/books/{book_id}/recommendations endpoint
    pub async fn recommendations(&self, book_id: BookId) -> anyhow::Result<Vec<Recommendation>> {
        let response = self
            .retrying_client
            .get(format!("{}/api/v1/books/{}/recommendations", self.url, book_id))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response
                .json::<RecommendationsResponse>()
                .await?
                .recommendations)
        } else {
            bail!(
                "Failed to get recommendations {}",
                error_message(response).await
            )
        }
    }

    /// Calls POST /api/v1/books/{book_id}/recommendations endpoint
    pub async fn add_recommendation(
        &self,
        book_id: BookId,
        recommendation: NewRecommendation,
    ) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/api/v1/books/{}/recommendations", self.url, book_id))
            .json(&recommendation)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!(
                "Failed to add recommendation {}",
                error_message(response).await
            )
        }
        Ok(())
    }
}
