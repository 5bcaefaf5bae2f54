//! End-to-end tests run against deployed services.
//! Service urls are read from `BOOKS_URL` and `AUTHORS_URL`.


#[cfg(test)]
pub(crate) fn books_url() -> String {
    std::env::var("BOOKS_URL").unwrap_or_else(|_| "http://127.0.0.1:8001".to_string())
}

#[cfg(test)]
pub(crate) fn authors_url() -> String {
    std::env::var("AUTHORS_URL").unwrap_or_else(|_| "http://127.0.0.1:8002".to_string())
}
