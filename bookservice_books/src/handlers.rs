use actix_web::http::header::LOCATION;
use actix_web::web::Data;
use actix_web::Error;
use actix_web::HttpResponse;
use chrono::Utc;
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{
    Book, BookId, BooksResponse, BorrowRequest, BorrowingRecordsResponse, ErrorResponse,
    NewRecommendation, RecommendationsResponse,
};
use crate::books_service::{BooksService, BooksServiceError};
use crate::database::DatabaseError;

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new(message))
}

/// Domain failures keep their message, everything else is logged and hidden
fn error_response(operation: &str, err: BooksServiceError) -> HttpResponse {
    match err.database_error() {
        DatabaseError::BookNotFound(_) | DatabaseError::RecordNotFoundOrAlreadyReturned { .. } => {
            HttpResponse::NotFound().json(ErrorResponse::new(err.to_string()))
        }
        DatabaseError::BookUnavailable(_) => {
            HttpResponse::Conflict().json(ErrorResponse::new(err.to_string()))
        }
        other => {
            tracing::error!(
                "{} failed {} (retryable: {})",
                operation,
                err,
                other.is_retryable()
            );
            HttpResponse::InternalServerError().json(ErrorResponse::new("internal error"))
        }
    }
}

/// Checks the rules a book has to satisfy before it is added
fn validate_new_book(book: &Book) -> Result<(), &'static str> {
    if book.title.is_empty() {
        return Err("title is required");
    }
    match book.publish_date {
        None => Err("published date is required"),
        Some(date) if date > Utc::now().date_naive() => {
            Err("published date cannot be in the future")
        }
        Some(_) => Ok(()),
    }
}

#[api_v2_operation]
pub async fn status() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().body("ok"))
}

#[api_v2_operation]
pub async fn get_all_books(books_service: Data<BooksService>) -> Result<HttpResponse, Error> {
    Ok(match books_service.get_books().await {
        Ok(books) => HttpResponse::Ok().json(BooksResponse { books }),
        Err(err) => error_response("Get all books", err),
    })
}

#[api_v2_operation]
pub async fn get_book(
    books_service: Data<BooksService>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(match books_service.get_book(book_id.into_inner()).await {
        Ok(book) => HttpResponse::Ok().json(book),
        Err(err) => error_response("Get book", err),
    })
}

#[api_v2_operation]
pub async fn add_book(
    books_service: Data<BooksService>,
    book: web::Json<Book>,
) -> Result<HttpResponse, Error> {
    let book = book.into_inner();
    if let Err(message) = validate_new_book(&book) {
        tracing::warn!("Add book rejected: {}", message);
        return Ok(bad_request(message));
    }

    Ok(match books_service.save_book(book).await {
        Ok(book_id) => HttpResponse::Created()
            .append_header((LOCATION, format!("/api/v1/books/{}", book_id)))
            .finish(),
        Err(err) => error_response("Add book", err),
    })
}

#[api_v2_operation]
pub async fn update_book(
    books_service: Data<BooksService>,
    book: web::Json<Book>,
) -> Result<HttpResponse, Error> {
    let book = book.into_inner();
    if book.title.is_empty() {
        return Ok(bad_request("title is required"));
    }

    Ok(match books_service.update_book(book).await {
        Ok(()) => HttpResponse::Created().finish(),
        Err(err) => error_response("Update book", err),
    })
}

#[api_v2_operation]
pub async fn delete_book(
    books_service: Data<BooksService>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(match books_service.delete_book(book_id.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => error_response("Delete book", err),
    })
}

#[api_v2_operation]
pub async fn borrow_book(
    books_service: Data<BooksService>,
    book_id: web::Path<BookId>,
    request: web::Json<BorrowRequest>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_service
            .borrow_book(book_id.into_inner(), request.user_id)
            .await
        {
            Ok(()) => HttpResponse::Created().finish(),
            Err(err) => error_response("Borrow book", err),
        },
    )
}

#[api_v2_operation]
pub async fn return_book(
    books_service: Data<BooksService>,
    book_id: web::Path<BookId>,
    request: web::Json<BorrowRequest>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_service
            .return_book(book_id.into_inner(), request.user_id)
            .await
        {
            Ok(()) => HttpResponse::NoContent().finish(),
            Err(err) => error_response("Return book", err),
        },
    )
}

#[api_v2_operation]
pub async fn get_borrowing_records(
    books_service: Data<BooksService>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_service
            .get_borrowing_records(book_id.into_inner())
            .await
        {
            Ok(borrowing_records) => {
                HttpResponse::Ok().json(BorrowingRecordsResponse { borrowing_records })
            }
            Err(err) => error_response("Get borrowing records", err),
        },
    )
}

#[api_v2_operation]
pub async fn get_recommendations(
    books_service: Data<BooksService>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_service.get_recommendations(book_id.into_inner()).await {
            Ok(recommendations) => {
                HttpResponse::Ok().json(RecommendationsResponse { recommendations })
            }
            Err(err) => error_response("Get recommendations", err),
        },
    )
}

#[api_v2_operation]
pub async fn add_recommendation(
    books_service: Data<BooksService>,
    book_id: web::Path<BookId>,
    recommendation: web::Json<NewRecommendation>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_service
            .add_recommendation(book_id.into_inner(), recommendation.into_inner())
            .await
        {
            Ok(()) => HttpResponse::Created().finish(),
            Err(err) => error_response("Add recommendation", err),
        },
    )
}

#[cfg(test)]
mod handler_tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use chrono::{Duration, NaiveDate};
    use paperclip::actix::OpenApiExt;
    use serde_json::json;

    use super::*;
    use crate::api::{BorrowingRecord, Recommendation};
    use crate::app_config::{config_app, json_config, path_config};
    use crate::database::{BooksDatabase, InMemoryBooksDatabase, NewBook};

    macro_rules! init_app {
        ($database:expr) => {
            test::init_service(
                App::new()
                    .wrap_api()
                    .app_data(Data::new(BooksService::new($database.clone())))
                    .app_data(path_config())
                    .app_data(json_config())
                    .configure(config_app)
                    .build(),
            )
            .await
        };
    }

    async fn book_with_stock(database: &InMemoryBooksDatabase, stock: i32) -> BookId {
        database
            .create_book(NewBook {
                title: "book".to_string(),
                isbn: "1234567890".to_string(),
                author_id: 1,
                category_id: 2,
                stock,
                published_date: NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
                description: "".to_string(),
            })
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn test_status() {
        let database = Arc::new(InMemoryBooksDatabase::default());
        let app = init_app!(database);

        let response =
            test::call_service(&app, test::TestRequest::get().uri("/api/status").to_request())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(test::read_body(response).await, "ok");
    }

    #[actix_web::test]
    /// 1. Adds a book and follows the location header
    /// 2. Lists books
    /// 3. Updates the title
    /// 4. Deletes it and gets 404 afterwards
    async fn test_book_crud() {
        let database = Arc::new(InMemoryBooksDatabase::default());
        let app = init_app!(database);

        let request = test::TestRequest::post()
            .uri("/api/v1/books")
            .set_json(json!({
                "title": "book1",
                "isbn": "1234567890",
                "author_id": 1,
                "category_id": 2,
                "publish_date": "2023-10-01",
                "description": "a book desc"
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let location = response
            .headers()
            .get(LOCATION)
            .expect("No location header")
            .to_str()
            .unwrap()
            .to_string();

        let book: Book = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri(&location).to_request(),
        )
        .await;
        assert_eq!(book.title, "book1");
        assert_eq!(book.publish_date, NaiveDate::from_ymd_opt(2023, 10, 1));

        let books: BooksResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/v1/books").to_request(),
        )
        .await;
        assert_eq!(books.books, vec![book.clone()]);

        let request = test::TestRequest::put()
            .uri("/api/v1/books")
            .set_json(Book {
                title: "updated".to_string(),
                ..book.clone()
            })
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(database.get_book(book.id).await.unwrap().title, "updated");

        let request = test::TestRequest::delete().uri(&location).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response =
            test::call_service(&app, test::TestRequest::get().uri(&location).to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorResponse = test::read_body_json(response).await;
        assert!(error.error.contains("not found"));
    }

    #[actix_web::test]
    async fn test_add_book_validation() {
        let database = Arc::new(InMemoryBooksDatabase::default());
        let app = init_app!(database);

        let tomorrow = (Utc::now() + Duration::days(1)).date_naive();
        let cases = vec![
            (
                json!({"title": "", "author_id": 1, "category_id": 2, "publish_date": "2023-10-01"}),
                "title is required",
            ),
            (
                json!({"title": "book", "author_id": 1, "category_id": 2}),
                "published date is required",
            ),
            (
                json!({"title": "book", "author_id": 1, "category_id": 2, "publish_date": tomorrow}),
                "published date cannot be in the future",
            ),
        ];

        for (body, expected_error) in cases {
            let request = test::TestRequest::post()
                .uri("/api/v1/books")
                .set_json(body)
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let error: ErrorResponse = test::read_body_json(response).await;
            assert_eq!(error.error, expected_error);
        }

        let request = test::TestRequest::post()
            .uri("/api/v1/books")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(database.load_all_books().await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_author_and_category_are_required() {
        let database = Arc::new(InMemoryBooksDatabase::default());
        let app = init_app!(database);

        for body in [
            json!({"title": "book", "category_id": 2, "publish_date": "2023-10-01"}),
            json!({"title": "book", "author_id": 1, "publish_date": "2023-10-01"}),
        ] {
            let request = test::TestRequest::post()
                .uri("/api/v1/books")
                .set_json(body.clone())
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
            let _: ErrorResponse = test::read_body_json(response).await;
        }

        let request = test::TestRequest::put()
            .uri("/api/v1/books")
            .set_json(json!({"id": 1, "title": "book"}))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(database.load_all_books().await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_invalid_id_is_client_error() {
        let database = Arc::new(InMemoryBooksDatabase::default());
        let app = init_app!(database);

        let response = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/v1/books/abc").to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let _: ErrorResponse = test::read_body_json(response).await;
    }

    #[actix_web::test]
    /// 1. Borrows a book and checks the ledger
    /// 2. Borrows the last copy, next borrow gets conflict
    /// 3. Returns the book, second return is not found
    /// 4. Borrowing a missing book is not found
    async fn test_borrow_and_return() {
        let database = Arc::new(InMemoryBooksDatabase::default());
        let app = init_app!(database);
        let book_id = book_with_stock(&database, 2).await;

        let borrow = |user_id: i32| {
            test::TestRequest::post()
                .uri(&format!("/api/v1/books/{}/borrow", book_id))
                .set_json(BorrowRequest { user_id })
                .to_request()
        };
        let give_back = |user_id: i32| {
            test::TestRequest::post()
                .uri(&format!("/api/v1/books/{}/return", book_id))
                .set_json(BorrowRequest { user_id })
                .to_request()
        };

        let response = test::call_service(&app, borrow(1)).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let records: BorrowingRecordsResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri(&format!("/api/v1/books/{}/borrowings", book_id))
                .to_request(),
        )
        .await;
        let record: &BorrowingRecord = &records.borrowing_records[0];
        assert_eq!(record.user_id, 1);
        assert_eq!(record.due_date - record.borrowed_at, Duration::hours(72));
        assert_eq!(record.returned_at, None);

        assert_eq!(
            test::call_service(&app, borrow(2)).await.status(),
            StatusCode::CREATED
        );
        let response = test::call_service(&app, borrow(3)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(database.get_book(book_id).await.unwrap().stock, 0);

        assert_eq!(
            test::call_service(&app, give_back(1)).await.status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            test::call_service(&app, give_back(1)).await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(database.get_book(book_id).await.unwrap().stock, 1);

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/books/20000/borrow")
                .set_json(BorrowRequest { user_id: 1 })
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_recommendations() {
        let database = Arc::new(InMemoryBooksDatabase::default());
        let app = init_app!(database);

        let request = test::TestRequest::post()
            .uri("/api/v1/books/1/recommendations")
            .set_json(NewRecommendation {
                recommended_book_id: 2,
                score: 0.8,
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::CREATED
        );

        let response: RecommendationsResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/books/1/recommendations")
                .to_request(),
        )
        .await;
        assert_eq!(
            response.recommendations,
            vec![Recommendation {
                id: 1,
                book_id: 1,
                recommended_book_id: 2,
                score: 0.8,
            }]
        );
    }
}
