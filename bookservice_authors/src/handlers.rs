use actix_web::http::header::LOCATION;
use actix_web::web::Data;
use actix_web::Error;
use actix_web::HttpResponse;
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{Author, AuthorId, AuthorsResponse, ErrorResponse, ListAuthorsQuery};
use crate::authors_service::{AuthorsService, AuthorsServiceError};
use crate::database::DatabaseError;

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new(message))
}

fn error_response(operation: &str, err: AuthorsServiceError) -> HttpResponse {
    match err.database_error() {
        DatabaseError::AuthorNotFound(_) => {
            HttpResponse::NotFound().json(ErrorResponse::new(err.to_string()))
        }
        _ => {
            tracing::error!("{} failed {}", operation, err);
            HttpResponse::InternalServerError().json(ErrorResponse::new("internal error"))
        }
    }
}

fn validate_author(author: &Author) -> Result<(), &'static str> {
    if author.first_name.is_empty() {
        return Err("first name is required");
    }
    if author.last_name.is_empty() {
        return Err("last name is required");
    }
    Ok(())
}

#[api_v2_operation]
pub async fn status() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().body("ok"))
}

#[api_v2_operation]
pub async fn list_authors(
    authors_service: Data<AuthorsService>,
    query: web::Query<ListAuthorsQuery>,
) -> Result<HttpResponse, Error> {
    let query = query.into_inner();
    if query.limit.is_some_and(|limit| limit < 0) {
        return Ok(bad_request("limit cannot be negative"));
    }
    if query.offset.is_some_and(|offset| offset < 0) {
        return Ok(bad_request("offset cannot be negative"));
    }

    Ok(match authors_service.list_authors(query).await {
        Ok(authors) => HttpResponse::Ok().json(AuthorsResponse { authors }),
        Err(err) => error_response("List authors", err),
    })
}

#[api_v2_operation]
pub async fn get_author(
    authors_service: Data<AuthorsService>,
    author_id: web::Path<AuthorId>,
) -> Result<HttpResponse, Error> {
    Ok(match authors_service.get_author(author_id.into_inner()).await {
        Ok(author) => HttpResponse::Ok().json(author),
        Err(err) => error_response("Get author", err),
    })
}

#[api_v2_operation]
pub async fn add_author(
    authors_service: Data<AuthorsService>,
    author: web::Json<Author>,
) -> Result<HttpResponse, Error> {
    let author = author.into_inner();
    if let Err(message) = validate_author(&author) {
        tracing::warn!("Add author rejected: {}", message);
        return Ok(bad_request(message));
    }

    Ok(match authors_service.add_author(author).await {
        Ok(author_id) => HttpResponse::Created()
            .append_header((LOCATION, format!("/api/v1/authors/{}", author_id)))
            .finish(),
        Err(err) => error_response("Add author", err),
    })
}

#[api_v2_operation]
pub async fn update_author(
    authors_service: Data<AuthorsService>,
    author: web::Json<Author>,
) -> Result<HttpResponse, Error> {
    let author = author.into_inner();
    if let Err(message) = validate_author(&author) {
        tracing::warn!("Update author rejected: {}", message);
        return Ok(bad_request(message));
    }

    Ok(match authors_service.update_author(author).await {
        Ok(()) => HttpResponse::Created().finish(),
        Err(err) => error_response("Update author", err),
    })
}

#[api_v2_operation]
pub async fn delete_author(
    authors_service: Data<AuthorsService>,
    author_id: web::Path<AuthorId>,
) -> Result<HttpResponse, Error> {
    Ok(match authors_service.delete_author(author_id.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => error_response("Delete author", err),
    })
}

#[cfg(test)]
mod handler_tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use chrono::NaiveDate;
    use paperclip::actix::OpenApiExt;
    use serde_json::json;

    use super::*;
    use crate::app_config::{config_app, json_config, path_config, query_config};
    use crate::database::{AuthorsDatabase, InMemoryAuthorsDatabase};

    macro_rules! init_app {
        ($database:expr) => {
            test::init_service(
                App::new()
                    .wrap_api()
                    .app_data(Data::new(AuthorsService::new($database.clone())))
                    .app_data(path_config())
                    .app_data(query_config())
                    .app_data(json_config())
                    .configure(config_app)
                    .build(),
            )
            .await
        };
    }

    macro_rules! add_author {
        ($app:expr, $first_name:expr, $last_name:expr) => {{
            let request = test::TestRequest::post()
                .uri("/api/v1/authors")
                .set_json(json!({
                    "first_name": $first_name,
                    "last_name": $last_name,
                    "birth_date": "1970-01-01",
                    "nationality": "British"
                }))
                .to_request();
            let response = test::call_service(&$app, request).await;
            assert_eq!(response.status(), StatusCode::CREATED);
            response
                .headers()
                .get(LOCATION)
                .expect("No location header")
                .to_str()
                .unwrap()
                .to_string()
        }};
    }

    #[actix_web::test]
    async fn test_status() {
        let database = Arc::new(InMemoryAuthorsDatabase::default());
        let app = init_app!(database);

        let response =
            test::call_service(&app, test::TestRequest::get().uri("/api/status").to_request())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[actix_web::test]
    /// 1. Adds an author and follows the location header
    /// 2. Updates nationality
    /// 3. Deletes it and gets 404 afterwards
    async fn test_author_crud() {
        let database = Arc::new(InMemoryAuthorsDatabase::default());
        let app = init_app!(database);

        let location = add_author!(app, "Jane", "Doe");
        let author: Author = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri(&location).to_request(),
        )
        .await;
        assert_eq!(author.first_name, "Jane");
        assert_eq!(author.birth_date, NaiveDate::from_ymd_opt(1970, 1, 1));

        let request = test::TestRequest::put()
            .uri("/api/v1/authors")
            .set_json(Author {
                nationality: "Irish".to_string(),
                ..author.clone()
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::CREATED
        );
        assert_eq!(
            database.get_author(author.id).await.unwrap().nationality,
            "Irish"
        );

        let request = test::TestRequest::put()
            .uri("/api/v1/authors")
            .set_json(Author {
                id: 20000,
                ..author.clone()
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NOT_FOUND
        );

        let request = test::TestRequest::delete().uri(&location).to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NO_CONTENT
        );
        let response =
            test::call_service(&app, test::TestRequest::get().uri(&location).to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorResponse = test::read_body_json(response).await;
        assert!(error.error.contains("not found"));
    }

    #[actix_web::test]
    async fn test_names_are_required() {
        let database = Arc::new(InMemoryAuthorsDatabase::default());
        let app = init_app!(database);

        let cases = vec![
            (json!({"last_name": "Doe"}), "first name is required"),
            (json!({"first_name": "Jane"}), "last name is required"),
        ];
        for (body, expected_error) in cases {
            let request = test::TestRequest::post()
                .uri("/api/v1/authors")
                .set_json(body)
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let error: ErrorResponse = test::read_body_json(response).await;
            assert_eq!(error.error, expected_error);
        }
    }

    #[actix_web::test]
    async fn test_list_authors() {
        let database = Arc::new(InMemoryAuthorsDatabase::default());
        let app = init_app!(database);
        let jane_location = add_author!(app, "Jane", "Doe");
        add_author!(app, "John", "Smith");
        add_author!(app, "Adam", "Janeway");

        let jane: Author = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri(&jane_location).to_request(),
        )
        .await;
        let response: AuthorsResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/authors?first_name=Jane&limit=10&offset=0")
                .to_request(),
        )
        .await;
        assert_eq!(response.authors, vec![jane]);

        let response: AuthorsResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/authors?first_name=jo&last_name=jane")
                .to_request(),
        )
        .await;
        let names: Vec<_> = response
            .authors
            .iter()
            .map(|author| author.first_name.as_str())
            .collect();
        assert_eq!(names, vec!["Adam", "John"]);

        for uri in [
            "/api/v1/authors?limit=-1",
            "/api/v1/authors?offset=-5",
            "/api/v1/authors?limit=ten",
        ] {
            let response =
                test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }

        let response = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/v1/authors/abc").to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
