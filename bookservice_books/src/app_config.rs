use actix_web::error::InternalError;
use actix_web::HttpResponse;
use paperclip::actix::web;

use crate::api::ErrorResponse;
use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/status").route(web::get().to(handlers::status)))
            .service(
                web::scope("/v1/books")
                    .service(
                        web::resource("")
                            .route(web::get().to(handlers::get_all_books))
                            .route(web::post().to(handlers::add_book))
                            .route(web::put().to(handlers::update_book)),
                    )
                    .service(
                        web::scope("/{book_id}")
                            .service(
                                web::resource("")
                                    .route(web::get().to(handlers::get_book))
                                    .route(web::delete().to(handlers::delete_book)),
                            )
                            .service(
                                web::resource("/borrow")
                                    .route(web::post().to(handlers::borrow_book)),
                            )
                            .service(
                                web::resource("/return")
                                    .route(web::post().to(handlers::return_book)),
                            )
                            .service(
                                web::resource("/borrowings")
                                    .route(web::get().to(handlers::get_borrowing_records)),
                            )
                            .service(
                                web::resource("/recommendations")
                                    .route(web::get().to(handlers::get_recommendations))
                                    .route(web::post().to(handlers::add_recommendation)),
                            ),
                    ),
            ),
    );
}

/// Non numeric ids are a client error instead of actix's default 404
pub fn path_config() -> actix_web::web::PathConfig {
    actix_web::web::PathConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ErrorResponse::new(err.to_string()));
        InternalError::from_response(err, response).into()
    })
}

pub fn json_config() -> actix_web::web::JsonConfig {
    actix_web::web::JsonConfig::default().error_handler(|err, _req| {
        tracing::warn!("Request body parsing failed {}", err);
        let response = HttpResponse::BadRequest().json(ErrorResponse::new("invalid request"));
        InternalError::from_response(err, response).into()
    })
}
