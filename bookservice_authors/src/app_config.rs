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
                web::scope("/v1/authors")
                    .service(
                        web::resource("")
                            .route(web::get().to(handlers::list_authors))
                            .route(web::post().to(handlers::add_author))
                            .route(web::put().to(handlers::update_author)),
                    )
                    .service(
                        web::resource("/{author_id}")
                            .route(web::get().to(handlers::get_author))
                            .route(web::delete().to(handlers::delete_author)),
                    ),
            ),
    );
}

pub fn path_config() -> actix_web::web::PathConfig {
    actix_web::web::PathConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ErrorResponse::new(err.to_string()));
        InternalError::from_response(err, response).into()
    })
}

pub fn query_config() -> actix_web::web::QueryConfig {
    actix_web::web::QueryConfig::default().error_handler(|err, _req| {
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
