use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use paperclip::actix::OpenApiExt;
use tracing_actix_web::TracingLogger;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use bookservice_books::app_config::{config_app, json_config, path_config};
use bookservice_books::books_service::BooksService;
use bookservice_books::database;
use bookservice_books::settings::Settings;

// Based on https://github.com/LukeMathWalker/tracing-actix-web/blob/main/examples/opentelemetry/src/main.rs#L15
fn init_telemetry() {
    let app_name = "bookservice_books";

    // Start a new Jaeger trace pipeline.
    // Spans are exported in batch - recommended setup for a production application.
    global::set_text_map_propagator(TraceContextPropagator::new());
    #[allow(deprecated)]
    let tracer = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(app_name)
        .install_batch(TokioCurrentThread)
        .expect("Failed to install OpenTelemetry tracer.");

    // Filter based on level - trace, debug, info, warn, error
    // Tunable via `RUST_LOG` env variable
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
    let formatting_layer = BunyanFormattingLayer::new(app_name.into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(telemetry)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to install `tracing` subscriber.")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry();

    let settings = Settings::load()?;
    let database = database::connect(&settings.database_url).await?;
    let books_service = BooksService::new(database);

    tracing::info!(
        "starting HTTP server at http://{}:{}",
        settings.host,
        settings.port
    );

    let server_books_service = books_service.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(Data::new(server_books_service.clone()))
            .app_data(path_config())
            .app_data(json_config())
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    });
    if let Some(workers) = settings.workers {
        server = server.workers(workers);
    }

    let result = server
        .bind((settings.host.as_str(), settings.port))
        .context("Failed to bind http server")?
        .run()
        .await
        .context("Http server failed");

    books_service.close();
    opentelemetry::global::shutdown_tracer_provider();
    result
}
