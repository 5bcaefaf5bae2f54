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

use bookservice_authors::app_config::{config_app, json_config, path_config, query_config};
use bookservice_authors::authors_service::AuthorsService;
use bookservice_authors::database;
use bookservice_authors::settings::Settings;

// Based on https://github.com/LukeMathWalker/tracing-actix-web/blob/main/examples/opentelemetry/src/main.rs#L15
fn init_telemetry() {
    let app_name = "bookservice_authors";

    global::set_text_map_propagator(TraceContextPropagator::new());
    #[allow(deprecated)]
    let tracer = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(app_name)
        .install_batch(TokioCurrentThread)
        .expect("Failed to install OpenTelemetry tracer.");

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
    let authors_service = AuthorsService::new(database);

    tracing::info!(
        "starting HTTP server at http://{}:{}",
        settings.host,
        settings.port
    );

    let server_authors_service = authors_service.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(Data::new(server_authors_service.clone()))
            .app_data(path_config())
            .app_data(query_config())
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

    authors_service.close();
    opentelemetry::global::shutdown_tracer_provider();
    result
}
