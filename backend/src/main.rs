use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use deepshield::config::EngineConfig;
use deepshield::inference::model::load_model_or_none;
use deepshield::inference::Engine;
use deepshield::routes::{configure_routes, UploadLimit};
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = EngineConfig::load().map_err(|e| {
        log::error!("Failed to load engine config: {}", e);
        std::io::Error::other(format!("Config loading failed: {}", e))
    })?;

    // Resolved once; the engine never swaps its model afterwards.
    let model = load_model_or_none(&config.model);
    let engine = web::Data::new(Engine::from_config(&config, model));
    if engine.model_loaded() {
        log::info!("Scoring with the trained model, heuristic as fallback");
    } else {
        log::warn!("No model available, every verdict will come from the heuristic");
    }

    let upload_limit = UploadLimit(config.server.max_upload_bytes);
    let bind_address = format!("0.0.0.0:{}", config.server.port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(engine.clone())
            .app_data(web::Data::new(upload_limit))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
