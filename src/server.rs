use crate::{
    config::HubConfig,
    error::HubError,
    hub::ImageGeneratorHub,
    models::GenerationRequest,
};
use actix_web::{
    error::InternalError, http::StatusCode, middleware, web, App, HttpResponse, HttpServer,
    ResponseError,
};
use serde_json::json;

impl ResponseError for HubError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(ResponseError::status_code(self)).json(json!({ "detail": self.to_string() }))
    }
}

async fn list_engines(hub: web::Data<ImageGeneratorHub>) -> HttpResponse {
    HttpResponse::Ok().json(hub.list_engines())
}

async fn generate_images(
    hub: web::Data<ImageGeneratorHub>,
    request: web::Json<GenerationRequest>,
) -> Result<HttpResponse, HubError> {
    let response = hub.generate_images(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn health(hub: web::Data<ImageGeneratorHub>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "engines": hub.registry().len()
    }))
}

/// Malformed JSON bodies answer 400 with the same `{"detail"}` shape as
/// every other error.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let detail = err.to_string();
        InternalError::from_response(err, HttpResponse::BadRequest().json(json!({ "detail": detail })))
            .into()
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/engines", web::get().to(list_engines))
        .route("/generate", web::post().to(generate_images))
        .route("/health", web::get().to(health));
}

pub async fn run(hub: ImageGeneratorHub, config: &HubConfig) -> std::io::Result<()> {
    let hub = web::Data::new(hub);

    HttpServer::new(move || {
        App::new()
            .app_data(hub.clone())
            .app_data(json_config())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
