use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shared::{ErrorResponse, HealthResponse, PredictionResponse};
use uuid::Uuid;

use crate::error::EngineError;
use crate::inference::aggregate::Verdict;
use crate::inference::frames::clamp_stride;
use crate::inference::Engine;

/// Largest accepted upload, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("No file uploaded")]
    MissingFile,
    #[error("Upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("Malformed upload: {0}")]
    Multipart(String),
    #[error("Invalid query: {0}")]
    Query(String),
    #[error("Scoring task failed: {0}")]
    Blocking(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Engine(_)
            | ApiError::MissingFile
            | ApiError::Multipart(_)
            | ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct VideoQuery {
    sample_rate: Option<i64>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::Query(err.to_string()).into()),
    )
    .service(web::resource("/health").route(web::get().to(health)))
    .service(web::resource("/predict-image").route(web::post().to(predict_image)))
    .service(web::resource("/predict-video").route(web::post().to(predict_video)));
}

async fn health(engine: web::Data<Engine>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".into(),
        model_loaded: engine.model_loaded(),
    })
}

async fn predict_image(
    engine: web::Data<Engine>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let bytes = read_upload(payload, limit.0).await?;
    info!("[{}] predict-image: {} bytes", request_id, bytes.len());
    let input_sha256 = hex::encode(Sha256::digest(&bytes));

    let engine = engine.into_inner();
    let verdict = web::block(move || engine.score_image(&bytes))
        .await
        .map_err(|e| ApiError::Blocking(e.to_string()))?
        .inspect_err(|e| error!("[{}] predict-image failed: {}", request_id, e))?;

    Ok(HttpResponse::Ok().json(to_response(request_id, verdict, input_sha256)))
}

async fn predict_video(
    engine: web::Data<Engine>,
    limit: web::Data<UploadLimit>,
    query: web::Query<VideoQuery>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let stride = query
        .sample_rate
        .map(clamp_stride)
        .unwrap_or_else(|| engine.default_stride());
    let bytes = read_upload(payload, limit.0).await?;
    info!(
        "[{}] predict-video: {} bytes, stride {}",
        request_id,
        bytes.len(),
        stride
    );
    let input_sha256 = hex::encode(Sha256::digest(&bytes));

    let engine = engine.into_inner();
    let verdict = web::block(move || engine.score_video(&bytes, stride))
        .await
        .map_err(|e| ApiError::Blocking(e.to_string()))?
        .inspect_err(|e| error!("[{}] predict-video failed: {}", request_id, e))?;

    Ok(HttpResponse::Ok().json(to_response(request_id, verdict, input_sha256)))
}

/// Reads the first non-empty multipart field, enforcing `limit`.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
            if data.len() + chunk.len() > limit {
                return Err(ApiError::PayloadTooLarge(limit));
            }
            data.extend_from_slice(&chunk);
        }
        if !data.is_empty() {
            return Ok(data);
        }
    }
    Err(ApiError::MissingFile)
}

fn to_response(request_id: Uuid, verdict: Verdict, input_sha256: String) -> PredictionResponse {
    let stats = verdict.pixel_stats;
    PredictionResponse {
        request_id,
        prediction: verdict.label,
        score: verdict.probability_of_real,
        source: verdict.source,
        frames_considered: verdict.frames_considered,
        input_sha256,
        mean_pixel: stats.map(|s| s.mean * 255.0),
        pixel_std: stats.map(|s| s.std_dev * 255.0),
    }
}
