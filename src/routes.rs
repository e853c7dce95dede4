use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ConfigKey;
use crate::dal::{Backend, Dal};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::{SubmissionKind, SubmissionLimiter};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(
                web::JsonConfig::default()
                    .error_handler(|e, _| ApiError::BadRequest(e.to_string()).into()),
            )
            .app_data(
                web::QueryConfig::default()
                    .error_handler(|e, _| ApiError::BadRequest(e.to_string()).into()),
            )
            .service(
                web::resource("/pets")
                    .route(web::get().to(list_pets))
                    .route(web::post().to(create_pet)),
            )
            .service(
                web::resource("/campaigns")
                    .route(web::get().to(list_campaigns))
                    .route(web::post().to(create_campaign)),
            )
            .service(
                web::resource("/reports")
                    .route(web::get().to(list_reports))
                    .route(web::post().to(create_report)),
            )
            .service(web::resource("/images/pets").route(web::post().to(upload_pet_image)))
            .service(web::resource("/images/campaigns").route(web::post().to(upload_campaign_image)))
            .service(web::resource("/status").route(web::get().to(status))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub dal: Dal,
    /// Required configuration keys that were absent at startup.
    pub missing_config: Vec<ConfigKey>,
    pub limiter: Option<SubmissionLimiter>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub configured: bool,
    pub missing: Vec<String>,
}

fn client_key(req: &HttpRequest, limiter: &SubmissionLimiter) -> String {
    if limiter.trusts_forwarded() {
        if let Some(ip) = req.connection_info().realip_remote_addr() {
            return ip.to_string();
        }
    }
    req.peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Charged only once a submission has passed the local checks.
fn check_quota(data: &AppState, req: &HttpRequest, kind: SubmissionKind) -> Result<(), ApiError> {
    match &data.limiter {
        Some(l) if !l.allow(kind, &client_key(req, l)) => Err(ApiError::TooManyRequests),
        _ => Ok(()),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/pets",
    params(PetFilter),
    responses((status = 200, description = "Pets, most recent first", body = [Pet]))
)]
pub async fn list_pets(data: web::Data<AppState>, filter: web::Query<PetFilter>) -> HttpResponse {
    let pets = filter.into_inner().apply(data.dal.list_pets().await);
    HttpResponse::Ok().json(pets)
}

#[utoipa::path(
    post,
    path = "/api/v1/pets",
    request_body = NewPet,
    responses(
        (status = 201, description = "Pet created", body = CreatedResponse),
        (status = 400, description = "Invalid payload"),
        (status = 429, description = "Too many submissions"),
        (status = 503, description = "Backend not configured")
    )
)]
pub async fn create_pet(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<NewPet>,
) -> Result<HttpResponse, ApiError> {
    let pet = payload.into_inner();
    data.dal.admit_pet(&pet)?;
    check_quota(&data, &req, SubmissionKind::Pet)?;
    let id = data.dal.create_pet(pet).await?;
    Ok(HttpResponse::Created().json(CreatedResponse { id }))
}

#[utoipa::path(
    get,
    path = "/api/v1/campaigns",
    responses((status = 200, description = "Campaigns, most recent first", body = [Campaign]))
)]
pub async fn list_campaigns(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.dal.list_campaigns().await)
}

#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    request_body = NewCampaign,
    responses(
        (status = 201, description = "Campaign created", body = CreatedResponse),
        (status = 400, description = "Invalid payload"),
        (status = 503, description = "Backend not configured")
    )
)]
pub async fn create_campaign(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<NewCampaign>,
) -> Result<HttpResponse, ApiError> {
    let campaign = payload.into_inner();
    data.dal.admit_campaign(&campaign)?;
    check_quota(&data, &req, SubmissionKind::Campaign)?;
    let id = data.dal.create_campaign(campaign).await?;
    Ok(HttpResponse::Created().json(CreatedResponse { id }))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    responses((status = 200, description = "Reports, most recent first", body = [Report]))
)]
pub async fn list_reports(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.dal.list_reports().await)
}

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed", body = CreatedResponse),
        (status = 400, description = "Invalid payload"),
        (status = 503, description = "Backend not configured")
    )
)]
pub async fn create_report(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    let report = payload.into_inner();
    data.dal.admit_report(&report)?;
    check_quota(&data, &req, SubmissionKind::Report)?;
    let id = data.dal.create_report(report).await?;
    Ok(HttpResponse::Created().json(CreatedResponse { id }))
}

pub const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Pull the `file` field out of a multipart body, enforcing size and type.
async fn read_image(mut payload: Multipart) -> Result<ImageFile, ApiError> {
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest("malformed multipart body".into())
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let name = field
            .content_disposition()
            .get_filename()
            .unwrap_or("upload")
            .to_string();
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::BadRequest("malformed multipart body".into())
        })? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                return Err(ApiError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        let file = ImageFile { name, bytes };
        // the declared part type is not trusted
        match file.sniffed_type() {
            Some(mime) if ALLOWED_MIME.contains(&mime) => {}
            _ => return Err(ApiError::UnsupportedMediaType),
        }
        return Ok(file);
    }
    Err(ApiError::BadRequest("missing multipart field 'file'".into()))
}

async fn upload(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: Multipart,
    folder: ImageFolder,
) -> Result<HttpResponse, ApiError> {
    let file = read_image(payload).await?;
    data.dal.ensure(Backend::Blobs)?;
    check_quota(&data, &req, SubmissionKind::Image)?;
    let url = data.dal.upload_image(file, folder).await?;
    Ok(HttpResponse::Created().json(UploadResponse { url }))
}

#[utoipa::path(
    post,
    path = "/api/v1/images/pets",
    responses(
        (status = 201, description = "Image stored", body = UploadResponse),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Unsupported media type")
    )
)]
pub async fn upload_pet_image(req: HttpRequest, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    upload(req, data, payload, ImageFolder::Pets).await
}

#[utoipa::path(
    post,
    path = "/api/v1/images/campaigns",
    responses(
        (status = 201, description = "Image stored", body = UploadResponse),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Unsupported media type")
    )
)]
pub async fn upload_campaign_image(req: HttpRequest, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    upload(req, data, payload, ImageFolder::Campaigns).await
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses((status = 200, description = "Backend configuration state", body = StatusResponse))
)]
pub async fn status(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        configured: data.dal.is_ready(),
        missing: data.missing_config.iter().map(|k| k.name().to_string()).collect(),
    })
}
