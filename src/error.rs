use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::dal::DalError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Unavailable(String),
    #[error("{0}")] BadGateway(String),
    #[error("{0}")] GatewayTimeout(String),
    #[error("too many submissions; try again later")] TooManyRequests,
    #[error("file too large")] PayloadTooLarge,
    #[error("unsupported media type")] UnsupportedMediaType,
}

impl From<DalError> for ApiError {
    fn from(e: DalError) -> Self {
        let msg = e.to_string();
        match e {
            DalError::NotConfigured(_) => ApiError::Unavailable(msg),
            DalError::Invalid { .. } => ApiError::BadRequest(msg),
            DalError::Timeout(_) => ApiError::GatewayTimeout(msg),
            DalError::SaveFailed(_) | DalError::ListFailed(_) | DalError::UploadFailed(_) => {
                ApiError::BadGateway(msg)
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
