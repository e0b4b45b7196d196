//! JSON shapes returned to callers

use crate::error::ServiceError;
use crate::proxy::{GeoLocation, ProxyRecord};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Country code reported when geolocation is unavailable
const UNKNOWN_COUNTRY_CODE: &str = "--";
const UNKNOWN_COUNTRY_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryResponse {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoResponse {
    pub country: CountryResponse,
    pub city: Option<String>,
    pub continent: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

impl From<GeoLocation> for GeoResponse {
    fn from(geo: GeoLocation) -> Self {
        Self {
            country: CountryResponse {
                code: geo
                    .country_code
                    .unwrap_or_else(|| UNKNOWN_COUNTRY_CODE.to_string()),
                name: geo
                    .country_name
                    .unwrap_or_else(|| UNKNOWN_COUNTRY_NAME.to_string()),
            },
            city: geo.city_name,
            continent: geo.continent_code,
            latitude: geo.latitude,
            longitude: geo.longitude,
            timezone: geo.timezone,
        }
    }
}

/// One proxy as serialized on the wire; protocol types are flattened to names
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyResponse {
    pub host: String,
    pub port: u16,
    pub types: Vec<String>,
    pub geo: GeoResponse,
    pub is_working: Option<bool>,
    pub avg_resp_time: Option<f64>,
    pub error_rate: Option<f64>,
}

impl From<ProxyRecord> for ProxyResponse {
    fn from(record: ProxyRecord) -> Self {
        let types = record.type_names();
        Self {
            host: record.host,
            port: record.port,
            types,
            geo: record.geo.into(),
            is_working: record.metrics.map(|m| m.is_working),
            avg_resp_time: record.metrics.map(|m| m.avg_resp_time),
            error_rate: record.metrics.map(|m| m.error_rate),
        }
    }
}

/// Error body: `{"error": CODE, "detail": message}`
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

/// Adapter turning a [`ServiceError`] into an HTTP response
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

/// Unreadable request bodies are reported like any other bad filter
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServiceError::InvalidFilter(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ServiceError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::DiscoveryFailed(_) => StatusCode::BAD_GATEWAY,
            ServiceError::AlreadyInitialized => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.code(),
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
