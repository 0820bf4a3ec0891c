use crate::error::{Error, ErrorKind};
use crate::log::SERVER;
use crate::prometheus::HTTP_ERRORS_TOTAL;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::counter;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

///
/// The `{ success, data?, message? }` envelope every endpoint answers with.
/// Extra top-level fields such as `pagination` sit next to `data`.
///
#[derive(Debug)]
pub struct ApiResponse {
    status: StatusCode,
    body: Map<String, Value>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(true));
        ApiResponse {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn data<T: Serialize>(data: &T) -> Result<Self, Error> {
        Self::ok().with("data", data)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.body
            .insert("message".to_string(), Value::String(message.into()));
        self
    }

    pub fn with<T: Serialize>(mut self, field: &str, value: &T) -> Result<Self, Error> {
        self.body
            .insert(field.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn created(mut self) -> Self {
        self.status = StatusCode::CREATED;
        self
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument | ErrorKind::InvalidState => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({
        "success": false,
        "message": message.into(),
    });
    (status, Json(body)).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        counter!(HTTP_ERRORS_TOTAL, "status" => status.as_u16().to_string()).increment(1);

        let message = match kind {
            ErrorKind::Internal => {
                error!(target: SERVER, msg = "Request failed", error = self.to_string());
                "Internal Server Error".to_string()
            }
            _ => {
                debug!(target: SERVER, msg = "Request rejected", status = status.as_u16(), error = self.to_string());
                self.to_string()
            }
        };

        failure(status, message)
    }
}
