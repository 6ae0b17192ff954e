use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn success<T: Serialize>(message: impl Into<String>, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    with_status(StatusCode::OK, true, message, Some(data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    with_status(StatusCode::CREATED, true, message, Some(data))
}

/// A 200 whose body reports that nothing useful happened, e.g. no new content.
pub fn unsuccessful<T: Serialize>(message: impl Into<String>, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    with_status(StatusCode::OK, false, message, Some(data))
}

pub fn message(message: impl Into<String>) -> (StatusCode, Json<ApiResponse<()>>) {
    with_status(StatusCode::OK, true, message, None)
}

fn with_status<T: Serialize>(
    status: StatusCode,
    success: bool,
    message: impl Into<String>,
    data: Option<T>,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        status,
        Json(ApiResponse {
            success,
            message: message.into(),
            data,
        }),
    )
}
