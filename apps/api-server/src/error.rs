use crate::upload::UploadError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

impl UploadError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::Multipart(_) | UploadError::NoFiles => StatusCode::BAD_REQUEST,
            UploadError::Storage(_) | UploadError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.to_string();
        if status.is_server_error() {
            tracing::error!(%status, "upload failed: {}", detail);
        } else {
            tracing::warn!(%status, "upload rejected: {}", detail);
        }

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
