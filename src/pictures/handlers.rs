use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{instrument, warn};

use super::dto::{PictureResponse, RemovePictureRequest};
use super::services::{self, too_large, UploadItem};
use crate::{
    accounts::{dto::OkResponse, handlers::json_body},
    error::AppError,
    state::AppState,
};

/// Room for multipart framing and the `username` field on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn picture_routes(max_picture_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/upload-picture", post(upload_picture))
        .layer(DefaultBodyLimit::max(max_picture_bytes + MULTIPART_OVERHEAD))
        .route("/api/remove-picture", post(remove_picture))
}

/// POST /api/upload-picture (multipart)
/// Fields: `username` (text) and `picture` (file).
#[instrument(skip(state, mp))]
pub async fn upload_picture(
    State(state): State<AppState>,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<PictureResponse>, AppError> {
    let mp = mp.map_err(|e| {
        warn!(error = %e, "upload without multipart body");
        AppError::validation("No file uploaded")
    })?;
    let (username, file) = read_upload(mp).await?;
    let picture_url = services::upload_picture(&state, username, file).await?;
    Ok(Json(PictureResponse {
        success: true,
        picture_url,
    }))
}

#[instrument(skip(state, payload))]
pub async fn remove_picture(
    State(state): State<AppState>,
    payload: Result<Json<RemovePictureRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, AppError> {
    let req = json_body(payload)?;
    services::remove_picture(&state, req.username).await?;
    Ok(Json(OkResponse::ok()))
}

async fn read_upload(mut mp: Multipart) -> Result<(Option<String>, Option<UploadItem>), AppError> {
    let mut username = None;
    let mut file = None;
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("username") => username = Some(field.text().await.map_err(multipart_error)?),
            Some("picture") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let file_name = field.file_name().map(|s| s.to_string());
                let body = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadItem {
                    body,
                    content_type,
                    file_name,
                });
            }
            _ => {}
        }
    }
    Ok((username, file))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    warn!(error = %e, "malformed multipart body");
    AppError::validation("Invalid upload")
}
