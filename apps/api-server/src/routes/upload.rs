use crate::{
    ctx::Ctx,
    upload::{self, ResultRecord, UploadError, UploadedFile},
};
use axum::{
    extract::{Multipart, State},
    Json,
};

/// `POST /upload`: every multipart part carrying a filename is a file of the
/// batch, whatever its field name. Other parts are ignored.
pub async fn upload_files(
    State(ctx): State<Ctx>,
    mut multipart: Multipart,
) -> Result<Json<Vec<ResultRecord>>, UploadError> {
    let mut files = vec![];

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        let filename = match field.file_name() {
            Some(filename) if !filename.is_empty() => filename.to_string(),
            _ => {
                tracing::debug!(field = ?field.name(), "skip non-file field");
                continue;
            }
        };

        let content = field
            .bytes()
            .await
            .map_err(|e| UploadError::Multipart(e.to_string()))?;

        tracing::debug!(filename = %filename, size = content.len(), "received file");
        files.push(UploadedFile { filename, content });
    }

    if files.is_empty() {
        return Err(UploadError::NoFiles);
    }

    let records = upload::process_batch(ctx.storage(), ctx.ai_handler(), files).await?;

    Ok(Json(records))
}
