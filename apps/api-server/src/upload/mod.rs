mod media;

pub use media::{is_video, VIDEO_EXTENSIONS};

use crate::ai::AIHandler;
use ai::DetectedObject;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use storage::{Storage, StorageError};
use thiserror::Error;

/// Directory under the static root that receives uploads.
pub const UPLOADS_DIR: &str = "uploads";
/// Url prefix the static root is served under.
pub const STATIC_URL_PREFIX: &str = "/static";

/// One file part of an upload request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Bytes,
}

#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub filename: String,
    /// storage key, `uploads/<filename>` after normalization
    pub key: String,
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub filename: String,
    /// url path under the static root, e.g. `/static/uploads/cat.jpg`
    pub filepath: String,
    pub is_video: bool,
    pub caption: Option<String>,
    pub objects: Option<Vec<DetectedObject>>,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to parse multipart body: {0}")]
    Multipart(String),

    #[error("no files in upload")]
    NoFiles,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0:#}")]
    Inference(anyhow::Error),
}

/// Url of a stored key under the static prefix.
pub fn static_url_path(key: &str) -> String {
    format!("{}/{}", STATIC_URL_PREFIX, key)
}

/// Write the file verbatim to `uploads/<filename>` under the storage root.
///
/// An existing file with the same name is replaced. The filename is appended
/// to the uploads dir as a string, so an absolute name still lands below it.
/// The returned path is the one the bytes were written to.
pub async fn store_upload(storage: &Storage, file: UploadedFile) -> Result<StoredMedia, StorageError> {
    let key = storage::normalize_key(&format!("{}/{}", UPLOADS_DIR, file.filename));
    storage.write(&key, file.content).await?;

    Ok(StoredMedia {
        path: storage.get_actual_path(&key),
        key,
        filename: file.filename,
    })
}

/// Store, classify and analyze every file of a batch, in order.
///
/// Any failure aborts the whole batch and the records computed so far are
/// dropped. Files already written are left on disk.
#[tracing::instrument(skip_all, fields(files = files.len()), err(Display))]
pub async fn process_batch(
    storage: &Storage,
    ai_handler: &AIHandler,
    files: Vec<UploadedFile>,
) -> Result<Vec<ResultRecord>, UploadError> {
    let mut records = Vec::with_capacity(files.len());

    for file in files {
        let stored = store_upload(storage, file).await?;
        let record = analyze(ai_handler, stored).await?;
        records.push(record);
    }

    Ok(records)
}

#[tracing::instrument(skip(ai_handler, media), fields(filename = %media.filename))]
async fn analyze(ai_handler: &AIHandler, media: StoredMedia) -> Result<ResultRecord, UploadError> {
    let is_video = is_video(&media.filename);

    let (caption, objects) = if is_video {
        tracing::debug!("video upload, skip caption and detection");
        (None, None)
    } else {
        let caption = ai_handler
            .image_caption
            .process_single(media.path.clone())
            .await
            .map_err(UploadError::Inference)?;
        let objects = ai_handler
            .object_detection
            .process_single(media.path.clone())
            .await
            .map_err(UploadError::Inference)?;
        tracing::info!(caption = %caption, objects = objects.len(), "image analyzed");
        (Some(caption), Some(objects))
    };

    Ok(ResultRecord {
        filepath: static_url_path(&media.key),
        filename: media.filename,
        is_video,
        caption,
        objects,
    })
}
