//! Stand-in models and context for tests, no checkpoints needed.

use crate::{ai::AIHandler, ctx::Ctx, upload::UPLOADS_DIR};
use ai::{AIModel, BoundingBox, DetectedObject, Model};
use anyhow::bail;
use std::path::{Path, PathBuf};
use storage::Storage;

pub const FAKE_LABEL: &str = "cat";

/// Captions every existing file as "a picture of <stem>". Files whose name
/// contains "corrupt" fail to decode.
pub struct FakeCaption;

impl Model for FakeCaption {
    type Item = PathBuf;
    type Output = String;

    fn batch_size_limit(&self) -> usize {
        1
    }

    async fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
        Ok(items
            .iter()
            .map(|path| -> anyhow::Result<String> {
                let name = check_image(path)?;
                let stem = path
                    .file_stem()
                    .map(|v| v.to_string_lossy().to_string())
                    .unwrap_or(name);
                Ok(format!("a picture of {}", stem))
            })
            .collect())
    }
}

/// Finds one cat in every existing file.
pub struct FakeDetector;

impl Model for FakeDetector {
    type Item = PathBuf;
    type Output = Vec<DetectedObject>;

    fn batch_size_limit(&self) -> usize {
        1
    }

    async fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
        Ok(items
            .iter()
            .map(|path| -> anyhow::Result<Vec<DetectedObject>> {
                check_image(path)?;
                Ok(vec![DetectedObject {
                    label: FAKE_LABEL.to_string(),
                    confidence: 0.9,
                    bbox: BoundingBox {
                        xmin: 1.0,
                        ymin: 2.0,
                        xmax: 30.0,
                        ymax: 40.0,
                    },
                }])
            })
            .collect())
    }
}

fn check_image(path: &Path) -> anyhow::Result<String> {
    if !path.is_file() {
        bail!("image not found: {}", path.display());
    }
    let name = path
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.contains("corrupt") {
        bail!("cannot decode image {}", name);
    }
    Ok(name)
}

pub fn fake_ai_handler() -> AIHandler {
    let image_caption = AIModel::new("fake-caption".into(), || async { Ok(FakeCaption) }, None)
        .expect("create fake caption model");
    let object_detection =
        AIModel::new("fake-detector".into(), || async { Ok(FakeDetector) }, None)
            .expect("create fake detection model");
    AIHandler::from_models(image_caption, object_detection)
}

/// Context over a fresh temp static root with `uploads/` created.
pub async fn test_ctx() -> (tempfile::TempDir, Ctx) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let storage = Storage::new_fs(dir.path()).expect("create storage");
    storage
        .create_dir(UPLOADS_DIR)
        .await
        .expect("create uploads dir");
    (dir, Ctx::new(storage, fake_ai_handler()))
}
