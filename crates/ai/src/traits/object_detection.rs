use super::AIModel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Box corners in pixels of the original image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

pub type ObjectDetectionInput = PathBuf;
pub type ObjectDetectionOutput = Vec<DetectedObject>;
pub type ObjectDetectionModel = AIModel<ObjectDetectionInput, ObjectDetectionOutput>;
