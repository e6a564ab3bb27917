use crate::config::{Config, ImageCaptionConfig, ObjectDetectionConfig};
use ai::{AIModel, ImageCaptionModel, ObjectDetectionModel};
use std::{fmt, time::Duration};

/// Models shared by every request. Built once at startup.
#[derive(Clone)]
pub struct AIHandler {
    pub image_caption: ImageCaptionModel,
    pub object_detection: ObjectDetectionModel,
}

impl fmt::Debug for AIHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AIHandler")
            .field("image_caption", &self.image_caption.model_id())
            .field("object_detection", &self.object_detection.model_id())
            .finish()
    }
}

impl AIHandler {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            image_caption: Self::get_image_caption(
                &config.image_caption,
                config.offload_duration,
            )?,
            object_detection: Self::get_object_detection(
                &config.object_detection,
                config.offload_duration,
            )?,
        })
    }

    pub fn from_models(
        image_caption: ImageCaptionModel,
        object_detection: ObjectDetectionModel,
    ) -> Self {
        Self {
            image_caption,
            object_detection,
        }
    }

    fn get_image_caption(
        config: &ImageCaptionConfig,
        offload_duration: Option<Duration>,
    ) -> anyhow::Result<ImageCaptionModel> {
        match config.clone() {
            #[cfg(feature = "blip")]
            ImageCaptionConfig::Blip {
                model_path,
                tokenizer_path,
                model_type,
            } => {
                let model_type = match model_type {
                    crate::config::BlipModelType::Large => ai::blip::BLIPModel::Large,
                    crate::config::BlipModelType::Base => ai::blip::BLIPModel::Base,
                };
                AIModel::new(
                    "blip".into(),
                    move || {
                        let model_path = model_path.clone();
                        let tokenizer_path = tokenizer_path.clone();
                        async move { ai::blip::BLIP::new(model_path, tokenizer_path, model_type).await }
                    },
                    offload_duration,
                )
            }
            #[cfg(not(feature = "blip"))]
            ImageCaptionConfig::Blip { .. } => {
                anyhow::bail!(
                    "image caption model {} is not available, rebuild with the `blip` feature",
                    config.backend().as_ref()
                )
            }
            ImageCaptionConfig::OpenAI {
                base_url,
                api_key,
                model,
            } => AIModel::new(
                format!("openai-caption:{}", model),
                move || {
                    let client = ai::openai::OpenAICaption::new(&base_url, &api_key, &model);
                    async move { client }
                },
                offload_duration,
            ),
        }
    }

    #[cfg_attr(not(feature = "yolo"), allow(unused_variables))]
    fn get_object_detection(
        config: &ObjectDetectionConfig,
        offload_duration: Option<Duration>,
    ) -> anyhow::Result<ObjectDetectionModel> {
        match config.clone() {
            #[cfg(feature = "yolo")]
            ObjectDetectionConfig::Yolo {
                model_path,
                confidence_threshold,
                nms_threshold,
            } => AIModel::new(
                "yolo".into(),
                move || {
                    let model_path = model_path.clone();
                    async move {
                        ai::yolo::YOLO::new(model_path, confidence_threshold, nms_threshold).await
                    }
                },
                offload_duration,
            ),
            #[cfg(not(feature = "yolo"))]
            ObjectDetectionConfig::Yolo { .. } => {
                anyhow::bail!(
                    "object detection model {} is not available, rebuild with the `yolo` feature",
                    config.backend().as_ref()
                )
            }
        }
    }
}
