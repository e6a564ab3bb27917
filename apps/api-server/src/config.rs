use anyhow::{anyhow, Context};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use strum_macros::{AsRefStr, EnumString};

pub const DEFAULT_LISTEN_ADDR: &str = "[::]:3001";
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 256 * 1024 * 1024;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum ImageCaptionBackend {
    Blip,
    OpenAI,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum ObjectDetectionBackend {
    Yolo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum BlipModelType {
    Base,
    Large,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageCaptionConfig {
    Blip {
        model_path: PathBuf,
        tokenizer_path: PathBuf,
        model_type: BlipModelType,
    },
    OpenAI {
        base_url: String,
        api_key: String,
        model: String,
    },
}

impl ImageCaptionConfig {
    pub fn backend(&self) -> ImageCaptionBackend {
        match self {
            ImageCaptionConfig::Blip { .. } => ImageCaptionBackend::Blip,
            ImageCaptionConfig::OpenAI { .. } => ImageCaptionBackend::OpenAI,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectDetectionConfig {
    Yolo {
        model_path: PathBuf,
        confidence_threshold: f32,
        nms_threshold: f32,
    },
}

impl ObjectDetectionConfig {
    pub fn backend(&self) -> ObjectDetectionBackend {
        match self {
            ObjectDetectionConfig::Yolo { .. } => ObjectDetectionBackend::Yolo,
        }
    }
}

/// Server settings, read from the environment (and `.env`) at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub local_data_root: PathBuf,
    pub resources_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub listen_addr: SocketAddr,
    pub max_upload_size: usize,
    pub image_caption: ImageCaptionConfig,
    pub object_detection: ObjectDetectionConfig,
    /// `None` keeps models resident for the whole process lifetime.
    pub offload_duration: Option<Duration>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let local_data_root = var("LOCAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let resources_dir = var("LOCAL_RESOURCES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| local_data_root.join("resources"));
        let log_dir = var("LOCAL_LOG_DIR").map(PathBuf::from);

        let listen_addr = var("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = SocketAddr::from_str(&listen_addr)
            .with_context(|| format!("invalid LISTEN_ADDR '{}'", listen_addr))?;

        let max_upload_size = parse_var(&var, "MAX_UPLOAD_SIZE")?.unwrap_or(DEFAULT_MAX_UPLOAD_SIZE);

        let offload_duration =
            parse_var::<u64>(&var, "MODEL_OFFLOAD_SECS")?.map(Duration::from_secs);

        let caption_backend = parse_var(&var, "IMAGE_CAPTION_MODEL")?
            .unwrap_or(ImageCaptionBackend::Blip);
        let image_caption = match caption_backend {
            ImageCaptionBackend::Blip => ImageCaptionConfig::Blip {
                model_path: resources_dir.join(
                    var("BLIP_MODEL_PATH")
                        .unwrap_or_else(|| "blip/blip-image-captioning-base-q4k.gguf".into()),
                ),
                tokenizer_path: resources_dir.join(
                    var("BLIP_TOKENIZER_PATH").unwrap_or_else(|| "blip/tokenizer.json".into()),
                ),
                model_type: parse_var(&var, "BLIP_MODEL_TYPE")?.unwrap_or(BlipModelType::Base),
            },
            ImageCaptionBackend::OpenAI => ImageCaptionConfig::OpenAI {
                base_url: var("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                api_key: var("OPENAI_API_KEY")
                    .ok_or(anyhow!("OPENAI_API_KEY is required for IMAGE_CAPTION_MODEL=openai"))?,
                model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
        };

        let detection_backend = parse_var(&var, "OBJECT_DETECTION_MODEL")?
            .unwrap_or(ObjectDetectionBackend::Yolo);
        let object_detection = match detection_backend {
            ObjectDetectionBackend::Yolo => ObjectDetectionConfig::Yolo {
                model_path: resources_dir
                    .join(var("YOLO_MODEL_PATH").unwrap_or_else(|| "yolo/yolov8n.onnx".into())),
                confidence_threshold: parse_var(&var, "YOLO_CONFIDENCE_THRESHOLD")?.unwrap_or(0.5),
                nms_threshold: parse_var(&var, "YOLO_NMS_THRESHOLD")?.unwrap_or(0.45),
            },
        };

        Ok(Self {
            local_data_root,
            resources_dir,
            log_dir,
            listen_addr,
            max_upload_size,
            image_caption,
            object_detection,
            offload_duration,
        })
    }

    /// Directory served under `/static`, uploads go into its `uploads/`.
    pub fn static_dir(&self) -> PathBuf {
        self.local_data_root.join("static")
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {} '{}': {}", key, value, e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.local_data_root, PathBuf::from("."));
        assert_eq!(config.static_dir(), PathBuf::from("./static"));
        assert_eq!(config.resources_dir, PathBuf::from("./resources"));
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR.parse().unwrap());
        assert_eq!(config.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
        assert_eq!(config.offload_duration, None);
        assert_eq!(config.image_caption.backend(), ImageCaptionBackend::Blip);
        assert_eq!(
            config.object_detection,
            ObjectDetectionConfig::Yolo {
                model_path: PathBuf::from("./resources/yolo/yolov8n.onnx"),
                confidence_threshold: 0.5,
                nms_threshold: 0.45,
            }
        );
    }

    #[test]
    fn test_openai_caption_backend() {
        let config = config_from(&[
            ("IMAGE_CAPTION_MODEL", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
            ("MODEL_OFFLOAD_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(
            config.image_caption,
            ImageCaptionConfig::OpenAI {
                base_url: DEFAULT_OPENAI_BASE_URL.into(),
                api_key: "sk-test".into(),
                model: DEFAULT_OPENAI_MODEL.into(),
            }
        );
        assert_eq!(config.offload_duration, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_openai_requires_api_key() {
        let err = config_from(&[("IMAGE_CAPTION_MODEL", "openai")]).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("IMAGE_CAPTION_MODEL", "gpt")]).is_err());
        assert!(config_from(&[("MAX_UPLOAD_SIZE", "lots")]).is_err());
        assert!(config_from(&[("LISTEN_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn test_blip_paths_are_relative_to_resources() {
        let config = config_from(&[
            ("LOCAL_RESOURCES_DIR", "/models"),
            ("BLIP_MODEL_TYPE", "large"),
            ("BLIP_MODEL_PATH", "blip-large.gguf"),
        ])
        .unwrap();

        assert_eq!(
            config.image_caption,
            ImageCaptionConfig::Blip {
                model_path: PathBuf::from("/models/blip-large.gguf"),
                tokenizer_path: PathBuf::from("/models/blip/tokenizer.json"),
                model_type: BlipModelType::Large,
            }
        );
    }
}
