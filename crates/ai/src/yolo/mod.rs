use crate::ort::{load_session, SessionOptions};
use crate::traits::{BoundingBox, DetectedObject, ObjectDetectionInput, ObjectDetectionOutput};
use crate::Model;
use anyhow::{anyhow, bail};
use candle_transformers::object_detection::{non_maximum_suppression, Bbox, KeyPoint};
use image::GenericImageView;
use ndarray::{s, Array3, ArrayView2, Axis, Ix3};
use ort::Session;
use std::path::Path;

mod coco_classes;

const INPUT_SIZE: usize = 640;

pub struct YOLO {
    model: Session,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl Model for YOLO {
    type Item = ObjectDetectionInput;
    type Output = ObjectDetectionOutput;

    fn batch_size_limit(&self) -> usize {
        1
    }

    async fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
        if items.len() > self.batch_size_limit() {
            bail!("too many items");
        }

        let mut results = vec![];

        for item in items {
            results.push(self.detect(&item));
        }

        Ok(results)
    }
}

impl YOLO {
    pub async fn new(
        model_path: impl AsRef<Path>,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> anyhow::Result<Self> {
        let model = load_session(model_path, SessionOptions::default())?;

        Ok(Self {
            model,
            confidence_threshold,
            nms_threshold,
        })
    }

    pub fn detect(&self, image_path: impl AsRef<Path>) -> anyhow::Result<Vec<DetectedObject>> {
        tracing::debug!("detecting objects in image: {}", image_path.as_ref().display());
        // refer the pipeline to candle:
        // https://github.com/huggingface/candle/blob/main/candle-examples/examples/yolo-v8/main.rs
        // the only exception is that here we use onnx to inference
        // but preprocessing of input image and postprocessing(NMS) is the same
        let original_image = image::open(image_path)?;
        let (original_width, original_height) = original_image.dimensions();
        let (width, height) = model_input_size(original_width as usize, original_height as usize);
        let img = original_image.resize_exact(
            width as u32,
            height as u32,
            image::imageops::FilterType::CatmullRom,
        );

        let mut array = Array3::zeros((3, img.height() as usize, img.width() as usize));
        for i in 0..img.width() {
            for j in 0..img.height() {
                let p = img.get_pixel(i, j);

                array[[0, j as usize, i as usize]] = p[0] as f32 / 255.0;
                array[[1, j as usize, i as usize]] = p[1] as f32 / 255.0;
                array[[2, j as usize, i as usize]] = p[2] as f32 / 255.0;
            }
        }
        let array = array.insert_axis(Axis(0));
        let outputs = self.model.run(ort::inputs!["images" => array.view()]?)?;

        let output = outputs
            .get("output0")
            .ok_or(anyhow!("output not found"))?
            .try_extract_tensor::<f32>()?
            .to_owned();

        // here output is in shape (batch_size, 4 + category_num, anchor_num)
        let output = output.into_dimensionality::<Ix3>()?;
        let output = output.slice(s![0, .., ..]);

        let scale = (
            original_width as f32 / width as f32,
            original_height as f32 / height as f32,
        );

        Ok(postprocess(
            output,
            self.confidence_threshold,
            self.nms_threshold,
            scale,
        ))
    }
}

/// Resize target keeping the aspect ratio, longest side 640, both sides
/// divisible by 32 and at least 32.
fn model_input_size(w: usize, h: usize) -> (usize, usize) {
    let align = |v: usize| (v / 32 * 32).max(32);
    if w < h {
        (align(w * INPUT_SIZE / h), INPUT_SIZE)
    } else {
        (INPUT_SIZE, align(h * INPUT_SIZE / w.max(1)))
    }
}

/// Turn raw predictions of shape `(4 + category_num, anchor_num)` into
/// detections: threshold by confidence, run per-class NMS, then scale boxes
/// back to the original image.
fn postprocess(
    pred: ArrayView2<f32>,
    confidence_threshold: f32,
    nms_threshold: f32,
    scale: (f32, f32),
) -> Vec<DetectedObject> {
    let (pred_size, npreds) = pred.dim();
    if pred_size <= 4 {
        return vec![];
    }
    let nclasses = pred_size - 4;
    let mut bboxes: Vec<Vec<Bbox<Vec<KeyPoint>>>> = (0..nclasses).map(|_| vec![]).collect();

    // Extract the bounding boxes for which confidence is above the threshold.
    for index in 0..npreds {
        let pred = pred.column(index);
        let (class_index, confidence) = pred
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        if confidence > confidence_threshold {
            let bbox = Bbox {
                xmin: pred[0] - pred[2] / 2.,
                ymin: pred[1] - pred[3] / 2.,
                xmax: pred[0] + pred[2] / 2.,
                ymax: pred[1] + pred[3] / 2.,
                confidence,
                data: vec![],
            };
            bboxes[class_index].push(bbox)
        }
    }

    non_maximum_suppression(&mut bboxes, nms_threshold);

    let mut results = vec![];

    bboxes
        .iter()
        .enumerate()
        .for_each(|(class_index, boxes_list)| {
            boxes_list.iter().for_each(|bbox| {
                let label = coco_classes::NAMES
                    .get(class_index)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| format!("class_{}", class_index));
                results.push(DetectedObject {
                    label,
                    confidence: bbox.confidence,
                    bbox: BoundingBox {
                        xmin: bbox.xmin * scale.0,
                        ymin: bbox.ymin * scale.1,
                        xmax: bbox.xmax * scale.0,
                        ymax: bbox.ymax * scale.1,
                    },
                })
            })
        });

    results
}
