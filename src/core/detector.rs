use crate::common::{Config, FacesError, Result};
use crate::common::config::DetectorConfig;
use crate::core::onnx::OnnxSession;
use crate::core::types::{BoundingBox, FacePatch, FaceProbability};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array3, Array4, CowArray};
use ort::Value;

const NMS_IOU_THRESHOLD: f32 = 0.45;
const MIN_FACE_SIDE: f32 = 10.0;

/// Detect and extract faces.
pub trait Detector {
    /// Bounding boxes whose face probability meets the detector's threshold.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<(BoundingBox, FaceProbability)>>;

    /// Bounding boxes together with the normalized face crop they enclose.
    fn extract(&self, image: &DynamicImage) -> Result<Vec<(BoundingBox, FacePatch)>>;
}

/// Crop `bbox` out of `image`, resize it to `size`² and standardize it into a
/// 3 x size x size patch with values around zero.
pub fn extract_patch(image: &DynamicImage, bbox: &BoundingBox, size: u32) -> FacePatch {
    let x = bbox.left().max(0.0) as u32;
    let y = bbox.top().max(0.0) as u32;
    let width = bbox.width().max(1.0) as u32;
    let height = bbox.height().max(1.0) as u32;

    let face = image
        .crop_imm(x, y, width, height)
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    let size = size as usize;
    let data = Array3::from_shape_fn((3, size, size), |(c, y, x)| {
        let pixel = face.get_pixel(x as u32, y as u32);
        (pixel[c] as f32 - 127.5) / 128.0
    });
    FacePatch::new(data)
}

/// Greedy non-maximum suppression; keeps the most confident of overlapping boxes.
pub fn non_maximum_suppression(
    mut boxes: Vec<(BoundingBox, FaceProbability)>,
    iou_threshold: f32,
) -> Vec<(BoundingBox, FaceProbability)> {
    boxes.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut keep: Vec<(BoundingBox, FaceProbability)> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|(kept, _)| kept.iou(&candidate.0) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// YOLO-style face detector run through ONNX Runtime.
pub struct OnnxDetector {
    onnx: OnnxSession,
    config: DetectorConfig,
}

impl OnnxDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let onnx = OnnxSession::load(
            "face_detector",
            &config.detector.model_path,
            config.performance.optimization_level,
        )?;
        Ok(Self {
            onnx,
            config: config.detector.clone(),
        })
    }

    fn image_to_array(&self, image: &DynamicImage) -> Array4<f32> {
        let rgb = image.to_rgb8();
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<(BoundingBox, FaceProbability)>> {
        let Some(first) = outputs.first() else {
            return Ok(Vec::new());
        };
        let output = first.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let values: Vec<f32> = output.iter().copied().collect();
        decode_detections(&shape, &values, &self.config)
    }
}

/// Turn raw detector predictions into boxes in detector input coordinates,
/// filtered by probability, suppressed and capped at `max_faces`.
fn decode_detections(
    shape: &[usize],
    values: &[f32],
    config: &DetectorConfig,
) -> Result<Vec<(BoundingBox, FaceProbability)>> {
    let mut faces = Vec::new();

    // [1, N, 5] or transposed [1, 5, N]
    let (num_predictions, prediction_length, is_transposed) = match shape {
        [_, a, b] if b > a && *a <= 10 => (*b, *a, true),
        [_, a, b] => (*a, *b, false),
        [a, b] => (*a, *b, false),
        _ => {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Ok(faces);
        }
    };
    if prediction_length < 5 {
        return Err(FacesError::Model(format!(
            "Detector predictions have {} values, expected at least 5", prediction_length
        )));
    }

    let input_width = config.input_width as f32;
    let input_height = config.input_height as f32;

    for i in 0..num_predictions {
        let at = |field: usize| {
            if is_transposed {
                values[field * num_predictions + i]
            } else {
                values[i * prediction_length + field]
            }
        };
        let (cx, cy, w, h, confidence) = (at(0), at(1), at(2), at(3), at(4));

        if confidence < config.probability_threshold {
            continue;
        }

        // normalized coordinates are scaled to the input size
        let (scale_x, scale_y) = if cx > 1.0 || cy > 1.0 || w > 1.0 || h > 1.0 {
            (1.0, 1.0)
        } else {
            (input_width, input_height)
        };
        let (cx, cy, w, h) = (cx * scale_x, cy * scale_y, w * scale_x, h * scale_y);

        let left = (cx - w / 2.0).max(0.0);
        let top = (cy - h / 2.0).max(0.0);
        let right = (cx + w / 2.0).min(input_width);
        let bottom = (cy + h / 2.0).min(input_height);

        if right - left > MIN_FACE_SIDE && bottom - top > MIN_FACE_SIDE {
            faces.push((BoundingBox::new(left, top, right, bottom)?, confidence));
        }
    }

    let mut faces = non_maximum_suppression(faces, NMS_IOU_THRESHOLD);
    faces.truncate(config.max_faces);
    Ok(faces)
}

impl Detector for OnnxDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<(BoundingBox, FaceProbability)>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.config.input_width
            && image.height() == self.config.input_height
        {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(
                self.config.input_width,
                self.config.input_height,
                FilterType::Nearest,
            );
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.onnx.session.allocator(), &cow_array)?;
        let outputs = self.onnx.session.run(vec![input_tensor])?;
        let faces = self.parse_detections(&outputs)?;

        // back to original image coordinates
        let scale_x = orig_width / self.config.input_width as f32;
        let scale_y = orig_height / self.config.input_height as f32;

        let faces = faces
            .into_iter()
            .map(|(bbox, probability)| -> Result<(BoundingBox, FaceProbability)> {
                let (left, top, right, bottom) = bbox.as_tuple();
                let scaled = BoundingBox::new(
                    left * scale_x,
                    top * scale_y,
                    right * scale_x,
                    bottom * scale_y,
                )?;
                Ok((scaled, probability))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Detected {} face(s)", faces.len());
        Ok(faces)
    }

    fn extract(&self, image: &DynamicImage) -> Result<Vec<(BoundingBox, FacePatch)>> {
        Ok(self
            .detect(image)?
            .into_iter()
            .map(|(bbox, _)| {
                let patch = extract_patch(image, &bbox, self.config.patch_size);
                (bbox, patch)
            })
            .collect())
    }
}
