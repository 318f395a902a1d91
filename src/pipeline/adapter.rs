use anyhow::Result;
use futures::future::BoxFuture;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Region, RegionSource};

/// General-object classes that plausibly carry a printed logo. Anything whose
/// label contains "sign" qualifies as well.
const LOGO_FRIENDLY_CLASSES: [&str; 52] = [
    "book",
    "tv",
    "laptop",
    "cell phone",
    "remote",
    "keyboard",
    "mouse",
    "toaster",
    "microwave",
    "oven",
    "broccoli",
    "clock",
    "stop sign",
    "traffic light",
    "tie",
    "sports ball",
    "skateboard",
    "suitcase",
    "handbag",
    "backpack",
    "wine glass",
    "bottle",
    "cup",
    "umbrella",
    "baseball bat",
    "baseball glove",
    "tennis racket",
    "surfboard",
    "truck",
    "bus",
    "car",
    "bench",
    "boat",
    "frisbee",
    "kite",
    "toothbrush",
    "hair drier",
    "scissors",
    "vase",
    "spoon",
    "fork",
    "knife",
    "sandwich",
    "donut",
    "pizza",
    "hot dog",
    "cake",
    "chair",
    "potted plant",
    "refrigerator",
    "sink",
    "bed",
];

fn class_is_logo_friendly(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    LOGO_FRIENDLY_CLASSES.contains(&name) || name.contains("sign")
}

/// One raw box from a pretrained general-object detector, before filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    /// `[x, y, w, h]` in image pixels.
    pub bbox: [f32; 4],
    pub score: f32,
    pub class: String,
}

/// Boundary to an external object-detection model. Implementations own model
/// loading and inference; the pipeline only consumes boxes.
pub trait ObjectDetector: Send + Sync {
    fn detect<'a>(&'a self, image: &'a RgbaImage) -> BoxFuture<'a, Result<Vec<RawDetection>>>;
}

/// Detector that never reports anything, for model-free runs and tests.
pub struct NullDetector;

impl ObjectDetector for NullDetector {
    fn detect<'a>(&'a self, _image: &'a RgbaImage) -> BoxFuture<'a, Result<Vec<RawDetection>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

/// Maps raw model detections into pipeline regions: logo-friendly classes
/// only, confidence and area-ratio gates, clamped to bounds, size floor.
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    min_score: f32,
    min_area_ratio: f32,
    max_area_ratio: f32,
    max_detections: usize,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionFilter {
    pub fn new() -> Self {
        Self {
            min_score: 0.45,
            min_area_ratio: 0.003,
            max_area_ratio: 0.45,
            max_detections: 12,
        }
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    pub fn filter(&self, raw: Vec<RawDetection>, image_width: u32, image_height: u32) -> Vec<Region> {
        let image_area = image_width as f32 * image_height as f32;
        if image_area == 0.0 {
            return Vec::new();
        }

        raw.into_iter()
            .filter(|d| d.score >= self.min_score && class_is_logo_friendly(&d.class))
            .filter(|d| {
                let ratio = (d.bbox[2] * d.bbox[3]) / image_area;
                ratio >= self.min_area_ratio && ratio <= self.max_area_ratio
            })
            .take(self.max_detections)
            .filter_map(|d| {
                let x = d.bbox[0].round().max(0.0) as u32;
                let y = d.bbox[1].round().max(0.0) as u32;
                let w = d.bbox[2].round().max(0.0) as u32;
                let h = d.bbox[3].round().max(0.0) as u32;
                Region::new(x, y, w, h, d.score, d.class, RegionSource::Ai)
                    .clamped(image_width, image_height)
            })
            .collect()
    }
}

/// Runs the external detector and filters its output. A failing detector
/// degrades to "no detections" rather than aborting the pass.
pub async fn detect_filtered(
    detector: &dyn ObjectDetector,
    image: &RgbaImage,
    filter: &DetectionFilter,
) -> Vec<Region> {
    match detector.detect(image).await {
        Ok(raw) => {
            let raw_count = raw.len();
            let regions = filter.filter(raw, image.width(), image.height());
            debug!("Model produced {} boxes, {} kept after filtering", raw_count, regions.len());
            regions
        }
        Err(e) => {
            warn!("Object detection failed, continuing without model regions: {}", e);
            Vec::new()
        }
    }
}
