pub mod adapter;
pub mod merge;
pub mod ocr;
pub mod preprocess;
pub mod proposal;
pub mod similarity;
pub mod text;

use anyhow::{bail, Result};
use chrono::Utc;
use image::{imageops, DynamicImage, RgbaImage};
use std::cmp::Ordering;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{
    Detection, DetectionReport, ProposalStats, RankedMatch, Region, SimilarityScore,
};
use adapter::{DetectionFilter, ObjectDetector};
use ocr::OcrEngine;
use proposal::WindowProposer;
use similarity::{HttpReferenceLoader, ReferenceLoader, SimilarityError};

/// Edge score above which a region is kept even without readable text.
const KEEP_EDGE_SCORE: f32 = 0.40;
/// Relaxed score floors for wide and ultra-wide text logos, which carry
/// little edge density but usually produce OCR output.
const WIDE_ASPECT: f32 = 2.5;
const WIDE_KEEP_SCORE: f32 = 0.10;
const ULTRA_WIDE_ASPECT: f32 = 4.0;
const ULTRA_WIDE_KEEP_SCORE: f32 = 0.07;

/// One detection session: owns the heuristic proposer plus the injected
/// external boundaries. Construct per pass; nothing is shared across passes.
pub struct LogoPipeline {
    config: Config,
    proposer: WindowProposer,
    detection_filter: DetectionFilter,
    object_detector: Option<Box<dyn ObjectDetector>>,
    ocr_engine: Option<Box<dyn OcrEngine>>,
    reference_loader: Box<dyn ReferenceLoader>,
}

impl LogoPipeline {
    pub fn new(config: Config) -> Self {
        let proposer = WindowProposer::new().with_max_windows(config.proposal.max_windows);
        let detection_filter = DetectionFilter::new()
            .with_min_score(config.detector.min_score)
            .with_max_detections(config.detector.max_detections);
        Self {
            config,
            proposer,
            detection_filter,
            object_detector: None,
            ocr_engine: None,
            reference_loader: Box::new(HttpReferenceLoader),
        }
    }

    pub fn with_object_detector(mut self, detector: Box<dyn ObjectDetector>) -> Self {
        self.object_detector = Some(detector);
        self
    }

    pub fn with_ocr_engine(mut self, engine: Box<dyn OcrEngine>) -> Self {
        self.ocr_engine = Some(engine);
        self
    }

    pub fn with_reference_loader(mut self, loader: Box<dyn ReferenceLoader>) -> Self {
        self.reference_loader = loader;
        self
    }

    /// Suggestion pass with the configured region cap.
    pub async fn suggest(&self, image: &RgbaImage) -> Result<(Vec<Region>, ProposalStats)> {
        self.suggest_regions(image, self.config.proposal.max_suggestions)
            .await
    }

    /// Fast proposal pass: heuristic windows fused with filtered model boxes,
    /// deduplicated and capped at `max` regions.
    pub async fn suggest_regions(
        &self,
        image: &RgbaImage,
        max: usize,
    ) -> Result<(Vec<Region>, ProposalStats)> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            bail!("cannot propose regions on an empty image");
        }

        let mut heuristic = self.propose_heuristic(image);
        heuristic.truncate(max * 2);
        let ai = self.detect_model_regions(image, max * 2).await;

        let stats = ProposalStats {
            heuristic_count: heuristic.len(),
            ai_count: ai.len(),
        };
        info!(
            "Suggesting regions: {} heuristic, {} from model",
            stats.heuristic_count, stats.ai_count
        );

        let mut fused = merge::fuse(
            heuristic,
            ai,
            self.config.fusion.suggest_nms_iou,
            width,
            height,
        );
        fused.truncate(max);
        Ok((fused, stats))
    }

    /// Full detection pass: propose, read text out of every candidate, keep
    /// the plausible ones, suppress overlaps, clamp.
    pub async fn detect(&self, image: &RgbaImage) -> Result<DetectionReport> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            bail!("cannot run detection on an empty image");
        }

        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting detection session {} on {}x{} image", session_id, width, height);

        let heuristic = self.propose_heuristic(image);
        let ai = self
            .detect_model_regions(image, self.config.detector.max_detections)
            .await;
        let stats = ProposalStats {
            heuristic_count: heuristic.len(),
            ai_count: ai.len(),
        };

        let mut candidates: Vec<Detection> = Vec::new();
        for region in heuristic.into_iter().chain(ai) {
            let patch = crop_patch(image, &region);
            let ocr_text = self.recognize_text(&patch).await;
            let brand_token = text::normalize_brand_word(&ocr_text);

            if !self.keep_candidate(&region, brand_token.is_some()) {
                debug!(
                    "Rejected region at ({}, {}) {}x{}: score {:.3}, text {:?}",
                    region.x, region.y, region.w, region.h, region.score, brand_token
                );
                continue;
            }

            candidates.push(Detection {
                region,
                ocr_text,
                brand_token,
            });
        }

        let kept = merge::nms_by(candidates, self.config.fusion.detect_nms_iou, |d| &d.region);
        let detections: Vec<Detection> = kept
            .into_iter()
            .filter_map(|mut d| {
                let clamped = d.region.clamped(width, height)?;
                d.region = clamped;
                Some(d)
            })
            .collect();

        info!(
            "Session {} finished: {} detections ({} heuristic, {} model candidates)",
            session_id,
            detections.len(),
            stats.heuristic_count,
            stats.ai_count
        );

        Ok(DetectionReport {
            session_id,
            started_at,
            image_width: width,
            image_height: height,
            detections,
            stats,
        })
    }

    /// Scores a region patch against one reference image. Load failures
    /// propagate; there is nothing sensible to substitute.
    pub async fn score_against(
        &self,
        patch: &RgbaImage,
        reference_url: &str,
    ) -> Result<SimilarityScore, SimilarityError> {
        let reference = self.reference_loader.load(reference_url).await?;
        if reference.width() == 0 || reference.height() == 0 {
            return Err(SimilarityError::EmptyImage);
        }
        Ok(similarity::score(patch, &reference))
    }

    /// Scores a patch against every candidate reference concurrently and
    /// returns the successful comparisons ranked by total score. Individual
    /// load failures are logged and skipped.
    pub async fn score_candidates(&self, patch: &RgbaImage, urls: &[String]) -> Vec<RankedMatch> {
        let comparisons = urls.iter().enumerate().map(|(index, url)| async move {
            (index, url.clone(), self.score_against(patch, url).await)
        });
        let results = futures::future::join_all(comparisons).await;

        let mut ranked: Vec<RankedMatch> = results
            .into_iter()
            .filter_map(|(index, url, result)| match result {
                Ok(score) => Some(RankedMatch { index, url, score }),
                Err(e) => {
                    warn!("Similarity scoring failed for {}: {}", url, e);
                    None
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total
                .partial_cmp(&a.score.total)
                .unwrap_or(Ordering::Equal)
        });
        ranked
    }

    fn propose_heuristic(&self, image: &RgbaImage) -> Vec<Region> {
        let gray = preprocess::to_grayscale(image);
        let edges = preprocess::edge_map(&gray);
        let color_variance = preprocess::color_variance_map(image);
        self.proposer.propose(&edges, &color_variance)
    }

    async fn detect_model_regions(&self, image: &RgbaImage, cap: usize) -> Vec<Region> {
        let Some(detector) = &self.object_detector else {
            return Vec::new();
        };
        // The suggestion pass asks for more boxes than the full-detection
        // default, so the cap is applied per call.
        let filter = self.detection_filter.clone().with_max_detections(cap);
        adapter::detect_filtered(detector.as_ref(), image, &filter).await
    }

    async fn recognize_text(&self, patch: &RgbaImage) -> String {
        let Some(engine) = &self.ocr_engine else {
            return String::new();
        };
        let prepared = DynamicImage::ImageLuma8(ocr::preprocess_for_ocr(patch)).to_rgba8();
        match engine.recognize(&prepared).await {
            Ok(raw) => raw.trim().to_string(),
            Err(e) => {
                warn!("OCR failed, treating region as textless: {}", e);
                String::new()
            }
        }
    }

    /// A candidate survives when it reads as text, or shows strong edges, or
    /// is a wide text-logo shape with readable text and a relaxed score.
    fn keep_candidate(&self, region: &Region, has_text: bool) -> bool {
        let high_edge = region.score > KEEP_EDGE_SCORE;
        let aspect = region.aspect_ratio();
        let ultra_wide_keep =
            aspect > ULTRA_WIDE_ASPECT && has_text && region.score > ULTRA_WIDE_KEEP_SCORE;
        let wide_keep = aspect > WIDE_ASPECT
            && aspect <= ULTRA_WIDE_ASPECT
            && has_text
            && region.score > WIDE_KEEP_SCORE;

        has_text || high_edge || ultra_wide_keep || wide_keep
    }
}

fn crop_patch(image: &RgbaImage, region: &Region) -> RgbaImage {
    imageops::crop_imm(image, region.x, region.y, region.w, region.h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrandToken, RegionSource};
    use adapter::RawDetection;
    use futures::future::BoxFuture;
    use image::Rgba;

    struct FixedDetector {
        boxes: Vec<RawDetection>,
    }

    impl ObjectDetector for FixedDetector {
        fn detect<'a>(&'a self, _image: &'a RgbaImage) -> BoxFuture<'a, Result<Vec<RawDetection>>> {
            let boxes = self.boxes.clone();
            Box::pin(async move { Ok(boxes) })
        }
    }

    struct FixedOcr {
        text: String,
    }

    impl OcrEngine for FixedOcr {
        fn recognize<'a>(&'a self, _image: &'a RgbaImage) -> BoxFuture<'a, Result<String>> {
            let text = self.text.clone();
            Box::pin(async move { Ok(text) })
        }
    }

    struct FailingOcr;

    impl OcrEngine for FailingOcr {
        fn recognize<'a>(&'a self, _image: &'a RgbaImage) -> BoxFuture<'a, Result<String>> {
            Box::pin(async { Err(anyhow::anyhow!("ocr worker crashed")) })
        }
    }

    struct StubLoader {
        images: Vec<(String, RgbaImage)>,
    }

    impl ReferenceLoader for StubLoader {
        fn load<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RgbaImage, SimilarityError>> {
            Box::pin(async move {
                self.images
                    .iter()
                    .find(|(known, _)| known == url)
                    .map(|(_, img)| img.clone())
                    .ok_or_else(|| SimilarityError::Fetch {
                        url: url.to_string(),
                        message: "unreachable".to_string(),
                    })
            })
        }
    }

    /// Midgray canvas with a striped 100x40 block at (200, 100), the same
    /// texture the proposer tests use.
    fn logo_image() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(512, 512, Rgba([128, 128, 128, 255]));
        for y in 100..140 {
            for x in (200..224).chain(276..300) {
                let v = if (x / 2) % 2 == 0 { 255 } else { 0 };
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        img
    }

    #[tokio::test]
    async fn detect_rejects_empty_image() {
        let pipeline = LogoPipeline::new(Config::default());
        let empty = RgbaImage::new(0, 0);
        assert!(pipeline.detect(&empty).await.is_err());
        assert!(pipeline.suggest_regions(&empty, 10).await.is_err());
    }

    #[tokio::test]
    async fn detect_with_ocr_extracts_brand_token() {
        let pipeline = LogoPipeline::new(Config::default()).with_ocr_engine(Box::new(FixedOcr {
            text: "Nike Inc".to_string(),
        }));

        let report = pipeline.detect(&logo_image()).await.unwrap();
        assert!(!report.detections.is_empty());
        assert!(report
            .detections
            .iter()
            .all(|d| d.brand_token.as_ref().map(BrandToken::as_str) == Some("nike")));
        assert!(report.stats.heuristic_count > 0);
        assert_eq!(report.stats.ai_count, 0);

        for d in &report.detections {
            assert!(d.region.right() <= 512);
            assert!(d.region.bottom() <= 512);
            assert!(d.region.w >= 24 && d.region.h >= 24);
        }
    }

    #[tokio::test]
    async fn failing_ocr_degrades_to_edge_only_keep() {
        let pipeline = LogoPipeline::new(Config::default()).with_ocr_engine(Box::new(FailingOcr));
        let report = pipeline.detect(&logo_image()).await.unwrap();
        // Without text only strong-edge regions survive, and none abort.
        for d in &report.detections {
            assert!(d.region.score > KEEP_EDGE_SCORE);
            assert!(d.ocr_text.is_empty());
            assert!(d.brand_token.is_none());
        }
    }

    #[tokio::test]
    async fn suggest_fuses_model_and_heuristic_boxes() {
        let detector = FixedDetector {
            boxes: vec![RawDetection {
                bbox: [40.0, 350.0, 120.0, 90.0],
                score: 0.8,
                class: "book".to_string(),
            }],
        };
        let pipeline =
            LogoPipeline::new(Config::default()).with_object_detector(Box::new(detector));

        let (regions, stats) = pipeline.suggest(&logo_image()).await.unwrap();
        assert_eq!(stats.ai_count, 1);
        assert!(stats.heuristic_count > 0);
        assert!(regions.len() <= 10);
        assert!(regions.iter().any(|r| r.source == RegionSource::Ai));
        assert!(regions.iter().any(|r| r.source == RegionSource::Heuristic));
    }

    #[tokio::test]
    async fn suggestion_pass_accepts_more_model_boxes_than_detection() {
        let boxes: Vec<RawDetection> = (0..18)
            .map(|i| RawDetection {
                bbox: [(i % 6) as f32 * 160.0, (i / 6) as f32 * 160.0, 100.0, 100.0],
                score: 0.9,
                class: "book".to_string(),
            })
            .collect();
        let pipeline = LogoPipeline::new(Config::default())
            .with_object_detector(Box::new(FixedDetector { boxes }));
        let image = RgbaImage::from_pixel(1024, 1024, Rgba([128, 128, 128, 255]));

        // Suggestion asks for 2 * max boxes, well above the detection default.
        let (_, stats) = pipeline.suggest_regions(&image, 10).await.unwrap();
        assert_eq!(stats.ai_count, 18);

        // The full pass keeps the configured detection cap.
        let report = pipeline.detect(&image).await.unwrap();
        assert_eq!(report.stats.ai_count, 12);
    }

    #[tokio::test]
    async fn suggested_pairs_respect_fusion_threshold() {
        let pipeline = LogoPipeline::new(Config::default());
        let (regions, _) = pipeline.suggest_regions(&logo_image(), 10).await.unwrap();
        for (i, a) in regions.iter().enumerate() {
            for b in regions.iter().skip(i + 1) {
                assert!(merge::iou(a, b) <= 0.35);
            }
        }
    }

    #[tokio::test]
    async fn score_candidates_ranks_and_skips_failures() {
        let patch = logo_image();
        let mut halves = RgbaImage::from_pixel(512, 512, Rgba([0, 0, 0, 255]));
        for y in 0..512 {
            for x in 0..256 {
                halves.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let loader = StubLoader {
            images: vec![
                ("https://example.org/halves.png".to_string(), halves),
                ("https://example.org/logo.png".to_string(), logo_image()),
            ],
        };
        let pipeline = LogoPipeline::new(Config::default()).with_reference_loader(Box::new(loader));

        let urls = vec![
            "https://example.org/broken.png".to_string(),
            "https://example.org/halves.png".to_string(),
            "https://example.org/logo.png".to_string(),
        ];
        let ranked = pipeline.score_candidates(&patch, &urls).await;
        assert_eq!(ranked.len(), 2);
        // The identical reference outranks the structurally different one.
        assert_eq!(ranked[0].index, 2);
        assert!((ranked[0].score.total - 1.0).abs() < 1e-4);
        assert_eq!(ranked[1].index, 1);
        assert!(ranked[0].score.total > ranked[1].score.total);
    }

    #[test]
    fn keep_rule_matches_score_and_aspect_gates() {
        let pipeline = LogoPipeline::new(Config::default());
        let wide = Region::new(0, 0, 280, 100, 0.11, "wide", RegionSource::Heuristic);
        let ultra = Region::new(0, 0, 550, 100, 0.08, "ultra-wide", RegionSource::Heuristic);
        let square = Region::new(0, 0, 100, 100, 0.2, "square", RegionSource::Heuristic);
        let strong = Region::new(0, 0, 100, 100, 0.5, "square", RegionSource::Heuristic);

        assert!(pipeline.keep_candidate(&wide, true));
        assert!(!pipeline.keep_candidate(&wide, false));
        assert!(pipeline.keep_candidate(&ultra, true));
        assert!(!pipeline.keep_candidate(&square, false));
        assert!(pipeline.keep_candidate(&strong, false));
    }
}
