use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Regions narrower or shorter than this are discarded everywhere in the
/// pipeline; smaller crops do not carry enough pixels for OCR or hashing.
pub const MIN_REGION_SIDE: u32 = 24;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    Heuristic,
    Ai,
    Manual,
}

impl RegionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionSource::Heuristic => "heuristic",
            RegionSource::Ai => "ai",
            RegionSource::Manual => "manual",
        }
    }
}

impl From<RegionSource> for String {
    fn from(source: RegionSource) -> Self {
        source.as_str().to_string()
    }
}

impl TryFrom<String> for RegionSource {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "heuristic" => Ok(RegionSource::Heuristic),
            "ai" => Ok(RegionSource::Ai),
            "manual" => Ok(RegionSource::Manual),
            _ => Err(format!("Invalid region source: {}", value)),
        }
    }
}

/// A candidate logo region inside one image. Coordinates are pixel offsets
/// from the top-left corner; `x + w` and `y + h` never exceed the image
/// bounds once a region has passed through clamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub score: f32,
    pub label: String,
    pub source: RegionSource,
}

impl Region {
    pub fn new(x: u32, y: u32, w: u32, h: u32, score: f32, label: impl Into<String>, source: RegionSource) -> Self {
        Self {
            x,
            y,
            w,
            h,
            score,
            label: label.into(),
            source,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.h == 0 {
            0.0
        } else {
            self.w as f32 / self.h as f32
        }
    }

    /// Clamps the region to the image bounds, dropping it entirely when the
    /// clamped box falls under the minimum size floor.
    pub fn clamped(&self, image_width: u32, image_height: u32) -> Option<Region> {
        if self.x >= image_width || self.y >= image_height {
            return None;
        }
        let w = self.w.min(image_width - self.x);
        let h = self.h.min(image_height - self.y);
        if w < MIN_REGION_SIDE || h < MIN_REGION_SIDE {
            return None;
        }
        let mut clamped = self.clone();
        clamped.w = w;
        clamped.h = h;
        Some(clamped)
    }
}

/// Normalized brand-name candidate extracted from OCR text. Always lowercase,
/// at least three characters, alphanumeric plus hyphen/underscore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct BrandToken(String);

impl BrandToken {
    pub(crate) fn new(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BrandToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-pair perceptual similarity. All components and the weighted total are
/// in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub p_hash: f32,
    pub color: f32,
    pub orb: f32,
    pub total: f32,
}

impl SimilarityScore {
    pub fn weighted(p_hash: f32, color: f32, orb: f32) -> Self {
        Self {
            p_hash,
            color,
            orb,
            total: 0.5 * p_hash + 0.3 * color + 0.2 * orb,
        }
    }
}

/// Summary counts for one proposal pass, split by where the boxes came from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProposalStats {
    pub heuristic_count: usize,
    pub ai_count: usize,
}

/// One surviving region together with whatever text was read out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub region: Region,
    pub ocr_text: String,
    pub brand_token: Option<BrandToken>,
}

/// Result of one full detection pass over a single image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub image_width: u32,
    pub image_height: u32,
    pub detections: Vec<Detection>,
    pub stats: ProposalStats,
}

/// A reference image ranked against a region patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMatch {
    pub index: usize,
    pub url: String,
    pub score: SimilarityScore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_clamps_to_image_bounds() {
        let region = Region::new(400, 400, 200, 200, 0.5, "square", RegionSource::Heuristic);
        let clamped = region.clamped(512, 512).unwrap();
        assert_eq!(clamped.right(), 512);
        assert_eq!(clamped.bottom(), 512);
    }

    #[test]
    fn region_below_size_floor_is_dropped() {
        let region = Region::new(500, 500, 100, 100, 0.5, "square", RegionSource::Heuristic);
        assert!(region.clamped(512, 512).is_none());

        let tiny = Region::new(0, 0, 23, 48, 0.5, "portrait", RegionSource::Heuristic);
        assert!(tiny.clamped(512, 512).is_none());
    }

    #[test]
    fn region_outside_image_is_dropped() {
        let region = Region::new(600, 10, 50, 50, 0.5, "square", RegionSource::Ai);
        assert!(region.clamped(512, 512).is_none());
    }

    #[test]
    fn score_weighting_endpoints() {
        let full = SimilarityScore::weighted(1.0, 1.0, 1.0);
        assert!((full.total - 1.0).abs() < 1e-6);

        let zero = SimilarityScore::weighted(0.0, 0.0, 0.0);
        assert!(zero.total.abs() < 1e-6);
    }

    #[test]
    fn region_source_round_trips_through_string() {
        for source in [RegionSource::Heuristic, RegionSource::Ai, RegionSource::Manual] {
            let s: String = source.into();
            assert_eq!(RegionSource::try_from(s).unwrap(), source);
        }
        assert!(RegionSource::try_from("model".to_string()).is_err());
    }
}
