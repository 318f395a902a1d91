use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub detector: DetectorConfig,
    pub proposal: ProposalConfig,
    pub fusion: FusionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum confidence for an external detection to be considered.
    pub min_score: f32,
    /// Cap on detections taken from the external model per image.
    pub max_detections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalConfig {
    /// Cap on sliding-window survivors after overlap suppression.
    pub max_windows: usize,
    /// Cap on fused regions returned by a suggestion pass.
    pub max_suggestions: usize,
}

/// The two fusion call sites historically used different IoU cutoffs
/// (suggestion fusion 0.35, full-detection fusion 0.4), so both are exposed
/// here instead of hard-coding either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub suggest_nms_iou: f32,
    pub detect_nms_iou: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detector: DetectorConfig {
                min_score: 0.45,
                max_detections: 12,
            },
            proposal: ProposalConfig {
                max_windows: 32,
                max_suggestions: 10,
            },
            fusion: FusionConfig {
                suggest_nms_iou: 0.35,
                detect_nms_iou: 0.4,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(min_score) = std::env::var("DETECTOR_MIN_SCORE") {
            config.detector.min_score = min_score.parse()?;
        }

        if let Ok(max_detections) = std::env::var("DETECTOR_MAX_DETECTIONS") {
            config.detector.max_detections = max_detections.parse()?;
        }

        if let Ok(max_windows) = std::env::var("PROPOSAL_MAX_WINDOWS") {
            config.proposal.max_windows = max_windows.parse()?;
        }

        if let Ok(max_suggestions) = std::env::var("PROPOSAL_MAX_SUGGESTIONS") {
            config.proposal.max_suggestions = max_suggestions.parse()?;
        }

        if let Ok(iou) = std::env::var("SUGGEST_NMS_IOU") {
            config.fusion.suggest_nms_iou = iou.parse()?;
        }

        if let Ok(iou) = std::env::var("DETECT_NMS_IOU") {
            config.fusion.detect_nms_iou = iou.parse()?;
        }

        Ok(config)
    }
}
