pub mod config;
pub mod models;
pub mod pipeline;

pub use config::Config;
pub use models::{
    BrandToken, Detection, DetectionReport, ProposalStats, RankedMatch, Region, RegionSource,
    SimilarityScore,
};
pub use pipeline::adapter::{DetectionFilter, ObjectDetector, RawDetection};
pub use pipeline::ocr::OcrEngine;
pub use pipeline::similarity::{ReferenceLoader, SimilarityError};
pub use pipeline::LogoPipeline;
