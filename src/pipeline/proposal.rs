use std::cmp::Ordering;

use image::GrayImage;
use tracing::debug;

use super::merge;
use crate::models::{Region, RegionSource};

/// (minimum side in pixels, fraction of the shorter image dimension).
/// The floors keep small images from producing character-sized fragments.
const BASE_SIZES: [(u32, f32); 4] = [(48, 0.12), (64, 0.20), (96, 0.30), (128, 0.45)];

/// (width multiplier, height multiplier, label). Wide shapes target
/// horizontal text logos, portrait covers stacked marks.
const ASPECT_RATIOS: [(f32, f32, &str); 6] = [
    (1.0, 1.0, "square"),
    (1.8, 1.0, "landscape"),
    (2.8, 1.0, "wide"),
    (4.0, 1.0, "extra-wide"),
    (5.5, 1.0, "ultra-wide"),
    (1.0, 1.5, "portrait"),
];

/// Multi-scale sliding-window region proposer scored by edge density and
/// local color variance.
pub struct WindowProposer {
    edge_threshold: u8,
    base_score_threshold: f32,
    wide_score_threshold: f32,
    ultra_wide_score_threshold: f32,
    small_window_score_threshold: f32,
    small_window_floor: u32,
    dedup_iou: f32,
    max_windows: usize,
}

impl Default for WindowProposer {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowProposer {
    pub fn new() -> Self {
        Self {
            edge_threshold: 64,
            base_score_threshold: 0.12,
            wide_score_threshold: 0.09,
            ultra_wide_score_threshold: 0.08,
            small_window_score_threshold: 0.15,
            small_window_floor: 60,
            dedup_iou: 0.25,
            max_windows: 32,
        }
    }

    pub fn with_max_windows(mut self, max_windows: usize) -> Self {
        self.max_windows = max_windows;
        self
    }

    /// Slides every base-size/aspect-ratio window combination over the image,
    /// scores each by `max(edge density, 0.8 * color-variance density)`, and
    /// greedily deduplicates the acceptances by IoU.
    ///
    /// `edges` and `color_variance` must share dimensions; both come from the
    /// preprocessing pass over the same image.
    pub fn propose(&self, edges: &GrayImage, color_variance: &GrayImage) -> Vec<Region> {
        let (width, height) = edges.dimensions();
        let min_dim = width.min(height);
        let mut windows: Vec<Region> = Vec::new();

        for &(floor, fraction) in &BASE_SIZES {
            let base = ((min_dim as f32 * fraction).round() as u32).max(floor);

            for &(ar_w, ar_h, label) in &ASPECT_RATIOS {
                let win_w = (base as f32 * ar_w).round() as u32;
                let win_h = (base as f32 * ar_h).round() as u32;
                if win_w > width || win_h > height {
                    continue;
                }

                let threshold = self.score_threshold(ar_w, win_w, win_h);
                let stride = ((win_w.min(win_h) as f32 * 0.4).round() as u32).max(1);

                let mut y = 0;
                while y + win_h <= height {
                    let mut x = 0;
                    while x + win_w <= width {
                        let edge_score = self.sampled_density(edges, x, y, win_w, win_h);
                        let color_score = self.sampled_density(color_variance, x, y, win_w, win_h);
                        let combined = edge_score.max(color_score * 0.8);

                        if combined > threshold {
                            windows.push(Region::new(
                                x,
                                y,
                                win_w,
                                win_h,
                                combined,
                                label,
                                RegionSource::Heuristic,
                            ));
                        }
                        x += stride;
                    }
                    y += stride;
                }
            }
        }

        debug!("Scored {} windows above threshold", windows.len());

        windows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        let mut kept: Vec<Region> = Vec::new();
        for window in windows {
            if kept.iter().any(|k| merge::iou(k, &window) > self.dedup_iou) {
                continue;
            }
            kept.push(window);
            if kept.len() >= self.max_windows {
                break;
            }
        }

        debug!("Kept {} windows after overlap suppression", kept.len());
        kept
    }

    /// Acceptance threshold adapted to window shape: wide text logos have
    /// inherently sparse edges, very small windows tend to latch onto single
    /// characters.
    fn score_threshold(&self, ar_w: f32, win_w: u32, win_h: u32) -> f32 {
        let mut threshold = self.base_score_threshold;
        if ar_w >= 4.0 {
            threshold = self.ultra_wide_score_threshold;
        } else if ar_w >= 2.5 {
            threshold = self.wide_score_threshold;
        }
        if win_w < self.small_window_floor || win_h < self.small_window_floor {
            threshold = self.small_window_score_threshold;
        }
        threshold
    }

    /// Fraction of pixels above the edge threshold, sampled on a 2-pixel grid
    /// for speed.
    fn sampled_density(&self, map: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> f32 {
        let mut hits = 0u32;
        let mut yy = y;
        while yy < y + h {
            let mut xx = x;
            while xx < x + w {
                if map.get_pixel(xx, yy)[0] > self.edge_threshold {
                    hits += 1;
                }
                xx += 2;
            }
            yy += 2;
        }
        hits as f32 / ((w as f32 / 2.0) * (h as f32 / 2.0))
    }
}
