use std::io::Read;

use futures::future::BoxFuture;
use image::{imageops, imageops::FilterType, RgbaImage};
use thiserror::Error;

use crate::models::SimilarityScore;

const PHASH_INPUT_SIZE: u32 = 32;
const PHASH_GRID: usize = 8;
const ORB_SIZE: u32 = 128;
const HUE_BINS: usize = 12;
const HISTOGRAM_BINS: usize = HUE_BINS * 2;

/// Failures while obtaining a reference image. Unlike detector and OCR
/// failures these propagate to the caller; there is no neutral score to
/// substitute.
#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("failed to fetch reference image from {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("failed to decode reference image from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("reference image has no pixels")]
    EmptyImage,
}

/// Boundary for resolving a reference-image URL into pixels.
pub trait ReferenceLoader: Send + Sync {
    fn load<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RgbaImage, SimilarityError>>;
}

/// Default loader: blocking HTTP fetch moved onto the blocking pool, then an
/// in-memory decode.
pub struct HttpReferenceLoader;

impl ReferenceLoader for HttpReferenceLoader {
    fn load<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RgbaImage, SimilarityError>> {
        Box::pin(async move {
            let fetch_url = url.to_string();
            let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, SimilarityError> {
                let response = ureq::get(&fetch_url).call().map_err(|e| SimilarityError::Fetch {
                    url: fetch_url.clone(),
                    message: e.to_string(),
                })?;
                let mut buf = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut buf)
                    .map_err(|e| SimilarityError::Fetch {
                        url: fetch_url.clone(),
                        message: e.to_string(),
                    })?;
                Ok(buf)
            })
            .await
            .map_err(|e| SimilarityError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })??;

            let decoded = image::load_from_memory(&bytes).map_err(|e| SimilarityError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            let rgba = decoded.to_rgba8();
            if rgba.width() == 0 || rgba.height() == 0 {
                return Err(SimilarityError::EmptyImage);
            }
            Ok(rgba)
        })
    }
}

/// 64-bit average hash: downsample to 32x32 luma, pool into an 8x8 grid,
/// set bit i (MSB first) when the cell is at or above the global mean.
pub fn phash(image: &RgbaImage) -> u64 {
    let small = imageops::resize(image, PHASH_INPUT_SIZE, PHASH_INPUT_SIZE, FilterType::Triangle);

    let mut gray = [0f32; (PHASH_INPUT_SIZE * PHASH_INPUT_SIZE) as usize];
    for (i, pixel) in small.pixels().enumerate() {
        let [r, g, b, _] = pixel.0;
        gray[i] = r as f32 * 0.299 + g as f32 * 0.587 + b as f32 * 0.114;
    }

    let tile = PHASH_INPUT_SIZE as usize / PHASH_GRID;
    let mut cells = [0f32; PHASH_GRID * PHASH_GRID];
    for cy in 0..PHASH_GRID {
        for cx in 0..PHASH_GRID {
            let mut sum = 0f32;
            for ty in 0..tile {
                for tx in 0..tile {
                    sum += gray[(cy * tile + ty) * PHASH_INPUT_SIZE as usize + cx * tile + tx];
                }
            }
            cells[cy * PHASH_GRID + cx] = sum / (tile * tile) as f32;
        }
    }

    let mean = cells.iter().sum::<f32>() / cells.len() as f32;
    let mut hash = 0u64;
    for (i, &value) in cells.iter().enumerate() {
        if value >= mean {
            hash |= 1 << (63 - i);
        }
    }
    hash
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Similarity in [0, 1]: 1 minus the normalized 64-bit Hamming distance.
pub fn phash_score(a: u64, b: u64) -> f32 {
    1.0 - hamming_distance(a, b) as f32 / 64.0
}

/// 24-bin joint histogram over HSV: 12 hue bins crossed with 2 value bands
/// (above/below 0.5), normalized to sum 1.
pub fn color_histogram(image: &RgbaImage) -> [f32; HISTOGRAM_BINS] {
    let mut bins = [0f32; HISTOGRAM_BINS];

    for pixel in image.pixels() {
        let r = pixel[0] as f32 / 255.0;
        let g = pixel[1] as f32 / 255.0;
        let b = pixel[2] as f32 / 255.0;

        let mx = r.max(g).max(b);
        let mn = r.min(g).min(b);
        let v = mx;

        let h = if mx == mn {
            0.0
        } else {
            let d = mx - mn;
            let h = if mx == r {
                (g - b) / d + if g < b { 6.0 } else { 0.0 }
            } else if mx == g {
                (b - r) / d + 2.0
            } else {
                (r - g) / d + 4.0
            };
            h / 6.0
        };

        let hue_bin = ((h * HUE_BINS as f32).floor() as usize) % HUE_BINS;
        let value_bin = if v > 0.5 { 1 } else { 0 };
        bins[hue_bin * 2 + value_bin] += 1.0;
    }

    let sum: f32 = bins.iter().sum();
    if sum > 0.0 {
        for bin in bins.iter_mut() {
            *bin /= sum;
        }
    }
    bins
}

/// Cosine similarity; zero-norm inputs score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f32;
    let mut norm_a = 0f32;
    let mut norm_b = 0f32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

/// Gradient-correlation stand-in for ORB keypoint matching: both images are
/// resized to 128x128, reduced to channel-summed gradient magnitudes, and
/// compared by cosine similarity.
///
/// This measures coarse structural agreement, not keypoint correspondence; a
/// real feature matcher can replace it behind the same signature.
pub fn orb_proxy(a: &RgbaImage, b: &RgbaImage) -> f32 {
    let ga = gradient_magnitude(a);
    let gb = gradient_magnitude(b);
    cosine(&ga, &gb).clamp(0.0, 1.0)
}

fn gradient_magnitude(image: &RgbaImage) -> Vec<f32> {
    let resized = imageops::resize(image, ORB_SIZE, ORB_SIZE, FilterType::Triangle);
    let mut magnitudes = vec![0f32; (ORB_SIZE * ORB_SIZE) as usize];

    for y in 1..ORB_SIZE - 1 {
        for x in 1..ORB_SIZE - 1 {
            let left = resized.get_pixel(x - 1, y);
            let right = resized.get_pixel(x + 1, y);
            let above = resized.get_pixel(x, y - 1);
            let below = resized.get_pixel(x, y + 1);

            let mut gx = 0i32;
            let mut gy = 0i32;
            for c in 0..3 {
                gx += right[c] as i32 - left[c] as i32;
                gy += below[c] as i32 - above[c] as i32;
            }

            let magnitude = (gx.abs() + gy.abs()).min(255);
            magnitudes[(y * ORB_SIZE + x) as usize] = magnitude as f32 / 255.0;
        }
    }

    magnitudes
}

/// Full perceptual comparison between a region patch and a reference image:
/// `0.5 * pHash + 0.3 * color + 0.2 * orb`.
pub fn score(patch: &RgbaImage, reference: &RgbaImage) -> SimilarityScore {
    let p_hash = phash_score(phash(patch), phash(reference));
    let color = cosine(&color_histogram(patch), &color_histogram(reference));
    let orb = orb_proxy(patch, reference);
    SimilarityScore::weighted(p_hash, color, orb)
}
