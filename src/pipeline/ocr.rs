use anyhow::Result;
use futures::future::BoxFuture;
use image::{GrayImage, Luma, RgbaImage};

/// Boundary to an external OCR engine. The pipeline treats recognition
/// failures as empty text.
pub trait OcrEngine: Send + Sync {
    fn recognize<'a>(&'a self, image: &'a RgbaImage) -> BoxFuture<'a, Result<String>>;
}

/// Engine that reads nothing, for OCR-free runs and tests.
pub struct NullOcr;

impl OcrEngine for NullOcr {
    fn recognize<'a>(&'a self, _image: &'a RgbaImage) -> BoxFuture<'a, Result<String>> {
        Box::pin(async { Ok(String::new()) })
    }
}

/// Prepares a region patch for OCR: grayscale, contrast stretched 1.5x
/// around the midpoint, then binarized. Brand text is usually high-contrast,
/// so the hard threshold helps more than it hurts.
pub fn preprocess_for_ocr(patch: &RgbaImage) -> GrayImage {
    let (width, height) = patch.dimensions();
    let mut out = GrayImage::new(width, height);

    for (x, y, pixel) in patch.enumerate_pixels() {
        let [r, g, b, _] = pixel.0;
        let gray = r as f32 * 0.299 + g as f32 * 0.587 + b as f32 * 0.114;
        let stretched = ((gray - 128.0) * 1.5 + 128.0).clamp(0.0, 255.0);
        let binary = if stretched > 128.0 { 255 } else { 0 };
        out.put_pixel(x, y, Luma([binary]));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn preprocess_binarizes_around_midpoint() {
        let mut patch = RgbaImage::from_pixel(2, 1, Rgba([200, 200, 200, 255]));
        patch.put_pixel(1, 0, Rgba([60, 60, 60, 255]));

        let out = preprocess_for_ocr(&patch);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        assert_eq!(out.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn midgray_maps_to_black() {
        let patch = RgbaImage::from_pixel(1, 1, Rgba([127, 127, 127, 255]));
        let out = preprocess_for_ocr(&patch);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
    }

    #[tokio::test]
    async fn null_ocr_reads_nothing() {
        let patch = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let text = NullOcr.recognize(&patch).await.unwrap();
        assert!(text.is_empty());
    }
}
