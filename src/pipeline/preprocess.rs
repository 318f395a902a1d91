use image::{GrayImage, Luma, RgbaImage};

/// Luma-weighted grayscale conversion (0.299 R + 0.587 G + 0.114 B).
pub fn to_grayscale(pixels: &RgbaImage) -> GrayImage {
    let (width, height) = pixels.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in pixels.enumerate_pixels() {
        let [r, g, b, _] = pixel.0;
        let luma = (r as f32 * 0.299 + g as f32 * 0.587 + b as f32 * 0.114) as u8;
        gray.put_pixel(x, y, Luma([luma]));
    }

    gray
}

/// 3x3 Sobel gradient magnitude, `min(255, |gx| + |gy|)`. Border pixels stay
/// at zero; there is no wraparound.
pub fn edge_map(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut edges = GrayImage::new(width, height);

    if width < 3 || height < 3 {
        return edges;
    }

    let sobel_x: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    let sobel_y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut gx = 0i32;
            let mut gy = 0i32;

            for dy in 0..3u32 {
                for dx in 0..3u32 {
                    let value = gray.get_pixel(x + dx - 1, y + dy - 1)[0] as i32;
                    gx += value * sobel_x[dy as usize][dx as usize];
                    gy += value * sobel_y[dy as usize][dx as usize];
                }
            }

            let magnitude = (gx.abs() + gy.abs()).min(255) as u8;
            edges.put_pixel(x, y, Luma([magnitude]));
        }
    }

    edges
}

/// Local color variance over each 3x3 RGB neighborhood, emitted as
/// `min(255, sqrt(variance))`. Highlights colorful symbol regions that carry
/// little edge contrast. Border pixels stay at zero.
pub fn color_variance_map(pixels: &RgbaImage) -> GrayImage {
    let (width, height) = pixels.dimensions();
    let mut variance = GrayImage::new(width, height);

    if width < 3 || height < 3 {
        return variance;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut sum = [0f32; 3];
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let pixel = pixels.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32);
                    sum[0] += pixel[0] as f32;
                    sum[1] += pixel[1] as f32;
                    sum[2] += pixel[2] as f32;
                }
            }
            let mean = [sum[0] / 9.0, sum[1] / 9.0, sum[2] / 9.0];

            let mut var_sum = 0f32;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let pixel = pixels.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32);
                    let dr = pixel[0] as f32 - mean[0];
                    let dg = pixel[1] as f32 - mean[1];
                    let db = pixel[2] as f32 - mean[2];
                    var_sum += dr * dr + dg * dg + db * db;
                }
            }

            let magnitude = (var_sum / 9.0).sqrt().min(255.0) as u8;
            variance.put_pixel(x, y, Luma([magnitude]));
        }
    }

    variance
}
