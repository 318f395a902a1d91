use std::cmp::Ordering;

use tracing::debug;

use crate::models::Region;

/// Intersection-over-union of two axis-aligned boxes. Degenerate pairs with
/// zero union score 0.
pub fn iou(a: &Region, b: &Region) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.right().min(b.right());
    let y2 = a.bottom().min(b.bottom());

    let iw = x2.saturating_sub(x1) as f32;
    let ih = y2.saturating_sub(y1) as f32;
    let inter = iw * ih;
    let union = a.area() as f32 + b.area() as f32 - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Greedy non-max suppression over arbitrary items carrying a region: sort
/// descending by score, keep the best, discard everything overlapping it by
/// strictly more than `iou_threshold`, repeat.
///
/// The comparison is deliberately strict: a pair sitting exactly at the
/// threshold survives, so both call sites suppress only past their cutoff.
/// Do not relax this to `>=`.
pub fn nms_by<T>(mut items: Vec<T>, iou_threshold: f32, region_of: impl Fn(&T) -> &Region) -> Vec<T> {
    items.sort_by(|a, b| {
        region_of(b)
            .score
            .partial_cmp(&region_of(a).score)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<T> = Vec::new();
    for item in items {
        if kept
            .iter()
            .any(|k| iou(region_of(k), region_of(&item)) > iou_threshold)
        {
            continue;
        }
        kept.push(item);
    }
    kept
}

pub fn nms(regions: Vec<Region>, iou_threshold: f32) -> Vec<Region> {
    nms_by(regions, iou_threshold, |r| r)
}

/// Fuses two region lists: greedy NMS over the concatenation, then clamp each
/// survivor to the image bounds and drop anything under the size floor.
pub fn fuse(
    a: Vec<Region>,
    b: Vec<Region>,
    iou_threshold: f32,
    image_width: u32,
    image_height: u32,
) -> Vec<Region> {
    let mut combined = a;
    combined.extend(b);
    let before = combined.len();

    let fused: Vec<Region> = nms(combined, iou_threshold)
        .into_iter()
        .filter_map(|r| r.clamped(image_width, image_height))
        .collect();

    debug!("Fused {} regions down to {}", before, fused.len());
    fused
}
