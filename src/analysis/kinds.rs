//! Change-kind inference for extracted regions.
//!
//! A region is checked against the kinds in a fixed order (shift, color
//! shift, resize, content) and the first detector that fires wins. Detectors
//! only read the two screenshots and the mask; no external context is
//! consulted here.

use crate::analysis::color::{dominant_color, lab_distance};
use crate::analysis::differ::DiffMask;
use crate::analysis::regions::RawRegion;
use crate::config::DifferOptions;
use crate::screenshot::Screenshot;
use crate::types::{ChangeKind, ChangeRegion, Extent, PixelBox, Rgb};

/// Fraction of pixels that must match under an offset for a shift.
const SHIFT_MATCH_MIN: f32 = 0.9;
/// A shift window this flat carries no content to track.
const MIN_WINDOW_LUMA_RANGE: u8 = 16;
/// Dominant-color share needed on both sides of a color shift.
const COLOR_DOMINANCE_MIN: f32 = 0.6;
/// Lab distance below this is the same color in different lighting.
const MIN_COLOR_DELTA: f32 = 2.0;
/// Content boxes must overlap this much for a pure recolor.
const COLOR_SHAPE_IOU_MIN: f32 = 0.9;
/// Relative aspect-ratio slack for resize detection.
const RESIZE_ASPECT_SLACK: f32 = 0.1;
/// Minimum relative area change for resize detection.
const RESIZE_AREA_MIN: f32 = 0.1;
/// Luma step that counts as an edge when estimating text-likeness.
const EDGE_LUMA_STEP: u8 = 32;
/// Edge density at or above this reads as text-like content.
const EDGE_DENSITY_MIN: f32 = 0.08;
/// Share a ring color needs to count as the region's backdrop.
const BACKGROUND_SHARE_MIN: f32 = 0.5;
/// Cap on color samples taken from large regions.
const COLOR_SAMPLE_CAP: u64 = 4096;

/// Builds the full [`ChangeRegion`] for one raw component.
pub fn classify_region(
    baseline: &Screenshot,
    current: &Screenshot,
    raw: &RawRegion,
    mask: &DiffMask,
    options: &DifferOptions,
) -> ChangeRegion {
    let old_content = content_box(baseline, &raw.bounds, options.tolerance);
    let new_content = content_box(current, &raw.bounds, options.tolerance);

    let kind = detect_shift(baseline, current, mask, &raw.bounds, options)
        .map(|(dx, dy)| ChangeKind::Shift { dx, dy })
        .or_else(|| {
            detect_color_shift(
                baseline,
                current,
                raw,
                mask,
                old_content.as_ref(),
                new_content.as_ref(),
            )
            .map(|(old, new)| ChangeKind::ColorShift { old, new })
        })
        .or_else(|| {
            detect_resize(old_content.as_ref(), new_content.as_ref())
                .map(|(old, new)| ChangeKind::Resize { old, new })
        })
        .or_else(|| {
            (looks_like_text(baseline, &raw.bounds) && looks_like_text(current, &raw.bounds))
                .then_some(ChangeKind::Content)
        })
        .unwrap_or(ChangeKind::Unclassified);

    ChangeRegion {
        bounds: raw.bounds,
        pixel_count: raw.pixel_count,
        ratio: raw.pixel_count as f32 / mask.extent().area() as f32,
        mean_magnitude: raw.mean_magnitude(),
        kind,
        background: ring_dominant(current, &raw.bounds),
    }
}

/// Searches integer offsets within the configured radius for a translation
/// that explains the region.
///
/// The decisive test runs over the changed pixels: at least 90% of them must
/// equal the baseline sampled at the candidate offset, and the surrounding
/// window must agree too. Flat windows are skipped because any offset
/// matches them.
fn detect_shift(
    baseline: &Screenshot,
    current: &Screenshot,
    mask: &DiffMask,
    bounds: &PixelBox,
    options: &DifferOptions,
) -> Option<(i32, i32)> {
    let max_shift = options.max_shift as i32;
    if max_shift == 0 {
        return None;
    }

    let window = inflate(bounds, options.max_shift, current.extent());
    if luma_range(current, &window) < MIN_WINDOW_LUMA_RANGE {
        return None;
    }

    let mut best: Option<(i32, i32, OffsetScore)> = None;
    for dy in -max_shift..=max_shift {
        for dx in -max_shift..=max_shift {
            if dx == 0 && dy == 0 {
                continue;
            }
            let Some(score) =
                score_offset(baseline, current, mask, &window, dx, dy, options.tolerance)
            else {
                continue;
            };
            if score.changed < SHIFT_MATCH_MIN || score.window < SHIFT_MATCH_MIN {
                continue;
            }
            let better = match &best {
                None => true,
                Some((bdx, bdy, b)) => {
                    score.changed > b.changed + 1e-6
                        || ((score.changed - b.changed).abs() <= 1e-6
                            && score.window > b.window + 1e-6)
                        || ((score.changed - b.changed).abs() <= 1e-6
                            && (score.window - b.window).abs() <= 1e-6
                            && dx.abs() + dy.abs() < bdx.abs() + bdy.abs())
                }
            };
            if better {
                best = Some((dx, dy, score));
            }
        }
    }

    best.map(|(dx, dy, _)| (dx, dy))
}

struct OffsetScore {
    /// Match fraction over the whole window.
    window: f32,
    /// Match fraction over the changed pixels only.
    changed: f32,
}

fn score_offset(
    baseline: &Screenshot,
    current: &Screenshot,
    mask: &DiffMask,
    window: &PixelBox,
    dx: i32,
    dy: i32,
    tolerance: f32,
) -> Option<OffsetScore> {
    let width = baseline.width() as i64;
    let height = baseline.height() as i64;
    let mut compared = 0u64;
    let mut matched = 0u64;
    let mut changed_compared = 0u64;
    let mut changed_matched = 0u64;

    for y in window.y..window.bottom() {
        for x in window.x..window.right() {
            let sx = x as i64 - dx as i64;
            let sy = y as i64 - dy as i64;
            if sx < 0 || sy < 0 || sx >= width || sy >= height {
                continue;
            }
            compared += 1;
            let is_match = pixels_match(
                baseline.pixel(sx as u32, sy as u32),
                current.pixel(x, y),
                tolerance,
            );
            if is_match {
                matched += 1;
            }
            if mask.is_changed(x, y) {
                changed_compared += 1;
                if is_match {
                    changed_matched += 1;
                }
            }
        }
    }

    if compared < window.area() / 2 || changed_compared == 0 {
        return None;
    }
    Some(OffsetScore {
        window: matched as f32 / compared as f32,
        changed: changed_matched as f32 / changed_compared as f32,
    })
}

fn pixels_match(a: [u8; 4], b: [u8; 4], tolerance: f32) -> bool {
    let mut max_delta = 0u8;
    for c in 0..4 {
        max_delta = max_delta.max(a[c].abs_diff(b[c]));
    }
    max_delta as f32 / 255.0 <= tolerance
}

/// A recolor keeps its shape: one dominant color per side over the changed
/// pixels, and (when both sides expose a content box) near-identical boxes.
fn detect_color_shift(
    baseline: &Screenshot,
    current: &Screenshot,
    raw: &RawRegion,
    mask: &DiffMask,
    old_content: Option<&PixelBox>,
    new_content: Option<&PixelBox>,
) -> Option<(Rgb, Rgb)> {
    if let (Some(old_box), Some(new_box)) = (old_content, new_content) {
        if box_iou(old_box, new_box) < COLOR_SHAPE_IOU_MIN {
            return None;
        }
    }

    let step = (raw.pixel_count / COLOR_SAMPLE_CAP + 1) as usize;
    let mut old_samples = Vec::new();
    let mut new_samples = Vec::new();
    let mut seen = 0usize;
    let b = raw.bounds;
    for y in b.y..b.bottom() {
        for x in b.x..b.right() {
            if !mask.is_changed(x, y) {
                continue;
            }
            seen += 1;
            if seen % step != 0 {
                continue;
            }
            old_samples.push(rgb_at(baseline, x, y));
            new_samples.push(rgb_at(current, x, y));
        }
    }

    let (old, old_share) = dominant_color(&old_samples)?;
    let (new, new_share) = dominant_color(&new_samples)?;
    (old_share >= COLOR_DOMINANCE_MIN
        && new_share >= COLOR_DOMINANCE_MIN
        && lab_distance(old, new) > MIN_COLOR_DELTA)
        .then_some((old, new))
}

/// Same aspect ratio, meaningfully different area.
fn detect_resize(
    old_content: Option<&PixelBox>,
    new_content: Option<&PixelBox>,
) -> Option<(Extent, Extent)> {
    let old_box = old_content?;
    let new_box = new_content?;
    if old_box.height == 0 || new_box.height == 0 || old_box.area() == 0 {
        return None;
    }

    let old_aspect = old_box.width as f32 / old_box.height as f32;
    let new_aspect = new_box.width as f32 / new_box.height as f32;
    if (old_aspect - new_aspect).abs() > RESIZE_ASPECT_SLACK * old_aspect {
        return None;
    }

    let old_area = old_box.area() as f32;
    let new_area = new_box.area() as f32;
    if (new_area - old_area).abs() < RESIZE_AREA_MIN * old_area {
        return None;
    }

    Some((
        Extent::new(old_box.width, old_box.height),
        Extent::new(new_box.width, new_box.height),
    ))
}

/// Edge-dense crops on both sides read as changed text or imagery.
fn looks_like_text(img: &Screenshot, bounds: &PixelBox) -> bool {
    if bounds.width < 2 {
        return false;
    }
    let mut pairs = 0u64;
    let mut edges = 0u64;
    for y in bounds.y..bounds.bottom() {
        for x in bounds.x..(bounds.right() - 1) {
            pairs += 1;
            let a = luma_at(img, x, y);
            let b = luma_at(img, x + 1, y);
            if a.abs_diff(b) > EDGE_LUMA_STEP {
                edges += 1;
            }
        }
    }
    pairs > 0 && edges as f32 / pairs as f32 >= EDGE_DENSITY_MIN
}

/// Dominant color of the one-pixel ring just outside the bounds, when the
/// ring exists and one color owns it.
fn ring_dominant(img: &Screenshot, bounds: &PixelBox) -> Option<Rgb> {
    let ring = inflate(bounds, 1, img.extent());
    let mut samples = Vec::new();
    for y in ring.y..ring.bottom() {
        for x in ring.x..ring.right() {
            let inside = x >= bounds.x && x < bounds.right() && y >= bounds.y && y < bounds.bottom();
            if !inside {
                samples.push(rgb_at(img, x, y));
            }
        }
    }
    let (color, share) = dominant_color(&samples)?;
    (share >= BACKGROUND_SHARE_MIN).then_some(color)
}

/// Bounding box of the pixels inside `bounds` that differ from the region's
/// backdrop. None when no backdrop is known or nothing stands out.
fn content_box(img: &Screenshot, bounds: &PixelBox, tolerance: f32) -> Option<PixelBox> {
    let bg = ring_dominant(img, bounds)?;
    let tol = tolerance * 255.0;
    let mut found: Option<(u32, u32, u32, u32)> = None;
    for y in bounds.y..bounds.bottom() {
        for x in bounds.x..bounds.right() {
            let p = rgb_at(img, x, y);
            let delta = p
                .r
                .abs_diff(bg.r)
                .max(p.g.abs_diff(bg.g))
                .max(p.b.abs_diff(bg.b));
            if delta as f32 <= tol {
                continue;
            }
            found = Some(match found {
                None => (x, x, y, y),
                Some((min_x, max_x, min_y, max_y)) => {
                    (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y))
                }
            });
        }
    }
    found.map(|(min_x, max_x, min_y, max_y)| {
        PixelBox::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    })
}

fn box_iou(a: &PixelBox, b: &PixelBox) -> f32 {
    let ix0 = a.x.max(b.x);
    let iy0 = a.y.max(b.y);
    let ix1 = a.right().min(b.right());
    let iy1 = a.bottom().min(b.bottom());
    if ix1 <= ix0 || iy1 <= iy0 {
        return 0.0;
    }
    let inter = (ix1 - ix0) as u64 * (iy1 - iy0) as u64;
    let union = a.area() + b.area() - inter;
    inter as f32 / union as f32
}

fn inflate(bounds: &PixelBox, margin: u32, extent: Extent) -> PixelBox {
    let x0 = bounds.x.saturating_sub(margin);
    let y0 = bounds.y.saturating_sub(margin);
    let x1 = bounds.right().saturating_add(margin).min(extent.width);
    let y1 = bounds.bottom().saturating_add(margin).min(extent.height);
    PixelBox::new(x0, y0, x1 - x0, y1 - y0)
}

fn rgb_at(img: &Screenshot, x: u32, y: u32) -> Rgb {
    let p = img.pixel(x, y);
    Rgb::new(p[0], p[1], p[2])
}

fn luma_at(img: &Screenshot, x: u32, y: u32) -> u8 {
    let p = img.pixel(x, y);
    (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32).round() as u8
}

fn luma_range(img: &Screenshot, bounds: &PixelBox) -> u8 {
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for y in bounds.y..bounds.bottom() {
        for x in bounds.x..bounds.right() {
            let l = luma_at(img, x, y);
            min = min.min(l);
            max = max.max(l);
        }
    }
    max.saturating_sub(min)
}
