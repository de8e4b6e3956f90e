use palette::{convert::FromColorUnclamped, Lab, Srgb};
use std::collections::HashMap;

use crate::types::Rgb;

/// WCAG 2.x relative luminance of an sRGB color (0.0 - 1.0).
pub fn relative_luminance(color: Rgb) -> f32 {
    fn linearize(channel: u8) -> f32 {
        let c = channel as f32 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }
    0.2126 * linearize(color.r) + 0.7152 * linearize(color.g) + 0.0722 * linearize(color.b)
}

/// WCAG contrast ratio between two colors, in 1.0 - 21.0.
///
/// Symmetric; the lighter color is treated as foreground.
pub fn contrast_ratio(a: Rgb, b: Rgb) -> f32 {
    let la = relative_luminance(a);
    let lb = relative_luminance(b);
    let (lighter, darker) = if la >= lb { (la, lb) } else { (lb, la) };
    (lighter + 0.05) / (darker + 0.05)
}

/// Euclidean distance in CIELAB; roughly one unit per just-noticeable
/// difference.
pub fn lab_distance(a: Rgb, b: Rgb) -> f32 {
    let lab_a = to_lab(a);
    let lab_b = to_lab(b);
    let dl = lab_a.l - lab_b.l;
    let da = lab_a.a - lab_b.a;
    let db = lab_a.b - lab_b.b;
    (dl * dl + da * da + db * db).sqrt()
}

fn to_lab(color: Rgb) -> Lab {
    let srgb = Srgb::new(
        color.r as f32 / 255.0,
        color.g as f32 / 255.0,
        color.b as f32 / 255.0,
    );
    Lab::from_color_unclamped(srgb)
}

// 16 levels per channel; solid UI fills land in a single bucket while
// anti-aliased fringes scatter.
const QUANT_SHIFT: u8 = 4;

/// Most common quantized color among the samples, with its share.
///
/// The returned color is the mean of the samples in the winning bucket,
/// not the bucket center.
pub fn dominant_color(samples: &[Rgb]) -> Option<(Rgb, f32)> {
    if samples.is_empty() {
        return None;
    }

    let mut buckets: HashMap<(u8, u8, u8), (u64, u64, u64, u64)> = HashMap::new();
    for c in samples {
        let key = (c.r >> QUANT_SHIFT, c.g >> QUANT_SHIFT, c.b >> QUANT_SHIFT);
        let entry = buckets.entry(key).or_default();
        entry.0 += c.r as u64;
        entry.1 += c.g as u64;
        entry.2 += c.b as u64;
        entry.3 += 1;
    }

    let (_, &(sum_r, sum_g, sum_b, count)) = buckets
        .iter()
        .max_by_key(|(key, (_, _, _, count))| (*count, *key))?;

    let mean = Rgb::new(
        (sum_r / count) as u8,
        (sum_g / count) as u8,
        (sum_b / count) as u8,
    );
    Some((mean, count as f32 / samples.len() as f32))
}
