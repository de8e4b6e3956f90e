use image::RgbaImage;

use crate::config::DifferOptions;
use crate::error::{Result, VdcError};
use crate::screenshot::Screenshot;
use crate::types::Extent;

/// Per-pixel difference between a baseline and a current screenshot.
///
/// Magnitudes are the largest per-channel delta at each pixel, normalized to
/// 0.0 - 1.0; a pixel counts as changed when its magnitude exceeds the
/// configured tolerance. A mask only exists for dimension-matched pairs.
#[derive(Debug, Clone)]
pub struct DiffMask {
    width: u32,
    height: u32,
    tolerance: f32,
    magnitudes: Vec<f32>,
    changed: u64,
}

impl DiffMask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    pub fn magnitude(&self, x: u32, y: u32) -> f32 {
        self.magnitudes[(y * self.width + x) as usize]
    }

    pub fn is_changed(&self, x: u32, y: u32) -> bool {
        self.magnitude(x, y) > self.tolerance
    }

    pub fn changed(&self) -> u64 {
        self.changed
    }

    /// Changed pixels over total pixels. Exactly 0.0 for identical inputs.
    pub fn ratio(&self) -> f32 {
        if self.magnitudes.is_empty() {
            return 0.0;
        }
        self.changed as f32 / self.magnitudes.len() as f32
    }
}

/// Computes the diff mask for a pair of screenshots.
///
/// Dimension mismatch is reported as `IncompatibleBaseline`; nothing is ever
/// scaled to fit.
pub fn diff_screenshots(
    baseline: &Screenshot,
    current: &Screenshot,
    options: &DifferOptions,
) -> Result<DiffMask> {
    if baseline.extent() != current.extent() {
        return Err(VdcError::incompatible(baseline.extent(), current.extent()));
    }

    let base_buf = baseline.pixels().as_raw();
    let curr_buf = current.pixels().as_raw();
    let len = base_buf.len();

    let mut magnitudes = Vec::with_capacity(len / 4);
    let mut changed = 0u64;
    for i in (0..len).step_by(4) {
        let mut max_delta = 0u8;
        for c in 0..4 {
            let delta = base_buf[i + c].abs_diff(curr_buf[i + c]);
            max_delta = max_delta.max(delta);
        }
        let magnitude = max_delta as f32 / 255.0;
        if magnitude > options.tolerance {
            changed += 1;
        }
        magnitudes.push(magnitude);
    }

    Ok(DiffMask {
        width: baseline.width(),
        height: baseline.height(),
        tolerance: options.tolerance,
        magnitudes,
        changed,
    })
}

/// Renders the mask as a translucent green/yellow/red overlay for artifacts.
pub fn render_heatmap(mask: &DiffMask) -> RgbaImage {
    let mut heat = RgbaImage::new(mask.width(), mask.height());
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            let ratio = mask.magnitude(x, y).clamp(0.0, 1.0);
            let alpha = (ratio * 200.0).clamp(0.0, 200.0) as u8;
            let pixel = if ratio < 0.33 {
                let g = (100.0 + ratio / 0.33 * 100.0).clamp(0.0, 200.0) as u8;
                image::Rgba([0, g, 0, alpha])
            } else if ratio < 0.66 {
                let r = (150.0 + (ratio - 0.33) / 0.33 * 80.0).clamp(150.0, 230.0) as u8;
                image::Rgba([r, 180, 0, alpha])
            } else {
                let r = (200.0 + (ratio - 0.66) / 0.34 * 55.0).clamp(200.0, 255.0) as u8;
                image::Rgba([r, 0, 0, alpha])
            };
            heat.put_pixel(x, y, pixel);
        }
    }
    heat
}
