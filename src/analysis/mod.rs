//! Analysis pipeline for one baseline/current screenshot pair.
//!
//! The pipeline runs in three stages:
//! - pixel differencing into a [`DiffMask`] (`differ`)
//! - connected-component extraction and proximity merging (`regions`)
//! - per-region change-kind inference (`kinds`) and rule-based
//!   categorization (`categorize`)

// Submodules
mod categorize;
mod color;
mod differ;
mod kinds;
mod regions;

// Re-exports
pub use categorize::{
    categorize, CONFIDENCE_DEGRADED, CONFIDENCE_OVERRIDE, CONFIDENCE_RATIO, CONFIDENCE_SHIFT,
    MIN_CONTRAST_RATIO,
};
pub use color::{contrast_ratio, dominant_color, lab_distance, relative_luminance};
pub use differ::{diff_screenshots, render_heatmap, DiffMask};
pub use kinds::classify_region;
pub use regions::{extract_regions, RawRegion};

use crate::config::DifferOptions;
use crate::error::Result;
use crate::screenshot::Screenshot;
use crate::types::ChangeRegion;

/// Regions and the mask they were cut from, for one story pair.
#[derive(Debug)]
pub struct PairAnalysis {
    pub mask: DiffMask,
    pub regions: Vec<ChangeRegion>,
}

impl PairAnalysis {
    pub fn ratio(&self) -> f32 {
        self.mask.ratio()
    }
}

/// Diffs a pair and classifies every change region.
///
/// Fails with `IncompatibleBaseline` when the two screenshots disagree on
/// dimensions; a missing baseline never reaches this function.
pub fn analyze_pair(
    baseline: &Screenshot,
    current: &Screenshot,
    options: &DifferOptions,
) -> Result<PairAnalysis> {
    let mask = diff_screenshots(baseline, current, options)?;
    let raw = extract_regions(&mask, options);
    let regions = raw
        .iter()
        .map(|r| classify_region(baseline, current, r, &mask, options))
        .collect();
    Ok(PairAnalysis { mask, regions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, ChangeKind};
    use image::{Rgba, RgbaImage};

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Screenshot {
        Screenshot::new(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    fn with_rect(mut base: RgbaImage, x0: u32, y0: u32, w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        for y in y0..(y0 + h) {
            for x in x0..(x0 + w) {
                base.put_pixel(x, y, Rgba(rgba));
            }
        }
        base
    }

    #[test]
    fn identical_pair_yields_no_regions_and_zero_ratio() {
        let a = solid(64, 64, [200, 200, 200, 255]);
        let analysis = analyze_pair(&a, &a.clone(), &DifferOptions::default()).unwrap();
        assert_eq!(analysis.ratio(), 0.0);
        assert!(analysis.regions.is_empty());
    }

    #[test]
    fn recolored_rect_becomes_a_color_shift_region() {
        let bg = [255u8, 255, 255, 255];
        let base = with_rect(
            RgbaImage::from_pixel(80, 80, Rgba(bg)),
            20,
            20,
            24,
            24,
            [0x21, 0x96, 0xf3, 255],
        );
        let curr = with_rect(
            RgbaImage::from_pixel(80, 80, Rgba(bg)),
            20,
            20,
            24,
            24,
            [0x19, 0x76, 0xd2, 255],
        );
        let analysis = analyze_pair(
            &Screenshot::new(base),
            &Screenshot::new(curr),
            &DifferOptions::default(),
        )
        .unwrap();

        assert_eq!(analysis.regions.len(), 1);
        let region = &analysis.regions[0];
        match region.kind {
            ChangeKind::ColorShift { old, new } => {
                assert_eq!(old.hex(), "#2196f3");
                assert_eq!(new.hex(), "#1976d2");
            }
            ref other => panic!("expected a color shift, got {other:?}"),
        }
        assert_eq!(region.bounds.x, 20);
        assert_eq!(region.bounds.y, 20);
        assert!(region.ratio > 0.0);
    }

    #[test]
    fn degraded_categorization_still_orders_by_ratio() {
        // Sanity check that the full pipeline plus categorization agree on
        // an obvious large change.
        let base = solid(40, 40, [255, 255, 255, 255]);
        let curr = solid(40, 40, [0, 0, 0, 255]);
        let policy = crate::config::Policy::default();
        let analysis = analyze_pair(&base, &curr, &policy.differ).unwrap();
        assert_eq!(analysis.regions.len(), 1);
        let verdict = categorize(&analysis.regions[0], None, &policy);
        assert_eq!(verdict.category, Category::Error);
    }
}
