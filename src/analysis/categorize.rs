//! Rule-based categorization of change regions.
//!
//! Rules are checked in a fixed order and the first match wins: hard
//! overrides (contrast, token diff, context mention), then the shift table
//! for shift regions, then the ratio buckets from the policy thresholds.
//! Without a context snapshot only the region-intrinsic rules run and the
//! verdict is marked degraded.

use crate::analysis::color::contrast_ratio;
use crate::approval;
use crate::config::Policy;
use crate::context::ContextSnapshot;
use crate::types::{Category, ChangeKind, ChangeRegion, Evidence, Verdict};

/// Confidence for hard overrides (contrast, token, mention).
pub const CONFIDENCE_OVERRIDE: f32 = 0.95;
/// Confidence for shift-table verdicts.
pub const CONFIDENCE_SHIFT: f32 = 0.85;
/// Confidence for plain ratio-bucket verdicts.
pub const CONFIDENCE_RATIO: f32 = 0.75;
/// Flat confidence when no change context was available.
pub const CONFIDENCE_DEGRADED: f32 = 0.3;
/// WCAG AA minimum contrast for normal text.
pub const MIN_CONTRAST_RATIO: f32 = 4.5;

/// Shifts below this on both axes are sub-pixel rendering noise.
const SHIFT_IGNORE_BELOW: i32 = 2;
/// Shifts beyond this on either axis need a layout-affecting commit.
const SHIFT_ERROR_ABOVE: i32 = 5;

/// Produces the verdict for one region.
///
/// `context` is the per-run change context; `None` means the run is
/// degraded and only region-intrinsic rules apply.
pub fn categorize(
    region: &ChangeRegion,
    context: Option<&ContextSnapshot>,
    policy: &Policy,
) -> Verdict {
    let verdict = apply_rules(region, context, policy);
    match context {
        Some(_) => verdict,
        None => degrade(verdict),
    }
}

fn degrade(mut verdict: Verdict) -> Verdict {
    verdict.confidence = CONFIDENCE_DEGRADED;
    verdict.evidence.push(Evidence::NoneAvailable);
    verdict
}

fn apply_rules(region: &ChangeRegion, context: Option<&ContextSnapshot>, policy: &Policy) -> Verdict {
    // Contrast regression beats every other signal, including an exact
    // token match.
    if let ChangeKind::ColorShift { new, .. } = region.kind {
        if let Some(bg) = region.background {
            let contrast = contrast_ratio(new, bg);
            if contrast < MIN_CONTRAST_RATIO {
                return build(
                    Category::Error,
                    format!(
                        "new color {} has {:.2}:1 contrast against backdrop {}, below the {:.1}:1 minimum",
                        new.hex(),
                        contrast,
                        bg.hex(),
                        MIN_CONTRAST_RATIO
                    ),
                    vec![Evidence::Measurement {
                        label: "contrastRatio".to_string(),
                        value: format!("{contrast:.2}"),
                    }],
                    CONFIDENCE_OVERRIDE,
                    region,
                    policy,
                );
            }
        }
    }

    if let Some(ctx) = context {
        if let Some(token) = matching_token(region, ctx) {
            return build(
                Category::Expected,
                format!("change matches design token '{}'", token.name),
                vec![Evidence::Token {
                    name: token.name.clone(),
                    commit: token.commit.clone(),
                }],
                CONFIDENCE_OVERRIDE,
                region,
                policy,
            );
        }

        if let Some((value, evidence)) = find_value_mention(region, ctx) {
            return build(
                Category::Expected,
                format!("changed value {value} is called out in the change context"),
                vec![evidence],
                CONFIDENCE_OVERRIDE,
                region,
                policy,
            );
        }
    }

    if let ChangeKind::Shift { dx, dy } = region.kind {
        return shift_verdict(dx, dy, context, region, policy);
    }

    let category = policy.thresholds.category_for_ratio(region.ratio);
    build(
        category,
        format!(
            "{} region changed {:.3}% of the screenshot",
            region.kind.label(),
            region.ratio * 100.0
        ),
        vec![Evidence::Measurement {
            label: "changeRatio".to_string(),
            value: format!("{:.6}", region.ratio),
        }],
        CONFIDENCE_RATIO,
        region,
        policy,
    )
}

/// Looks for a token-diff entry explaining the region.
///
/// Colors match hex-normalized; resizes match a sizing token through
/// either the width or the height spelled as `{n}px`.
fn matching_token<'a>(
    region: &ChangeRegion,
    ctx: &'a ContextSnapshot,
) -> Option<&'a crate::context::TokenChange> {
    match region.kind {
        ChangeKind::ColorShift { old, new } => ctx.matching_color_token(old, new),
        ChangeKind::Resize { old, new } => ctx
            .matching_value_token(&format!("{}px", old.width), &format!("{}px", new.width))
            .or_else(|| {
                ctx.matching_value_token(&format!("{}px", old.height), &format!("{}px", new.height))
            }),
        _ => None,
    }
}

/// Spellings of the changed value worth looking up in commit messages and
/// the PR description.
fn mention_values(kind: &ChangeKind) -> Vec<String> {
    match kind {
        ChangeKind::ColorShift { new, .. } => {
            let hex = new.hex();
            let bare = hex.trim_start_matches('#').to_string();
            vec![hex, bare]
        }
        ChangeKind::Shift { dx, dy } => {
            let mut values = Vec::new();
            if *dx != 0 {
                values.push(format!("{}px", dx.abs()));
            }
            if *dy != 0 {
                values.push(format!("{}px", dy.abs()));
            }
            values
        }
        ChangeKind::Resize { new, .. } => vec![new.to_string()],
        ChangeKind::Content | ChangeKind::Unclassified => Vec::new(),
    }
}

fn find_value_mention(region: &ChangeRegion, ctx: &ContextSnapshot) -> Option<(String, Evidence)> {
    for value in mention_values(&region.kind) {
        if let Some(evidence) = ctx.find_mention(&value) {
            return Some((value, evidence));
        }
    }
    None
}

fn shift_verdict(
    dx: i32,
    dy: i32,
    context: Option<&ContextSnapshot>,
    region: &ChangeRegion,
    policy: &Policy,
) -> Verdict {
    let offset = Evidence::Measurement {
        label: "offset".to_string(),
        value: format!("({dx}, {dy})"),
    };

    if dx.abs() < SHIFT_IGNORE_BELOW && dy.abs() < SHIFT_IGNORE_BELOW {
        return build(
            Category::Ignore,
            format!("sub-pixel shift of ({dx}, {dy})"),
            vec![offset],
            CONFIDENCE_SHIFT,
            region,
            policy,
        );
    }

    if dx.abs() > SHIFT_ERROR_ABOVE || dy.abs() > SHIFT_ERROR_ABOVE {
        return match context.and_then(|c| c.refactor_commit()) {
            Some(commit) => build(
                Category::Warning,
                format!(
                    "shift of ({dx}, {dy}) px alongside layout work in commit {}",
                    commit.id
                ),
                vec![
                    offset,
                    Evidence::Commit {
                        id: commit.id.clone(),
                        excerpt: first_line(&commit.message),
                    },
                ],
                CONFIDENCE_SHIFT,
                region,
                policy,
            ),
            None => build(
                Category::Error,
                format!("shift of ({dx}, {dy}) px with no layout-affecting commit in context"),
                vec![offset],
                CONFIDENCE_SHIFT,
                region,
                policy,
            ),
        };
    }

    build(
        Category::Warning,
        format!("moderate shift of ({dx}, {dy}) px"),
        vec![offset],
        CONFIDENCE_SHIFT,
        region,
        policy,
    )
}

fn build(
    category: Category,
    reason: String,
    evidence: Vec<Evidence>,
    confidence: f32,
    region: &ChangeRegion,
    policy: &Policy,
) -> Verdict {
    let kind = approval::approval_kind(&evidence, region.mean_magnitude, None);
    let recommendation = approval::recommendation_for(category, kind, &policy.auto_approve);
    Verdict {
        category,
        reason,
        evidence,
        recommendation,
        confidence,
        advisory: None,
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Commit, TokenChange};
    use crate::types::{PixelBox, Recommendation, Rgb};
    use chrono::Utc;

    const WHITE: Rgb = Rgb::new(255, 255, 255);
    const LIGHT_BLUE: Rgb = Rgb::new(0x21, 0x96, 0xf3);
    const DARK_BLUE: Rgb = Rgb::new(0x19, 0x76, 0xd2);

    fn region(kind: ChangeKind, ratio: f32) -> ChangeRegion {
        ChangeRegion {
            bounds: PixelBox::new(0, 0, 10, 10),
            pixel_count: 100,
            ratio,
            mean_magnitude: 0.5,
            kind,
            background: Some(WHITE),
        }
    }

    fn empty_context() -> ContextSnapshot {
        ContextSnapshot {
            commits: Vec::new(),
            token_changes: Vec::new(),
            pr_description: None,
            branch: None,
            fetched_at: Utc::now(),
        }
    }

    fn commit(id: &str, message: &str) -> Commit {
        Commit {
            id: id.to_string(),
            message: message.to_string(),
            timestamp: None,
        }
    }

    fn token_context() -> ContextSnapshot {
        let mut ctx = empty_context();
        ctx.token_changes.push(TokenChange {
            name: "primary-600".to_string(),
            old_value: "#2196F3".to_string(),
            new_value: "#1976D2".to_string(),
            commit: "abc123".to_string(),
        });
        ctx
    }

    #[test]
    fn low_contrast_recolor_is_an_error_even_with_a_token() {
        let kind = ChangeKind::ColorShift {
            old: DARK_BLUE,
            new: LIGHT_BLUE,
        };
        let mut ctx = empty_context();
        ctx.token_changes.push(TokenChange {
            name: "primary-500".to_string(),
            old_value: "#1976d2".to_string(),
            new_value: "#2196f3".to_string(),
            commit: "abc123".to_string(),
        });

        let verdict = categorize(&region(kind, 0.02), Some(&ctx), &Policy::default());
        assert_eq!(verdict.category, Category::Error);
        assert!(verdict.reason.contains("contrast"), "got: {}", verdict.reason);
        assert_eq!(verdict.confidence, CONFIDENCE_OVERRIDE);
        assert_eq!(verdict.recommendation, Recommendation::Reject);
    }

    #[test]
    fn token_matched_recolor_is_expected() {
        let kind = ChangeKind::ColorShift {
            old: LIGHT_BLUE,
            new: DARK_BLUE,
        };
        let verdict = categorize(&region(kind, 0.02), Some(&token_context()), &Policy::default());
        assert_eq!(verdict.category, Category::Expected);
        assert!(verdict
            .evidence
            .iter()
            .any(|e| matches!(e, Evidence::Token { name, .. } if name == "primary-600")));
        assert!(verdict.reason.contains("primary-600"), "got: {}", verdict.reason);
        assert_eq!(verdict.recommendation, Recommendation::Approve);
    }

    #[test]
    fn token_flag_turns_expected_into_auto_approve() {
        let kind = ChangeKind::ColorShift {
            old: LIGHT_BLUE,
            new: DARK_BLUE,
        };
        let mut policy = Policy::default();
        policy.auto_approve.token_changes = true;
        let verdict = categorize(&region(kind, 0.02), Some(&token_context()), &policy);
        assert_eq!(verdict.recommendation, Recommendation::AutoApprove);
    }

    #[test]
    fn sizing_token_explains_a_resize() {
        let kind = ChangeKind::Resize {
            old: crate::types::Extent::new(20, 20),
            new: crate::types::Extent::new(32, 32),
        };
        let mut ctx = empty_context();
        ctx.token_changes.push(TokenChange {
            name: "button-size".to_string(),
            old_value: "20px".to_string(),
            new_value: "32px".to_string(),
            commit: "def456".to_string(),
        });
        let verdict = categorize(&region(kind, 0.04), Some(&ctx), &Policy::default());
        assert_eq!(verdict.category, Category::Expected);
        assert!(verdict
            .evidence
            .iter()
            .any(|e| matches!(e, Evidence::Token { name, .. } if name == "button-size")));
    }

    #[test]
    fn commit_mention_of_the_new_value_is_expected() {
        let kind = ChangeKind::ColorShift {
            old: WHITE,
            new: DARK_BLUE,
        };
        let mut ctx = empty_context();
        ctx.commits
            .push(commit("9f3c2d1", "Darken primary buttons to #1976D2"));

        let verdict = categorize(&region(kind, 0.08), Some(&ctx), &Policy::default());
        assert_eq!(verdict.category, Category::Expected);
        assert!(verdict
            .evidence
            .iter()
            .any(|e| matches!(e, Evidence::Commit { id, .. } if id == "9f3c2d1")));
    }

    #[test]
    fn tiny_shift_is_ignored() {
        let verdict = categorize(
            &region(ChangeKind::Shift { dx: 1, dy: -1 }, 0.02),
            Some(&empty_context()),
            &Policy::default(),
        );
        assert_eq!(verdict.category, Category::Ignore);
        assert_eq!(verdict.confidence, CONFIDENCE_SHIFT);
        assert_eq!(verdict.recommendation, Recommendation::Approve);
    }

    #[test]
    fn large_shift_without_layout_commit_is_an_error() {
        let verdict = categorize(
            &region(ChangeKind::Shift { dx: 6, dy: 0 }, 0.02),
            Some(&empty_context()),
            &Policy::default(),
        );
        assert_eq!(verdict.category, Category::Error);
        assert!(verdict.reason.contains("(6, 0)"), "got: {}", verdict.reason);
    }

    #[test]
    fn shift_embedded_in_a_larger_value_is_not_a_mention() {
        // "16px" in the commit must not pass for a mention of the 6px
        // displacement; the shift table still decides.
        let mut ctx = empty_context();
        ctx.commits.push(commit("4e5f6a7", "Bump header avatar to 16px"));
        let verdict = categorize(
            &region(ChangeKind::Shift { dx: 6, dy: 0 }, 0.02),
            Some(&ctx),
            &Policy::default(),
        );
        assert_eq!(verdict.category, Category::Error);
        assert!(
            verdict.reason.contains("no layout-affecting commit"),
            "got: {}",
            verdict.reason
        );
    }

    #[test]
    fn large_shift_with_layout_commit_is_a_warning() {
        let mut ctx = empty_context();
        ctx.commits
            .push(commit("71b0a44", "Refactor header spacing for the new grid"));
        let verdict = categorize(
            &region(ChangeKind::Shift { dx: 6, dy: 0 }, 0.02),
            Some(&ctx),
            &Policy::default(),
        );
        assert_eq!(verdict.category, Category::Warning);
        assert!(verdict
            .evidence
            .iter()
            .any(|e| matches!(e, Evidence::Commit { id, .. } if id == "71b0a44")));
    }

    #[test]
    fn moderate_shift_is_a_warning() {
        let verdict = categorize(
            &region(ChangeKind::Shift { dx: 4, dy: 0 }, 0.02),
            Some(&empty_context()),
            &Policy::default(),
        );
        assert_eq!(verdict.category, Category::Warning);
    }

    #[test]
    fn ratio_buckets_map_boundaries_upward() {
        let policy = Policy::default();
        let ctx = empty_context();
        let cases = [
            (0.0005, Category::Ignore),
            (0.001, Category::Expected),
            (0.005, Category::Expected),
            (0.01, Category::Warning),
            (0.03, Category::Warning),
            (0.05, Category::Error),
            (0.2, Category::Error),
        ];
        for (ratio, want) in cases {
            let verdict = categorize(&region(ChangeKind::Content, ratio), Some(&ctx), &policy);
            assert_eq!(verdict.category, want, "ratio {ratio}");
            assert_eq!(verdict.confidence, CONFIDENCE_RATIO);
        }
    }

    #[test]
    fn degraded_mode_caps_confidence_and_records_missing_context() {
        let kind = ChangeKind::ColorShift {
            old: LIGHT_BLUE,
            new: DARK_BLUE,
        };
        let verdict = categorize(&region(kind, 0.02), None, &Policy::default());
        assert_eq!(verdict.category, Category::Warning);
        assert_eq!(verdict.confidence, CONFIDENCE_DEGRADED);
        assert!(verdict
            .evidence
            .iter()
            .any(|e| matches!(e, Evidence::NoneAvailable)));
    }

    #[test]
    fn contrast_override_survives_degraded_mode() {
        let kind = ChangeKind::ColorShift {
            old: DARK_BLUE,
            new: LIGHT_BLUE,
        };
        let verdict = categorize(&region(kind, 0.002), None, &Policy::default());
        assert_eq!(verdict.category, Category::Error);
        assert_eq!(verdict.confidence, CONFIDENCE_DEGRADED);
        assert!(verdict.reason.contains("contrast"), "got: {}", verdict.reason);
    }
}
