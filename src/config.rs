//! Run policy: thresholds, auto-approval flags, notification routing,
//! advisory settings, differ tunables, and timeouts.
//!
//! Loaded from TOML (`--config PATH`, else `$VDC_CONFIG`, else `./vdc.toml`)
//! with built-in defaults for every field. Keys accept both snake_case and
//! camelCase spellings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VdcError};
use crate::types::Category;

pub const DEFAULT_CONFIG_FILE: &str = "vdc.toml";
pub const CONFIG_ENV_VAR: &str = "VDC_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Policy {
    pub thresholds: Thresholds,
    #[serde(alias = "autoApprove")]
    pub auto_approve: AutoApprove,
    pub notifications: Notifications,
    #[serde(alias = "aiAnalysis")]
    pub ai_analysis: AiAnalysis,
    pub differ: DifferOptions,
    pub timeouts: Timeouts,
}

/// Change-ratio cutoffs partitioning [0, 1] into categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub ignore: f32,
    pub expected: f32,
    pub warning: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ignore: 0.001,
            expected: 0.01,
            warning: 0.05,
        }
    }
}

impl Thresholds {
    /// Maps a change ratio to its category bucket. A ratio equal to a
    /// bucket's upper bound belongs to the next bucket up, so exactly 1%
    /// is already [`Category::Warning`].
    pub fn category_for_ratio(&self, ratio: f32) -> Category {
        if ratio < self.ignore {
            Category::Ignore
        } else if ratio < self.expected {
            Category::Expected
        } else if ratio < self.warning {
            Category::Warning
        } else {
            Category::Error
        }
    }
}

/// Which kinds of expected changes may refresh the baseline without review.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoApprove {
    #[serde(alias = "tokenChanges")]
    pub token_changes: bool,
    #[serde(alias = "antiAliasing")]
    pub anti_aliasing: bool,
    pub timestamps: bool,
    pub uuids: bool,
    /// Catch-all for expected changes that match none of the named kinds.
    pub other: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    #[serde(alias = "onError")]
    pub on_error: Route,
    #[serde(alias = "onWarning")]
    pub on_warning: Route,
    #[serde(alias = "onSuccess")]
    pub on_success: Route,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            on_error: Route::Always,
            on_warning: Route::PrOnly,
            on_success: Route::Never,
        }
    }
}

/// Where a notification for a given outcome should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    Always,
    PrOnly,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiAnalysis {
    /// Whether to consult the advisory vision classifier at all.
    pub enabled: bool,
    #[serde(alias = "lookbackDays")]
    pub lookback_days: u32,
    /// OpenAI-compatible chat-completions endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Falls back to `VDC_ADVISORY_API_KEY` / `OPENAI_API_KEY` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Most regions per story worth an advisory round-trip.
    #[serde(alias = "maxRegions")]
    pub max_regions: usize,
}

impl Default for AiAnalysis {
    fn default() -> Self {
        Self {
            enabled: false,
            lookback_days: 30,
            endpoint: None,
            model: None,
            api_key: None,
            max_regions: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferOptions {
    /// Per-pixel magnitude below this is not a change (anti-aliasing slack).
    pub tolerance: f32,
    /// Regions whose boxes are within this many pixels merge into one.
    #[serde(alias = "proximityMargin")]
    pub proximity_margin: u32,
    /// Search radius for shift detection, in pixels per axis.
    #[serde(alias = "maxShift")]
    pub max_shift: u32,
}

impl Default for DifferOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.04,
            proximity_margin: 8,
            max_shift: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wall-clock budget for analyzing one story.
    #[serde(with = "humantime_serde")]
    pub story: Duration,
    /// Budget for one advisory classifier round-trip.
    #[serde(with = "humantime_serde")]
    pub classifier: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            story: Duration::from_secs(30),
            classifier: Duration::from_secs(10),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            auto_approve: AutoApprove::default(),
            notifications: Notifications::default(),
            ai_analysis: AiAnalysis::default(),
            differ: DifferOptions::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Policy {
    /// Loads the policy without validating it; callers run [`Policy::validate`]
    /// before use. Resolution order: explicit path, `$VDC_CONFIG`, `./vdc.toml`,
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Policy> {
        let resolved: Option<PathBuf> = match path {
            Some(p) => Some(p.to_path_buf()),
            None => match std::env::var(CONFIG_ENV_VAR) {
                Ok(p) if !p.is_empty() => Some(PathBuf::from(p)),
                _ => {
                    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                    local.exists().then_some(local)
                }
            },
        };

        let Some(file) = resolved else {
            return Ok(Policy::default());
        };
        if !file.exists() {
            return Err(VdcError::Config(format!(
                "config file not found: {}",
                file.display()
            )));
        }
        let raw = std::fs::read_to_string(&file)?;
        toml::from_str(&raw)
            .map_err(|e| VdcError::Config(format!("invalid config {}: {}", file.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.ignore > 0.0 && t.ignore < t.expected && t.expected < t.warning && t.warning <= 1.0)
        {
            return Err(VdcError::Config(format!(
                "thresholds must satisfy 0 < ignore < expected < warning <= 1, got {} / {} / {}",
                t.ignore, t.expected, t.warning
            )));
        }
        if !(0.0..1.0).contains(&self.differ.tolerance) {
            return Err(VdcError::Config(format!(
                "differ.tolerance must be in [0, 1), got {}",
                self.differ.tolerance
            )));
        }
        if self.ai_analysis.max_regions == 0 {
            return Err(VdcError::Config(
                "ai_analysis.max_regions must be at least 1".to_string(),
            ));
        }
        if self.timeouts.story.is_zero() || self.timeouts.classifier.is_zero() {
            return Err(VdcError::Config(
                "timeouts.story and timeouts.classifier must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_expected() {
        let policy = Policy::default();

        assert!((policy.thresholds.ignore - 0.001).abs() < f32::EPSILON);
        assert!((policy.thresholds.expected - 0.01).abs() < f32::EPSILON);
        assert!((policy.thresholds.warning - 0.05).abs() < f32::EPSILON);
        assert!(!policy.auto_approve.token_changes);
        assert_eq!(policy.notifications.on_error, Route::Always);
        assert_eq!(policy.notifications.on_warning, Route::PrOnly);
        assert_eq!(policy.notifications.on_success, Route::Never);
        assert_eq!(policy.ai_analysis.lookback_days, 30);
        assert_eq!(policy.timeouts.story, Duration::from_secs(30));
        assert_eq!(policy.timeouts.classifier, Duration::from_secs(10));
        policy.validate().expect("defaults must validate");
    }

    #[test]
    fn ratio_boundaries_map_to_the_higher_category() {
        let t = Thresholds::default();
        assert_eq!(t.category_for_ratio(0.0), Category::Ignore);
        assert_eq!(t.category_for_ratio(0.0009), Category::Ignore);
        assert_eq!(t.category_for_ratio(0.001), Category::Expected);
        assert_eq!(t.category_for_ratio(0.0099), Category::Expected);
        assert_eq!(t.category_for_ratio(0.01), Category::Warning);
        assert_eq!(t.category_for_ratio(0.049), Category::Warning);
        assert_eq!(t.category_for_ratio(0.05), Category::Error);
        assert_eq!(t.category_for_ratio(1.0), Category::Error);
    }

    #[test]
    fn toml_accepts_camel_case_aliases() {
        let policy: Policy = toml::from_str(
            r#"
            [thresholds]
            ignore = 0.002
            expected = 0.02
            warning = 0.2

            [autoApprove]
            tokenChanges = true
            antiAliasing = true

            [notifications]
            onWarning = "always"

            [aiAnalysis]
            lookbackDays = 7

            [timeouts]
            story = "45s"
            "#,
        )
        .unwrap();

        assert!((policy.thresholds.expected - 0.02).abs() < f32::EPSILON);
        assert!(policy.auto_approve.token_changes);
        assert!(policy.auto_approve.anti_aliasing);
        assert!(!policy.auto_approve.timestamps);
        assert_eq!(policy.notifications.on_warning, Route::Always);
        assert_eq!(policy.ai_analysis.lookback_days, 7);
        assert_eq!(policy.timeouts.story, Duration::from_secs(45));
        assert_eq!(policy.timeouts.classifier, Duration::from_secs(10));
        policy.validate().unwrap();
    }

    #[test]
    fn toml_accepts_snake_case_spellings() {
        let policy: Policy = toml::from_str(
            r#"
            [auto_approve]
            token_changes = true

            [notifications]
            on_success = "pr-only"

            [differ]
            proximity_margin = 12
            "#,
        )
        .unwrap();
        assert!(policy.auto_approve.token_changes);
        assert_eq!(policy.notifications.on_success, Route::PrOnly);
        assert_eq!(policy.differ.proximity_margin, 12);
    }

    #[test]
    fn misordered_thresholds_fail_validation() {
        let policy = Policy {
            thresholds: Thresholds {
                ignore: 0.05,
                expected: 0.01,
                warning: 0.1,
            },
            ..Policy::default()
        };
        let err = policy.validate().unwrap_err();
        assert!(
            err.to_string().contains("thresholds"),
            "expected threshold message, got: {err}"
        );
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let policy = Policy {
            timeouts: Timeouts {
                story: Duration::ZERO,
                classifier: Duration::from_secs(10),
            },
            ..Policy::default()
        };
        assert!(policy.validate().is_err());
    }
}
