use std::path::Path;
use std::time::Duration;

use vdc_lib::{Policy, VdcError};

/// CLI overrides for the check command; `None` keeps the policy value.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckOverrides {
    pub story_timeout: Option<u64>,
    pub lookback_days: Option<u32>,
    pub advisory: Option<bool>,
}

/// Apply CLI overrides onto the loaded policy, preferring CLI when present.
pub fn apply_check_overrides(policy: &mut Policy, overrides: &CheckOverrides) {
    if let Some(secs) = overrides.story_timeout {
        policy.timeouts.story = Duration::from_secs(secs);
    }
    if let Some(days) = overrides.lookback_days {
        policy.ai_analysis.lookback_days = days;
    }
    if let Some(enabled) = overrides.advisory {
        policy.ai_analysis.enabled = enabled;
    }
}

/// Load the policy from a TOML file and validate it.
/// Priority: explicit path > $VDC_CONFIG > ./vdc.toml > defaults
pub fn load_policy(path: Option<&Path>) -> Result<Policy, VdcError> {
    let policy = Policy::load(path)?;
    policy.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid policy ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid policy: {}", e));
        VdcError::Config(prefix)
    })?;
    Ok(policy)
}

/// Log the effective policy to stderr (verbose mode).
pub fn log_effective_policy(config_path: Option<&Path>, policy: &Policy) {
    eprintln!("{}", format_effective_policy(policy, config_path));
}

/// Format the effective policy as a single-line string.
pub fn format_effective_policy(policy: &Policy, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    let auto = &policy.auto_approve;
    format!(
        "Effective policy [{source}]: thresholds ignore<{}, expected<{}, warning<{}; tolerance={}, proximity={}px, max-shift={}px; timeouts: story={:?}, classifier={:?}; auto-approve: token-changes={}, anti-aliasing={}, timestamps={}, uuids={}; advisory={} (lookback {}d, max {} regions)",
        policy.thresholds.ignore,
        policy.thresholds.expected,
        policy.thresholds.warning,
        policy.differ.tolerance,
        policy.differ.proximity_margin,
        policy.differ.max_shift,
        policy.timeouts.story,
        policy.timeouts.classifier,
        auto.token_changes,
        auto.anti_aliasing,
        auto.timestamps,
        auto.uuids,
        if policy.ai_analysis.enabled { "on" } else { "off" },
        policy.ai_analysis.lookback_days,
        policy.ai_analysis.max_regions
    )
}
