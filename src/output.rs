//! Versioned machine-readable output envelopes.
//!
//! Everything the binary prints as JSON goes through [`VdcOutput`] so
//! consumers can dispatch on `mode` and pin `version`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{Notifications, Route};
use crate::error::ErrorPayload;
use crate::report::{RunReport, StoryReport};
use crate::types::Category;

/// Schema version for output payloads.
pub const VDC_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum VdcOutput {
    Run(RunOutput),
    Compare(CompareOutput),
    Error(ErrorOutput),
}

impl VdcOutput {
    pub fn run(report: RunReport, notification: NotifyDecision) -> VdcOutput {
        VdcOutput::Run(RunOutput {
            version: VDC_OUTPUT_VERSION.to_string(),
            report,
            notification,
        })
    }

    pub fn compare(baseline: PathBuf, current: PathBuf, story: StoryReport) -> VdcOutput {
        VdcOutput::Compare(CompareOutput {
            version: VDC_OUTPUT_VERSION.to_string(),
            baseline,
            current,
            story,
        })
    }

    pub fn error(payload: ErrorPayload) -> VdcOutput {
        VdcOutput::Error(ErrorOutput {
            version: VDC_OUTPUT_VERSION.to_string(),
            error: payload,
        })
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A full `check` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub version: String,
    #[serde(flatten)]
    pub report: RunReport,
    pub notification: NotifyDecision,
}

/// A one-off two-file comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareOutput {
    pub version: String,
    pub baseline: PathBuf,
    pub current: PathBuf,
    #[serde(flatten)]
    pub story: StoryReport,
}

/// A fatal failure before a report existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    pub error: ErrorPayload,
}

/// Whether and where the run result should be announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyDecision {
    pub notify: bool,
    /// Announce only on the pull request, not the team channel.
    pub pr_only: bool,
}

/// Applies the configured notification routes to the run's worst category.
pub fn notify_decision(category: Option<Category>, routes: &Notifications) -> NotifyDecision {
    let route = match category {
        Some(Category::Error) => routes.on_error,
        Some(Category::Warning) => routes.on_warning,
        _ => routes.on_success,
    };
    match route {
        Route::Always => NotifyDecision {
            notify: true,
            pr_only: false,
        },
        Route::PrOnly => NotifyDecision {
            notify: true,
            pr_only: true,
        },
        Route::Never => NotifyDecision {
            notify: false,
            pr_only: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, VdcError};
    use crate::types::Extent;

    #[test]
    fn run_output_serializes_with_mode_tag() {
        let report = RunReport::from_stories(vec![StoryReport::first_run("header", None)], false, 42);
        let notification = notify_decision(report.category, &Notifications::default());
        let json = VdcOutput::run(report, notification).to_json().unwrap();
        assert!(json.contains("\"mode\": \"run\""), "got: {json}");
        assert!(json.contains(VDC_OUTPUT_VERSION), "got: {json}");
        assert!(json.contains("\"outcome\": \"pass\""), "got: {json}");
    }

    #[test]
    fn compare_output_serializes_with_mode_tag() {
        let story = StoryReport::analyzed("comparison", vec![]);
        let json = VdcOutput::compare("a.png".into(), "b.png".into(), story)
            .to_json()
            .unwrap();
        assert!(json.contains("\"mode\": \"compare\""), "got: {json}");
        assert!(json.contains("\"baseline\": \"a.png\""), "got: {json}");
    }

    #[test]
    fn error_output_carries_the_payload() {
        let err = VdcError::incompatible(Extent::new(800, 600), Extent::new(800, 400));
        let json = VdcOutput::error(err.to_payload()).to_json().unwrap();
        assert!(json.contains("\"mode\": \"error\""), "got: {json}");
        assert!(json.contains("\"category\": \"baseline\""), "got: {json}");
        assert!(json.contains("800x600"), "got: {json}");
    }

    #[test]
    fn error_payload_round_trips() {
        let payload = ErrorPayload::new(ErrorCategory::Network, "timeout".to_string(), "retry");
        let json = serde_json::to_string(&payload).unwrap();
        let back: ErrorPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.category, ErrorCategory::Network);
        assert_eq!(back.remediation.as_deref(), Some("retry"));
    }

    #[test]
    fn default_routes_notify_errors_everywhere_and_warnings_on_prs() {
        let routes = Notifications::default();
        let on_error = notify_decision(Some(Category::Error), &routes);
        assert!(on_error.notify && !on_error.pr_only);

        let on_warning = notify_decision(Some(Category::Warning), &routes);
        assert!(on_warning.notify && on_warning.pr_only);

        let on_success = notify_decision(Some(Category::Expected), &routes);
        assert!(!on_success.notify);

        let first_run = notify_decision(None, &routes);
        assert!(!first_run.notify);
    }
}
