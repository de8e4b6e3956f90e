use crate::screenshot::ScreenshotError;
use crate::types::Extent;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum VdcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Baseline incompatible: baseline is {baseline}, current is {current}")]
    IncompatibleBaseline { baseline: Extent, current: Extent },

    #[error("No baseline recorded for story '{0}'")]
    MissingBaseline(String),

    #[error("Baseline for story '{story}' is unreadable: {detail}")]
    CorruptBaseline { story: String, detail: String },

    #[error("Change context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("Advisory classifier did not answer within {0}")]
    ClassifierTimeout(String),

    #[error("Run aborted: {0}")]
    RunAborted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl VdcError {
    pub fn incompatible(baseline: Extent, current: Extent) -> Self {
        VdcError::IncompatibleBaseline { baseline, current }
    }

    pub fn corrupt_baseline(story: impl Into<String>, detail: impl Into<String>) -> Self {
        VdcError::CorruptBaseline {
            story: story.into(),
            detail: detail.into(),
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            VdcError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            VdcError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            VdcError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            VdcError::Image(e) => ErrorPayload::new(
                ErrorCategory::Image,
                e.to_string(),
                "Verify image path/format and readability.",
            ),
            VdcError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON/serialization inputs; run with --verbose for details.",
            ),
            VdcError::IncompatibleBaseline { .. } => ErrorPayload::new(
                ErrorCategory::Baseline,
                self.to_string(),
                "Re-capture the baseline at the current viewport, or fix the capture size; dimension changes are never diffed.",
            ),
            VdcError::MissingBaseline(story) => ErrorPayload::new(
                ErrorCategory::Baseline,
                format!("No baseline recorded for story '{}'", story),
                "First run for this story; approve the captured screenshot to establish a baseline.",
            ),
            VdcError::CorruptBaseline { .. } => ErrorPayload::new(
                ErrorCategory::Baseline,
                self.to_string(),
                "Delete or re-capture the stored baseline; it could not be decoded.",
            ),
            VdcError::ContextUnavailable(msg) => ErrorPayload::new(
                ErrorCategory::Context,
                msg.to_string(),
                "Provide --context with a change-context JSON file; without it verdicts run in degraded mode.",
            ),
            VdcError::ClassifierTimeout(_) => ErrorPayload::new(
                ErrorCategory::Advisory,
                self.to_string(),
                "Increase timeouts.classifier or disable the advisory endpoint; deterministic rules still applied.",
            ),
            VdcError::RunAborted(msg) => ErrorPayload::new(
                ErrorCategory::Aborted,
                msg.to_string(),
                "Re-run the check; completed stories were reported but the run did not finish.",
            ),
            VdcError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("threshold") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Thresholds must satisfy 0 < ignore < expected < warning <= 1 (e.g., 0.001 / 0.01 / 0.05).",
                    )
                } else if lower.contains("api key") || lower.contains("api_key") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Set VDC_ADVISORY_API_KEY (or OPENAI_API_KEY) or configure ai_analysis.api_key.",
                    )
                } else if lower.contains("not found") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Verify the path exists; use an absolute path or run from the project root.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags/paths (e.g., --baseline-dir, --current-dir) and the config file.",
                    )
                }
            }
            VdcError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

impl From<ScreenshotError> for VdcError {
    fn from(err: ScreenshotError) -> Self {
        match err {
            ScreenshotError::Decode(e) => VdcError::Image(e),
            ScreenshotError::NotFound(path) => VdcError::Config(format!("File not found: {}", path)),
            ScreenshotError::Save(msg) => VdcError::Io(std::io::Error::other(format!(
                "Failed to save image: {}",
                msg
            ))),
        }
    }
}

pub type Result<T> = std::result::Result<T, VdcError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Network,
    Image,
    Baseline,
    Context,
    Advisory,
    Aborted,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompatible_payload_mentions_recapture() {
        let err = VdcError::incompatible(Extent::new(800, 600), Extent::new(800, 400));
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Baseline);
        assert!(
            payload.message.contains("800x600") && payload.message.contains("800x400"),
            "expected both extents in the message, got: {}",
            payload.message
        );
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.to_ascii_lowercase().contains("re-capture"),
            "expected re-capture remediation, got: {remediation}"
        );
    }

    #[test]
    fn missing_baseline_payload_points_at_first_run() {
        let err = VdcError::MissingBaseline("button/primary".to_string());
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Baseline);
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.to_ascii_lowercase().contains("first run"),
            "expected first-run remediation, got: {remediation}"
        );
    }

    #[test]
    fn config_payload_explains_threshold_ordering() {
        let err = VdcError::Config("thresholds.expected must exceed thresholds.ignore".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("ignore < expected < warning"),
            "expected threshold ordering hint, got: {remediation}"
        );
    }

    #[test]
    fn config_payload_names_api_key_envs() {
        let err = VdcError::Config("advisory endpoint set but no API key found".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("VDC_ADVISORY_API_KEY"),
            "expected env var hint, got: {remediation}"
        );
    }

    #[test]
    fn config_payload_uses_default_remediation_for_other_messages() {
        let err = VdcError::Config("Some other config issue".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("Check flags/paths"),
            "expected default remediation for generic config errors"
        );
    }

    #[test]
    fn classifier_timeout_payload_keeps_deterministic_promise() {
        let err = VdcError::ClassifierTimeout("10s".to_string());
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Advisory);
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.contains("deterministic"),
            "expected note that deterministic rules still applied, got: {remediation}"
        );
    }

    #[test]
    fn screenshot_not_found_maps_to_config() {
        let err: VdcError = ScreenshotError::NotFound("missing.png".to_string()).into();
        assert!(matches!(err, VdcError::Config(_)));
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.to_ascii_lowercase().contains("path"),
            "expected path remediation, got: {remediation}"
        );
    }
}
