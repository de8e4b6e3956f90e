//! Per-story and per-run reports.
//!
//! Aggregation is always the maximum severity: a story is as bad as its
//! worst region, a run as bad as its worst story. First runs carry no
//! category at all and never fail the gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Category, ChangeRegion, Extent, Verdict};

/// One analyzed region together with its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionReport {
    #[serde(flatten)]
    pub region: ChangeRegion,
    pub verdict: Verdict,
}

/// How a story's comparison ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StoryStatus {
    /// Baseline and current were compared.
    Analyzed,
    /// No usable baseline existed; the current screenshot seeds one.
    #[serde(rename_all = "camelCase")]
    FirstRun { corrupt_baseline: bool },
    /// The baseline's dimensions do not match the current screenshot.
    Incompatible { baseline: Extent, current: Extent },
    /// The story ran out of time or the run was cancelled under it.
    Aborted { reason: String },
}

/// What happened to the story's stored baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaselineAction {
    /// Nothing to do (aborted, incompatible, or report-only).
    #[default]
    None,
    /// First run: the current screenshot was stored as the baseline.
    Captured,
    /// Every region resolved; the baseline was replaced.
    Refreshed,
    /// At least one region is unresolved or rejected; baseline kept.
    Kept,
}

/// Region counts by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub ignore: u32,
    pub expected: u32,
    pub warning: u32,
    pub error: u32,
}

impl CategoryCounts {
    pub fn add(&mut self, category: Category) {
        match category {
            Category::Ignore => self.ignore += 1,
            Category::Expected => self.expected += 1,
            Category::Warning => self.warning += 1,
            Category::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.ignore + self.expected + self.warning + self.error
    }

    pub fn merge(&mut self, other: &CategoryCounts) {
        self.ignore += other.ignore;
        self.expected += other.expected;
        self.warning += other.warning;
        self.error += other.error;
    }
}

/// Everything the run knows about one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryReport {
    pub story: String,
    #[serde(flatten)]
    pub status: StoryStatus,
    /// Worst category across regions; absent for first runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<RegionReport>,
    pub counts: CategoryCounts,
    #[serde(default)]
    pub baseline: BaselineAction,
    /// Token definitions a reviewer asked to sync.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_syncs: Vec<String>,
    /// Degraded context, advisory timeouts, corrupt-baseline details.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl StoryReport {
    /// A compared story. Category is the worst verdict, Ignore when the
    /// screenshots were identical.
    pub fn analyzed(story: impl Into<String>, regions: Vec<(ChangeRegion, Verdict)>) -> Self {
        let mut counts = CategoryCounts::default();
        let mut worst = Category::Ignore;
        let regions: Vec<RegionReport> = regions
            .into_iter()
            .map(|(region, verdict)| {
                counts.add(verdict.category);
                worst = worst.max(verdict.category);
                RegionReport { region, verdict }
            })
            .collect();
        StoryReport {
            story: story.into(),
            status: StoryStatus::Analyzed,
            category: Some(worst),
            regions,
            counts,
            baseline: BaselineAction::None,
            token_syncs: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// A story with no usable baseline. Passing; the current screenshot
    /// becomes the baseline.
    pub fn first_run(story: impl Into<String>, corrupt_detail: Option<String>) -> Self {
        let mut notes = Vec::new();
        if let Some(detail) = &corrupt_detail {
            notes.push(format!("stored baseline was unreadable: {detail}"));
        }
        StoryReport {
            story: story.into(),
            status: StoryStatus::FirstRun {
                corrupt_baseline: corrupt_detail.is_some(),
            },
            category: None,
            regions: Vec::new(),
            counts: CategoryCounts::default(),
            baseline: BaselineAction::None,
            token_syncs: Vec::new(),
            notes,
        }
    }

    /// Baseline and current screenshot disagree on dimensions.
    pub fn incompatible(story: impl Into<String>, baseline: Extent, current: Extent) -> Self {
        StoryReport {
            story: story.into(),
            status: StoryStatus::Incompatible { baseline, current },
            category: Some(Category::Error),
            regions: Vec::new(),
            counts: CategoryCounts::default(),
            baseline: BaselineAction::None,
            token_syncs: Vec::new(),
            notes: vec![format!(
                "baseline is {baseline}, current is {current}; re-capture required"
            )],
        }
    }

    /// The story's analysis never finished.
    pub fn aborted(story: impl Into<String>, reason: impl Into<String>) -> Self {
        StoryReport {
            story: story.into(),
            status: StoryStatus::Aborted {
                reason: reason.into(),
            },
            category: Some(Category::Warning),
            regions: Vec::new(),
            counts: CategoryCounts::default(),
            baseline: BaselineAction::None,
            token_syncs: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// First runs request a baseline capture.
    pub fn requests_capture(&self) -> bool {
        matches!(self.status, StoryStatus::FirstRun { .. })
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    Pass,
    Fail,
    Aborted,
}

/// The whole run: every story, aggregated counts, and the gate outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub stories: Vec<StoryReport>,
    /// Worst story category; absent when every story was a first run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub outcome: RunOutcome,
    pub counts: CategoryCounts,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    /// Builds the run report. `aborted` marks a cancelled run, which is
    /// never a pass regardless of what completed.
    pub fn from_stories(stories: Vec<StoryReport>, aborted: bool, duration_ms: u64) -> Self {
        let category = stories.iter().filter_map(|s| s.category).max();
        let mut counts = CategoryCounts::default();
        for story in &stories {
            counts.merge(&story.counts);
        }
        let outcome = if aborted {
            RunOutcome::Aborted
        } else if category == Some(Category::Error) {
            RunOutcome::Fail
        } else {
            RunOutcome::Pass
        };
        RunReport {
            stories,
            category,
            outcome,
            counts,
            generated_at: Utc::now(),
            duration_ms,
        }
    }

    /// Process exit code: pass 0, gate failure 1, aborted 3. Fatal errors
    /// exit 2 before a report exists.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Pass => 0,
            RunOutcome::Fail => 1,
            RunOutcome::Aborted => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeKind, Evidence, PixelBox, Recommendation};

    fn region(ratio: f32) -> ChangeRegion {
        ChangeRegion {
            bounds: PixelBox::new(0, 0, 10, 10),
            pixel_count: 100,
            ratio,
            mean_magnitude: 0.5,
            kind: ChangeKind::Content,
            background: None,
        }
    }

    fn verdict(category: Category) -> Verdict {
        Verdict {
            category,
            reason: "test".to_string(),
            evidence: vec![Evidence::NoneAvailable],
            recommendation: Recommendation::Review,
            confidence: 0.75,
            advisory: None,
        }
    }

    #[test]
    fn story_category_is_the_worst_region() {
        let report = StoryReport::analyzed(
            "buttons/primary",
            vec![
                (region(0.002), verdict(Category::Expected)),
                (region(0.08), verdict(Category::Error)),
                (region(0.02), verdict(Category::Warning)),
            ],
        );
        assert_eq!(report.category, Some(Category::Error));
        assert_eq!(report.counts.expected, 1);
        assert_eq!(report.counts.warning, 1);
        assert_eq!(report.counts.error, 1);
        assert_eq!(report.counts.total(), 3);
    }

    #[test]
    fn identical_story_is_ignore() {
        let report = StoryReport::analyzed("header", vec![]);
        assert_eq!(report.category, Some(Category::Ignore));
        assert!(report.regions.is_empty());
    }

    #[test]
    fn first_run_has_no_category_and_requests_capture() {
        let report = StoryReport::first_run("new-story", None);
        assert_eq!(report.category, None);
        assert!(report.requests_capture());
        assert!(report.notes.is_empty());
    }

    #[test]
    fn corrupt_baseline_is_a_first_run_with_a_note() {
        let report = StoryReport::first_run("header", Some("unexpected EOF".to_string()));
        assert_eq!(
            report.status,
            StoryStatus::FirstRun {
                corrupt_baseline: true
            }
        );
        assert!(report.requests_capture());
        assert!(report.notes[0].contains("unexpected EOF"));
    }

    #[test]
    fn incompatible_baseline_is_an_error_with_both_extents() {
        let report =
            StoryReport::incompatible("header", Extent::new(800, 600), Extent::new(800, 400));
        assert_eq!(report.category, Some(Category::Error));
        assert!(report.notes[0].contains("800x600"));
        assert!(report.notes[0].contains("800x400"));
    }

    #[test]
    fn aborted_story_is_a_warning() {
        let report = StoryReport::aborted("slow-story", "story timed out after 30s");
        assert_eq!(report.category, Some(Category::Warning));
    }

    #[test]
    fn run_category_is_the_worst_story() {
        let run = RunReport::from_stories(
            vec![
                StoryReport::analyzed("a", vec![(region(0.002), verdict(Category::Expected))]),
                StoryReport::analyzed("b", vec![(region(0.02), verdict(Category::Warning))]),
            ],
            false,
            1200,
        );
        assert_eq!(run.category, Some(Category::Warning));
        assert_eq!(run.outcome, RunOutcome::Pass);
        assert_eq!(run.exit_code(), 0);
    }

    #[test]
    fn error_story_fails_the_gate() {
        let run = RunReport::from_stories(
            vec![StoryReport::analyzed(
                "a",
                vec![(region(0.08), verdict(Category::Error))],
            )],
            false,
            800,
        );
        assert_eq!(run.outcome, RunOutcome::Fail);
        assert_eq!(run.exit_code(), 1);
    }

    #[test]
    fn first_runs_alone_still_pass() {
        let run = RunReport::from_stories(vec![StoryReport::first_run("a", None)], false, 100);
        assert_eq!(run.category, None);
        assert_eq!(run.outcome, RunOutcome::Pass);
    }

    #[test]
    fn aborted_run_is_never_a_pass() {
        let run = RunReport::from_stories(
            vec![StoryReport::analyzed(
                "a",
                vec![(region(0.002), verdict(Category::Expected))],
            )],
            true,
            400,
        );
        assert_eq!(run.outcome, RunOutcome::Aborted);
        assert_eq!(run.exit_code(), 3);
    }

    #[test]
    fn story_report_serializes_with_status_tag() {
        let report = StoryReport::first_run("header", None);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"firstRun\""), "got: {json}");
        assert!(json.contains("\"corruptBaseline\":false"), "got: {json}");

        let report =
            StoryReport::incompatible("header", Extent::new(800, 600), Extent::new(800, 400));
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"incompatible\""), "got: {json}");
    }
}
