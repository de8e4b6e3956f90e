//! Visual Diff Categorizer (VDC) Library
//!
//! A library for comparing UI screenshots against stored baselines and
//! categorizing every changed region by what kind of change it is and how
//! much a reviewer should care. Deterministic rules decide; an optional
//! vision classifier only annotates.
//!
//! # Module Overview
//!
//! - [`analysis`] - Pixel diffing, region extraction, change-kind inference,
//!   and the categorization rule table
//! - [`context`] - Commit / PR / design-token change context
//! - [`approval`] - Approval recommendations and reviewer decision resolution
//! - [`advisory`] - Optional vision-model classifier for volatile content
//! - [`store`] - Screenshot sources and baseline stores
//! - [`runner`] - Concurrent multi-story orchestration
//! - [`report`] - Per-story and per-run reports
//! - [`config`] - Policy file support
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use vdc_lib::{analyze_pair, categorize, Policy, Screenshot};
//!
//! # fn example() -> vdc_lib::Result<()> {
//! let baseline = Screenshot::load(Path::new("baselines/button.png"))?;
//! let current = Screenshot::load(Path::new("current/button.png"))?;
//!
//! let policy = Policy::default();
//! let analysis = analyze_pair(&baseline, &current, &policy.differ)?;
//! for region in &analysis.regions {
//!     let verdict = categorize(region, None, &policy);
//!     println!("{}: {}", region.kind.label(), verdict.reason);
//! }
//! # Ok(())
//! # }
//! ```

pub mod advisory;
pub mod analysis;
pub mod approval;
pub mod config;
pub mod context;
pub mod error;
pub mod output;
pub mod report;
pub mod runner;
pub mod screenshot;
pub mod store;
pub mod types;

// Analysis re-exports
pub use analysis::{
    analyze_pair, categorize, classify_region, contrast_ratio, diff_screenshots, render_heatmap,
    DiffMask, PairAnalysis, CONFIDENCE_DEGRADED, CONFIDENCE_OVERRIDE, CONFIDENCE_RATIO,
    CONFIDENCE_SHIFT, MIN_CONTRAST_RATIO,
};
pub use advisory::{AdvisoryClassifier, AdvisoryConfig, VisionClassifier};
pub use approval::{
    annotate, approval_kind, recommendation_for, resolve_story, ApprovalKind, DecisionSet,
    RegionDecision, ReviewDecision, StoryResolution,
};
pub use config::{
    AiAnalysis, AutoApprove, DifferOptions, Notifications, Policy, Route, Thresholds, Timeouts,
};
pub use context::{Commit, ContextSnapshot, TokenChange};
pub use error::{ErrorCategory, ErrorPayload, Result, VdcError};
pub use output::{
    notify_decision, CompareOutput, ErrorOutput, NotifyDecision, RunOutput, VdcOutput,
    VDC_OUTPUT_VERSION,
};
pub use report::{
    BaselineAction, CategoryCounts, RegionReport, RunOutcome, RunReport, StoryReport, StoryStatus,
};
pub use runner::{run, ProgressCallback, RunRequest};
pub use screenshot::{Screenshot, ScreenshotError};
pub use store::{BaselineLookup, BaselineStore, DirSource, DirStore, MemoryStore, StorySource};
pub use types::{
    AdvisoryNote, Category, ChangeKind, ChangeRegion, Evidence, Extent, PixelBox, Recommendation,
    Rgb, Verdict, VolatileKind,
};
