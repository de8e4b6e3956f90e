//! Multi-story run orchestration.
//!
//! Stories are analyzed concurrently, each under its own wall-clock budget
//! and racing the run's cancellation token. A story that exceeds its budget
//! is reported as aborted while the rest of the run continues; cancelling
//! the token ends the run with whatever already completed. Baseline writes
//! happen in a sequential stage after analysis so an interrupted run never
//! leaves a half-updated store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::advisory::AdvisoryClassifier;
use crate::analysis::{analyze_pair, categorize, render_heatmap, DiffMask};
use crate::approval::{self, DecisionSet};
use crate::config::Policy;
use crate::context::ContextSnapshot;
use crate::error::{Result, VdcError};
use crate::report::{BaselineAction, RunReport, StoryReport, StoryStatus};
use crate::screenshot::Screenshot;
use crate::store::{BaselineLookup, BaselineStore, StorySource};
use crate::types::{Category, ChangeRegion, Verdict};

pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything one run needs. Collaborators are shared behind `Arc` so the
/// per-story tasks can borrow nothing from the caller.
pub struct RunRequest {
    pub source: Arc<dyn StorySource>,
    pub store: Arc<dyn BaselineStore>,
    /// Change context, fetched once before the run. `None` runs degraded.
    pub context: Option<Arc<ContextSnapshot>>,
    pub policy: Arc<Policy>,
    /// Reviewer decisions from an earlier run of the same stories.
    pub decisions: Arc<DecisionSet>,
    pub advisory: Option<Arc<dyn AdvisoryClassifier>>,
    /// Analyze and report without touching the baseline store.
    pub report_only: bool,
    /// Directory for per-story diff heatmaps; `None` skips rendering.
    pub artifacts_dir: Option<PathBuf>,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressCallback>,
}

/// What one story task hands back to the write stage.
struct StoryOutcome {
    report: StoryReport,
    /// Current screenshot, kept only when the write stage may store it.
    current: Option<Screenshot>,
    /// Analysis finished and every region resolved in favor of the change.
    refresh: bool,
}

/// What the blocking pixel stage hands back to the story task.
enum PixelStage {
    /// Story settled without categorization: first run, incompatible
    /// extents, or a load/diff failure.
    Settled(StoryOutcome),
    /// Regions categorized; advisory consult and decision resolution remain.
    Categorized {
        baseline: Screenshot,
        current: Screenshot,
        region_verdicts: Vec<(ChangeRegion, Verdict)>,
        notes: Vec<String>,
    },
}

/// Runs every story the source lists and assembles the run report.
///
/// Returns `Err` only for failures that prevent the run from starting at
/// all; per-story failures are folded into the report instead.
pub async fn run(request: RunRequest) -> Result<RunReport> {
    let started = Instant::now();
    let stories = request.source.stories()?;
    if stories.is_empty() {
        return Err(VdcError::Config(
            "story source listed no stories".to_string(),
        ));
    }
    emit(
        &request.progress,
        &format!("analyzing {} stories", stories.len()),
    );

    let mut tasks: JoinSet<StoryOutcome> = JoinSet::new();
    let mut names: HashMap<tokio::task::Id, String> = HashMap::new();
    for story in stories {
        let source = Arc::clone(&request.source);
        let store = Arc::clone(&request.store);
        let context = request.context.clone();
        let policy = Arc::clone(&request.policy);
        let decisions = Arc::clone(&request.decisions);
        let advisory = request.advisory.clone();
        let artifacts = request.artifacts_dir.clone();
        let cancel = request.cancel.clone();
        let name = story.clone();
        let handle = tasks.spawn(async move {
            let budget = policy.timeouts.story;
            let work = analyze_story(
                &story, source, store, context, policy, decisions, advisory, artifacts,
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => StoryOutcome {
                    report: StoryReport::aborted(&story, "run cancelled"),
                    current: None,
                    refresh: false,
                },
                finished = tokio::time::timeout(budget, work) => match finished {
                    Ok(outcome) => outcome,
                    Err(_) => StoryOutcome {
                        report: StoryReport::aborted(
                            &story,
                            format!("analysis exceeded the {budget:?} story budget"),
                        ),
                        current: None,
                        refresh: false,
                    },
                },
            }
        });
        names.insert(handle.id(), name);
    }

    let mut outcomes = Vec::with_capacity(names.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, outcome)) => {
                emit_story(&request.progress, &outcome.report);
                outcomes.push(outcome);
            }
            Err(join_error) => {
                let story = names
                    .get(&join_error.id())
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                outcomes.push(StoryOutcome {
                    report: StoryReport::aborted(story, format!("analysis task failed: {join_error}")),
                    current: None,
                    refresh: false,
                });
            }
        }
    }
    outcomes.sort_by(|a, b| a.report.story.cmp(&b.report.story));

    let aborted = request.cancel.is_cancelled();
    if !aborted && !request.report_only {
        apply_baseline_updates(&mut outcomes, request.store.as_ref(), &request.progress);
    }

    let reports = outcomes.into_iter().map(|o| o.report).collect();
    let elapsed = started.elapsed().as_millis() as u64;
    Ok(RunReport::from_stories(reports, aborted, elapsed))
}

/// One story, end to end. The pixel pipeline is synchronous and runs on a
/// blocking thread; the await on that stage is where the story budget and
/// the cancel token preempt. An over-budget stage keeps its thread until it
/// finishes, only the result is discarded.
#[allow(clippy::too_many_arguments)]
async fn analyze_story(
    story: &str,
    source: Arc<dyn StorySource>,
    store: Arc<dyn BaselineStore>,
    context: Option<Arc<ContextSnapshot>>,
    policy: Arc<Policy>,
    decisions: Arc<DecisionSet>,
    advisory: Option<Arc<dyn AdvisoryClassifier>>,
    artifacts_dir: Option<PathBuf>,
) -> StoryOutcome {
    let staged = {
        let story = story.to_string();
        let policy = Arc::clone(&policy);
        tokio::task::spawn_blocking(move || {
            analyze_pixels(
                &story,
                source.as_ref(),
                store.as_ref(),
                context.as_deref(),
                &policy,
                artifacts_dir.as_deref(),
            )
        })
        .await
    };

    let (baseline, current, mut region_verdicts, mut notes) = match staged {
        Ok(PixelStage::Settled(outcome)) => return outcome,
        Ok(PixelStage::Categorized {
            baseline,
            current,
            region_verdicts,
            notes,
        }) => (baseline, current, region_verdicts, notes),
        Err(join_error) => return failed(story, format!("analysis task failed: {join_error}")),
    };

    if let Some(classifier) = &advisory {
        consult_advisory(
            classifier.as_ref(),
            &baseline,
            &current,
            &mut region_verdicts,
            &mut notes,
            &policy,
        )
        .await;
    }

    let verdicts: Vec<Verdict> = region_verdicts.iter().map(|(_, v)| v.clone()).collect();
    let resolution = approval::resolve_story(&verdicts, decisions.for_story(story));

    let mut report = StoryReport::analyzed(story, region_verdicts);
    report.token_syncs = resolution.token_syncs;
    for note in notes {
        report.note(note);
    }

    let refresh = resolution.refresh_baseline;
    StoryOutcome {
        current: refresh.then_some(current),
        report,
        refresh,
    }
}

/// Load, diff, and categorize one story. Runs off the async runtime.
fn analyze_pixels(
    story: &str,
    source: &dyn StorySource,
    store: &dyn BaselineStore,
    context: Option<&ContextSnapshot>,
    policy: &Policy,
    artifacts_dir: Option<&Path>,
) -> PixelStage {
    let current = match source.load(story) {
        Ok(screenshot) => screenshot,
        Err(e) => {
            return PixelStage::Settled(failed(
                story,
                format!("current screenshot unavailable: {e}"),
            ))
        }
    };

    let lookup = match store.get(story) {
        Ok(lookup) => lookup,
        Err(e) => {
            return PixelStage::Settled(failed(story, format!("baseline lookup failed: {e}")))
        }
    };
    let baseline = match lookup {
        BaselineLookup::Found { screenshot, .. } => screenshot,
        BaselineLookup::Missing => {
            return PixelStage::Settled(StoryOutcome {
                report: StoryReport::first_run(story, None),
                current: Some(current),
                refresh: false,
            })
        }
        BaselineLookup::Corrupt { detail } => {
            return PixelStage::Settled(StoryOutcome {
                report: StoryReport::first_run(story, Some(detail)),
                current: Some(current),
                refresh: false,
            })
        }
    };

    if baseline.extent() != current.extent() {
        return PixelStage::Settled(StoryOutcome {
            report: StoryReport::incompatible(story, baseline.extent(), current.extent()),
            current: None,
            refresh: false,
        });
    }

    let analysis = match analyze_pair(&baseline, &current, &policy.differ) {
        Ok(analysis) => analysis,
        Err(e) => return PixelStage::Settled(failed(story, format!("analysis failed: {e}"))),
    };

    let mut notes = Vec::new();
    if context.is_none() && !analysis.regions.is_empty() {
        notes.push("no change context available; verdicts carry reduced confidence".to_string());
    }

    if let Some(dir) = artifacts_dir {
        if !analysis.regions.is_empty() {
            let path = dir.join(format!("{story}.png"));
            if let Err(e) = write_heatmap(&analysis.mask, &path) {
                notes.push(format!("heatmap not written: {e}"));
            }
        }
    }

    let region_verdicts: Vec<(ChangeRegion, Verdict)> = analysis
        .regions
        .iter()
        .map(|region| (region.clone(), categorize(region, context, policy)))
        .collect();

    PixelStage::Categorized {
        baseline,
        current,
        region_verdicts,
        notes,
    }
}

/// Asks the classifier about the most severe regions, worst first, up to the
/// configured cap. A slow or failing classifier only costs the note; the
/// deterministic verdicts stand either way.
async fn consult_advisory(
    classifier: &dyn AdvisoryClassifier,
    baseline: &Screenshot,
    current: &Screenshot,
    region_verdicts: &mut [(ChangeRegion, Verdict)],
    notes: &mut Vec<String>,
    policy: &Policy,
) {
    let mut order: Vec<usize> = (0..region_verdicts.len())
        .filter(|&i| region_verdicts[i].1.category > Category::Ignore)
        .collect();
    order.sort_by(|&a, &b| {
        let (region_a, verdict_a) = &region_verdicts[a];
        let (region_b, verdict_b) = &region_verdicts[b];
        verdict_b
            .category
            .cmp(&verdict_a.category)
            .then(
                region_b
                    .ratio
                    .partial_cmp(&region_a.ratio)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    let budget = policy.timeouts.classifier;
    for &index in order.iter().take(policy.ai_analysis.max_regions) {
        let answer = {
            let region = &region_verdicts[index].0;
            tokio::time::timeout(budget, classifier.describe(baseline, current, region)).await
        };
        match answer {
            Ok(Ok(note)) => {
                approval::annotate(&mut region_verdicts[index].1, note, &policy.auto_approve);
            }
            Ok(Err(e)) => {
                notes.push(format!("advisory classifier failed for region {index}: {e}"));
            }
            Err(_) => {
                notes.push(VdcError::ClassifierTimeout(format!("{budget:?}")).to_string());
            }
        }
    }
}

/// Sequential write stage. Failures are recorded on the story instead of
/// failing the run.
fn apply_baseline_updates(
    outcomes: &mut [StoryOutcome],
    store: &dyn BaselineStore,
    progress: &Option<ProgressCallback>,
) {
    for outcome in outcomes.iter_mut() {
        let report = &mut outcome.report;
        match report.status {
            StoryStatus::FirstRun { .. } => {
                let Some(current) = &outcome.current else {
                    continue;
                };
                match store.put(&report.story, current) {
                    Ok(()) => {
                        report.baseline = BaselineAction::Captured;
                        emit(progress, &format!("{}: baseline captured", report.story));
                    }
                    Err(e) => report.note(format!("baseline capture failed: {e}")),
                }
            }
            StoryStatus::Analyzed => {
                if !outcome.refresh {
                    report.baseline = BaselineAction::Kept;
                    continue;
                }
                let Some(current) = &outcome.current else {
                    report.baseline = BaselineAction::Kept;
                    continue;
                };
                match store.put(&report.story, current) {
                    Ok(()) => {
                        report.baseline = BaselineAction::Refreshed;
                        emit(progress, &format!("{}: baseline refreshed", report.story));
                    }
                    Err(e) => {
                        report.baseline = BaselineAction::Kept;
                        report.note(format!("baseline refresh failed: {e}"));
                    }
                }
            }
            StoryStatus::Incompatible { .. } | StoryStatus::Aborted { .. } => {}
        }
    }
}

fn write_heatmap(mask: &DiffMask, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    render_heatmap(mask).save(path)?;
    Ok(())
}

fn failed(story: &str, reason: String) -> StoryOutcome {
    StoryOutcome {
        report: StoryReport::aborted(story, reason),
        current: None,
        refresh: false,
    }
}

fn emit(progress: &Option<ProgressCallback>, message: &str) {
    if let Some(callback) = progress {
        callback(message);
    }
}

fn emit_story(progress: &Option<ProgressCallback>, report: &StoryReport) {
    let summary = match &report.status {
        StoryStatus::Analyzed => match report.category {
            Some(category) => format!("{:?}", category).to_ascii_lowercase(),
            None => "analyzed".to_string(),
        },
        StoryStatus::FirstRun { .. } => "first run".to_string(),
        StoryStatus::Incompatible { .. } => "incompatible baseline".to_string(),
        StoryStatus::Aborted { .. } => "aborted".to_string(),
    };
    emit(progress, &format!("{}: {}", report.story, summary));
}
