//! Auto-approval policy and the external review protocol.
//!
//! Categorization only suggests; this module decides. Expected changes
//! auto-approve when the policy flag for their approval kind is on,
//! everything else waits for reviewer decisions fed back through a
//! [`DecisionSet`]. A story's baseline refresh is requested only once every
//! region is resolved.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::AutoApprove;
use crate::error::{Result, VdcError};
use crate::types::{AdvisoryNote, Category, Evidence, Recommendation, Verdict, VolatileKind};

/// Mean change magnitude at or below this reads as anti-aliasing softness.
const ANTI_ALIAS_MAX_MAGNITUDE: f32 = 0.1;

/// Which auto-approval flag governs a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalKind {
    TokenChanges,
    AntiAliasing,
    Timestamps,
    Uuids,
    Other,
}

impl ApprovalKind {
    pub fn enabled(&self, auto: &AutoApprove) -> bool {
        match self {
            ApprovalKind::TokenChanges => auto.token_changes,
            ApprovalKind::AntiAliasing => auto.anti_aliasing,
            ApprovalKind::Timestamps => auto.timestamps,
            ApprovalKind::Uuids => auto.uuids,
            ApprovalKind::Other => auto.other,
        }
    }
}

/// Derives the approval kind for a region from its evidence, its softness,
/// and any advisory volatile tag.
pub fn approval_kind(
    evidence: &[Evidence],
    mean_magnitude: f32,
    advisory: Option<&AdvisoryNote>,
) -> ApprovalKind {
    if evidence
        .iter()
        .any(|e| matches!(e, Evidence::Token { .. }))
    {
        return ApprovalKind::TokenChanges;
    }
    if let Some(note) = advisory {
        match note.volatile {
            Some(VolatileKind::Timestamp) => return ApprovalKind::Timestamps,
            Some(VolatileKind::Uuid) => return ApprovalKind::Uuids,
            None => {}
        }
    }
    if mean_magnitude <= ANTI_ALIAS_MAX_MAGNITUDE {
        return ApprovalKind::AntiAliasing;
    }
    ApprovalKind::Other
}

/// Maps a category to the suggested handling.
///
/// Only Expected changes are ever auto-approved, and only when the policy
/// flag for their kind is on.
pub fn recommendation_for(
    category: Category,
    kind: ApprovalKind,
    auto: &AutoApprove,
) -> Recommendation {
    match category {
        Category::Error => Recommendation::Reject,
        Category::Warning => Recommendation::Review,
        Category::Ignore => Recommendation::Approve,
        Category::Expected => {
            if kind.enabled(auto) {
                Recommendation::AutoApprove
            } else {
                Recommendation::Approve
            }
        }
    }
}

/// Attaches an advisory note to a verdict.
///
/// The note may upgrade an Expected change from approve to auto-approve
/// when it tags volatile content whose flag is on. It never changes the
/// category.
pub fn annotate(verdict: &mut Verdict, note: AdvisoryNote, auto: &AutoApprove) {
    if verdict.category == Category::Expected
        && verdict.recommendation == Recommendation::Approve
    {
        let kind = match note.volatile {
            Some(VolatileKind::Timestamp) => Some(ApprovalKind::Timestamps),
            Some(VolatileKind::Uuid) => Some(ApprovalKind::Uuids),
            None => None,
        };
        if let Some(kind) = kind {
            if kind.enabled(auto) {
                verdict.recommendation = Recommendation::AutoApprove;
            }
        }
    }
    verdict.advisory = Some(note);
}

/// A reviewer's call on one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewDecision {
    Approve,
    Reject,
    /// Approve and request a token-definition sync for the matched token.
    UpdateToken,
    Skip,
}

/// One reviewed region: index into the story's region list plus the call.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionDecision {
    pub region: usize,
    pub decision: ReviewDecision,
}

/// External review decisions for a run, keyed by story id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct DecisionSet(pub HashMap<String, Vec<RegionDecision>>);

impl DecisionSet {
    pub fn from_json_file(path: &Path) -> Result<DecisionSet> {
        if !path.exists() {
            return Err(VdcError::Config(format!(
                "decisions file not found: {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn for_story(&self, story: &str) -> &[RegionDecision] {
        self.0.get(story).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Outcome of resolving one story's verdicts against the decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryResolution {
    /// Replace the stored baseline with the current screenshot.
    pub refresh_baseline: bool,
    /// Token names whose definitions should be synced.
    pub token_syncs: Vec<String>,
    /// Region indexes still waiting on a reviewer.
    pub unresolved: Vec<usize>,
}

/// Resolves a story's regions.
///
/// A region counts as resolved when it was auto-approved, its category is
/// Ignore, or a reviewer approved it. Any rejection keeps the baseline,
/// and a `skip` always defers the region even when it would have resolved
/// on its own.
pub fn resolve_story(verdicts: &[Verdict], decisions: &[RegionDecision]) -> StoryResolution {
    let mut decided: HashMap<usize, ReviewDecision> = HashMap::new();
    for d in decisions {
        decided.insert(d.region, d.decision);
    }

    let mut rejected = false;
    let mut unresolved = Vec::new();
    let mut token_syncs = Vec::new();
    for (index, verdict) in verdicts.iter().enumerate() {
        match decided.get(&index) {
            Some(ReviewDecision::Approve) => {}
            Some(ReviewDecision::UpdateToken) => {
                if let Some(name) = token_name(verdict) {
                    token_syncs.push(name);
                }
            }
            Some(ReviewDecision::Reject) => rejected = true,
            Some(ReviewDecision::Skip) => unresolved.push(index),
            None => {
                let resolved = verdict.recommendation == Recommendation::AutoApprove
                    || verdict.category == Category::Ignore;
                if !resolved {
                    unresolved.push(index);
                }
            }
        }
    }

    StoryResolution {
        refresh_baseline: !rejected && unresolved.is_empty() && !verdicts.is_empty(),
        token_syncs,
        unresolved,
    }
}

fn token_name(verdict: &Verdict) -> Option<String> {
    verdict.evidence.iter().find_map(|e| match e {
        Evidence::Token { name, .. } => Some(name.clone()),
        _ => None,
    })
}
