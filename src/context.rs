use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VdcError};
use crate::types::{Evidence, Rgb};

/// Commit messages that signal an intentional layout rework.
const REFACTOR_KEYWORDS: [&str; 5] = ["refactor", "restructur", "rework", "reorganiz", "layout"];

/// How much surrounding text to keep when quoting a match.
const EXCERPT_RADIUS: usize = 40;

/// One commit in the change under review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One design-token value change extracted from the diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenChange {
    pub name: String,
    pub old_value: String,
    pub new_value: String,
    /// Commit that introduced the change.
    pub commit: String,
}

/// Immutable snapshot of the change context for one run.
///
/// Fetched (or loaded) once before analysis starts and shared across all
/// stories; a run never observes two different snapshots. Every field may be
/// partially populated; a missing snapshot altogether puts the engine in
/// degraded mode instead of failing the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub token_changes: Vec<TokenChange>,
    #[serde(default)]
    pub pr_description: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

impl ContextSnapshot {
    pub fn from_json_file(path: &Path) -> Result<ContextSnapshot> {
        if !path.exists() {
            return Err(VdcError::ContextUnavailable(format!(
                "context file not found: {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)?;
        let snapshot: ContextSnapshot = serde_json::from_str(&raw)?;
        Ok(snapshot)
    }

    /// Drops commits older than the lookback window. Undated commits are
    /// kept; the window only prunes what it can prove stale.
    pub fn trimmed(mut self, lookback_days: u32) -> ContextSnapshot {
        let cutoff = self.fetched_at - Duration::days(i64::from(lookback_days));
        self.commits
            .retain(|c| c.timestamp.map(|t| t >= cutoff).unwrap_or(true));
        self
    }

    /// Finds a token-diff entry whose (old, new) pair matches the observed
    /// color change. Hex spellings are normalized before comparison.
    pub fn matching_color_token(&self, old: Rgb, new: Rgb) -> Option<&TokenChange> {
        self.token_changes.iter().find(|tc| {
            matches!(
                (Rgb::parse(&tc.old_value), Rgb::parse(&tc.new_value)),
                (Some(o), Some(n)) if o == old && n == new
            )
        })
    }

    /// Finds a token-diff entry matching a non-color value exactly
    /// (whitespace-trimmed, case-insensitive).
    pub fn matching_value_token(&self, old: &str, new: &str) -> Option<&TokenChange> {
        let norm = |s: &str| s.trim().to_ascii_lowercase();
        let (old, new) = (norm(old), norm(new));
        self.token_changes
            .iter()
            .find(|tc| norm(&tc.old_value) == old && norm(&tc.new_value) == new)
    }

    /// Searches commit messages and the PR description for a literal value
    /// (case-insensitive) and returns the first mention as evidence.
    ///
    /// Only standalone occurrences count: text that merely contains the
    /// value inside a longer word or number is not a mention of it.
    pub fn find_mention(&self, value: &str) -> Option<Evidence> {
        let needle = value.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return None;
        }
        for commit in &self.commits {
            if let Some(pos) = mention_position(&commit.message, &needle) {
                return Some(Evidence::Commit {
                    id: commit.id.clone(),
                    excerpt: excerpt_around(&commit.message, pos, needle.len()),
                });
            }
        }
        if let Some(body) = &self.pr_description {
            if let Some(pos) = mention_position(body, &needle) {
                return Some(Evidence::PrDescription {
                    excerpt: excerpt_around(body, pos, needle.len()),
                });
            }
        }
        None
    }

    /// First commit whose message signals a layout refactor, if any.
    pub fn refactor_commit(&self) -> Option<&Commit> {
        self.commits.iter().find(|c| {
            let lower = c.message.to_ascii_lowercase();
            REFACTOR_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
    }
}

/// Byte position of the first standalone occurrence of `needle` (already
/// lowercased) in `text`. Later occurrences are tried when an earlier one
/// is embedded in a longer token.
fn mention_position(text: &str, needle: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    lower
        .match_indices(needle)
        .find(|&(pos, _)| standalone(&lower, pos, needle))
        .map(|(pos, _)| pos)
}

/// True when the match at `pos` stands on its own. Digits or letters running
/// into either end of the match mean the text names a different value:
/// "16px" is not a mention of "6px", nor "0.5px" one of "5px".
fn standalone(text: &str, pos: usize, needle: &str) -> bool {
    let before = text[..pos].chars().next_back();
    let tail = &text[pos + needle.len()..];
    let after = tail.chars().next();
    if before.is_some_and(|c| c.is_ascii_alphanumeric())
        || after.is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return false;
    }
    if needle.starts_with(|c: char| c.is_ascii_digit())
        && before.is_some_and(|c| c == '.' || c == '-')
    {
        return false;
    }
    if needle.ends_with(|c: char| c.is_ascii_digit())
        && after == Some('.')
        && tail.chars().nth(1).is_some_and(|c| c.is_ascii_digit())
    {
        return false;
    }
    true
}

/// Quotes the matched value with a little surrounding text, clamped to
/// char boundaries.
fn excerpt_around(text: &str, pos: usize, len: usize) -> String {
    let mut start = pos.saturating_sub(EXCERPT_RADIUS);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + len + EXCERPT_RADIUS).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    let mut excerpt = text[start..end].trim().to_string();
    if start > 0 {
        excerpt.insert_str(0, "...");
    }
    if end < text.len() {
        excerpt.push_str("...");
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot_with(commits: Vec<Commit>, tokens: Vec<TokenChange>) -> ContextSnapshot {
        ContextSnapshot {
            commits,
            token_changes: tokens,
            pr_description: None,
            branch: Some("feature/button-polish".to_string()),
            fetched_at: Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
        }
    }

    fn commit(id: &str, message: &str, day: u32) -> Commit {
        Commit {
            id: id.to_string(),
            message: message.to_string(),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap()),
        }
    }

    #[test]
    fn matching_color_token_normalizes_hex_spelling() {
        let snapshot = snapshot_with(
            vec![],
            vec![TokenChange {
                name: "primary-600".to_string(),
                old_value: "#2196F3".to_string(),
                new_value: "1976D2".to_string(),
                commit: "abc123".to_string(),
            }],
        );
        let found = snapshot
            .matching_color_token(Rgb::new(0x21, 0x96, 0xf3), Rgb::new(0x19, 0x76, 0xd2))
            .expect("token should match despite case and missing hash");
        assert_eq!(found.name, "primary-600");

        assert!(snapshot
            .matching_color_token(Rgb::new(0, 0, 0), Rgb::new(0x19, 0x76, 0xd2))
            .is_none());
    }

    #[test]
    fn find_mention_prefers_commits_and_quotes_an_excerpt() {
        let mut snapshot = snapshot_with(
            vec![commit(
                "c1",
                "Bump button padding from 12px to 16px for touch targets",
                10,
            )],
            vec![],
        );
        snapshot.pr_description = Some("Also mentions 16px here".to_string());

        match snapshot.find_mention("16px") {
            Some(Evidence::Commit { id, excerpt }) => {
                assert_eq!(id, "c1");
                assert!(excerpt.contains("16px"), "excerpt was: {excerpt}");
            }
            other => panic!("expected commit evidence, got {other:?}"),
        }
    }

    #[test]
    fn find_mention_falls_back_to_pr_description() {
        let mut snapshot = snapshot_with(vec![], vec![]);
        snapshot.pr_description =
            Some("Switch the header accent to #1976d2 per design review".to_string());
        match snapshot.find_mention("#1976D2") {
            Some(Evidence::PrDescription { excerpt }) => {
                assert!(excerpt.contains("#1976d2"), "excerpt was: {excerpt}");
            }
            other => panic!("expected PR evidence, got {other:?}"),
        }
    }

    #[test]
    fn find_mention_skips_values_embedded_in_larger_ones() {
        let snapshot = snapshot_with(vec![commit("c1", "Bump header avatar to 16px", 10)], vec![]);
        assert!(snapshot.find_mention("6px").is_none());

        let decimal = snapshot_with(vec![commit("c2", "Tighten divider to 0.5px", 10)], vec![]);
        assert!(decimal.find_mention("5px").is_none());
    }

    #[test]
    fn find_mention_accepts_a_later_standalone_occurrence() {
        let snapshot = snapshot_with(
            vec![commit("c1", "Grid keeps 16px gutters; icons move 6px right", 10)],
            vec![],
        );
        match snapshot.find_mention("6px") {
            Some(Evidence::Commit { id, excerpt }) => {
                assert_eq!(id, "c1");
                assert!(excerpt.contains("move 6px"), "excerpt was: {excerpt}");
            }
            other => panic!("expected commit evidence, got {other:?}"),
        }
    }

    #[test]
    fn refactor_commit_matches_keyword_variants() {
        let snapshot = snapshot_with(
            vec![
                commit("c1", "Fix typo", 9),
                commit("c2", "Restructure card grid into flex layout", 11),
            ],
            vec![],
        );
        let hit = snapshot.refactor_commit().expect("restructure should match");
        assert_eq!(hit.id, "c2");

        let none = snapshot_with(vec![commit("c1", "Fix typo", 9)], vec![]);
        assert!(none.refactor_commit().is_none());
    }

    #[test]
    fn trimmed_drops_commits_outside_lookback() {
        let snapshot = snapshot_with(
            vec![
                commit("old", "ancient history", 1),
                commit("new", "recent work", 14),
                Commit {
                    id: "undated".to_string(),
                    message: "no timestamp".to_string(),
                    timestamp: None,
                },
            ],
            vec![],
        );
        let trimmed = snapshot.trimmed(7);
        let ids: Vec<&str> = trimmed.commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "undated"]);
    }

    #[test]
    fn context_json_accepts_partial_fields() {
        let snapshot: ContextSnapshot =
            serde_json::from_str(r#"{"commits":[{"id":"c1","message":"m"}]}"#).unwrap();
        assert_eq!(snapshot.commits.len(), 1);
        assert!(snapshot.commits[0].timestamp.is_none());
        assert!(snapshot.token_changes.is_empty());
        assert!(snapshot.pr_description.is_none());
    }
}
