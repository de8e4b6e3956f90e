use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vdc_lib::{
    BaselineAction, Category, Recommendation, RunOutcome, RunReport, StoryReport, StoryStatus,
    VdcError, VdcOutput,
};

use crate::cli::OutputFormat;

const TOP_ISSUES_MAX: usize = 5;

/// Write output in the requested format.
pub fn write_output(
    body: &VdcOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the fatal exit code.
pub fn render_error(err: VdcError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let payload = VdcOutput::error(err.to_payload());

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    // Exit code 2 is reserved for fatal errors; gate failures use 1.
    ExitCode::from(2)
}

/// Exit code for a whole run: pass=0, gate fail=1, aborted=3.
pub fn exit_code_for_run(report: &RunReport) -> ExitCode {
    ExitCode::from(report.exit_code() as u8)
}

/// Exit code for a single compared pair.
pub fn exit_code_for_story(story: &StoryReport) -> ExitCode {
    if story.category == Some(Category::Error) {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

/// Write JSON output to file or stdout.
fn write_json_output(
    body: &VdcOutput,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Write pretty output to file or stdout.
fn write_pretty_output(body: &VdcOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &VdcOutput, colorize: bool) -> String {
    match body {
        VdcOutput::Run(out) => {
            let mut buf = String::new();
            let (status, code) = match out.report.outcome {
                RunOutcome::Pass => ("PASS", "32"),
                RunOutcome::Fail => ("FAIL", "31"),
                RunOutcome::Aborted => ("ABORTED", "33"),
            };
            let header = color(status, code, colorize);
            writeln!(buf, "{} visual diff check", header).ok();
            let counts = &out.report.counts;
            writeln!(
                buf,
                "Stories: {}; regions: {} error / {} warning / {} expected / {} ignore",
                out.report.stories.len(),
                counts.error,
                counts.warning,
                counts.expected,
                counts.ignore
            )
            .ok();
            let issues = top_issues(&out.report);
            if !issues.is_empty() {
                writeln!(buf, "Top issues (max {TOP_ISSUES_MAX}):").ok();
                for issue in issues {
                    writeln!(buf, "- {issue}").ok();
                }
            }
            for story in &out.report.stories {
                write_story(&mut buf, story, colorize);
            }
            writeln!(buf, "Duration: {}ms", out.report.duration_ms).ok();
            if out.notification.notify {
                let route = if out.notification.pr_only {
                    "pr comment"
                } else {
                    "full channel"
                };
                writeln!(buf, "Notification: {route}").ok();
            }
            buf
        }
        VdcOutput::Compare(out) => {
            let mut buf = String::new();
            let passed = out.story.category != Some(Category::Error);
            let status = color(
                if passed { "PASS" } else { "FAIL" },
                if passed { "32" } else { "31" },
                colorize,
            );
            writeln!(buf, "{} visual diff compare", status).ok();
            writeln!(buf, "Baseline: {}", out.baseline.display()).ok();
            writeln!(buf, "Current:  {}", out.current.display()).ok();
            write_story(&mut buf, &out.story, colorize);
            buf
        }
        VdcOutput::Error(out) => {
            let mut buf = String::new();
            let header = color("[ERROR]", "31", colorize);
            writeln!(buf, "{} {}", header, out.error.message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            buf
        }
    }
}

/// Worst findings across the run, errors before warnings, capped.
fn top_issues(report: &RunReport) -> Vec<String> {
    let mut issues: Vec<(u8, String)> = Vec::new();
    for story in &report.stories {
        match &story.status {
            StoryStatus::Analyzed => {
                for region in &story.regions {
                    let rank = match region.verdict.category {
                        Category::Error => 0,
                        Category::Warning => 1,
                        Category::Ignore | Category::Expected => continue,
                    };
                    issues.push((rank, format!("{}: {}", story.story, region.verdict.reason)));
                }
            }
            StoryStatus::Incompatible { baseline, current } => {
                issues.push((
                    0,
                    format!(
                        "{}: baseline is {baseline}, current is {current}",
                        story.story
                    ),
                ));
            }
            StoryStatus::Aborted { reason } => {
                issues.push((1, format!("{}: {reason}", story.story)));
            }
            StoryStatus::FirstRun { corrupt_baseline } => {
                if *corrupt_baseline {
                    issues.push((1, format!("{}: stored baseline was unreadable", story.story)));
                }
            }
        }
    }
    issues.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    issues.truncate(TOP_ISSUES_MAX);
    issues.into_iter().map(|(_, message)| message).collect()
}

fn write_story(buf: &mut String, story: &StoryReport, colorize: bool) {
    let status = match &story.status {
        StoryStatus::Analyzed => {
            let category = story.category.unwrap_or(Category::Ignore);
            color(category_label(category), category_color_code(category), colorize)
        }
        StoryStatus::FirstRun { .. } => color("first run", "36", colorize),
        StoryStatus::Incompatible { .. } => color("incompatible baseline", "31", colorize),
        StoryStatus::Aborted { reason } => {
            format!("{}: {}", color("aborted", "33", colorize), reason)
        }
    };
    let baseline = match story.baseline {
        BaselineAction::Captured => " (baseline captured)",
        BaselineAction::Refreshed => " (baseline refreshed)",
        BaselineAction::Kept | BaselineAction::None => "",
    };
    writeln!(buf, "- {}: {}{}", story.story, status, baseline).ok();

    for (index, region) in story.regions.iter().enumerate() {
        let category = region.verdict.category;
        let label = color(category_label(category), category_color_code(category), colorize);
        writeln!(
            buf,
            "    {}. [{}] {} -> {}",
            index + 1,
            label,
            region.verdict.reason,
            recommendation_label(region.verdict.recommendation)
        )
        .ok();
    }
    if !story.token_syncs.is_empty() {
        writeln!(buf, "    sync tokens: {}", story.token_syncs.join(", ")).ok();
    }
    for note in &story.notes {
        writeln!(buf, "    note: {note}").ok();
    }
}

fn category_label(category: Category) -> &'static str {
    match category {
        Category::Ignore => "ignore",
        Category::Expected => "expected",
        Category::Warning => "warning",
        Category::Error => "error",
    }
}

fn category_color_code(category: Category) -> &'static str {
    match category {
        Category::Ignore => "32",   // green
        Category::Expected => "36", // cyan
        Category::Warning => "33",  // yellow
        Category::Error => "31",    // red
    }
}

fn recommendation_label(recommendation: Recommendation) -> &'static str {
    match recommendation {
        Recommendation::AutoApprove => "auto-approve",
        Recommendation::Approve => "approve",
        Recommendation::Review => "review",
        Recommendation::Reject => "reject",
    }
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdc_lib::{
        notify_decision, ChangeKind, ChangeRegion, Evidence, Extent, Notifications, PixelBox, Rgb,
        Verdict,
    };

    fn sample_region() -> ChangeRegion {
        ChangeRegion {
            bounds: PixelBox::new(4, 4, 12, 12),
            pixel_count: 64,
            ratio: 0.0625,
            mean_magnitude: 0.12,
            kind: ChangeKind::ColorShift {
                old: Rgb::new(0x21, 0x96, 0xf3),
                new: Rgb::new(0x19, 0x76, 0xd2),
            },
            background: Some(Rgb::new(255, 255, 255)),
        }
    }

    fn expected_verdict() -> Verdict {
        Verdict {
            category: Category::Expected,
            reason: "change matches design token 'primary-600'".to_string(),
            evidence: vec![Evidence::Token {
                name: "primary-600".to_string(),
                commit: "ab12cd3".to_string(),
            }],
            recommendation: Recommendation::AutoApprove,
            confidence: 0.95,
            advisory: None,
        }
    }

    fn error_verdict() -> Verdict {
        Verdict {
            category: Category::Error,
            reason: "recolor region changed 6.250% of the screenshot".to_string(),
            evidence: Vec::new(),
            recommendation: Recommendation::Reject,
            confidence: 0.75,
            advisory: None,
        }
    }

    fn warning_verdict() -> Verdict {
        Verdict {
            category: Category::Warning,
            reason: "content region changed 2.250% of the screenshot".to_string(),
            evidence: Vec::new(),
            recommendation: Recommendation::Review,
            confidence: 0.75,
            advisory: None,
        }
    }

    #[test]
    fn exit_code_for_run_maps_outcomes() {
        let pass = RunReport::from_stories(
            vec![StoryReport::analyzed("a", vec![])],
            false,
            10,
        );
        assert_eq!(exit_code_for_run(&pass), ExitCode::SUCCESS);

        let fail = RunReport::from_stories(
            vec![StoryReport::analyzed(
                "a",
                vec![(sample_region(), error_verdict())],
            )],
            false,
            10,
        );
        assert_eq!(exit_code_for_run(&fail), ExitCode::from(1));

        let aborted = RunReport::from_stories(
            vec![StoryReport::aborted("a", "cancelled")],
            true,
            10,
        );
        assert_eq!(exit_code_for_run(&aborted), ExitCode::from(3));
    }

    #[test]
    fn exit_code_for_story_fails_only_on_error() {
        let expected = StoryReport::analyzed("a", vec![(sample_region(), expected_verdict())]);
        assert_eq!(exit_code_for_story(&expected), ExitCode::SUCCESS);

        let error = StoryReport::analyzed("a", vec![(sample_region(), error_verdict())]);
        assert_eq!(exit_code_for_story(&error), ExitCode::from(1));
    }

    #[test]
    fn render_error_always_returns_fatal_exit_code() {
        let code = render_error(
            VdcError::Config("boom".to_string()),
            OutputFormat::Json,
            None,
        );
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn format_pretty_lists_stories_regions_and_notes() {
        let mut failing = StoryReport::analyzed("header", vec![(sample_region(), error_verdict())]);
        failing.note("no change context available; verdicts carry reduced confidence");
        let mut approved =
            StoryReport::analyzed("button", vec![(sample_region(), expected_verdict())]);
        approved.baseline = BaselineAction::Refreshed;
        approved.token_syncs = vec!["primary-600".to_string()];

        let report = RunReport::from_stories(vec![failing, approved], false, 412);
        let decision = notify_decision(report.category, &Notifications::default());
        let body = VdcOutput::run(report, decision);

        let pretty = format_pretty(&body, false);
        assert!(pretty.contains("FAIL visual diff check"));
        assert!(pretty.contains("1 error / 0 warning / 1 expected / 0 ignore"));
        assert!(pretty.contains("- header: error"));
        assert!(pretty.contains("recolor region changed 6.250%"));
        assert!(pretty.contains("-> reject"));
        assert!(pretty.contains("note: no change context available"));
        assert!(pretty.contains("- button: expected (baseline refreshed)"));
        assert!(pretty.contains("sync tokens: primary-600"));
        assert!(pretty.contains("Duration: 412ms"));
        assert!(pretty.contains("Notification: full channel"));
    }

    #[test]
    fn top_issues_orders_errors_first_and_skips_expected() {
        let stories = vec![
            StoryReport::analyzed("footer", vec![(sample_region(), warning_verdict())]),
            StoryReport::analyzed("header", vec![(sample_region(), error_verdict())]),
            StoryReport::incompatible("hero", Extent::new(800, 600), Extent::new(800, 400)),
            StoryReport::analyzed("button", vec![(sample_region(), expected_verdict())]),
        ];
        let report = RunReport::from_stories(stories, false, 100);

        let issues = top_issues(&report);
        assert_eq!(issues.len(), 3, "got: {issues:?}");
        assert!(issues[0].starts_with("header:"), "got: {issues:?}");
        assert!(issues[1].starts_with("hero:"), "got: {issues:?}");
        assert!(issues[2].starts_with("footer:"), "got: {issues:?}");

        let body = VdcOutput::run(
            RunReport::from_stories(
                vec![StoryReport::analyzed(
                    "header",
                    vec![(sample_region(), error_verdict())],
                )],
                false,
                100,
            ),
            notify_decision(Some(Category::Error), &Notifications::default()),
        );
        let pretty = format_pretty(&body, false);
        assert!(pretty.contains("Top issues (max 5):"), "got: {pretty}");
    }

    #[test]
    fn format_pretty_renders_first_run_and_compare() {
        let story = StoryReport::first_run("hero", None);
        let body = VdcOutput::compare(
            PathBuf::from("baselines/hero.png"),
            PathBuf::from("current/hero.png"),
            story,
        );

        let pretty = format_pretty(&body, false);
        assert!(pretty.contains("PASS visual diff compare"));
        assert!(pretty.contains("baselines/hero.png"));
        assert!(pretty.contains("- hero: first run"));
    }

    #[test]
    fn format_pretty_handles_errors() {
        let body = VdcOutput::error(
            VdcError::Config("bad flag value".to_string()).to_payload(),
        );

        let pretty = format_pretty(&body, false);
        assert!(pretty.contains("[ERROR]"));
        assert!(pretty.contains("bad flag value"));
        assert!(pretty.contains("Hint:"));
    }
}
