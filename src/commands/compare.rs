use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vdc_lib::{
    analyze_pair, categorize, render_heatmap, ContextSnapshot, DiffMask, Screenshot, StoryReport,
    VdcError, VdcOutput,
};

use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_story, render_error, write_output};
use crate::settings::{load_policy, log_effective_policy};

/// Run the compare command.
#[allow(clippy::too_many_arguments)]
pub async fn run_compare(
    config_path: Option<PathBuf>,
    verbose: bool,
    baseline: PathBuf,
    current: PathBuf,
    story: String,
    context: Option<PathBuf>,
    heatmap: Option<PathBuf>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let policy = match load_policy(config_path.as_deref()) {
        Ok(policy) => policy,
        Err(err) => return render_error(err, format, output.clone()),
    };
    if verbose {
        log_effective_policy(config_path.as_deref(), &policy);
    }

    if verbose {
        eprintln!("Loading screenshots\u{2026}");
    }
    let baseline_shot = match Screenshot::load(&baseline) {
        Ok(shot) => shot,
        Err(err) => return render_error(err.into(), format, output.clone()),
    };
    let current_shot = match Screenshot::load(&current) {
        Ok(shot) => shot,
        Err(err) => return render_error(err.into(), format, output.clone()),
    };

    let snapshot = match &context {
        Some(path) => match ContextSnapshot::from_json_file(path) {
            Ok(snapshot) => Some(snapshot.trimmed(policy.ai_analysis.lookback_days)),
            Err(err) => {
                eprintln!("Warning: {err}; comparing without change context");
                None
            }
        },
        None => None,
    };

    let report = if baseline_shot.extent() != current_shot.extent() {
        StoryReport::incompatible(&story, baseline_shot.extent(), current_shot.extent())
    } else {
        let analysis = match analyze_pair(&baseline_shot, &current_shot, &policy.differ) {
            Ok(analysis) => analysis,
            Err(err) => return render_error(err, format, output.clone()),
        };
        if verbose {
            eprintln!(
                "{story}: {:.4}% of pixels changed across {} regions",
                analysis.mask.ratio() * 100.0,
                analysis.regions.len()
            );
        }
        if let Some(path) = &heatmap {
            if let Err(err) = save_heatmap(&analysis.mask, path) {
                return render_error(err, format, output.clone());
            }
            if verbose {
                eprintln!("Heatmap written to {}", path.display());
            }
        }
        let verdicts: Vec<_> = analysis
            .regions
            .iter()
            .map(|region| (region.clone(), categorize(region, snapshot.as_ref(), &policy)))
            .collect();
        let mut report = StoryReport::analyzed(&story, verdicts);
        if snapshot.is_none() && !report.regions.is_empty() {
            report.note("no change context available; verdicts carry reduced confidence");
        }
        report
    };

    let code = exit_code_for_story(&report);
    let body = VdcOutput::compare(baseline, current, report);
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(VdcError::Config(err.to_string()), format, output);
    }

    code
}

fn save_heatmap(mask: &DiffMask, path: &Path) -> vdc_lib::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    render_heatmap(mask).save(path)?;
    Ok(())
}
