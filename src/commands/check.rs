use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use vdc_lib::advisory::API_KEY_ENV;
use vdc_lib::{
    notify_decision, AdvisoryClassifier, ContextSnapshot, DecisionSet, DirSource, DirStore,
    ProgressCallback, RunRequest, VdcError, VdcOutput, VisionClassifier,
};

use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_run, render_error, write_output};
use crate::settings::{apply_check_overrides, load_policy, log_effective_policy, CheckOverrides};

/// Run the check command.
#[allow(clippy::too_many_arguments)]
pub async fn run_check(
    config_path: Option<PathBuf>,
    verbose: bool,
    current_dir: PathBuf,
    baseline_dir: PathBuf,
    context: Option<PathBuf>,
    decisions: Option<PathBuf>,
    update_baselines: bool,
    overrides: CheckOverrides,
    format: OutputFormat,
    output: Option<PathBuf>,
    keep_artifacts: bool,
    artifacts_dir: Option<PathBuf>,
) -> ExitCode {
    let mut policy = match load_policy(config_path.as_deref()) {
        Ok(policy) => policy,
        Err(err) => return render_error(err, format, output.clone()),
    };
    apply_check_overrides(&mut policy, &overrides);
    if verbose {
        log_effective_policy(config_path.as_deref(), &policy);
    }

    let source = match DirSource::new(current_dir) {
        Ok(source) => source,
        Err(err) => return render_error(err, format, output.clone()),
    };
    let store = DirStore::new(baseline_dir);

    // A missing or unreadable context file degrades the run, it never fails it.
    let snapshot = match &context {
        Some(path) => match ContextSnapshot::from_json_file(path) {
            Ok(snapshot) => Some(Arc::new(
                snapshot.trimmed(policy.ai_analysis.lookback_days),
            )),
            Err(err) => {
                eprintln!("Warning: {err}; running without change context");
                None
            }
        },
        None => None,
    };

    let decisions = match &decisions {
        Some(path) => match DecisionSet::from_json_file(path) {
            Ok(set) => set,
            Err(err) => return render_error(err, format, output.clone()),
        },
        None => DecisionSet::default(),
    };

    let advisory: Option<Arc<dyn AdvisoryClassifier>> = if policy.ai_analysis.enabled {
        match VisionClassifier::from_policy(&policy.ai_analysis) {
            Ok(Some(classifier)) => Some(Arc::new(classifier)),
            Ok(None) => {
                eprintln!(
                    "Warning: advisory analysis enabled without an API key. Set {API_KEY_ENV}, OPENAI_API_KEY, or [ai_analysis] api_key in config"
                );
                None
            }
            Err(err) => return render_error(err, format, output.clone()),
        }
    } else {
        None
    };

    let artifacts_dir = resolve_artifacts_dir(artifacts_dir, keep_artifacts);
    if let Some(dir) = &artifacts_dir {
        if let Err(err) = std::fs::create_dir_all(dir) {
            return render_error(VdcError::Io(err), format, output.clone());
        }
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let progress: Option<ProgressCallback> = if verbose {
        Some(Arc::new(|msg: &str| eprintln!("{msg}")))
    } else {
        None
    };

    let policy = Arc::new(policy);
    let request = RunRequest {
        source: Arc::new(source),
        store: Arc::new(store),
        context: snapshot,
        policy: Arc::clone(&policy),
        decisions: Arc::new(decisions),
        advisory,
        report_only: !update_baselines,
        artifacts_dir: artifacts_dir.clone(),
        cancel,
        progress,
    };

    let report = match vdc_lib::run(request).await {
        Ok(report) => report,
        Err(err) => return render_error(err, format, output.clone()),
    };

    if let Some(dir) = &artifacts_dir {
        eprintln!("Artifacts directory: {}", dir.display());
    }

    let code = exit_code_for_run(&report);
    let notification = notify_decision(report.category, &policy.notifications);
    let body = VdcOutput::run(report, notification);
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(VdcError::Config(err.to_string()), format, output);
    }

    code
}

/// Explicit directory wins; `--keep-artifacts` alone lands in a temp
/// directory named after the process.
fn resolve_artifacts_dir(custom: Option<PathBuf>, keep: bool) -> Option<PathBuf> {
    if custom.is_some() {
        return custom;
    }
    if !keep {
        return None;
    }
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    Some(std::env::temp_dir().join(format!("vdc-{}-{timestamp}", std::process::id())))
}
