mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_check, run_compare};
use settings::CheckOverrides;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();

    match args.command {
        Commands::Check {
            current_dir,
            baseline_dir,
            context,
            decisions,
            update_baselines,
            story_timeout,
            lookback_days,
            advisory,
            format,
            output,
            keep_artifacts,
            artifacts_dir,
        } => {
            run_check(
                args.config,
                args.verbose,
                current_dir,
                baseline_dir,
                context,
                decisions,
                update_baselines,
                CheckOverrides {
                    story_timeout,
                    lookback_days,
                    advisory,
                },
                format,
                output,
                keep_artifacts,
                artifacts_dir,
            )
            .await
        }
        Commands::Compare {
            baseline,
            current,
            story,
            context,
            heatmap,
            format,
            output,
        } => {
            run_compare(
                args.config,
                args.verbose,
                baseline,
                current,
                story,
                context,
                heatmap,
                format,
                output,
            )
            .await
        }
    }
}
