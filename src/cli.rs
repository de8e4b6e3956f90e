use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vdc")]
#[command(
    version,
    about = "Visual Diff Categorizer - Categorize screenshot changes against baselines",
    long_about = "Visual Diff Categorizer (VDC)\n\nModes:\n- check: analyze every story screenshot under a directory against its stored baseline, categorize changed regions, and gate on the worst category.\n- compare: analyze one baseline/current pair and report its categorized regions.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose progress on stderr")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Policy file (TOML) with thresholds/auto-approve/notifications; CLI flags override file values"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze every story under a directory against stored baselines
    Check {
        #[arg(
            long,
            value_name = "DIR",
            help = "Directory of current screenshots (one PNG per story; subdirectories become story prefixes)"
        )]
        current_dir: PathBuf,

        #[arg(
            long,
            value_name = "DIR",
            help = "Directory of stored baselines; populated on first runs when --update-baselines is set"
        )]
        baseline_dir: PathBuf,

        #[arg(
            long,
            value_name = "PATH",
            help = "Change context JSON (commits, PR description, design-token changes); omitted or unreadable runs degraded"
        )]
        context: Option<PathBuf>,

        #[arg(
            long,
            value_name = "PATH",
            help = "Reviewer decisions JSON from an earlier run of the same stories"
        )]
        decisions: Option<PathBuf>,

        #[arg(
            long,
            help = "Capture first-run baselines and refresh baselines for fully resolved stories"
        )]
        update_baselines: bool,

        #[arg(
            long,
            value_name = "SECONDS",
            help = "Per-story analysis budget (overrides the policy file)"
        )]
        story_timeout: Option<u64>,

        #[arg(
            long,
            value_name = "DAYS",
            help = "Only consider commits within this window (overrides the policy file)"
        )]
        lookback_days: Option<u32>,

        #[arg(
            long,
            value_name = "BOOL",
            help = "Consult the advisory vision classifier (true/false; requires VDC_ADVISORY_API_KEY or OPENAI_API_KEY)"
        )]
        advisory: Option<bool>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,

        #[arg(
            long,
            help = "Keep per-story diff heatmaps; otherwise none are rendered"
        )]
        keep_artifacts: bool,

        #[arg(
            long,
            value_name = "PATH",
            help = "Directory for diff heatmaps (implies --keep-artifacts); created if missing"
        )]
        artifacts_dir: Option<PathBuf>,
    },

    /// Compare one baseline/current screenshot pair
    Compare {
        #[arg(long, value_name = "PATH", help = "Baseline screenshot (PNG)")]
        baseline: PathBuf,

        #[arg(long, value_name = "PATH", help = "Current screenshot (PNG)")]
        current: PathBuf,

        #[arg(
            long,
            default_value = "adhoc",
            help = "Story id to use in the report"
        )]
        story: String,

        #[arg(
            long,
            value_name = "PATH",
            help = "Change context JSON; omitted or unreadable runs degraded"
        )]
        context: Option<PathBuf>,

        #[arg(
            long,
            value_name = "PATH",
            help = "Write a diff heatmap PNG to this path"
        )]
        heatmap: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
