//! CLI command definitions

use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pipeline file, or a name looked up in the pipelines directory
    pub pipeline: String,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Hide task output lines
    #[arg(short, long)]
    pub quiet: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Pipeline file, or a name looked up in the pipelines directory
    pub pipeline: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline ID to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show task-runs and logs for a specific run ID
    #[arg(long)]
    pub run: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
