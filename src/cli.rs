use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "helmaudit")]
#[command(about = "Snapshot Helm releases and report drift between snapshots")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Capture every release in the cluster and store it as a snapshot
    Snapshot(SnapshotArgs),

    /// List stored snapshots, oldest first
    List(ListArgs),

    /// Compare two snapshots, or a snapshot against a declared baseline
    Diff(DiffArgs),

    /// Show the releases recorded in a snapshot
    Show(ShowArgs),

    /// Remove snapshots outside the retention policy
    Prune(PruneArgs),
}

#[derive(Parser, Default)]
pub struct GlobalArgs {
    /// Snapshot database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to ~/.config/helmaudit/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Inventory timeout for the whole pass, e.g. "30s" or "2m"
    #[arg(long, global = true)]
    pub timeout: Option<String>,

    /// kubeconfig context passed through to helm
    #[arg(long, global = true)]
    pub kube_context: Option<String>,

    /// Only inventory these namespaces (queried concurrently)
    #[arg(long, short = 'n', value_delimiter = ',', global = true)]
    pub namespace: Option<Vec<String>>,

    /// Show debug logging on stderr
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,
}

#[derive(Parser)]
pub struct SnapshotArgs {
    /// Free-text label stored with the snapshot
    #[arg(long)]
    pub label: Option<String>,

    /// Read releases from an exported JSON file instead of querying helm
    #[arg(long)]
    pub from_file: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct DiffArgs {
    /// Baseline snapshot ID
    #[arg(long, conflicts_with = "baseline")]
    pub from: Option<i64>,

    /// Current snapshot ID (defaults to the newest)
    #[arg(long, conflicts_with = "live")]
    pub to: Option<i64>,

    /// Declared baseline file (JSON) to compare against
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Compare against a fresh inventory pass instead of a stored snapshot
    #[arg(long, default_value_t = false)]
    pub live: bool,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// List unchanged releases in text output
    #[arg(long, default_value_t = false)]
    pub show_unchanged: bool,

    /// Treat same-revision values changes as unchanged
    #[arg(long, default_value_t = false)]
    pub ignore_values: bool,

    /// Exit with status 2 when any drift is found
    #[arg(long, default_value_t = false)]
    pub fail_on_drift: bool,
}

#[derive(Parser)]
pub struct ShowArgs {
    /// Snapshot ID (defaults to the newest)
    pub id: Option<i64>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct PruneArgs {
    /// Keep this many newest snapshots
    #[arg(long)]
    pub keep_last: Option<usize>,

    /// Keep snapshots younger than this, e.g. "30d"
    #[arg(long)]
    pub max_age: Option<String>,

    /// Show what would be removed without removing it
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
