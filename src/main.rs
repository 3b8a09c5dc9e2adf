use std::path::Path;

use chrono::Utc;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use helmaudit::baseline;
use helmaudit::cli::{Cli, Command, DiffArgs, ListArgs, PruneArgs, ShowArgs, SnapshotArgs};
use helmaudit::config::{parse_duration, Config};
use helmaudit::error::{AuditError, Result};
use helmaudit::exit_codes;
use helmaudit::inventory::{self, fanout::NamespacedInventory, fixed::StaticInventory, helm::HelmCli};
use helmaudit::report::{self, SnapshotRef};
use helmaudit::snapshot::Snapshot;
use helmaudit::store::diff;
use helmaudit::store::{SnapshotSummary, Store};
use helmaudit::util::{format_timestamp, short_digest, truncate};

fn init_logging(verbose: bool) {
    let default = if verbose { "helmaudit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            if e.is_retryable() {
                eprintln!("hint: the inventory pass can be retried, or raise --timeout");
            }
            exit_codes::for_error(&e)
        }
    };

    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = Config::load(&cli.global)?;
    debug!(db = %config.db_path.display(), timeout = ?config.timeout, "loaded config");

    match cli.command {
        Command::Snapshot(args) => take_snapshot(&config, &args),
        Command::List(args) => list_snapshots(&config, &args),
        Command::Diff(args) => diff_snapshots(&config, &args),
        Command::Show(args) => show_snapshot(&config, &args),
        Command::Prune(args) => prune_snapshots(&config, &args),
    }
}

/// One inventory pass against the cluster (or an exported file).
fn capture(config: &Config, from_file: Option<&Path>, label: Option<&str>) -> Result<Snapshot> {
    if let Some(path) = from_file {
        let client = StaticInventory::from_file(path)?;
        return inventory::capture(&client, config.timeout, label);
    }

    let helm = HelmCli::new(config.kube_context.clone());
    if config.namespaces.is_empty() {
        inventory::capture(&helm, config.timeout, label)
    } else {
        let client = NamespacedInventory::new(config.namespaces.clone(), |ns, timeout| {
            helm.fetch_namespace(Some(ns), timeout)
        });
        inventory::capture(&client, config.timeout, label)
    }
}

fn no_snapshots() -> AuditError {
    AuditError::Storage("no snapshots stored yet. Run 'helmaudit snapshot' to create one.".to_string())
}

fn take_snapshot(config: &Config, args: &SnapshotArgs) -> Result<i32> {
    let snap = capture(config, args.from_file.as_deref(), args.label.as_deref())?;
    let mut store = Store::open(&config.db_path)?;
    let id = store.save(&snap)?;

    println!(
        "saved snapshot #{id}: {} releases at {}",
        snap.len(),
        format_timestamp(snap.taken_at())
    );
    Ok(exit_codes::SUCCESS)
}

fn list_snapshots(config: &Config, args: &ListArgs) -> Result<i32> {
    let store = Store::open(&config.db_path)?;
    let snapshots = store.list()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(exit_codes::SUCCESS);
    }

    if snapshots.is_empty() {
        println!("No snapshots found. Run 'helmaudit snapshot' to create one.");
        return Ok(exit_codes::SUCCESS);
    }

    println!("{:<6} {:<20} {:<9} {}", "ID", "Date", "Releases", "Label");
    println!("{}", "-".repeat(60));
    for s in snapshots {
        println!(
            "{:<6} {:<20} {:<9} {}",
            s.id,
            format_timestamp(s.taken_at),
            s.release_count,
            s.label.as_deref().unwrap_or("")
        );
    }
    Ok(exit_codes::SUCCESS)
}

/// The stored snapshot immediately before `id`
fn previous_of(store: &Store, id: i64) -> Result<SnapshotSummary> {
    let all = store.list()?;
    let position = all
        .iter()
        .position(|s| s.id == id)
        .ok_or(AuditError::NotFound(id))?;

    position
        .checked_sub(1)
        .and_then(|p| all.get(p).cloned())
        .ok_or_else(|| AuditError::Storage(format!("snapshot #{id} is the oldest, nothing to compare against")))
}

fn diff_snapshots(config: &Config, args: &DiffArgs) -> Result<i32> {
    let store = Store::open(&config.db_path)?;
    let mut options = config.detect;
    if args.ignore_values {
        options.detect_values_changes = false;
    }

    let default_pair = if args.baseline.is_none() && args.from.is_none() && args.to.is_none() && !args.live {
        Some(store.previous_two()?.ok_or_else(|| {
            AuditError::Storage("need at least 2 snapshots to compare. Run 'helmaudit snapshot' again.".to_string())
        })?)
    } else {
        None
    };

    // current side
    let (to_ref, current) = if args.live {
        let snap = capture(config, None, None)?;
        (SnapshotRef::live(&snap), snap)
    } else {
        let id = match (args.to, &default_pair) {
            (Some(id), _) => id,
            (None, Some((_, newer))) => newer.id,
            (None, None) => store.latest()?.ok_or_else(no_snapshots)?.id,
        };
        let snap = store.load(id)?;
        (SnapshotRef::stored(id, &snap), snap)
    };

    // baseline side
    let (from_ref, baseline) = if let Some(path) = &args.baseline {
        let snap = baseline::load(path)?;
        (SnapshotRef::baseline(&path.display().to_string(), &snap), snap)
    } else {
        let id = match (args.from, &default_pair, &to_ref.id) {
            (Some(id), _, _) => id,
            (None, Some((older, _)), _) => older.id,
            (None, None, Some(to_id)) => previous_of(&store, *to_id)?.id,
            (None, None, None) => store.latest()?.ok_or_else(no_snapshots)?.id,
        };
        let snap = store.load(id)?;
        (SnapshotRef::stored(id, &snap), snap)
    };

    let entries = diff::detect(&baseline, &current, options);
    let report = report::generate(&entries).between(from_ref, to_ref);

    if args.json {
        println!("{}", report::json::render(&report));
    } else {
        print!("{}", report::table::render(&report, args.show_unchanged));
    }

    if args.fail_on_drift && report.has_drift() {
        return Ok(exit_codes::DRIFT_DETECTED);
    }
    Ok(exit_codes::SUCCESS)
}

fn show_snapshot(config: &Config, args: &ShowArgs) -> Result<i32> {
    let store = Store::open(&config.db_path)?;
    let id = match args.id {
        Some(id) => id,
        None => store.latest()?.ok_or_else(no_snapshots)?.id,
    };
    let snap = store.load(id)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snap)?);
        return Ok(exit_codes::SUCCESS);
    }

    println!("snapshot #{id} ({})", format_timestamp(snap.taken_at()));
    if let Some(label) = snap.label() {
        println!("label: {label}");
    }
    println!();
    println!(
        "{:<20} {:<28} {:>5}  {:<28} {:<16} {}",
        "NAMESPACE", "NAME", "REV", "CHART", "STATUS", "VALUES"
    );
    for record in snap.records() {
        println!(
            "{:<20} {:<28} {:>5}  {:<28} {:<16} {}",
            truncate(&record.namespace, 20),
            truncate(&record.name, 28),
            record.revision,
            truncate(&record.chart_ref(), 28),
            record.status.as_str(),
            short_digest(&record.values_digest)
        );
    }
    println!("\n{} releases", snap.len());
    Ok(exit_codes::SUCCESS)
}

fn prune_snapshots(config: &Config, args: &PruneArgs) -> Result<i32> {
    let mut policy = config.retention;
    if let Some(keep_last) = args.keep_last {
        policy.keep_last = Some(keep_last);
    }
    if let Some(max_age) = &args.max_age {
        policy.max_age = Some(parse_duration(max_age, "--max-age")?);
    }

    if policy.is_noop() {
        println!("No retention policy set. Pass --keep-last or --max-age, or configure [retention].");
        return Ok(exit_codes::SUCCESS);
    }

    let mut store = Store::open(&config.db_path)?;
    let now = Utc::now();

    let removed = if args.dry_run {
        policy.expired(&store.list()?, now)
    } else {
        store.prune(&policy, now)?
    };

    let verb = if args.dry_run { "would remove" } else { "removed" };
    if removed.is_empty() {
        println!("Nothing to prune.");
    } else {
        let ids: Vec<String> = removed.iter().map(|id| format!("#{id}")).collect();
        println!("{verb} {} snapshot(s): {}", removed.len(), ids.join(", "));
    }
    Ok(exit_codes::SUCCESS)
}
