//! retro-ids entrypoint: train a model from labelled CSV, classify recorded
//! connections, or summarise the audit log.

use clap::{Parser, Subcommand};
use retro_ids::{
    audit::AuditLog,
    config::IdsConfig,
    dataset::Dataset,
    detect::DetectionSession,
    logging::StructuredLogger,
    training, IdsError,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

static STOP: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "retro-ids")]
#[command(author, version, about = "Retrospective ML intrusion detection over connection records")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (default: $RETRO_IDS_CONFIG or config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory holding models/ and logs/
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit preprocessing and the classifier on a labelled dataset
    Train {
        /// Labelled CSV dataset
        #[arg(long)]
        csv: PathBuf,

        /// Maximum training epochs
        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Classify recorded connections and append verdicts to the audit log
    Detect {
        /// CSV of connection records
        #[arg(long)]
        csv: PathBuf,

        /// Classify only this row (0-based)
        #[arg(long)]
        row: Option<usize>,

        /// Worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Refuse input missing any trained categorical column
        #[arg(long)]
        strict: bool,
    },

    /// Summarise the audit log
    Stats {
        /// Also show the label distribution of this dataset
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
}

/// The subscriber is not installed yet, so a config error is handed back
/// to be logged once it is.
fn load_config(cli: &Cli) -> (IdsConfig, Option<(PathBuf, IdsError)>) {
    let path = cli.config.clone().unwrap_or_else(|| {
        std::env::var("RETRO_IDS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"))
    });
    let (mut config, rejected) = match IdsConfig::try_load(&path) {
        Ok(c) => (c, None),
        Err(e) => (IdsConfig::default(), Some((path, e))),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    (config, rejected)
}

fn run_train(config: &mut IdsConfig, csv: PathBuf, epochs: Option<usize>) -> CliResult {
    if let Some(n) = epochs {
        config.training.epochs = n;
    }
    let outcome = training::train_from_csv(&csv, config)?;
    println!(
        "trained on {} rows, evaluated on {} rows, best epoch {}{}",
        outcome.train_rows,
        outcome.test_rows,
        outcome.history.best_epoch,
        if outcome.history.stopped_early {
            " (stopped early)"
        } else {
            ""
        }
    );
    println!("accuracy: {:.4}", outcome.evaluation.accuracy);
    println!("{}", outcome.evaluation);
    info!(dir = %config.artifacts_dir().display(), "artifacts saved");
    Ok(())
}

fn run_detect(
    config: &mut IdsConfig,
    csv: PathBuf,
    row: Option<usize>,
    workers: Option<usize>,
    strict: bool,
) -> CliResult {
    if let Some(w) = workers {
        config.detection.workers = w;
    }
    let strict = strict || config.detection.strict_columns;

    let session = DetectionSession::open(config)?;
    let dataset = Dataset::from_csv_path(&csv)?;

    let missing = session.missing_columns(dataset.columns());
    if !missing.is_empty() {
        if strict {
            return Err(format!("input is missing trained columns: {}", missing.join(", ")).into());
        }
        warn!(missing = ?missing, "input lacks trained categorical columns; filling with 0");
    }

    let samples = match row {
        Some(i) => vec![dataset
            .sample(i)
            .ok_or_else(|| format!("row {} out of range ({} rows)", i, dataset.len()))?],
        None => dataset.samples(),
    };

    if let Err(e) = ctrlc::set_handler(|| STOP.store(true, Ordering::Relaxed)) {
        warn!(error = %e, "could not install Ctrl+C handler");
    }

    let report = session.detect_parallel(&samples, config.detection.workers, &STOP);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in &report.records {
        StructuredLogger::emit_json(record, &mut out)?;
    }
    out.flush()?;

    for f in &report.failures {
        eprintln!("{} ({}) failed after {}: {}", f.sample, f.index, f.stage, f.error);
    }
    eprintln!(
        "{} classified, {} attacks, {} failed{}",
        report.records.len(),
        report.attacks(),
        report.failures.len(),
        if report.stopped { ", stopped early" } else { "" }
    );
    Ok(())
}

fn run_stats(config: &IdsConfig, dataset: Option<PathBuf>) -> CliResult {
    let log = AuditLog::open(config.audit_log_path())?;
    let summary = log.summary()?;
    println!("audit log: {}", log.path().display());
    println!(
        "total: {}  attacks: {}  normal: {}",
        summary.total, summary.attacks, summary.normal
    );
    for (label, n) in &summary.by_label {
        println!("  {:<20} {}", label, n);
    }

    if let Some(path) = dataset {
        let ds = Dataset::from_csv_path(&path)?;
        println!("dataset: {} ({} rows)", path.display(), ds.len());
        for (label, n) in ds.label_distribution(&config.label_column)? {
            println!("  {:<20} {}", label, n);
        }
    }
    Ok(())
}

fn main() -> CliResult {
    let cli = Cli::parse();
    let (mut config, rejected) = load_config(&cli);

    StructuredLogger::init(&config.log);
    if let Some((path, e)) = rejected {
        warn!(path = %path.display(), error = %e, "config ignored, using defaults");
    }
    info!(data_dir = ?config.data_dir, "retro-ids starting");

    match cli.command {
        Commands::Train { csv, epochs } => run_train(&mut config, csv, epochs),
        Commands::Detect {
            csv,
            row,
            workers,
            strict,
        } => run_detect(&mut config, csv, row, workers, strict),
        Commands::Stats { dataset } => run_stats(&config, dataset),
    }
}
