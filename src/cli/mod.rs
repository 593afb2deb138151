//! # CLI Module
//!
//! Command-line interface for the file fingerprinting engine.
//!
//! ## Usage
//! ```bash
//! # Fingerprint a tree into hashes.txt
//! fingerprint hash ~/data
//!
//! # Pick a strategy and widths
//! fingerprint hash ~/data --strategy pipeline --read-workers 2 --hash-workers 6
//!
//! # JSON lines report and a JSON summary on stdout
//! fingerprint hash ~/data --format json --json
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use file_fingerprint::core::hasher::FingerprintAlgorithm;
use file_fingerprint::core::pipeline::PipelineConfig;
use file_fingerprint::core::pool::default_parallelism;
use file_fingerprint::core::reporter::ReportFormat;
use file_fingerprint::core::scanner::ScanConfig;
use file_fingerprint::core::strategy::{fingerprint_tree, RunOptions, Strategy};
use file_fingerprint::core::types::RunSummary;
use file_fingerprint::error::{FingerprintError, Result};
use file_fingerprint::events::{
    DiscoverEvent, Event, EventChannel, EventReceiver, FileEvent, PipelineEvent,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::thread;

/// File Fingerprint - content digests for every file in a tree
#[derive(Parser, Debug)]
#[command(name = "fingerprint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fingerprint every regular file under a directory
    Hash(HashArgs),
}

#[derive(Args, Debug)]
struct HashArgs {
    /// Directory to fingerprint
    root: PathBuf,

    /// Report file, created or truncated
    #[arg(short, long, default_value = "hashes.txt")]
    output: PathBuf,

    /// Execution strategy
    #[arg(short, long, value_enum, default_value_t = StrategyArg::Pipeline)]
    strategy: StrategyArg,

    /// Threads for the threaded and pool strategies [default: all cores]
    #[arg(long)]
    threads: Option<usize>,

    /// Read stage workers (pipeline strategy)
    #[arg(long)]
    read_workers: Option<usize>,

    /// Hash stage workers (pipeline strategy) [default: cores - 2]
    #[arg(long)]
    hash_workers: Option<usize>,

    /// Bound of each inter-stage queue, 0 for unbounded
    #[arg(long, default_value_t = file_fingerprint::core::pipeline::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Fingerprint algorithm
    #[arg(short, long, value_enum, default_value_t = Algorithm::Xxh3)]
    algorithm: Algorithm,

    /// Report line format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Leave out hidden files and directories
    #[arg(long)]
    skip_hidden: bool,

    /// Regex of paths to leave out; matching directories are not descended
    #[arg(long, value_name = "REGEX")]
    exclude: Vec<String>,

    /// Follow symbolic links
    #[arg(long)]
    follow_symlinks: bool,

    /// Maximum directory depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// One file at a time on one thread
    Sequential,
    /// Fixed chunks, one thread per chunk
    Threaded,
    /// One worker pool task per file
    Pool,
    /// Staged read/hash/write pipeline (default)
    Pipeline,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => Strategy::Sequential,
            StrategyArg::Threaded => Strategy::Threaded,
            StrategyArg::Pool => Strategy::Pool,
            StrategyArg::Pipeline => Strategy::Pipeline,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algorithm {
    /// 64-bit XXH3 (default)
    Xxh3,
    /// 128-bit XXH3
    #[value(name = "xxh3-128")]
    Xxh3_128,
}

impl From<Algorithm> for FingerprintAlgorithm {
    fn from(algo: Algorithm) -> Self {
        match algo {
            Algorithm::Xxh3 => FingerprintAlgorithm::Xxh3,
            Algorithm::Xxh3_128 => FingerprintAlgorithm::Xxh3_128,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// `<path>: <digest>` per line
    Text,
    /// One JSON object per line
    Json,
}

impl From<Format> for ReportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => ReportFormat::Text,
            Format::Json => ReportFormat::JsonLines,
        }
    }
}

impl HashArgs {
    fn run_options(&self) -> Result<RunOptions> {
        for (flag, value) in [
            ("--threads", self.threads),
            ("--read-workers", self.read_workers),
            ("--hash-workers", self.hash_workers),
        ] {
            if value == Some(0) {
                return Err(FingerprintError::Config(format!(
                    "{flag} must be at least 1"
                )));
            }
        }

        let defaults = PipelineConfig::default();
        Ok(RunOptions {
            strategy: self.strategy.into(),
            pipeline: PipelineConfig {
                read_workers: self.read_workers.unwrap_or(defaults.read_workers),
                hash_workers: self.hash_workers.unwrap_or(defaults.hash_workers),
                queue_capacity: (self.queue_capacity > 0).then_some(self.queue_capacity),
            },
            threads: self.threads.unwrap_or_else(default_parallelism),
            algorithm: self.algorithm.into(),
            format: self.format.into(),
            scan: ScanConfig {
                follow_symlinks: self.follow_symlinks,
                include_hidden: !self.skip_hidden,
                max_depth: self.max_depth,
                exclude: self.exclude.clone(),
            },
        })
    }
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Hash(args) => run_hash(args),
    }
}

fn run_hash(args: HashArgs) -> Result<()> {
    file_fingerprint::init_tracing(if args.verbose { "debug" } else { "warn" });

    let term = Term::stderr();
    let pretty = !args.json;
    let options = args.run_options()?;

    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("File Fingerprint").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let (sender, receiver) = EventChannel::new();

    // Progress bar for pretty output
    let progress = if pretty {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Some(pb)
    } else {
        None
    };

    let verbose = args.verbose;
    let event_thread = thread::spawn(move || render_events(receiver, progress, verbose));

    let result = fingerprint_tree(&args.root, &args.output, &options, &sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();

    let summary = result?;
    if pretty {
        print_pretty_summary(&term, &summary, &options.strategy, &args.output);
    } else {
        print_json_summary(&summary, &options.strategy, &args.output);
    }

    Ok(())
}

fn render_events(receiver: EventReceiver, progress: Option<ProgressBar>, verbose: bool) {
    for event in receiver.iter() {
        let Some(ref pb) = progress else {
            continue;
        };
        match event {
            Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                pb.set_message(format!("{}", phase));
            }
            Event::Discover(DiscoverEvent::Progress(p)) => {
                pb.set_message(format!("Discovering ({} files)", p.files_found));
            }
            Event::Discover(DiscoverEvent::Completed { total_files }) => {
                pb.set_length(total_files as u64);
            }
            Event::File(FileEvent::Written(p)) => {
                pb.set_position(p.completed as u64);
                if verbose {
                    pb.set_message(
                        p.current_path
                            .file_name()
                            .unwrap_or_default()
                            .to_string_lossy()
                            .into_owned(),
                    );
                }
            }
            Event::File(FileEvent::Skipped { path, message }) => {
                if verbose {
                    pb.println(format!(
                        "  {} {}: {}",
                        style("skipped").yellow(),
                        path.display(),
                        message
                    ));
                }
            }
            Event::Pipeline(PipelineEvent::Completed { .. })
            | Event::Pipeline(PipelineEvent::Aborted)
            | Event::Pipeline(PipelineEvent::Error { .. }) => {
                pb.finish_and_clear();
            }
            _ => {}
        }
    }
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
}

fn print_pretty_summary(term: &Term, summary: &RunSummary, strategy: &Strategy, output: &Path) {
    term.write_line(&format!(
        "{} Fingerprinting complete ({})",
        style("✓").green().bold(),
        strategy
    ))
    .ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} files discovered",
        style(summary.discovered).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} records written to {}",
        style(summary.processed).cyan(),
        style(output.display()).bold()
    ))
    .ok();
    if summary.skipped > 0 {
        term.write_line(&format!(
            "  {} files skipped (unreadable)",
            style(summary.skipped).yellow()
        ))
        .ok();
    }
    term.write_line(&format!(
        "  Elapsed time: {} ms",
        style(summary.duration_ms).dim()
    ))
    .ok();
}

fn print_json_summary(summary: &RunSummary, strategy: &Strategy, output: &Path) {
    let output = serde_json::json!({
        "strategy": strategy.to_string(),
        "output": output,
        "discovered": summary.discovered,
        "processed": summary.processed,
        "skipped": summary.skipped,
        "duration_ms": summary.duration_ms,
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_default()
    );
}
