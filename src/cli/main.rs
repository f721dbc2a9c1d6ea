//! Character crop CLI tool
//!
//! Command-line interface for segmenting characters out of illustrations,
//! maintaining caption files and sorting the resulting crops into buckets.

use super::config::CliConfigBuilder;
use crate::{
    batch::{find_image_files, BatchDriver, BatchReport},
    config::{OutputFormat, PromptStrategy},
    oracle::SidecarMaskOracle,
    segmenter::CharacterSegmenter,
    services::{
        BatchProcessingStats, ConsoleProgressReporter, ProcessingStage, ProgressReporter,
        ProgressUpdate,
    },
    sorter::{default_buckets, CharacterSorter},
    tags,
    tracing_config::{init_cli_tracing, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Character segmentation and crop extraction tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "charcrop")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Segment characters out of images and save one crop per character
    Segment(SegmentArgs),

    /// Inspect and edit caption files
    #[command(subcommand)]
    Tags(TagsCommand),

    /// Sort crops into buckets from keyboard input on stdin
    Sort {
        /// Directory holding the crops to sort
        #[arg(value_name = "CROPS_DIR")]
        crops_dir: PathBuf,

        /// Directory receiving the bucket folders
        #[arg(short, long, value_name = "SORTED_DIR")]
        output: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct SegmentArgs {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory for crops and the segmentation ledger
    #[arg(short, long, value_name = "OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// Re-segment images even when their crops already exist
    #[arg(long)]
    pub force: bool,

    /// Directory of exported masks (`<ID>.masks.json`) [default: <OUTPUT_DIR>/masks]
    #[arg(long, value_name = "DIR")]
    pub masks_dir: Option<PathBuf>,

    /// JSON configuration file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Prompt strategies to run, in order
    #[arg(long = "strategy", value_enum)]
    pub strategies: Vec<CliStrategy>,

    /// Padding in pixels added around each character box
    #[arg(long)]
    pub padding: Option<u32>,

    /// Crop file format
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Scan input directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for directory inputs (e.g., "*.png")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Show a progress bar instead of per-image log lines
    #[arg(long)]
    pub progress: bool,
}

#[derive(Subcommand, Debug)]
pub enum TagsCommand {
    /// Count tags across caption files
    Stats {
        /// Directory holding images and their caption files
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Image file pattern
        #[arg(long, default_value = "*.png")]
        pattern: String,
    },

    /// Remove a tag from every caption file in a directory
    Remove {
        /// Tag to remove
        tag: String,

        /// Directory holding the caption files
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliStrategy {
    Text,
    PointGrid,
}

impl From<CliStrategy> for PromptStrategy {
    fn from(strategy: CliStrategy) -> Self {
        match strategy {
            CliStrategy::Text => Self::Text,
            CliStrategy::PointGrid => Self::PointGrid,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Jpeg => Self::Jpeg,
            CliOutputFormat::Webp => Self::WebP,
        }
    }
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, TracingFormat::Console)
        .context("Failed to initialize tracing")?;

    match &cli.command {
        Command::Segment(args) => run_segment(args, cli.verbose),
        Command::Tags(TagsCommand::Stats { dir, pattern }) => run_tag_stats(dir, pattern),
        Command::Tags(TagsCommand::Remove { tag, dir }) => run_tag_remove(tag, dir),
        Command::Sort { crops_dir, output } => run_sort(crops_dir, output),
    }
}

fn run_segment(args: &SegmentArgs, verbose: u8) -> Result<()> {
    CliConfigBuilder::validate_cli(args).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(args).context("Failed to build configuration")?;

    let masks_dir = args
        .masks_dir
        .clone()
        .unwrap_or_else(|| config.output_dir.join("masks"));
    if !masks_dir.is_dir() {
        warn!(
            "Masks directory {} not found; every image will yield zero crops",
            masks_dir.display()
        );
    }

    let files = collect_inputs(&args.inputs, args.recursive, args.pattern.as_deref())?;
    info!("Found {} image(s) to segment", files.len());
    info!("Output directory: {}", config.output_dir.display());
    info!(
        "Strategies: {}",
        config
            .strategies
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let reporter: Box<dyn ProgressReporter> = if args.progress && !files.is_empty() {
        Box::new(IndicatifProgressReporter::new(files.len()))
    } else {
        Box::new(ConsoleProgressReporter::new(verbose > 0))
    };

    let segmenter = CharacterSegmenter::new(config, Box::new(SidecarMaskOracle::new(masks_dir)))
        .context("Failed to create character segmenter")?
        .with_progress_reporter(reporter);
    let mut driver = BatchDriver::new(segmenter);

    let report = driver
        .process_files(&files, args.force)
        .context("Segmentation run aborted")?;
    print_failures(&report);

    Ok(())
}

/// Expand file and directory inputs into one ordered list
fn collect_inputs(inputs: &[PathBuf], recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let found = find_image_files(input, recursive, pattern)
                .with_context(|| format!("Failed to scan directory: {}", input.display()))?;
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                input.display()
            );
        }
    }

    Ok(files)
}

fn print_failures(report: &BatchReport) {
    for result in report.failures() {
        if let crate::types::ImageOutcome::Failed { reason } = &result.outcome {
            warn!("⚠️  {}: {}", result.path.display(), reason);
        }
    }
    if report.stopped {
        warn!("Batch stopped before all images were processed");
    }
}

fn run_tag_stats(dir: &Path, pattern: &str) -> Result<()> {
    let captions = tags::collect_captions(dir, pattern)
        .with_context(|| format!("Failed to read captions in {}", dir.display()))?;
    let stats = tags::tag_statistics(&captions);

    println!("🏷️  Tag statistics for {} image(s)", captions.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if stats.is_empty() {
        println!("No tags found.");
        return Ok(());
    }
    for (tag, count) in &stats {
        println!("  {count:>5}  {tag}");
    }

    Ok(())
}

fn run_tag_remove(tag: &str, dir: &Path) -> Result<()> {
    let modified = tags::remove_tag_from_all(dir, tag)
        .with_context(|| format!("Failed to update captions in {}", dir.display()))?;
    println!("✅ Removed '{tag}' from {modified} caption file(s)");
    Ok(())
}

fn run_sort(crops_dir: &Path, output: &Path) -> Result<()> {
    let mut sorter = CharacterSorter::new(crops_dir, output, default_buckets())
        .context("Failed to open sorting session")?;
    let pending = sorter
        .unsorted_images()
        .context("Failed to list unsorted crops")?;

    println!("📁 {} crop(s) to sort", pending.len());
    let keys = sorter
        .buckets()
        .iter()
        .map(|bucket| format!("{}={}", bucket.key, bucket.name))
        .collect::<Vec<_>>()
        .join("  ");
    println!("Keys: {keys}  u=undo  q=quit  (empty line skips)");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut index = 0;

    while let Some(image) = pending.get(index) {
        if sorter.entry(image).is_some() {
            index += 1;
            continue;
        }

        print!("[{}/{}] {} > ", index + 1, pending.len(), image.display());
        io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read from stdin")?;
        let Some(key) = line.trim().chars().next() else {
            index += 1;
            continue;
        };

        match key.to_ascii_lowercase() {
            'q' => break,
            'u' => {
                let target = sorter.undo_target().map(Path::to_path_buf);
                if sorter.undo().context("Failed to undo last sort")? {
                    index = resume_index(&pending, target.as_deref(), index);
                    println!("↩️  Undone");
                } else {
                    println!("Nothing to undo");
                }
            }
            other => {
                let Some(category) = sorter.bucket_for_key(other).map(|b| b.name.clone()) else {
                    println!("Unknown key '{other}'");
                    continue;
                };
                let destination = sorter
                    .sort(image, &category)
                    .with_context(|| format!("Failed to sort {}", image.display()))?;
                println!("  → {}", destination.display());
                index += 1;
            }
        }
    }

    println!("📊 Sorted {} crop(s) in total", sorter.total_sorted());
    for (category, count) in sorter.stats() {
        println!("  ├─ {category}: {count}");
    }

    Ok(())
}

/// Prompt position after an undo: the restored crop, or the current one if it is not pending
fn resume_index(pending: &[PathBuf], restored: Option<&Path>, current: usize) -> usize {
    restored
        .and_then(|restored| pending.iter().position(|image| image == restored))
        .unwrap_or(current)
}

/// Progress bar reporter used with `--progress`
struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar
            .set_message(format!("{}: {}", update.image_id, update.description));
    }

    fn report_completion(&self, image_id: &str, crops: usize, _elapsed_ms: u64) {
        self.bar.set_message(format!("{image_id}: {crops} crops"));
    }

    fn report_error(&self, image_id: &str, stage: ProcessingStage, error: &str) {
        self.bar.println(format!(
            "❌ {image_id}: error during {}: {error}",
            stage.description()
        ));
    }

    fn report_batch_progress(&self, stats: &BatchProcessingStats) {
        self.bar.set_position(stats.items_completed as u64);
        if stats.items_completed >= stats.items_total {
            self.bar.finish_with_message(format!(
                "{} crops from {} images",
                stats.crops_produced, stats.items_total
            ));
        }
    }
}
