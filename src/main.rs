use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rir_unpleasantness::report::Summary;
use rir_unpleasantness::{AnalysisConfig, AnalysisResult, Analyzer, ScoreModel, Verdict};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "rir-unpleasantness")]
#[command(author, version, about = "Rate the unpleasantness of rooms from their impulse responses")]
struct Args {
    /// Impulse response file or directory of recordings
    path: PathBuf,

    /// Output report file (.csv, .json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for auto-generated reports
    #[arg(long, default_value = "rir-reports")]
    report_dir: PathBuf,

    /// Don't auto-generate a CSV report
    #[arg(long)]
    no_report: bool,

    /// Analysis parameters (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Score model (JSON, linear or MLP)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Write the default parameters to this TOML file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Number of parallel workers (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Skip spatial asymmetry even for four-channel files
    #[arg(long)]
    no_spatial: bool,

    /// Include per-feature details in JSON reports
    #[arg(long)]
    details: bool,

    /// Debug logging and per-file error messages
    #[arg(short, long)]
    verbose: bool,

    /// Only show summary
    #[arg(short, long)]
    quiet: bool,
}

const SUPPORTED_EXTENSIONS: [&str; 3] = ["wav", "wave", "flac"];

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_dir() {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .map(|e| e.path().to_path_buf())
            .collect()
    } else {
        vec![path.to_path_buf()]
    }
}

fn build_analyzer(args: &Args) -> rir_unpleasantness::Result<Analyzer> {
    let config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    let mut analyzer = Analyzer::new()
        .with_config(config)
        .with_skip_spatial(args.no_spatial)
        .with_details(args.details);
    if let Some(path) = &args.model {
        analyzer = analyzer.with_model(ScoreModel::load(path)?);
    }
    Ok(analyzer)
}

fn fmt_score(value: Option<f64>) -> String {
    value.map(|v| format!("{:>7.3}", v)).unwrap_or_else(|| format!("{:>7}", "-"))
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Some(path) = &args.dump_config {
        if let Err(e) = AnalysisConfig::default().save(path) {
            error!("Failed to write config: {}", e);
            std::process::exit(1);
        }
        eprintln!("Default parameters written to {}", path.display());
        return;
    }

    let analyzer = match build_analyzer(&args) {
        Ok(a) => a,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // Set up thread pool
    if let Some(jobs) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .ok();
    }

    let files = collect_files(&args.path);
    if files.is_empty() {
        eprintln!("No impulse responses found (supported: wav, flac)");
        std::process::exit(1);
    }
    info!(files = files.len(), "starting analysis");

    if !args.quiet {
        eprintln!("\x1b[1mRIR Unpleasantness\x1b[0m");
        eprintln!("{}", "─".repeat(78));
        eprintln!("Found {} impulse response(s)\n", files.len());
    }

    let pb = if !args.quiet && files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        pb.set_style(style);
        Some(pb)
    } else {
        None
    };

    // Analyze files in parallel
    let results: Vec<AnalysisResult> = files
        .par_iter()
        .map(|path| {
            let result = analyzer.analyze(path);
            if let Some(ref pb) = pb {
                pb.inc(1);
                pb.set_message(result.file_name.clone());
            }
            result
        })
        .collect();

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if !args.quiet {
        println!(
            "{:<10} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}  {}",
            "VERDICT", "COLOUR", "FLUTTER", "ASYM", "CURV", "HFDAMP", "RATING", "FILE"
        );
        for r in &results {
            let color = match r.verdict {
                Verdict::Ok => "\x1b[32m",
                Verdict::Partial => "\x1b[33m",
                Verdict::Error => "\x1b[90m",
            };
            let reset = "\x1b[0m";

            println!(
                "{}{:<10}{} {} {} {} {} {} {}  {}",
                color,
                format!("[{}]", r.verdict),
                reset,
                fmt_score(r.colouration),
                fmt_score(r.flutter_echo),
                fmt_score(r.asymmetry),
                fmt_score(r.curvature),
                fmt_score(r.hf_damping),
                fmt_score(r.rating),
                &r.file_name
            );

            if args.verbose {
                if let Some(ref e) = r.error {
                    eprintln!("    {}", e);
                }
            }
        }
    }

    let summary = Summary::from_results(&results);
    if !args.quiet {
        eprintln!("\n{}", "─".repeat(78));
        eprintln!("\x1b[1mSummary:\x1b[0m");
        eprintln!("  \x1b[32m✓ Complete:\x1b[0m {}", summary.ok);
        eprintln!("  \x1b[33m? Partial:\x1b[0m  {}", summary.partial);
        if summary.error > 0 {
            eprintln!("  \x1b[90mErrors:\x1b[0m     {}", summary.error);
        }
        if let Some(mean) = summary.mean_rating {
            eprintln!("  Mean rating: {:.1}", mean);
        }
    }

    // Determine report path
    let report_path = if let Some(ref output) = args.output {
        Some(output.clone())
    } else if !args.no_report {
        std::fs::create_dir_all(&args.report_dir).ok();
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("rir_report_{}.csv", timestamp);
        Some(args.report_dir.join(filename))
    } else {
        None
    };

    if let Some(ref output_path) = report_path {
        if let Err(e) = rir_unpleasantness::report::generate(output_path, &results) {
            error!("Failed to write report: {}", e);
            std::process::exit(1);
        }
        if !args.quiet {
            eprintln!("\n\x1b[32mReport saved: {}\x1b[0m", output_path.display());
        }
    }

    // Exit code: 2 if nothing could be analysed, 1 if anything failed
    if summary.error == summary.total {
        std::process::exit(2);
    } else if summary.error > 0 || summary.partial > 0 {
        std::process::exit(1);
    }
}
