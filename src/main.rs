//! sz CLI
//!
//! Scans a directory tree and lists the directories whose own files take the
//! most space.

use clap::Parser;
use env_logger::Env;
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;

use sz::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_THREADS};
use sz::report::{render, render_json};
use sz::{scan_with_config, FormatOptions, ScanConfig};

/// Per-directory disk usage
#[derive(Parser, Debug)]
#[command(name = "sz")]
#[command(author, about, long_about = None)]
// -h means human-readable, as in du; help stays available as --help and
// -V belongs to --zeroes, so there is no version flag
#[command(disable_help_flag = true)]
struct Cli {
    /// Directory to scan
    dir: PathBuf,

    /// Show sizes in human-readable form (e.g. 2.1G)
    #[arg(short = 'h', long)]
    human: bool,

    /// Worker threads (0 = auto-detect)
    #[arg(short = 't', long, default_value_t = DEFAULT_THREADS)]
    threads: usize,

    /// Milliseconds to wait between checks while all workers are busy
    #[arg(short = 'p', long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval: u64,

    /// List every directory, not only those above 1% of the total
    #[arg(short = 'v', long)]
    nosummary: bool,

    /// Include directories without any file bytes
    #[arg(short = 'V', long)]
    zeroes: bool,

    /// Disable colored output
    #[arg(short = 'c', long)]
    nocolors: bool,

    /// Additional path to skip (repeatable)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Stream JSON progress messages to stderr
    #[arg(long)]
    progress: bool,

    /// Print help
    #[arg(long = "help", action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    debug!("Arguments: {:?}", cli);

    let mut builder = ScanConfig::builder()
        .root(cli.dir.clone())
        .num_threads(cli.threads)
        .poll_interval_ms(cli.poll_interval)
        .show_progress(cli.progress);
    for path in cli.exclude {
        builder = builder.exclude(path);
    }
    let config = builder.build();

    let result = match scan_with_config(&config) {
        Ok(result) => result,
        Err(e) => {
            debug!("Scan could not start: {:?}", e);
            eprintln!("sz: {}", e.message);
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match render_json(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("sz: cannot serialize result: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        let options = FormatOptions::from_flags(cli.human, cli.nosummary, cli.zeroes, cli.nocolors);
        print!("{}", render(&result, &options));
    }

    ExitCode::SUCCESS
}
