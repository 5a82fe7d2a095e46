// logsift - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. Config file loading and merging with CLI overrides
// 3. Logging initialisation (debug mode support)
// 4. Field profile loading (built-in + user-defined)
// 5. File discovery, the search run, and the end-of-run report
//
// Exit codes: 0 run completed, 1 no input files, 2 configuration error,
// 3 export error.

use clap::Parser;
use logsift::app::{profile_mgr, search};
use logsift::core::config::SearchConfig;
use logsift::core::discovery;
use logsift::core::export::{self, OutputFormat, RecordSink};
use logsift::core::model::{MatchMode, RunSummary};
use logsift::platform::config::{self, Overrides, PlatformPaths, RunPlan};
use logsift::util::constants;
use logsift::util::error::{self, SearchError};
use logsift::util::logging;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_NO_INPUT: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_EXPORT: u8 = 3;

/// Search log files for keywords and patterns, extract fields from known
/// formats, and export the matches.
#[derive(Parser, Debug)]
#[command(name = "logsift", version, about)]
struct Cli {
    /// Files, directories or glob patterns to search.
    paths: Vec<String>,

    /// Config file (default: ./logsift.toml, then the user config dir).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Keyword to search for (repeatable).
    #[arg(short = 'k', long = "keyword")]
    keywords: Vec<String>,

    /// Regular expression to search for (repeatable).
    #[arg(short = 'r', long = "regex")]
    regexes: Vec<String>,

    /// Ignore criteria from the config file.
    #[arg(long)]
    replace_criteria: bool,

    /// Accept a line when any criterion matches (default).
    #[arg(long, conflicts_with = "all")]
    any: bool,

    /// Accept a line only when every criterion matches.
    #[arg(long)]
    all: bool,

    /// Emit every line in the window, regardless of criteria.
    #[arg(long)]
    match_all_lines: bool,

    /// Window start, e.g. "2025-08-10 09:00:00" or RFC 3339.
    #[arg(long)]
    since: Option<String>,

    /// Window end (inclusive).
    #[arg(long)]
    until: Option<String>,

    /// Output format: console, csv or jsonl.
    #[arg(long)]
    format: Option<String>,

    /// Write results to this file instead of stdout.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Text encoding of the input files (WHATWG label).
    #[arg(long)]
    encoding: Option<String>,

    /// Case-insensitive matching.
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Additional include entry (repeatable).
    #[arg(long = "include")]
    include: Vec<String>,

    /// Exclude glob (repeatable).
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Field profile id to try, in order (repeatable).
    #[arg(long = "profile")]
    profiles: Vec<String>,

    /// Directory with user-defined field profiles.
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Keep files open and print new lines as they are appended.
    #[arg(short = 'f', long)]
    follow: bool,

    /// Search files in parallel.
    #[arg(long)]
    parallel: bool,

    /// Enable debug logging.
    #[arg(short = 'd', long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let mode = if self.all {
            Some(MatchMode::All)
        } else if self.any {
            Some(MatchMode::Any)
        } else {
            None
        };
        let mut include = self.paths.clone();
        include.extend(self.include.iter().cloned());

        Overrides {
            keywords: self.keywords.clone(),
            regexes: self.regexes.clone(),
            replace_criteria: self.replace_criteria,
            mode,
            match_all_lines: self.match_all_lines,
            ignore_case: self.ignore_case,
            since: self.since.clone(),
            until: self.until.clone(),
            format: self.format.clone(),
            output: self.output.clone(),
            encoding: self.encoding.clone(),
            include,
            exclude: self.exclude.clone(),
            profiles: self.profiles.clone(),
            profile_dir: self.profile_dir.clone(),
            follow: self.follow,
            parallel: self.parallel,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let plan = match load_plan(&cli, &platform_paths) {
        Ok(plan) => plan,
        Err(e) => {
            logging::init(cli.debug, None);
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    logging::init(cli.debug, plan.log_level.as_deref());
    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "logsift starting"
    );

    match run(plan) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            eprintln!("Error: {e}");
            let code = match e {
                SearchError::Config(_) | SearchError::Profile(_) => EXIT_CONFIG,
                SearchError::Export { .. } | SearchError::Io { .. } => EXIT_EXPORT,
            };
            ExitCode::from(code)
        }
    }
}

fn load_plan(cli: &Cli, paths: &PlatformPaths) -> error::Result<RunPlan> {
    let raw = match config::locate_config(cli.config.as_deref(), paths) {
        Some(path) => config::load_config_file(&path)?,
        None => config::RawConfig::default(),
    };
    Ok(config::resolve(raw, cli.overrides(), paths)?)
}

fn run(plan: RunPlan) -> error::Result<ExitCode> {
    let RunPlan {
        search: builder,
        discovery: discovery_config,
        format,
        output,
        options,
        profile_dir,
        ..
    } = plan;

    let (profiles, _profile_errors) = profile_mgr::load_all_profiles(Some(&profile_dir));
    let search_config = builder.available_profiles(profiles).build()?;

    let found = discovery::discover_files(&discovery_config)?;
    for warning in &found.warnings {
        tracing::warn!("{warning}");
    }
    if found.files.is_empty() {
        eprintln!("No input files matched");
        return Ok(ExitCode::from(EXIT_NO_INPUT));
    }

    let cancel = search::CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %e, "Cannot install Ctrl-C handler");
    }

    let mut sink = open_sink(format, output.as_ref(), &search_config)?;
    let summary = search::run_search(
        &found.files,
        &search_config,
        sink.as_mut(),
        &options,
        &cancel,
    )?;

    report(&summary);
    Ok(ExitCode::SUCCESS)
}

fn open_sink(
    format: OutputFormat,
    output: Option<&PathBuf>,
    search_config: &SearchConfig,
) -> error::Result<Box<dyn RecordSink + Send>> {
    let export_err = |source| SearchError::Export {
        source,
        records_written: 0,
    };

    match output {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|source| SearchError::Io {
                path: path.clone(),
                operation: "create output file",
                source,
            })?;
            export::create_sink(
                format,
                BufWriter::new(file),
                path.display().to_string(),
                search_config,
            )
            .map_err(export_err)
        }
        None => export::create_sink(format, std::io::stdout(), "stdout", search_config)
            .map_err(export_err),
    }
}

/// End-of-run report on stderr; stdout carries only records.
fn report(summary: &RunSummary) {
    eprintln!(
        "{} file(s) searched, {} line(s), {} match(es), {} outside window, {} decode warning(s){}",
        summary.files.len(),
        summary.total_lines(),
        summary.total_matched(),
        summary.total_windowed_out(),
        summary.total_decode_warnings(),
        if summary.cancelled { " (cancelled)" } else { "" },
    );
    if summary.total_oversized() > 0 {
        eprintln!(
            "{} over-long line(s) skipped while following",
            summary.total_oversized()
        );
    }
    if summary.total_rotations() > 0 {
        eprintln!("{} rotation(s) followed", summary.total_rotations());
    }
    for skipped in &summary.skipped {
        eprintln!("skipped {}: {}", skipped.path.display(), skipped.reason);
    }
}
