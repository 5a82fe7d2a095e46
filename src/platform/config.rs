// logsift - platform/config.rs
//
// Config directory resolution, logsift.toml loading, and merging of the
// file with command-line overrides into the settings of one run.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows) and
// Library (macOS) locations.
//
// Lookup order: an explicit --config path, else ./logsift.toml, else
// <config dir>/logsift.toml. No file at all means defaults. A file that
// exists but is unreadable, oversized or invalid is a ConfigError: the run
// does not start on a half-understood configuration.

use crate::core::config::{SearchConfigBuilder, SearchOptions};
use crate::core::discovery::DiscoveryConfig;
use crate::core::export::OutputFormat;
use crate::core::model::{CriterionKind, DecodePolicy, MatchMode, ZonePolicy};
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved platform paths for logsift configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logsift/).
    pub config_dir: PathBuf,

    /// User profile directory (e.g. ~/.config/logsift/profiles/).
    pub user_profiles_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths, falling back to the current
    /// directory when the platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let user_profiles_dir = config_dir.join(constants::PROFILES_DIR_NAME);
            tracing::debug!(
                config = %config_dir.display(),
                profiles = %user_profiles_dir.display(),
                "Platform paths resolved"
            );
            Self {
                config_dir,
                user_profiles_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                user_profiles_dir: fallback.join(constants::PROFILES_DIR_NAME),
                config_dir: fallback,
            }
        }
    }
}

// =============================================================================
// logsift.toml shape
// =============================================================================

/// Raw deserialisable shape of logsift.toml. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub search: SearchSection,
    pub files: FilesSection,
    pub timestamp: TimestampSection,
    pub window: WindowSection,
    pub fields: FieldsSection,
    pub output: OutputSection,
    pub follow: FollowSection,
    pub performance: PerformanceSection,
    pub logging: LoggingSection,
}

/// `[search]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub keywords: Vec<String>,
    pub regexes: Vec<String>,
    /// `[[search.criteria]]`: criteria with their own case sensitivity.
    pub criteria: Vec<CriterionEntry>,
    /// "any" or "all".
    pub match_mode: Option<String>,
    pub ignore_case: Option<bool>,
    pub match_all_lines: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CriterionEntry {
    /// "keyword" or "regex".
    pub kind: String,
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: Option<bool>,
}

/// `[files]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub include: Vec<String>,
    pub exclude: Option<Vec<String>>,
    pub encoding: Option<String>,
    /// "skip" or "replace".
    pub decode_errors: Option<String>,
    pub max_depth: Option<usize>,
    pub max_files: Option<usize>,
}

/// `[timestamp]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TimestampSection {
    pub enabled: Option<bool>,
    /// "local" or "utc".
    pub zone: Option<String>,
    /// `[[timestamp.patterns]]`: replaces the built-in patterns when set.
    pub patterns: Vec<TimestampPatternEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TimestampPatternEntry {
    pub regex: String,
    pub format: String,
}

/// `[window]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub since: Option<String>,
    pub until: Option<String>,
}

/// `[fields]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FieldsSection {
    /// Profile ids in the order they are tried. Unset means all.
    pub profiles: Option<Vec<String>>,
    pub profile_dir: Option<PathBuf>,
}

/// `[output]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub format: Option<String>,
    pub path: Option<PathBuf>,
}

/// `[follow]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FollowSection {
    pub enabled: Option<bool>,
    pub poll_interval_ms: Option<u64>,
}

/// `[performance]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PerformanceSection {
    pub parallel: Option<bool>,
    pub worker_threads: Option<usize>,
}

/// `[logging]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// "error", "warn", "info", "debug" or "trace".
    pub level: Option<String>,
}

// =============================================================================
// Loading
// =============================================================================

/// Pick the config file to load, if any.
pub fn locate_config(explicit: Option<&Path>, paths: &PlatformPaths) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(constants::CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    let platform = paths.config_dir.join(constants::CONFIG_FILE_NAME);
    platform.is_file().then_some(platform)
}

/// Read and parse one config file.
pub fn load_config_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let io_err = |e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > constants::MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            max_size: constants::MAX_CONFIG_FILE_SIZE,
        });
    }

    let content = std::fs::read_to_string(path).map_err(io_err)?;
    let raw = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "Loaded config file");
    Ok(raw)
}

// =============================================================================
// Merging with the command line
// =============================================================================

/// Command-line values that override or extend the config file.
///
/// `Vec` fields extend the file's lists; `Option` and `bool` fields
/// override when set.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub keywords: Vec<String>,
    pub regexes: Vec<String>,
    /// Drop criteria from the config file instead of adding to them.
    pub replace_criteria: bool,
    pub mode: Option<MatchMode>,
    pub match_all_lines: bool,
    pub ignore_case: bool,
    pub since: Option<String>,
    pub until: Option<String>,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
    pub encoding: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub profiles: Vec<String>,
    pub profile_dir: Option<PathBuf>,
    pub follow: bool,
    pub parallel: bool,
}

/// Everything `main` needs to start a run, before profiles are loaded.
#[derive(Debug)]
pub struct RunPlan {
    /// Search settings; profiles still have to be supplied.
    pub search: SearchConfigBuilder,
    pub discovery: DiscoveryConfig,
    pub format: OutputFormat,
    /// `None` writes to stdout.
    pub output: Option<PathBuf>,
    pub options: SearchOptions,
    pub profile_dir: PathBuf,
    pub log_level: Option<String>,
}

/// Merge `raw` and `cli` into a run plan, validating every enumerated or
/// bounded value.
pub fn resolve(
    raw: RawConfig,
    cli: Overrides,
    paths: &PlatformPaths,
) -> Result<RunPlan, ConfigError> {
    let mut search = SearchConfigBuilder::default();

    // -- Criteria --
    if !cli.replace_criteria {
        for entry in &raw.search.criteria {
            let kind = match entry.kind.to_ascii_lowercase().as_str() {
                "keyword" => CriterionKind::Keyword,
                "regex" => CriterionKind::Regex,
                other => {
                    return Err(invalid("search.criteria.kind", other, "keyword, regex"));
                }
            };
            search = search.criterion(kind, entry.pattern.clone(), entry.case_sensitive);
        }
        for keyword in raw.search.keywords {
            search = search.keyword(keyword);
        }
        for regex in raw.search.regexes {
            search = search.regex(regex);
        }
    }
    for keyword in cli.keywords {
        search = search.keyword(keyword);
    }
    for regex in cli.regexes {
        search = search.regex(regex);
    }

    let mode = match (cli.mode, raw.search.match_mode.as_deref()) {
        (Some(mode), _) => mode,
        (None, Some(value)) => {
            MatchMode::parse(value).ok_or_else(|| invalid("search.match_mode", value, "any, all"))?
        }
        (None, None) => MatchMode::default(),
    };
    let ignore_case = cli.ignore_case || raw.search.ignore_case.unwrap_or(false);
    search = search
        .mode(mode)
        .case_sensitive(!ignore_case)
        .match_all_lines(cli.match_all_lines || raw.search.match_all_lines.unwrap_or(false));

    // -- Files --
    let mut discovery = DiscoveryConfig {
        include: raw.files.include,
        ..DiscoveryConfig::default()
    };
    discovery.include.extend(cli.include);
    if let Some(exclude) = raw.files.exclude {
        discovery.exclude = exclude;
    }
    discovery.exclude.extend(cli.exclude);
    if let Some(depth) = raw.files.max_depth {
        discovery.max_depth = bounded(
            "files.max_depth",
            depth,
            1,
            constants::ABSOLUTE_MAX_DEPTH,
        )?;
    }
    if let Some(max_files) = raw.files.max_files {
        discovery.max_files = bounded(
            "files.max_files",
            max_files,
            1,
            constants::ABSOLUTE_MAX_FILES,
        )?;
    }
    for pattern in &discovery.include {
        search = search.include(pattern.clone());
    }
    for pattern in &discovery.exclude {
        search = search.exclude(pattern.clone());
    }

    if let Some(label) = cli.encoding.or(raw.files.encoding) {
        search = search.encoding(label);
    }
    if let Some(value) = raw.files.decode_errors.as_deref() {
        let policy = DecodePolicy::parse(value)
            .ok_or_else(|| invalid("files.decode_errors", value, "skip, replace"))?;
        search = search.decode_policy(policy);
    }

    // -- Timestamps and window --
    search = search.timestamps(raw.timestamp.enabled.unwrap_or(true));
    if let Some(value) = raw.timestamp.zone.as_deref() {
        let zone =
            ZonePolicy::parse(value).ok_or_else(|| invalid("timestamp.zone", value, "local, utc"))?;
        search = search.zone(zone);
    }
    for entry in raw.timestamp.patterns {
        search = search.timestamp_pattern(entry.regex, entry.format);
    }
    if let Some(since) = cli.since.or(raw.window.since) {
        search = search.since(since);
    }
    if let Some(until) = cli.until.or(raw.window.until) {
        search = search.until(until);
    }

    // -- Fields --
    if !cli.profiles.is_empty() {
        search = search.select_profiles(cli.profiles);
    } else if let Some(ids) = raw.fields.profiles {
        search = search.select_profiles(ids);
    }
    let profile_dir = cli
        .profile_dir
        .or(raw.fields.profile_dir)
        .unwrap_or_else(|| paths.user_profiles_dir.clone());

    // -- Output --
    let format = match cli.format.or(raw.output.format) {
        Some(value) => OutputFormat::parse(&value)
            .ok_or_else(|| invalid("output.format", &value, "console, csv, jsonl"))?,
        None => OutputFormat::default(),
    };
    let output = cli.output.or(raw.output.path);

    // -- Execution --
    let mut options = SearchOptions {
        follow: cli.follow || raw.follow.enabled.unwrap_or(false),
        parallel: cli.parallel || raw.performance.parallel.unwrap_or(false),
        ..SearchOptions::default()
    };
    if let Some(ms) = raw.follow.poll_interval_ms {
        let ms = bounded(
            "follow.poll_interval_ms",
            ms,
            constants::MIN_FOLLOW_POLL_INTERVAL_MS,
            constants::MAX_FOLLOW_POLL_INTERVAL_MS,
        )?;
        options.poll_interval = Duration::from_millis(ms);
    }
    if let Some(threads) = raw.performance.worker_threads {
        options.worker_threads = bounded(
            "performance.worker_threads",
            threads,
            0,
            constants::MAX_WORKER_THREADS,
        )?;
    }

    // -- Logging --
    let log_level = match raw.logging.level {
        Some(level) => {
            let valid = ["error", "warn", "info", "debug", "trace"];
            if !valid.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(invalid(
                    "logging.level",
                    &level,
                    "error, warn, info, debug, trace",
                ));
            }
            Some(level.to_ascii_lowercase())
        }
        None => None,
    };

    Ok(RunPlan {
        search,
        discovery,
        format,
        output,
        options,
        profile_dir,
        log_level,
    })
}

fn invalid(field: &'static str, value: &str, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn bounded<T>(field: &'static str, value: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            field,
            value: value.to_string(),
            expected: format!("{min}-{max}"),
        })
    }
}
