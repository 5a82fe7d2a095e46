// logsift - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation: every variant carries the structured
// context (field, file, pattern) needed to fix the cause.
//
// Fatal for a run: ConfigError, ProfileError, ExportError (wrapped in
// SearchError). Recoverable at file granularity: FileAccessError, which is
// recorded in the RunSummary instead of being propagated.

use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for a search run.
#[derive(Debug)]
pub enum SearchError {
    /// Configuration loading or validation failed. Raised before any file
    /// is opened.
    Config(ConfigError),

    /// Field profile loading or validation failed.
    Profile(ProfileError),

    /// The result sink could not be written. Output flushed before the
    /// failure is left in place.
    Export {
        source: ExportError,
        records_written: u64,
    },

    /// I/O error with path context (outside of per-file search I/O).
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Profile(e) => write!(f, "Profile error: {e}"),
            Self::Export {
                source,
                records_written,
            } => write!(
                f,
                "Export error after {records_written} record(s) written: {source}"
            ),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Profile(e) => Some(e),
            Self::Export { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors raised while loading, merging or validating the search
/// configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// I/O error reading the config file.
    Io { path: PathBuf, source: io::Error },

    /// Config file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// No criteria were given and match-all-lines mode is off.
    EmptyCriteria,

    /// More criteria than the named bound allows.
    TooManyCriteria { count: usize, max: usize },

    /// A criterion pattern failed to compile.
    InvalidCriterion {
        pattern: String,
        source: regex::Error,
    },

    /// A pattern exceeds the maximum allowed length.
    PatternTooLong {
        field: &'static str,
        length: usize,
        max_length: usize,
    },

    /// The time window start is after its end.
    InvalidWindow {
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },

    /// A time window bound could not be parsed.
    InvalidWindowBound { field: &'static str, value: String },

    /// A timestamp pattern regex failed to compile.
    InvalidTimestampPattern {
        pattern: String,
        source: regex::Error,
    },

    /// A timestamp format string is empty or unusable.
    InvalidTimestampFormat { format: String, reason: String },

    /// A selected field profile id is not loaded.
    UnknownProfile { id: String },

    /// The encoding label is not recognised.
    UnknownEncoding { label: String },

    /// The encoding is recognised but cannot be split on newline bytes.
    UnsupportedEncoding { label: String },

    /// A config value is not one of the accepted values.
    InvalidValue {
        field: &'static str,
        value: String,
        expected: String,
    },

    /// A glob pattern failed to compile.
    InvalidGlob {
        pattern: String,
        source: glob::PatternError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Config '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::EmptyCriteria => write!(
                f,
                "No keywords or regexes given. Add [search] keywords/regexes, \
                 pass --keyword/--regex, or enable match_all_lines."
            ),
            Self::TooManyCriteria { count, max } => {
                write!(f, "{count} criteria given, maximum is {max}")
            }
            Self::InvalidCriterion { pattern, source } => {
                write!(f, "Invalid search regex '{pattern}': {source}")
            }
            Self::PatternTooLong {
                field,
                length,
                max_length,
            } => write!(
                f,
                "Pattern in '{field}' is {length} chars, exceeds maximum of {max_length}"
            ),
            Self::InvalidWindow { since, until } => write!(
                f,
                "Time window start {} is after its end {}",
                since.to_rfc3339(),
                until.to_rfc3339()
            ),
            Self::InvalidWindowBound { field, value } => write!(
                f,
                "Cannot parse {field} = '{value}'. Expected YYYY-MM-DD, \
                 YYYY-MM-DD HH:MM, YYYY-MM-DD HH:MM:SS or RFC 3339"
            ),
            Self::InvalidTimestampPattern { pattern, source } => {
                write!(f, "Invalid timestamp regex '{pattern}': {source}")
            }
            Self::InvalidTimestampFormat { format, reason } => {
                write!(f, "Invalid timestamp format '{format}': {reason}")
            }
            Self::UnknownProfile { id } => {
                write!(f, "Field profile '{id}' is not loaded")
            }
            Self::UnknownEncoding { label } => {
                write!(f, "Unknown text encoding '{label}'")
            }
            Self::UnsupportedEncoding { label } => write!(
                f,
                "Encoding '{label}' is not ASCII-compatible; line splitting is unsupported"
            ),
            Self::InvalidValue {
                field,
                value,
                expected,
            } => write!(f, "Config '{field}' = '{value}' is invalid. Expected: {expected}"),
            Self::InvalidGlob { pattern, source } => {
                write!(f, "Invalid glob pattern '{pattern}': {source}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::InvalidCriterion { source, .. } => Some(source),
            Self::InvalidTimestampPattern { source, .. } => Some(source),
            Self::InvalidGlob { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for SearchError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Profile errors
// ---------------------------------------------------------------------------

/// Errors related to field profile loading and validation.
#[derive(Debug)]
pub enum ProfileError {
    /// TOML file could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Profile file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// A required field is missing from the profile definition.
    MissingField {
        profile_id: String,
        field: &'static str,
    },

    /// A regex pattern in the profile is invalid.
    InvalidRegex {
        profile_id: String,
        pattern_index: usize,
        pattern: String,
        source: regex::Error,
    },

    /// A regex pattern exceeds the maximum allowed length.
    RegexTooLong {
        profile_id: String,
        pattern_index: usize,
        length: usize,
        max_length: usize,
    },

    /// A pattern has no named capture groups, so it can never produce fields.
    NoNamedGroups {
        profile_id: String,
        pattern_index: usize,
    },

    /// A profile declares more patterns than allowed.
    TooManyPatterns {
        profile_id: String,
        count: usize,
        max: usize,
    },

    /// Two user profiles share an id.
    DuplicateId {
        id: String,
        path1: PathBuf,
        path2: PathBuf,
    },

    /// Maximum number of profiles exceeded.
    TooManyProfiles { count: usize, max: usize },

    /// I/O error reading a profile file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse TOML '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Profile '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::MissingField { profile_id, field } => {
                write!(
                    f,
                    "Profile '{profile_id}': missing required field '{field}'"
                )
            }
            Self::InvalidRegex {
                profile_id,
                pattern_index,
                pattern,
                source,
            } => write!(
                f,
                "Profile '{profile_id}': invalid regex in patterns[{pattern_index}] ('{pattern}'): {source}"
            ),
            Self::RegexTooLong {
                profile_id,
                pattern_index,
                length,
                max_length,
            } => write!(
                f,
                "Profile '{profile_id}': patterns[{pattern_index}] is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::NoNamedGroups {
                profile_id,
                pattern_index,
            } => write!(
                f,
                "Profile '{profile_id}': patterns[{pattern_index}] has no named capture groups"
            ),
            Self::TooManyPatterns {
                profile_id,
                count,
                max,
            } => write!(
                f,
                "Profile '{profile_id}': {count} patterns declared, maximum is {max}"
            ),
            Self::DuplicateId { id, path1, path2 } => write!(
                f,
                "Duplicate profile ID '{id}' in '{}' and '{}'",
                path1.display(),
                path2.display()
            ),
            Self::TooManyProfiles { count, max } => {
                write!(f, "Too many profiles loaded ({count}), maximum is {max}")
            }
            Self::Io { path, source } => {
                write!(
                    f,
                    "I/O error reading profile '{}': {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ProfileError> for SearchError {
    fn from(e: ProfileError) -> Self {
        Self::Profile(e)
    }
}

// ---------------------------------------------------------------------------
// File access errors
// ---------------------------------------------------------------------------

/// Errors opening or reading a single input file. Never fatal for the run:
/// the file is recorded as skipped and the search continues.
#[derive(Debug)]
pub enum FileAccessError {
    /// The path does not exist.
    NotFound { path: PathBuf },

    /// The path exists but cannot be opened.
    PermissionDenied { path: PathBuf, source: io::Error },

    /// The path is a directory, socket, or other non-regular file.
    NotAFile { path: PathBuf },

    /// Follow mode was requested on a compressed file.
    FollowCompressed { path: PathBuf },

    /// Any other error opening the file (after retries).
    Open { path: PathBuf, source: io::Error },

    /// The file was opened but a read failed part-way through.
    Read {
        path: PathBuf,
        line_number: u64,
        source: io::Error,
    },
}

impl FileAccessError {
    /// Build the right variant for an I/O error raised while opening `path`.
    pub fn from_open(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, source },
            _ => Self::Open { path, source },
        }
    }

    /// The path this error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::NotFound { path }
            | Self::PermissionDenied { path, .. }
            | Self::NotAFile { path }
            | Self::FollowCompressed { path }
            | Self::Open { path, .. }
            | Self::Read { path, .. } => path,
        }
    }
}

impl fmt::Display for FileAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "'{}' does not exist", path.display()),
            Self::PermissionDenied { path, source } => {
                write!(f, "Permission denied opening '{}': {source}", path.display())
            }
            Self::NotAFile { path } => {
                write!(f, "'{}' is not a regular file", path.display())
            }
            Self::FollowCompressed { path } => write!(
                f,
                "'{}' is compressed; follow mode skips compressed files",
                path.display()
            ),
            Self::Open { path, source } => {
                write!(f, "Cannot open '{}': {source}", path.display())
            }
            Self::Read {
                path,
                line_number,
                source,
            } => write!(
                f,
                "Read error in '{}' after line {line_number}: {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for FileAccessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PermissionDenied { source, .. } => Some(source),
            Self::Open { source, .. } => Some(source),
            Self::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to writing result records to a sink.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the destination.
    Io {
        destination: String,
        source: io::Error,
    },

    /// CSV serialisation error.
    Csv {
        destination: String,
        source: csv::Error,
    },

    /// JSON serialisation error.
    Json {
        destination: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io {
                destination,
                source,
            } => write!(f, "Export I/O error '{destination}': {source}"),
            Self::Csv {
                destination,
                source,
            } => write!(f, "CSV export error '{destination}': {source}"),
            Self::Json {
                destination,
                source,
            } => write!(f, "JSON export error '{destination}': {source}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

/// Convenience type alias for search results.
pub type Result<T> = std::result::Result<T, SearchError>;
