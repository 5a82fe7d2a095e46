// logsift - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every bound used by the search pipeline is declared here so limits are
// auditable in one place.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "logsift";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "logsift";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name, looked up in the working directory first and
/// then in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "logsift.toml";

/// User profiles subdirectory name (under the platform config directory).
pub const PROFILES_DIR_NAME: &str = "profiles";

/// Maximum size of a configuration file in bytes.
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024; // 1 MB

/// Default text encoding label for log files.
pub const DEFAULT_ENCODING: &str = "utf-8";

// =============================================================================
// Matching limits
// =============================================================================

/// Maximum regex pattern length (criteria, timestamp and profile patterns).
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Compiled-size limit handed to the regex builder for user patterns.
pub const REGEX_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

/// Maximum number of match criteria in one search.
pub const MAX_CRITERIA: usize = 256;

/// How far ahead of the clock a year-less timestamp may be before it is
/// taken to belong to the previous year.
pub const YEARLESS_FUTURE_TOLERANCE_HOURS: i64 = 24;

// =============================================================================
// Profile limits
// =============================================================================

/// Maximum number of field profiles that can be loaded (built-in + user).
pub const MAX_PROFILES: usize = 100;

/// Maximum number of patterns inside a single profile.
pub const MAX_PATTERNS_PER_PROFILE: usize = 32;

/// Maximum size of a profile TOML file in bytes.
pub const MAX_PROFILE_FILE_SIZE: u64 = 64 * 1024; // 64 KB

// =============================================================================
// File access
// =============================================================================

/// Retry delays for transient open/read errors. The number of attempts is
/// the length of this table.
pub const OPEN_RETRY_DELAYS_MS: [u64; 3] = [50, 100, 200];

/// Read buffer capacity for line sources.
pub const READ_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// gzip magic bytes, used when a compressed file lacks the `.gz` suffix.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Default include glob patterns applied to directory arguments.
pub const DEFAULT_DIRECTORY_INCLUDE: &[&str] = &["*.log", "*.out", "*.log.[0-9]*", "*.gz"];

/// Default exclude glob patterns.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["**/archive/**", "**/.Trash/**"];

/// Maximum directory recursion depth when a directory is given as input.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Upper bound accepted for a configured recursion depth.
pub const ABSOLUTE_MAX_DEPTH: usize = 64;

/// Hard upper bound on the number of candidate files in one run.
pub const ABSOLUTE_MAX_FILES: usize = 10_000;

// =============================================================================
// Follow (live tail) limits
// =============================================================================

/// How often a follower polls its file for new content (ms).
pub const FOLLOW_POLL_INTERVAL_MS: u64 = 500;

/// How often the cancel flag is checked within each poll sleep interval (ms).
pub const FOLLOW_CANCEL_CHECK_INTERVAL_MS: u64 = 100;

/// Minimum user-configurable follow poll interval (ms).
pub const MIN_FOLLOW_POLL_INTERVAL_MS: u64 = 10;

/// Maximum user-configurable follow poll interval (ms).
pub const MAX_FOLLOW_POLL_INTERVAL_MS: u64 = 10_000; // 10 s

/// Maximum bytes read from a single followed file in one read.
pub const MAX_FOLLOW_READ_BYTES_PER_TICK: usize = 512 * 1_024; // 512 KiB

/// Maximum accumulated size of the partial (in-progress) line buffer for a
/// followed file. A line beyond this is skipped up to its newline.
pub const MAX_FOLLOW_PARTIAL_BYTES: usize = MAX_FOLLOW_READ_BYTES_PER_TICK * 4; // 2 MiB

// =============================================================================
// Parallel search
// =============================================================================

/// Default number of worker threads for parallel file processing.
/// 0 means auto-detect (use available CPU cores).
pub const DEFAULT_WORKER_THREADS: usize = 0;

/// Hard upper bound on worker threads.
pub const MAX_WORKER_THREADS: usize = 256;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;
