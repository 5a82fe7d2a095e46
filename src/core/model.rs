// logsift - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::util::error::FileAccessError;

// =============================================================================
// Match criteria
// =============================================================================

/// Whether a criterion is a literal substring or a regular expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionKind {
    Keyword,
    Regex,
}

impl CriterionKind {
    /// Prefix used in criterion identifiers (`kw:ERROR`, `re:time(out)?`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            CriterionKind::Keyword => "kw",
            CriterionKind::Regex => "re",
        }
    }
}

/// A single keyword or regex condition, compiled at config-load time.
///
/// Immutable once built; see `core::matcher::compile_criterion`.
#[derive(Debug, Clone)]
pub struct MatchCriterion {
    /// Stable identifier reported in `ResultRecord::matched`.
    pub id: String,

    pub kind: CriterionKind,

    /// Pattern text as configured (unescaped for keywords).
    pub pattern: String,

    pub case_sensitive: bool,

    /// Compiled handle. Keywords are compiled as escaped literals so case
    /// folding behaves the same for both kinds.
    pub regex: Regex,
}

/// How multiple criteria combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Accept when at least one criterion fires.
    #[default]
    Any,
    /// Accept only when every criterion fires.
    All,
}

impl MatchMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "any" => Some(MatchMode::Any),
            "all" => Some(MatchMode::All),
            _ => None,
        }
    }
}

// =============================================================================
// Time handling
// =============================================================================

/// How timestamps without an explicit zone offset are interpreted. Applied
/// to log timestamps and window bounds alike so comparisons line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZonePolicy {
    #[default]
    Local,
    Utc,
}

impl ZonePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Some(ZonePolicy::Local),
            "utc" => Some(ZonePolicy::Utc),
            _ => None,
        }
    }
}

/// Inclusive time window. Either bound may be absent (unbounded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// True when neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    /// True when `ts` lies within both bounds (inclusive).
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if ts < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if ts > until {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Text decoding
// =============================================================================

/// What to do with a line whose bytes are not valid in the configured
/// encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Skip the line and count a decode warning.
    #[default]
    Skip,
    /// Decode with U+FFFD replacement characters and count a decode warning.
    Replace,
}

impl DecodePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "skip" => Some(DecodePolicy::Skip),
            "replace" => Some(DecodePolicy::Replace),
            _ => None,
        }
    }
}

// =============================================================================
// Field profile (runtime representation)
// =============================================================================

/// Runtime representation of a field-extraction profile after TOML parsing
/// and regex compilation.
///
/// Built from `ProfileDefinition` (the raw TOML structure) via validation in
/// `core::profile`.
#[derive(Debug, Clone)]
pub struct FieldProfile {
    /// Unique profile identifier (e.g. "haproxy-http").
    pub id: String,

    /// Human-readable name.
    pub name: String,

    pub description: String,

    /// Extraction patterns in priority order. Each has at least one named
    /// capture group.
    pub patterns: Vec<Regex>,

    /// Whether this is a built-in profile (true) or user-defined (false).
    pub is_builtin: bool,
}

impl FieldProfile {
    /// Named capture groups across all patterns, first occurrence order,
    /// without duplicates.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for pattern in &self.patterns {
            for name in pattern.capture_names().flatten() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

// =============================================================================
// Lines and results
// =============================================================================

/// A raw line produced by a line source.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Source file identity, shared by every line of the file.
    pub source: Arc<Path>,

    /// 1-based line number. Strictly increasing within one file's stream.
    pub line_number: u64,

    /// Decoded text without the line terminator.
    pub text: String,

    /// Parsed instant, filled in by the timestamp extractor.
    pub timestamp: Option<DateTime<Utc>>,
}

/// One accepted line: the unit flowing from the orchestrator to a sink.
///
/// The serialised form is the JSONL record. Optional parts are omitted
/// when absent, so the schema is asymmetric by design of JSONL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Serialised lossily, so a non-UTF-8 file name never fails an export.
    #[serde(rename = "file", serialize_with = "serialize_path_lossy")]
    pub source_file: PathBuf,

    pub line_number: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Identifiers of the criteria that fired, in configuration order.
    #[serde(default)]
    pub matched: Vec<String>,

    #[serde(rename = "line")]
    pub raw_text: String,

    /// Id of the profile whose pattern produced `fields`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Extracted fields. Groups that did not participate are absent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

fn serialize_path_lossy<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&path.to_string_lossy())
}

// =============================================================================
// Per-file lifecycle and run summary
// =============================================================================

/// Lifecycle of one input file inside a search run.
///
/// `Open -> Streaming -> (Eof | Following | Error) -> Closed`
///
/// A cancelled run may close a file straight from `Streaming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileState {
    Open,
    Streaming,
    Eof,
    Following,
    Error,
    Closed,
}

impl FileState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: FileState) -> bool {
        use FileState::*;
        matches!(
            (self, next),
            (Open, Streaming)
                | (Open, Error)
                | (Streaming, Eof)
                | (Streaming, Following)
                | (Streaming, Error)
                | (Streaming, Closed)
                | (Following, Error)
                | (Eof, Closed)
                | (Following, Closed)
                | (Error, Closed)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileState::Open => "open",
            FileState::Streaming => "streaming",
            FileState::Eof => "eof",
            FileState::Following => "following",
            FileState::Error => "error",
            FileState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-file search statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: PathBuf,

    /// Lines read from the file (decoded or not).
    pub lines_read: u64,

    /// Lines accepted by the matcher and emitted.
    pub lines_matched: u64,

    /// Dated lines dropped by the time window.
    pub lines_windowed_out: u64,

    /// Lines that could not be decoded in the configured encoding.
    pub decode_warnings: u64,

    /// Follow-mode lines skipped for exceeding the partial-line buffer.
    pub lines_oversized: u64,

    /// Rotations observed in follow mode.
    pub rotations: u64,

    /// Last lifecycle state reached before the file was closed.
    pub final_state: FileState,
}

impl FileSummary {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lines_read: 0,
            lines_matched: 0,
            lines_windowed_out: 0,
            decode_warnings: 0,
            lines_oversized: 0,
            rotations: 0,
            final_state: FileState::Open,
        }
    }
}

/// A file that could not be searched, with the reason.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: FileAccessError,
}

/// Aggregate outcome of one search invocation.
///
/// `files` keeps input order regardless of processing mode.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub files: Vec<FileSummary>,

    pub skipped: Vec<SkippedFile>,

    /// Records successfully handed to the sink.
    pub records_written: u64,

    /// Wall-clock run duration.
    pub duration: Duration,

    /// True when the run stopped because of a cancellation request.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total_lines(&self) -> u64 {
        self.files.iter().map(|f| f.lines_read).sum()
    }

    pub fn total_matched(&self) -> u64 {
        self.files.iter().map(|f| f.lines_matched).sum()
    }

    pub fn total_windowed_out(&self) -> u64 {
        self.files.iter().map(|f| f.lines_windowed_out).sum()
    }

    pub fn total_decode_warnings(&self) -> u64 {
        self.files.iter().map(|f| f.decode_warnings).sum()
    }

    pub fn total_oversized(&self) -> u64 {
        self.files.iter().map(|f| f.lines_oversized).sum()
    }

    pub fn total_rotations(&self) -> u64 {
        self.files.iter().map(|f| f.rotations).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let w = TimeWindow {
            since: Some(ts(9)),
            until: Some(ts(11)),
        };
        assert!(w.contains(ts(9)));
        assert!(w.contains(ts(10)));
        assert!(w.contains(ts(11)));
        assert!(!w.contains(ts(8)));
        assert!(!w.contains(ts(12)));
    }

    #[test]
    fn test_window_open_ended() {
        let w = TimeWindow {
            since: Some(ts(9)),
            until: None,
        };
        assert!(w.contains(ts(23)));
        assert!(!w.contains(ts(1)));
        assert!(TimeWindow::default().is_unbounded());
    }

    #[test]
    fn test_file_state_transitions() {
        assert!(FileState::Open.can_transition_to(FileState::Streaming));
        assert!(FileState::Streaming.can_transition_to(FileState::Following));
        assert!(FileState::Following.can_transition_to(FileState::Closed));
        assert!(!FileState::Closed.can_transition_to(FileState::Open));
        assert!(!FileState::Eof.can_transition_to(FileState::Streaming));
    }

    #[test]
    fn test_result_record_omits_empty_parts() {
        let rec = ResultRecord {
            source_file: PathBuf::from("a.log"),
            line_number: 3,
            timestamp: None,
            matched: vec!["kw:ERROR".to_string()],
            raw_text: "ERROR x".to_string(),
            profile: None,
            fields: BTreeMap::new(),
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(
            json,
            r#"{"file":"a.log","line_number":3,"matched":["kw:ERROR"],"line":"ERROR x"}"#
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_result_record_non_utf8_path_serialises_lossily() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let rec = ResultRecord {
            source_file: PathBuf::from(OsStr::from_bytes(b"/var/log/caf\xe9.log")),
            line_number: 1,
            timestamp: None,
            matched: Vec::new(),
            raw_text: "ERROR".to_string(),
            profile: None,
            fields: BTreeMap::new(),
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(
            json.starts_with("{\"file\":\"/var/log/caf\u{FFFD}.log\","),
            "{json}"
        );
    }

    #[test]
    fn test_mode_parsing_is_case_insensitive() {
        assert_eq!(MatchMode::parse("ALL"), Some(MatchMode::All));
        assert_eq!(ZonePolicy::parse("Utc"), Some(ZonePolicy::Utc));
        assert_eq!(DecodePolicy::parse("replace"), Some(DecodePolicy::Replace));
        assert_eq!(MatchMode::parse("either"), None);
    }
}
