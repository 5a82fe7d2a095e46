// logsift - tests/e2e_search.rs
//
// End-to-end tests for static (non-follow) searches.
//
// These tests exercise the real filesystem, real profile loading, real gzip
// decoding and real chrono timestamp parsing. No mocks, no stubs: a raw log
// file on disk goes in, result records and a run summary come out.

use flate2::write::GzEncoder;
use flate2::Compression;
use logsift::app::search::{run_search, CancelToken};
use logsift::core::config::{SearchConfig, SearchOptions};
use logsift::core::export::{CsvExporter, JsonlExporter, RecordSink};
use logsift::core::model::{FileState, MatchMode, ResultRecord, RunSummary, ZonePolicy};
use logsift::core::profile::load_builtin_profiles;
use logsift::util::error::{ExportError, FileAccessError, SearchError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

/// Absolute path to the on-disk fixture files.
fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn disk_full_config() -> SearchConfig {
    SearchConfig::builder()
        .keyword("ERROR")
        .zone(ZonePolicy::Utc)
        .since("2025-08-10 09:00:00")
        .until("2025-08-10 11:00:00")
        .available_profiles(load_builtin_profiles())
        .build()
        .unwrap()
}

fn search(files: &[PathBuf], config: &SearchConfig) -> (Vec<ResultRecord>, RunSummary) {
    search_with(files, config, &SearchOptions::default())
}

fn search_with(
    files: &[PathBuf],
    config: &SearchConfig,
    options: &SearchOptions,
) -> (Vec<ResultRecord>, RunSummary) {
    let mut records: Vec<ResultRecord> = Vec::new();
    let summary = run_search(files, config, &mut records, options, &CancelToken::new()).unwrap();
    (records, summary)
}

/// `count` files of `lines` ERROR lines each.
fn service_logs(dir: &Path, count: usize, lines: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("svc{i}.log"));
            let body: String = (0..lines)
                .map(|n| format!("2025-08-10 10:00:{:02} ERROR svc{i} event {n}\n", n % 60))
                .collect();
            fs::write(&path, body).unwrap();
            path
        })
        .collect()
}

/// Accepts `capacity` records, then fails every write.
struct FullDiskSink {
    accepted: Vec<ResultRecord>,
    capacity: usize,
}

impl FullDiskSink {
    fn new(capacity: usize) -> Self {
        Self {
            accepted: Vec::new(),
            capacity,
        }
    }
}

impl RecordSink for FullDiskSink {
    fn write_record(&mut self, record: &ResultRecord) -> Result<(), ExportError> {
        if self.accepted.len() == self.capacity {
            return Err(ExportError::Io {
                destination: "hits.jsonl".to_string(),
                source: std::io::Error::other("no space left on device"),
            });
        }
        self.accepted.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

fn gzip_copy(src: &Path, dest: &Path) {
    let mut encoder = GzEncoder::new(fs::File::create(dest).unwrap(), Compression::default());
    encoder.write_all(&fs::read(src).unwrap()).unwrap();
    encoder.finish().unwrap();
}

// =============================================================================
// Matching and windowing
// =============================================================================

/// ERROR keyword inside a 09:00-11:00 window yields exactly the one line in
/// the window, with no extracted fields.
#[test]
fn e2e_keyword_within_window() {
    let config = disk_full_config();
    let (records, summary) = search(&[fixture("app_sample.log")], &config);

    assert_eq!(records.len(), 1, "records: {records:?}");
    let record = &records[0];
    assert_eq!(record.line_number, 3);
    assert_eq!(record.matched, vec!["kw:ERROR"]);
    assert_eq!(record.raw_text, "2025-08-10 10:00:00 ERROR disk full");
    assert!(record.fields.is_empty());
    assert!(record.profile.is_none());

    let file = &summary.files[0];
    assert_eq!(file.lines_read, 6);
    assert_eq!(file.lines_matched, 1);
    assert_eq!(file.lines_windowed_out, 2);
    assert_eq!(file.final_state, FileState::Eof);
    assert!(summary.skipped.is_empty());
    assert!(!summary.cancelled);
    assert_eq!(summary.records_written, 1);
}

/// ALL mode needs every criterion; undated lines are never windowed out.
#[test]
fn e2e_all_mode_and_undated_lines() {
    let config = SearchConfig::builder()
        .keyword("disk")
        .regex(r"\d+%")
        .mode(MatchMode::All)
        .build()
        .unwrap();
    let (records, _) = search(&[fixture("app_sample.log")], &config);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].matched, vec!["kw:disk", r"re:\d+%"]);

    let config = SearchConfig::builder()
        .keyword("stack trace")
        .since("2030-01-01T00:00:00Z")
        .build()
        .unwrap();
    let (records, summary) = search(&[fixture("app_sample.log")], &config);
    assert_eq!(records.len(), 1);
    assert!(records[0].timestamp.is_none());
    assert_eq!(summary.total_windowed_out(), 5);
}

// =============================================================================
// Field extraction
// =============================================================================

/// HAProxy lines through `haproxy-simple` carry exactly its three fields.
#[test]
fn e2e_haproxy_simple_fields() {
    let config = SearchConfig::builder()
        .regex(r" 5\d\d ")
        .available_profiles(load_builtin_profiles())
        .select_profiles(["haproxy-simple"])
        .build()
        .unwrap();
    let (records, _) = search(&[fixture("haproxy_sample.log")], &config);

    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.profile.as_deref(), Some("haproxy-simple"));
        let keys: Vec<&str> = record.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["client_ip", "request_path", "status_code"]);
    }
    assert_eq!(records[1].fields["client_ip"], "192.168.1.20");
    assert_eq!(records[1].fields["status_code"], "502");
    assert_eq!(records[1].fields["request_path"], "/api/orders");
}

/// With every built-in profile selected the detailed HAProxy profile wins,
/// and a line no profile understands is still emitted without fields.
#[test]
fn e2e_default_profiles_first_match_wins() {
    let config = SearchConfig::builder()
        .keyword("haproxy")
        .available_profiles(load_builtin_profiles())
        .build()
        .unwrap();
    let (records, _) = search(&[fixture("haproxy_sample.log")], &config);

    assert_eq!(records.len(), 4);
    assert_eq!(records[0].profile.as_deref(), Some("haproxy-http"));
    assert_eq!(records[0].fields["backend"], "app");
    assert_eq!(records[0].fields["method"], "GET");
    assert!(records[3].profile.is_none());
    assert!(records[3].fields.is_empty());
}

// =============================================================================
// Sources
// =============================================================================

#[test]
fn e2e_gzip_matches_plain() {
    let dir = TempDir::new().unwrap();
    let gz = dir.path().join("app_sample.log.gz");
    gzip_copy(&fixture("app_sample.log"), &gz);

    let config = disk_full_config();
    let (plain, _) = search(&[fixture("app_sample.log")], &config);
    let (compressed, summary) = search(&[gz.clone()], &config);

    assert_eq!(compressed.len(), plain.len());
    assert_eq!(compressed[0].raw_text, plain[0].raw_text);
    assert_eq!(compressed[0].line_number, plain[0].line_number);
    assert_eq!(compressed[0].source_file, gz);
    assert_eq!(summary.total_lines(), 6);
}

#[test]
fn e2e_empty_file() {
    let dir = TempDir::new().unwrap();
    let empty = dir.path().join("empty.log");
    fs::write(&empty, "").unwrap();

    let (records, summary) = search(&[empty], &disk_full_config());
    assert!(records.is_empty());
    assert_eq!(summary.total_lines(), 0);
    assert_eq!(summary.total_matched(), 0);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.files[0].final_state, FileState::Eof);
}

/// Missing files are reported as skipped and the rest of the run goes on.
#[test]
fn e2e_missing_file_skipped() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("gone.log");

    let (records, summary) = search(
        &[missing.clone(), fixture("app_sample.log")],
        &disk_full_config(),
    );
    assert_eq!(records.len(), 1);
    assert_eq!(summary.files.len(), 2);
    assert_eq!(summary.files[0].final_state, FileState::Error);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].path, missing);
    assert!(matches!(
        summary.skipped[0].reason,
        FileAccessError::NotFound { .. }
    ));
}

/// Latin-1 input decodes when the encoding is configured.
#[test]
fn e2e_configured_encoding() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latin1.log");
    fs::write(&path, b"ERROR caf\xe9 closed\n").unwrap();

    let config = SearchConfig::builder()
        .keyword("café")
        .encoding("latin1")
        .build()
        .unwrap();
    let (records, summary) = search(&[path], &config);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].raw_text, "ERROR café closed");
    assert_eq!(summary.total_decode_warnings(), 0);
}

// =============================================================================
// Run-level properties
// =============================================================================

#[test]
fn e2e_repeated_runs_are_identical() {
    let files = [fixture("app_sample.log"), fixture("haproxy_sample.log")];
    let config = SearchConfig::builder()
        .keyword("ERROR")
        .keyword("503")
        .available_profiles(load_builtin_profiles())
        .build()
        .unwrap();

    let (first, first_summary) = search(&files, &config);
    let (second, second_summary) = search(&files, &config);
    assert_eq!(first, second);
    assert_eq!(first_summary.files, second_summary.files);
    assert_eq!(first_summary.records_written, second_summary.records_written);
}

/// Parallel output is grouped per file; the summary stays in input order.
#[test]
fn e2e_parallel_groups_by_file() {
    let dir = TempDir::new().unwrap();
    let files = service_logs(dir.path(), 4, 50);
    let config = SearchConfig::builder().keyword("ERROR").build().unwrap();
    let options = SearchOptions {
        parallel: true,
        worker_threads: 2,
        ..SearchOptions::default()
    };

    let (records, summary) = search_with(&files, &config, &options);
    let (sequential, _) = search(&files, &config);

    assert_eq!(records.len(), 200);
    assert_eq!(summary.records_written, 200);
    let summary_paths: Vec<&PathBuf> = summary.files.iter().map(|f| &f.path).collect();
    assert_eq!(summary_paths, files.iter().collect::<Vec<_>>());

    // Each file's records are contiguous and in line order.
    for chunk in records.chunks(50) {
        assert!(chunk.iter().all(|r| r.source_file == chunk[0].source_file));
        assert!(chunk.windows(2).all(|w| w[0].line_number < w[1].line_number));
    }

    let mut a = records.clone();
    let mut b = sequential;
    a.sort_by(|x, y| (&x.source_file, x.line_number).cmp(&(&y.source_file, y.line_number)));
    b.sort_by(|x, y| (&x.source_file, x.line_number).cmp(&(&y.source_file, y.line_number)));
    assert_eq!(a, b);
}

#[test]
fn e2e_cancelled_before_start() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut records: Vec<ResultRecord> = Vec::new();
    let summary = run_search(
        &[fixture("app_sample.log")],
        &disk_full_config(),
        &mut records,
        &SearchOptions::default(),
        &cancel,
    )
    .unwrap();
    assert!(summary.cancelled);
    assert!(records.is_empty());
}

// =============================================================================
// Export
// =============================================================================

/// A failing sink stops the run and reports what was written before it.
#[test]
fn e2e_sink_failure_is_fatal_sequential() {
    let dir = TempDir::new().unwrap();
    let files = service_logs(dir.path(), 2, 10);
    let config = SearchConfig::builder().keyword("ERROR").build().unwrap();

    let mut sink = FullDiskSink::new(13);
    let result = run_search(
        &files,
        &config,
        &mut sink,
        &SearchOptions::default(),
        &CancelToken::new(),
    );

    match result {
        Err(SearchError::Export {
            records_written,
            source: ExportError::Io { destination, .. },
        }) => {
            assert_eq!(records_written, 13);
            assert_eq!(destination, "hits.jsonl");
        }
        other => panic!("expected export error, got {other:?}"),
    }
    assert_eq!(sink.accepted.len(), 13);
    assert_eq!(sink.accepted[12].source_file, files[1]);
    assert_eq!(sink.accepted[12].line_number, 3);
}

#[test]
fn e2e_sink_failure_is_fatal_parallel() {
    let dir = TempDir::new().unwrap();
    let files = service_logs(dir.path(), 4, 50);
    let config = SearchConfig::builder().keyword("ERROR").build().unwrap();
    let options = SearchOptions {
        parallel: true,
        worker_threads: 2,
        ..SearchOptions::default()
    };

    let mut sink = FullDiskSink::new(60);
    let result = run_search(&files, &config, &mut sink, &options, &CancelToken::new());

    assert!(
        matches!(
            result,
            Err(SearchError::Export {
                records_written: 60,
                ..
            })
        ),
        "{result:?}"
    );
    assert_eq!(sink.accepted.len(), 60);
}

/// A file name that is not valid UTF-8 still exports as JSONL.
#[cfg(unix)]
#[test]
fn e2e_jsonl_non_utf8_file_name() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join(OsStr::from_bytes(b"caf\xe9.log"));
    fs::write(&path, "2025-08-10 10:00:00 ERROR disk full\n").unwrap();
    let config = SearchConfig::builder().keyword("ERROR").build().unwrap();

    let mut exporter = JsonlExporter::new(Vec::new(), "memory");
    let summary = run_search(
        &[path],
        &config,
        &mut exporter,
        &SearchOptions::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(summary.records_written, 1);

    let output = String::from_utf8(exporter.into_inner()).unwrap();
    let value: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
    let file = value["file"].as_str().unwrap();
    assert!(file.ends_with("caf\u{FFFD}.log"), "{file}");
}

/// JSONL output parses back into the same records.
#[test]
fn e2e_jsonl_round_trip() {
    let config = SearchConfig::builder()
        .keyword("haproxy")
        .available_profiles(load_builtin_profiles())
        .build()
        .unwrap();
    let (records, _) = search(&[fixture("haproxy_sample.log")], &config);

    let mut exporter = JsonlExporter::new(Vec::new(), "memory");
    for record in &records {
        exporter.write_record(record).unwrap();
    }
    exporter.flush().unwrap();
    let output = String::from_utf8(exporter.into_inner()).unwrap();

    let parsed: Vec<ResultRecord> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(parsed, records);
}

/// The CSV header is written even when nothing matches.
#[test]
fn e2e_csv_header_without_matches() {
    let config = SearchConfig::builder()
        .keyword("no such text")
        .available_profiles(load_builtin_profiles())
        .select_profiles(["haproxy-simple"])
        .build()
        .unwrap();

    let mut exporter = CsvExporter::new(Vec::new(), config.field_columns(), "memory").unwrap();
    let summary = run_search(
        &[fixture("haproxy_sample.log")],
        &config,
        &mut exporter,
        &SearchOptions::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(summary.records_written, 0);

    let output = String::from_utf8(exporter.into_inner().unwrap()).unwrap();
    assert_eq!(
        output,
        "file,line_number,timestamp,matched,line,client_ip,status_code,request_path\n"
    );
}
