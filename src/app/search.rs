// logsift - app/search.rs
//
// Search orchestration: drives every input file through
// source -> timestamp -> window -> match -> extract -> sink,
// and aggregates the run summary.
//
// Architecture:
//   - Sequential mode (default): files in input order, records streamed to
//     the sink as they are produced.
//   - Parallel mode: files processed on a rayon pool. Each file's records
//     are grouped and written under the sink mutex when that file completes,
//     so output is "grouped by file, files in completion order".
//   - Follow mode: one follower thread per file (app::follow) feeding a
//     single mpsc consumer here, which is the only sink writer.
//   - A `CancelToken` (shared atomic flag) is checked between lines. On
//     cancel the run stops, the sink is flushed and the summary is marked
//     cancelled.
//
// Per-file failures (open, read) are recorded as skipped files and never
// end the run. A sink failure ends the run with `SearchError::Export`.

use crate::app::follow::{self, FollowEvent, FollowSettings};
use crate::core::config::{SearchConfig, SearchOptions};
use crate::core::export::RecordSink;
use crate::core::extract;
use crate::core::model::{
    FileState, FileSummary, LogLine, ResultRecord, RunSummary, SkippedFile,
};
use crate::core::source::{self, SourceItem};
use crate::util::constants;
use crate::util::error::{ExportError, FileAccessError, SearchError};
use crate::util::logging;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

// =============================================================================
// Cancellation and options
// =============================================================================

/// Cooperative cancellation flag, cheap to clone and share across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Per-line processing
// =============================================================================

/// What happened to one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Accepted: emit this record.
    Emit(ResultRecord),
    /// Dated, but outside the time window.
    WindowedOut,
    /// In the window (or undated) but no criteria accepted it.
    Rejected,
}

/// Run one line through timestamp extraction, the window check, the matcher
/// and field extraction. Pure: no I/O, no shared state.
///
/// Undated lines are never windowed out.
pub fn process_line(mut line: LogLine, config: &SearchConfig) -> LineOutcome {
    line.timestamp = config.timestamps.extract(&line.text);

    if let Some(ts) = line.timestamp {
        if !config.window.contains(ts) {
            return LineOutcome::WindowedOut;
        }
    }

    let outcome = config.matcher().evaluate(&line.text);
    if !outcome.accepted {
        return LineOutcome::Rejected;
    }
    let matched = outcome.fired.iter().map(|id| id.to_string()).collect();

    let (profile, fields) = match extract::extract_fields(&line.text, &config.profiles) {
        Some(ex) => (Some(ex.profile_id.to_string()), ex.fields),
        None => (None, Default::default()),
    };

    LineOutcome::Emit(ResultRecord {
        source_file: line.source.to_path_buf(),
        line_number: line.line_number,
        timestamp: line.timestamp,
        matched,
        raw_text: line.text,
        profile,
        fields,
    })
}

/// Fold one source item into `summary`, returning a record to emit.
fn account_item(
    item: SourceItem,
    config: &SearchConfig,
    summary: &mut FileSummary,
) -> Option<ResultRecord> {
    summary.lines_read += 1;
    match item {
        SourceItem::Line {
            line,
            decode_warning,
        } => {
            if decode_warning {
                summary.decode_warnings += 1;
            }
            match process_line(line, config) {
                LineOutcome::Emit(record) => {
                    summary.lines_matched += 1;
                    Some(record)
                }
                LineOutcome::WindowedOut => {
                    summary.lines_windowed_out += 1;
                    None
                }
                LineOutcome::Rejected => None,
            }
        }
        SourceItem::Undecodable { line_number } => {
            summary.decode_warnings += 1;
            tracing::trace!(
                file = %summary.path.display(),
                line_number,
                "Skipped undecodable line"
            );
            None
        }
        SourceItem::Oversized {
            line_number,
            length,
        } => {
            summary.lines_oversized += 1;
            tracing::trace!(
                file = %summary.path.display(),
                line_number,
                length,
                "Skipped over-long line"
            );
            None
        }
    }
}

// =============================================================================
// Per-file lifecycle
// =============================================================================

/// Tracks one file's lifecycle and logs each transition.
struct Lifecycle<'a> {
    path: &'a Path,
    state: FileState,
}

impl<'a> Lifecycle<'a> {
    fn new(path: &'a Path) -> Self {
        tracing::trace!(file = %path.display(), state = %FileState::Open, "File state");
        Self {
            path,
            state: FileState::Open,
        }
    }

    fn advance(&mut self, next: FileState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                file = %self.path.display(),
                from = %self.state,
                to = %next,
                "Unexpected file state transition"
            );
        }
        tracing::trace!(file = %self.path.display(), from = %self.state, to = %next, "File state");
        self.state = next;
    }

    /// Move to `Closed`, returning the state reached before closing.
    fn close(mut self) -> FileState {
        let last = self.state;
        self.advance(FileState::Closed);
        last
    }
}

/// Result of searching one file in static (non-follow) mode.
struct FileOutcome {
    summary: FileSummary,
    skip: Option<FileAccessError>,
    cancelled: bool,
}

/// Stream one file through the pipeline, handing each record to `emit`.
///
/// Open and read failures end up in `FileOutcome::skip`; only `emit`
/// failures are returned as `Err`.
fn search_file<F>(
    path: &Path,
    config: &SearchConfig,
    should_stop: &(dyn Fn() -> bool + Sync),
    mut emit: F,
) -> Result<FileOutcome, ExportError>
where
    F: FnMut(&ResultRecord) -> Result<(), ExportError>,
{
    let mut summary = FileSummary::new(path.to_path_buf());
    let mut lifecycle = Lifecycle::new(path);

    let mut source = match source::open_source(path, &config.decode) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Skipping file");
            lifecycle.advance(FileState::Error);
            summary.final_state = lifecycle.close();
            return Ok(FileOutcome {
                summary,
                skip: Some(e),
                cancelled: false,
            });
        }
    };
    lifecycle.advance(FileState::Streaming);

    let mut skip = None;
    let mut cancelled = false;

    while let Some(item) = source.next() {
        if should_stop() {
            cancelled = true;
            break;
        }
        match item {
            Ok(item) => {
                if let Some(record) = account_item(item, config, &mut summary) {
                    if tracing::enabled!(tracing::Level::TRACE) {
                        tracing::trace!(
                            file = %path.display(),
                            line_number = record.line_number,
                            matched = ?record.matched,
                            line = logging::preview(&record.raw_text),
                            "Match"
                        );
                    }
                    emit(&record)?;
                }
            }
            Err(e) => {
                tracing::warn!(
                    file = %path.display(),
                    line_number = source.line_number(),
                    error = %e,
                    "Read error, stopping this file"
                );
                skip = Some(FileAccessError::Read {
                    path: path.to_path_buf(),
                    line_number: source.line_number(),
                    source: e,
                });
                break;
            }
        }
    }

    if skip.is_some() {
        lifecycle.advance(FileState::Error);
    } else if !cancelled {
        lifecycle.advance(FileState::Eof);
    }
    summary.final_state = lifecycle.close();

    tracing::debug!(
        file = %path.display(),
        lines = summary.lines_read,
        matched = summary.lines_matched,
        windowed_out = summary.lines_windowed_out,
        decode_warnings = summary.decode_warnings,
        compressed = source.is_compressed(),
        "File searched"
    );

    Ok(FileOutcome {
        summary,
        skip,
        cancelled,
    })
}

// =============================================================================
// Entry point
// =============================================================================

/// Search `files` and write every accepted line to `sink`.
///
/// The sink is flushed before returning, also when the run is cancelled.
pub fn run_search<S>(
    files: &[PathBuf],
    config: &SearchConfig,
    sink: &mut S,
    options: &SearchOptions,
    cancel: &CancelToken,
) -> Result<RunSummary, SearchError>
where
    S: RecordSink + Send + ?Sized,
{
    let started = Instant::now();
    tracing::info!(
        files = files.len(),
        follow = options.follow,
        parallel = options.parallel,
        "Search started"
    );

    let mut summary = if options.follow {
        run_follow(files, config, sink, options, cancel)?
    } else if options.parallel && files.len() > 1 {
        run_parallel(files, config, sink, options, cancel)?
    } else {
        run_sequential(files, config, sink, cancel)?
    };

    sink.flush().map_err(|source| SearchError::Export {
        source,
        records_written: summary.records_written,
    })?;

    summary.duration = started.elapsed();
    tracing::info!(
        files = summary.files.len(),
        skipped = summary.skipped.len(),
        lines = summary.total_lines(),
        matched = summary.total_matched(),
        windowed_out = summary.total_windowed_out(),
        records = summary.records_written,
        cancelled = summary.cancelled,
        duration_ms = summary.duration.as_millis() as u64,
        "Search complete"
    );
    Ok(summary)
}

/// Wrap a sink failure, flushing whatever the sink already holds.
fn export_failure<S>(sink: &mut S, source: ExportError, records_written: u64) -> SearchError
where
    S: RecordSink + ?Sized,
{
    tracing::error!(error = %source, records_written, "Sink failed, stopping search");
    if let Err(e) = sink.flush() {
        tracing::debug!(error = %e, "Flush after sink failure also failed");
    }
    SearchError::Export {
        source,
        records_written,
    }
}

fn record_outcome(summary: &mut RunSummary, outcome: FileOutcome) {
    if let Some(reason) = outcome.skip {
        summary.skipped.push(SkippedFile {
            path: outcome.summary.path.clone(),
            reason,
        });
    }
    summary.cancelled |= outcome.cancelled;
    summary.files.push(outcome.summary);
}

fn run_sequential<S>(
    files: &[PathBuf],
    config: &SearchConfig,
    sink: &mut S,
    cancel: &CancelToken,
) -> Result<RunSummary, SearchError>
where
    S: RecordSink + ?Sized,
{
    let mut summary = RunSummary::default();
    let mut written: u64 = 0;
    let should_stop = || cancel.is_cancelled();

    for path in files {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let result = search_file(path, config, &should_stop, |record| {
            sink.write_record(record)?;
            written += 1;
            Ok(())
        });
        match result {
            Ok(outcome) => record_outcome(&mut summary, outcome),
            Err(e) => return Err(export_failure(sink, e, written)),
        }
    }

    summary.records_written = written;
    Ok(summary)
}

/// Sink plus bookkeeping shared by parallel workers.
struct SharedSink<'a, S: ?Sized> {
    sink: &'a mut S,
    written: u64,
    error: Option<ExportError>,
}

fn run_parallel<S>(
    files: &[PathBuf],
    config: &SearchConfig,
    sink: &mut S,
    options: &SearchOptions,
    cancel: &CancelToken,
) -> Result<RunSummary, SearchError>
where
    S: RecordSink + Send + ?Sized,
{
    let threads = options.worker_threads.min(constants::MAX_WORKER_THREADS);
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("search-{i}"))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot build worker pool, searching sequentially");
            return run_sequential(files, config, sink, cancel);
        }
    };
    tracing::debug!(threads = pool.current_num_threads(), "Parallel search");

    let shared = Mutex::new(SharedSink {
        sink,
        written: 0,
        error: None,
    });
    let aborted = AtomicBool::new(false);
    let should_stop = || cancel.is_cancelled() || aborted.load(Ordering::SeqCst);

    let outcomes: Vec<FileOutcome> = pool.install(|| {
        files
            .par_iter()
            .filter_map(|path| {
                if should_stop() {
                    return None;
                }

                let mut grouped: Vec<ResultRecord> = Vec::new();
                let outcome = search_file(path, config, &should_stop, |record| {
                    grouped.push(record.clone());
                    Ok(())
                })
                .ok()?;

                if !grouped.is_empty() {
                    let mut guard = match shared.lock() {
                        Ok(g) => g,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    if guard.error.is_none() {
                        for record in &grouped {
                            if let Err(e) = guard.sink.write_record(record) {
                                guard.error = Some(e);
                                aborted.store(true, Ordering::SeqCst);
                                break;
                            }
                            guard.written += 1;
                        }
                    }
                }
                Some(outcome)
            })
            .collect()
    });

    let shared = match shared.into_inner() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(e) = shared.error {
        return Err(export_failure(shared.sink, e, shared.written));
    }

    // rayon `collect` keeps input order.
    let mut summary = RunSummary::default();
    for outcome in outcomes {
        record_outcome(&mut summary, outcome);
    }
    summary.cancelled |= cancel.is_cancelled();
    summary.records_written = shared.written;
    Ok(summary)
}

// =============================================================================
// Follow mode
// =============================================================================

/// Consumer side of follow mode. Returns when cancelled or when every
/// follower has stopped.
fn run_follow<S>(
    files: &[PathBuf],
    config: &SearchConfig,
    sink: &mut S,
    options: &SearchOptions,
    cancel: &CancelToken,
) -> Result<RunSummary, SearchError>
where
    S: RecordSink + ?Sized,
{
    let poll_ms = (options.poll_interval.as_millis() as u64).clamp(
        constants::MIN_FOLLOW_POLL_INTERVAL_MS,
        constants::MAX_FOLLOW_POLL_INTERVAL_MS,
    );
    let settings = FollowSettings {
        decode: config.decode,
        poll_interval: Duration::from_millis(poll_ms),
    };

    let mut summaries: Vec<FileSummary> = Vec::with_capacity(files.len());
    let mut lifecycles: Vec<Lifecycle<'_>> = Vec::with_capacity(files.len());
    let mut skipped: Vec<SkippedFile> = Vec::new();
    let mut handles = Vec::new();
    let (tx, rx) = mpsc::channel::<FollowEvent>();

    for (index, path) in files.iter().enumerate() {
        summaries.push(FileSummary::new(path.clone()));
        let mut lifecycle = Lifecycle::new(path);

        let spawned = check_followable(path).and_then(|()| {
            follow::spawn_follower(index, path.clone(), settings.clone(), tx.clone(), cancel.clone())
                .map_err(|e| FileAccessError::Open {
                    path: path.clone(),
                    source: e,
                })
        });
        match spawned {
            Ok(handle) => {
                lifecycle.advance(FileState::Streaming);
                handles.push(handle);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Not following file");
                lifecycle.advance(FileState::Error);
                skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: e,
                });
            }
        }
        lifecycles.push(lifecycle);
    }
    // Only followers hold senders now; the channel closes when all have exited.
    drop(tx);

    tracing::info!(following = handles.len(), "Follow mode started");

    let mut written: u64 = 0;
    let check_interval = Duration::from_millis(constants::FOLLOW_CANCEL_CHECK_INTERVAL_MS);
    let mut failure: Option<ExportError> = None;
    let mut unflushed = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let event = match rx.recv_timeout(check_interval) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Quiet period: push out what the last burst produced.
                if unflushed {
                    if let Err(e) = sink.flush() {
                        failure = Some(e);
                        break;
                    }
                    unflushed = false;
                }
                continue;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        match event {
            FollowEvent::Line { file, item } => {
                let Some(file_summary) = summaries.get_mut(file) else {
                    continue;
                };
                if let Some(record) = account_item(item, config, file_summary) {
                    if let Err(e) = sink.write_record(&record) {
                        failure = Some(e);
                        break;
                    }
                    written += 1;
                    unflushed = true;
                }
            }
            FollowEvent::CaughtUp { file } => {
                if let Some(lifecycle) = lifecycles.get_mut(file) {
                    lifecycle.advance(FileState::Following);
                }
                // Make the backlog visible before waiting for new lines.
                if let Err(e) = sink.flush() {
                    failure = Some(e);
                    break;
                }
                unflushed = false;
            }
            FollowEvent::Rotated { file } => {
                if let Some(s) = summaries.get_mut(file) {
                    s.rotations += 1;
                    tracing::info!(file = %s.path.display(), rotations = s.rotations, "Rotation");
                }
            }
            FollowEvent::Failed { file, error } => {
                if let Some(lifecycle) = lifecycles.get_mut(file) {
                    lifecycle.advance(FileState::Error);
                }
                skipped.push(SkippedFile {
                    path: error.path().clone(),
                    reason: error,
                });
            }
        }
    }

    // Stop every follower and wait for them to release their handles.
    let cancelled = cancel.is_cancelled();
    cancel.cancel();
    drop(rx);
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("Follower thread panicked");
        }
    }

    if let Some(e) = failure {
        return Err(export_failure(sink, e, written));
    }

    let mut summary = RunSummary {
        skipped,
        records_written: written,
        cancelled,
        ..RunSummary::default()
    };
    for (mut file_summary, lifecycle) in summaries.into_iter().zip(lifecycles) {
        file_summary.final_state = lifecycle.close();
        summary.files.push(file_summary);
    }
    Ok(summary)
}

/// Follow mode needs a regular, uncompressed file.
fn check_followable(path: &Path) -> Result<(), FileAccessError> {
    let mut file =
        source::open_with_retry(path).map_err(|e| FileAccessError::from_open(path.to_path_buf(), e))?;
    let metadata = file
        .metadata()
        .map_err(|e| FileAccessError::from_open(path.to_path_buf(), e))?;
    if !metadata.is_file() {
        return Err(FileAccessError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let mut magic = [0u8; 2];
    let has_magic = std::io::Read::read_exact(&mut file, &mut magic).is_ok()
        && magic == constants::GZIP_MAGIC;
    if has_magic || source::has_gzip_extension(path) {
        return Err(FileAccessError::FollowCompressed {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
