// logsift - app/follow.rs
//
// Follow mode: one polling thread per file streams the existing content and
// then every line appended afterwards, surviving rotation.
//
// Architecture:
//   - `spawn_follower` starts a background thread per file; all followers
//     share one mpsc sender, so the orchestrator is the single consumer and
//     the only sink writer.
//   - A shared cancel flag stops every follower. The poll sleep is sliced so
//     cancel is observed within FOLLOW_CANCEL_CHECK_INTERVAL_MS.
//   - Rotation: the path's identity (device + inode on Unix) changes, or the
//     size drops below the read offset. The offset resets to 0, the partial
//     line is dropped, and line numbering continues, so nothing read before
//     the rotation is emitted again.
//   - A path that vanishes is polled until it reappears.
//   - MAX_FOLLOW_READ_BYTES_PER_TICK caps each read so a burst of writes
//     cannot monopolise a follower; MAX_FOLLOW_PARTIAL_BYTES caps the
//     in-progress line buffer. A line that outgrows it is skipped up to its
//     newline and reported as `SourceItem::Oversized`, keeping its number.

use crate::app::search::CancelToken;
use crate::core::model::LogLine;
use crate::core::source::{self, DecodeSettings, Decoded, SourceItem};
use crate::platform::fs::{file_identity, FileIdentity};
use crate::util::constants::{
    FOLLOW_CANCEL_CHECK_INTERVAL_MS, MAX_FOLLOW_PARTIAL_BYTES, MAX_FOLLOW_READ_BYTES_PER_TICK,
};
use crate::util::error::FileAccessError;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

// =============================================================================
// Public types
// =============================================================================

/// Message from a follower to the orchestrator. `file` is the index of the
/// file in the orchestrator's input list.
#[derive(Debug)]
pub enum FollowEvent {
    /// A complete line (or an undecodable one).
    Line { file: usize, item: SourceItem },
    /// The content present at start has been read; now waiting for appends.
    CaughtUp { file: usize },
    /// The file was rotated or truncated; reading restarts at offset 0.
    Rotated { file: usize },
    /// The follower hit an unrecoverable read error and stopped.
    Failed { file: usize, error: FileAccessError },
}

/// Settings shared by every follower of a run.
#[derive(Debug, Clone)]
pub struct FollowSettings {
    pub decode: DecodeSettings,
    pub poll_interval: Duration,
}

/// Start following `path` on a background thread.
///
/// The thread exits when `cancel` is set, when the receiver is dropped, or
/// after sending `FollowEvent::Failed`.
pub fn spawn_follower(
    file: usize,
    path: PathBuf,
    settings: FollowSettings,
    tx: mpsc::Sender<FollowEvent>,
    cancel: CancelToken,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("follow-{file}"))
        .spawn(move || {
            let mut follower = Follower::new(file, path, settings);
            follower.run(&tx, &cancel);
            tracing::debug!(
                file = %follower.path.display(),
                lines = follower.line_number,
                rotations = follower.rotations,
                "Follower stopped"
            );
        })
}

// =============================================================================
// Per-file state (private to the follower thread)
// =============================================================================

struct Follower {
    index: usize,
    path: PathBuf,
    shared_path: Arc<Path>,
    settings: FollowSettings,
    /// Identity of the file the offset refers to.
    identity: Option<FileIdentity>,
    /// Bytes consumed so far. Advances by exactly the bytes read each tick,
    /// whether or not they completed a line.
    offset: u64,
    /// Bytes after the last newline: an in-progress line.
    partial: Vec<u8>,
    /// Set while skipping an over-long line: bytes dropped so far.
    oversized: Option<u64>,
    /// The next line starts at offset 0 of the file (BOM position).
    at_file_start: bool,
    /// Last line number handed out. Continues across rotations.
    line_number: u64,
    rotations: u64,
    caught_up: bool,
    vanished: bool,
}

/// What a single poll of the file produced.
enum Poll {
    /// Bytes were read; more may be available immediately.
    Progress,
    /// Nothing new.
    Idle,
    /// Stop following (receiver gone or fatal error already reported).
    Stop,
}

impl Follower {
    fn new(index: usize, path: PathBuf, settings: FollowSettings) -> Self {
        Self {
            index,
            shared_path: Arc::from(path.as_path()),
            path,
            settings,
            identity: None,
            offset: 0,
            partial: Vec::new(),
            oversized: None,
            at_file_start: true,
            line_number: 0,
            rotations: 0,
            caught_up: false,
            vanished: false,
        }
    }

    fn run(&mut self, tx: &mpsc::Sender<FollowEvent>, cancel: &CancelToken) {
        let slice_ms = FOLLOW_CANCEL_CHECK_INTERVAL_MS
            .min(self.settings.poll_interval.as_millis() as u64)
            .max(1);
        let slices = (self.settings.poll_interval.as_millis() as u64)
            .div_ceil(slice_ms)
            .max(1);

        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.poll(tx) {
                Poll::Progress => continue,
                Poll::Stop => return,
                Poll::Idle => {}
            }

            if !self.caught_up {
                self.caught_up = true;
                if tx.send(FollowEvent::CaughtUp { file: self.index }).is_err() {
                    return;
                }
            }

            // Interruptible sleep: check cancel flag between slices.
            for _ in 0..slices {
                std::thread::sleep(Duration::from_millis(slice_ms));
                if cancel.is_cancelled() {
                    return;
                }
            }
        }
    }

    fn poll(&mut self, tx: &mpsc::Sender<FollowEvent>) -> Poll {
        macro_rules! send {
            ($msg:expr) => {
                if tx.send($msg).is_err() {
                    // Orchestrator gone; exit quietly.
                    return Poll::Stop;
                }
            };
        }

        // ---------------------------------------------------------------------
        // 1. Stat the path. A missing path is polled until it comes back.
        // ---------------------------------------------------------------------
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => {
                if self.vanished {
                    tracing::info!(file = %self.path.display(), "Followed file reappeared");
                    self.vanished = false;
                }
                m
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !self.vanished {
                    tracing::info!(file = %self.path.display(), "Followed file vanished, waiting");
                    self.vanished = true;
                }
                return Poll::Idle;
            }
            Err(e) => {
                tracing::warn!(file = %self.path.display(), error = %e, "Follow: stat error");
                return Poll::Idle;
            }
        };

        let current_size = metadata.len();
        let current_identity = file_identity(&metadata);

        // ---------------------------------------------------------------------
        // 2. Rotation / truncation.
        // ---------------------------------------------------------------------
        let replaced = matches!(
            (self.identity, current_identity),
            (Some(old), Some(new)) if old != new
        );
        if replaced || current_size < self.offset {
            tracing::info!(
                file = %self.path.display(),
                old_offset = self.offset,
                new_size = current_size,
                replaced,
                "Follow: file rotated, restarting at offset 0"
            );
            self.offset = 0;
            self.partial.clear();
            self.oversized = None;
            self.at_file_start = true;
            self.rotations += 1;
            send!(FollowEvent::Rotated { file: self.index });
        }
        self.identity = current_identity;

        // ---------------------------------------------------------------------
        // 3. Nothing new.
        // ---------------------------------------------------------------------
        if current_size == self.offset {
            return Poll::Idle;
        }

        // ---------------------------------------------------------------------
        // 4. Read new bytes (capped per tick).
        // ---------------------------------------------------------------------
        let available = current_size - self.offset;
        let limit = usize::try_from(available)
            .unwrap_or(MAX_FOLLOW_READ_BYTES_PER_TICK)
            .min(MAX_FOLLOW_READ_BYTES_PER_TICK);

        let new_bytes = match read_bytes_at(&self.path, self.offset, limit) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Rotated away between stat and open; next tick handles it.
                return Poll::Idle;
            }
            Err(e) => {
                tracing::warn!(file = %self.path.display(), error = %e, "Follow: read error");
                send!(FollowEvent::Failed {
                    file: self.index,
                    error: FileAccessError::Read {
                        path: self.path.clone(),
                        line_number: self.line_number,
                        source: e,
                    },
                });
                return Poll::Stop;
            }
        };

        if new_bytes.is_empty() {
            return Poll::Idle;
        }
        self.offset += new_bytes.len() as u64;

        // ---------------------------------------------------------------------
        // 5. Finish skipping an over-long line.
        // ---------------------------------------------------------------------
        let mut fresh: &[u8] = &new_bytes;
        if let Some(dropped) = self.oversized {
            let Some(newline) = fresh.iter().position(|b| *b == b'\n') else {
                self.oversized = Some(dropped + fresh.len() as u64);
                return Poll::Progress;
            };
            self.oversized = None;
            self.at_file_start = false;
            self.line_number += 1;
            let length = dropped + source::trim_line_ending(&fresh[..=newline]).len() as u64;
            tracing::warn!(
                file = %self.path.display(),
                line_number = self.line_number,
                bytes = length,
                "Follow: skipped line longer than the buffer cap"
            );
            send!(FollowEvent::Line {
                file: self.index,
                item: SourceItem::Oversized {
                    line_number: self.line_number,
                    length,
                },
            });
            fresh = &fresh[newline + 1..];
        }

        // ---------------------------------------------------------------------
        // 6. Split complete lines off the partial buffer.
        // ---------------------------------------------------------------------
        self.partial.extend_from_slice(fresh);
        if let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') {
            let rest = self.partial.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.partial, rest);

            for raw in complete.split_inclusive(|b| *b == b'\n') {
                self.line_number += 1;
                let mut bytes = source::trim_line_ending(raw);
                if self.at_file_start {
                    bytes = source::strip_utf8_bom(bytes, &self.settings.decode);
                    self.at_file_start = false;
                }
                let item = match source::decode_line(bytes, &self.settings.decode) {
                    Decoded::Text(text) => SourceItem::Line {
                        line: self.make_line(text),
                        decode_warning: false,
                    },
                    Decoded::Lossy(text) => SourceItem::Line {
                        line: self.make_line(text),
                        decode_warning: true,
                    },
                    Decoded::Invalid => SourceItem::Undecodable {
                        line_number: self.line_number,
                    },
                };
                send!(FollowEvent::Line {
                    file: self.index,
                    item,
                });
            }
        }

        if self.partial.len() > MAX_FOLLOW_PARTIAL_BYTES {
            tracing::debug!(
                file = %self.path.display(),
                bytes = self.partial.len(),
                "Follow: unterminated line exceeds buffer cap, skipping to its end"
            );
            self.oversized = Some(self.partial.len() as u64);
            self.partial.clear();
        }

        Poll::Progress
    }

    fn make_line(&self, text: String) -> LogLine {
        LogLine {
            source: Arc::clone(&self.shared_path),
            line_number: self.line_number,
            text,
            timestamp: None,
        }
    }
}

/// Read up to `limit` bytes from `path` starting at byte position `offset`.
///
/// Returns fewer bytes than `limit` if the file ends first.
fn read_bytes_at(path: &Path, offset: u64, limit: usize) -> io::Result<Vec<u8>> {
    let mut file = source::open_with_retry(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn settings() -> FollowSettings {
        FollowSettings {
            decode: DecodeSettings::default(),
            poll_interval: Duration::from_millis(20),
        }
    }

    fn next_line(rx: &mpsc::Receiver<FollowEvent>) -> (u64, String) {
        loop {
            match rx.recv_timeout(WAIT).expect("follower produced no event") {
                FollowEvent::Line {
                    item: SourceItem::Line { line, .. },
                    ..
                } => return (line.line_number, line.text),
                FollowEvent::Failed { error, .. } => panic!("follower failed: {error}"),
                _ => continue,
            }
        }
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_reads_existing_then_appended_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "first\nsecond\n").unwrap();

        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let handle = spawn_follower(0, path.clone(), settings(), tx, cancel.clone()).unwrap();

        assert_eq!(next_line(&rx), (1, "first".to_string()));
        assert_eq!(next_line(&rx), (2, "second".to_string()));

        // Partial line is held back until its newline arrives.
        append(&path, "thi");
        append(&path, "rd\n");
        assert_eq!(next_line(&rx), (3, "third".to_string()));

        cancel.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_truncation_does_not_replay_old_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old one\nold two\nold three\n").unwrap();

        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let handle = spawn_follower(0, path.clone(), settings(), tx, cancel.clone()).unwrap();
        for _ in 0..3 {
            next_line(&rx);
        }

        std::fs::write(&path, "new\n").unwrap();
        assert_eq!(next_line(&rx), (4, "new".to_string()));

        cancel.cancel();
        handle.join().unwrap();
    }

    fn next_item(rx: &mpsc::Receiver<FollowEvent>) -> SourceItem {
        loop {
            match rx.recv_timeout(WAIT).expect("follower produced no event") {
                FollowEvent::Line { item, .. } => return item,
                FollowEvent::Failed { error, .. } => panic!("follower failed: {error}"),
                _ => continue,
            }
        }
    }

    #[test]
    fn test_over_long_line_skipped_whole() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.log");
        let long_len = MAX_FOLLOW_PARTIAL_BYTES + MAX_FOLLOW_READ_BYTES_PER_TICK * 2;
        let mut content = vec![b'x'; long_len];
        content.extend_from_slice(b"TAIL ERROR\nnext\n");
        std::fs::write(&path, &content).unwrap();

        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let handle = spawn_follower(0, path.clone(), settings(), tx, cancel.clone()).unwrap();

        match next_item(&rx) {
            SourceItem::Oversized {
                line_number,
                length,
            } => {
                assert_eq!(line_number, 1);
                assert_eq!(length, (long_len + "TAIL ERROR".len()) as u64);
            }
            other => panic!("expected oversized line, got {other:?}"),
        }
        assert_eq!(next_line(&rx), (2, "next".to_string()));

        // The follower recovers for ordinary appends.
        append(&path, "after\n");
        assert_eq!(next_line(&rx), (3, "after".to_string()));

        cancel.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_utf8_bom_stripped_from_first_line_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bom.log");
        std::fs::write(&path, b"\xEF\xBB\xBFfirst ERROR\nsecond\n").unwrap();

        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let handle = spawn_follower(0, path.clone(), settings(), tx, cancel.clone()).unwrap();

        assert_eq!(next_line(&rx), (1, "first ERROR".to_string()));
        assert_eq!(next_line(&rx), (2, "second".to_string()));

        // A truncated file starts over at offset 0, BOM included.
        std::fs::write(&path, b"\xEF\xBB\xBFreset\n").unwrap();
        assert_eq!(next_line(&rx), (3, "reset".to_string()));

        cancel.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_cancel_stops_idle_follower() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("idle.log");
        std::fs::write(&path, "").unwrap();

        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let handle = spawn_follower(0, path, settings(), tx, cancel.clone()).unwrap();
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            FollowEvent::CaughtUp { file: 0 }
        ));

        cancel.cancel();
        handle.join().unwrap();
    }
}
