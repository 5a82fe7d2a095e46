// logsift - core/source.rs
//
// Line source: opens a plain or gzip-compressed log file and yields its
// lines lazily, decoded in the configured text encoding.
//
// - Memory is bounded by the longest line, never by file size.
// - gzip is detected by magic bytes (or the `.gz` suffix on a non-empty
//   file) and decoded as a multi-member stream, which is what logrotate
//   produces when it appends to an existing archive.
// - Transient open errors are retried with the bounded backoff table in
//   util::constants before the file is reported as inaccessible.

use crate::core::model::{DecodePolicy, LogLine};
use crate::util::constants;
use crate::util::error::{ConfigError, FileAccessError};
use encoding_rs::{Encoding, UTF_8};
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// =============================================================================
// Decoding
// =============================================================================

/// Text encoding plus the policy for bytes that are invalid in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSettings {
    pub encoding: &'static Encoding,
    pub policy: DecodePolicy,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            policy: DecodePolicy::Skip,
        }
    }
}

impl DecodeSettings {
    /// Resolve a WHATWG encoding label (`utf-8`, `latin1`, `windows-1252`,
    /// `shift_jis`, ...).
    ///
    /// Encodings that are not ASCII-compatible (UTF-16) are rejected: lines
    /// are split on the `\n` byte before decoding, which is only sound when
    /// that byte always means newline.
    pub fn from_label(label: &str, policy: DecodePolicy) -> Result<Self, ConfigError> {
        let encoding =
            Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| ConfigError::UnknownEncoding {
                label: label.to_string(),
            })?;
        if !encoding.is_ascii_compatible() {
            return Err(ConfigError::UnsupportedEncoding {
                label: label.to_string(),
            });
        }
        Ok(Self { encoding, policy })
    }

    /// Canonical name of the encoding.
    pub fn label(&self) -> &'static str {
        self.encoding.name()
    }
}

/// Result of decoding one line's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Valid in the configured encoding.
    Text(String),
    /// Invalid, decoded with U+FFFD replacements (`DecodePolicy::Replace`).
    Lossy(String),
    /// Invalid and the policy is `DecodePolicy::Skip`.
    Invalid,
}

/// Decode `bytes` (without line terminator) per `settings`.
pub fn decode_line(bytes: &[u8], settings: &DecodeSettings) -> Decoded {
    if settings.encoding == UTF_8 {
        return match std::str::from_utf8(bytes) {
            Ok(text) => Decoded::Text(text.to_string()),
            Err(_) => match settings.policy {
                DecodePolicy::Skip => Decoded::Invalid,
                DecodePolicy::Replace => {
                    Decoded::Lossy(String::from_utf8_lossy(bytes).into_owned())
                }
            },
        };
    }

    match settings
        .encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
    {
        Some(text) => Decoded::Text(text.into_owned()),
        None => match settings.policy {
            DecodePolicy::Skip => Decoded::Invalid,
            DecodePolicy::Replace => {
                let (text, _had_errors) = settings.encoding.decode_without_bom_handling(bytes);
                Decoded::Lossy(text.into_owned())
            }
        },
    }
}

/// Drop a UTF-8 byte order mark from the first line of a file.
pub fn strip_utf8_bom<'a>(bytes: &'a [u8], settings: &DecodeSettings) -> &'a [u8] {
    if settings.encoding == UTF_8 {
        bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
    } else {
        bytes
    }
}

/// Strip a trailing `\n` or `\r\n`.
pub fn trim_line_ending(mut bytes: &[u8]) -> &[u8] {
    if let Some(rest) = bytes.strip_suffix(b"\n") {
        bytes = rest;
        if let Some(rest) = bytes.strip_suffix(b"\r") {
            bytes = rest;
        }
    }
    bytes
}

// =============================================================================
// Opening
// =============================================================================

/// Returns true for transient I/O errors that are worth retrying.
pub fn is_transient_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

/// Open `path` for reading, retrying transient errors with backoff.
pub fn open_with_retry(path: &Path) -> io::Result<File> {
    let mut last_err: Option<io::Error> = None;

    for (attempt, delay_ms) in constants::OPEN_RETRY_DELAYS_MS.iter().enumerate() {
        match File::open(path) {
            Ok(file) => return Ok(file),
            Err(e) if is_transient_error(&e) => {
                tracing::debug!(
                    file = %path.display(),
                    attempt = attempt + 1,
                    error = %e,
                    "Transient open error, retrying"
                );
                std::thread::sleep(Duration::from_millis(*delay_ms));
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::other("open retries exhausted")))
}

/// Whether `path` carries a `.gz` suffix (case-insensitive).
pub fn has_gzip_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// Open `path` as a line source.
///
/// Fails with `FileAccessError` when the path is missing, unreadable, or not
/// a regular file. The returned source reads lazily.
pub fn open_source(path: &Path, decode: &DecodeSettings) -> Result<LineSource, FileAccessError> {
    let file = open_with_retry(path).map_err(|e| FileAccessError::from_open(path.to_path_buf(), e))?;

    let metadata = file
        .metadata()
        .map_err(|e| FileAccessError::from_open(path.to_path_buf(), e))?;
    if !metadata.is_file() {
        return Err(FileAccessError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let mut buffered = BufReader::with_capacity(constants::READ_BUFFER_SIZE, file);
    let head = buffered
        .fill_buf()
        .map_err(|e| FileAccessError::from_open(path.to_path_buf(), e))?;
    let compressed =
        head.starts_with(&constants::GZIP_MAGIC) || (has_gzip_extension(path) && !head.is_empty());

    let reader: Box<dyn BufRead + Send> = if compressed {
        Box::new(BufReader::with_capacity(
            constants::READ_BUFFER_SIZE,
            MultiGzDecoder::new(buffered),
        ))
    } else {
        Box::new(buffered)
    };

    tracing::debug!(
        file = %path.display(),
        compressed,
        size = metadata.len(),
        encoding = decode.label(),
        "Opened line source"
    );

    Ok(LineSource {
        path: Arc::from(path),
        reader,
        decode: *decode,
        compressed,
        line_number: 0,
        buf: Vec::new(),
        done: false,
    })
}

// =============================================================================
// LineSource
// =============================================================================

/// One step of a line source.
#[derive(Debug, Clone)]
pub enum SourceItem {
    /// A decoded line. `decode_warning` is set when replacement characters
    /// were substituted for invalid bytes.
    Line { line: LogLine, decode_warning: bool },
    /// A line whose bytes are invalid in the configured encoding and were
    /// skipped.
    Undecodable { line_number: u64 },
    /// A followed line that outgrew the partial-line buffer and was skipped
    /// whole. `length` excludes the terminator.
    Oversized { line_number: u64, length: u64 },
}

/// Lazy, finite line iterator over one file.
///
/// Yields `Err` at most once, after which the source is exhausted.
pub struct LineSource {
    path: Arc<Path>,
    reader: Box<dyn BufRead + Send>,
    decode: DecodeSettings,
    compressed: bool,
    line_number: u64,
    buf: Vec<u8>,
    done: bool,
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("path", &self.path)
            .field("compressed", &self.compressed)
            .field("line_number", &self.line_number)
            .finish_non_exhaustive()
    }
}

impl LineSource {
    pub fn path(&self) -> &Arc<Path> {
        &self.path
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Number of the last line yielded (0 before the first).
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}

impl Iterator for LineSource {
    type Item = io::Result<SourceItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.line_number += 1;
                let mut bytes = trim_line_ending(&self.buf);
                if self.line_number == 1 {
                    bytes = strip_utf8_bom(bytes, &self.decode);
                }

                let item = match decode_line(bytes, &self.decode) {
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
                Some(Ok(item))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl LineSource {
    fn make_line(&self, text: String) -> LogLine {
        LogLine {
            source: Arc::clone(&self.path),
            line_number: self.line_number,
            text,
            timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn lines(source: LineSource) -> Vec<(u64, String)> {
        source
            .map(|item| match item.unwrap() {
                SourceItem::Line { line, .. } => (line.line_number, line.text),
                SourceItem::Undecodable { line_number } => (line_number, "<undecodable>".into()),
                SourceItem::Oversized { line_number, .. } => (line_number, "<oversized>".into()),
            })
            .collect()
    }

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_plain_file_strips_terminators() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.log", b"one\r\ntwo\nthree");
        let got = lines(open_source(&path, &DecodeSettings::default()).unwrap());
        assert_eq!(
            got,
            vec![(1, "one".into()), (2, "two".into()), (3, "three".into())]
        );
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.log", b"");
        let source = open_source(&path, &DecodeSettings::default()).unwrap();
        assert!(!source.is_compressed());
        assert_eq!(lines(source).len(), 0);
    }

    #[test]
    fn test_gzip_detected_by_magic_without_extension() {
        let dir = TempDir::new().unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"alpha\nbeta\n").unwrap();
        let path = write_file(&dir, "rotated.1", &enc.finish().unwrap());

        let source = open_source(&path, &DecodeSettings::default()).unwrap();
        assert!(source.is_compressed());
        assert_eq!(lines(source), vec![(1, "alpha".into()), (2, "beta".into())]);
    }

    #[test]
    fn test_invalid_utf8_skip_and_replace() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.log", b"ok\nbad \xff\xfe here\nlast\n");

        let got = lines(open_source(&path, &DecodeSettings::default()).unwrap());
        assert_eq!(got[1], (2, "<undecodable>".into()));
        assert_eq!(got[2], (3, "last".into()));

        let replace = DecodeSettings {
            encoding: UTF_8,
            policy: DecodePolicy::Replace,
        };
        let items: Vec<SourceItem> = open_source(&path, &replace)
            .unwrap()
            .map(|i| i.unwrap())
            .collect();
        match &items[1] {
            SourceItem::Line {
                line,
                decode_warning,
            } => {
                assert!(*decode_warning);
                assert!(line.text.contains('\u{FFFD}'));
            }
            other => panic!("expected lossy line, got {other:?}"),
        }
    }

    #[test]
    fn test_latin1_decoding() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "latin.log", b"caf\xe9 ERROR\n");
        let settings = DecodeSettings::from_label("latin1", DecodePolicy::Skip).unwrap();
        assert_eq!(lines(open_source(&path, &settings).unwrap()), vec![(1, "café ERROR".into())]);
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bom.log", b"\xEF\xBB\xBFfirst\nsecond\n");
        let got = lines(open_source(&path, &DecodeSettings::default()).unwrap());
        assert_eq!(got[0].1, "first");
    }

    #[test]
    fn test_encoding_labels() {
        assert!(matches!(
            DecodeSettings::from_label("no-such-charset", DecodePolicy::Skip),
            Err(ConfigError::UnknownEncoding { .. })
        ));
        assert!(matches!(
            DecodeSettings::from_label("utf-16le", DecodePolicy::Skip),
            Err(ConfigError::UnsupportedEncoding { .. })
        ));
        assert_eq!(
            DecodeSettings::from_label(" UTF8 ", DecodePolicy::Skip)
                .unwrap()
                .label(),
            "UTF-8"
        );
    }

    #[test]
    fn test_missing_and_directory_paths() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.log");
        assert!(matches!(
            open_source(&missing, &DecodeSettings::default()),
            Err(FileAccessError::NotFound { .. })
        ));
        assert!(matches!(
            open_source(dir.path(), &DecodeSettings::default()),
            Err(FileAccessError::NotAFile { .. }) | Err(FileAccessError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"a\r\n"), b"a");
        assert_eq!(trim_line_ending(b"a\n"), b"a");
        assert_eq!(trim_line_ending(b"a\r"), b"a\r");
        assert_eq!(trim_line_ending(b""), b"");
    }
}
