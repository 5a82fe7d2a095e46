// logsift - core/export.rs
//
// Result sinks: CSV, JSON Lines and the inline console rendering.
// Core layer: writes to any `Write` implementor handed in by the caller.
//
// Records are written one at a time as the orchestrator produces them;
// nothing is buffered beyond the writer's own buffer.

use crate::core::config::SearchConfig;
use crate::core::model::ResultRecord;
use crate::util::error::ExportError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;

/// Output format selectable from config and CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable, one line per record.
    #[default]
    Console,
    Csv,
    Jsonl,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "console" | "inline" => Some(OutputFormat::Console),
            "csv" => Some(OutputFormat::Csv),
            "jsonl" | "ndjson" => Some(OutputFormat::Jsonl),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Console => "console",
            OutputFormat::Csv => "csv",
            OutputFormat::Jsonl => "jsonl",
        }
    }
}

/// Destination for result records.
///
/// `write_record` may be called from one thread at a time only; parallel
/// callers serialise access themselves.
pub trait RecordSink {
    fn write_record(&mut self, record: &ResultRecord) -> Result<(), ExportError>;

    fn flush(&mut self) -> Result<(), ExportError>;
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write_record(&mut self, record: &ResultRecord) -> Result<(), ExportError> {
        (**self).write_record(record)
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        (**self).flush()
    }
}

/// Collecting sink, used by library callers and tests.
impl RecordSink for Vec<ResultRecord> {
    fn write_record(&mut self, record: &ResultRecord) -> Result<(), ExportError> {
        self.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

/// RFC 3339 in UTC with a `Z` suffix, the same text serde produces for JSONL.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// =============================================================================
// CSV
// =============================================================================

/// Fixed leading CSV columns, followed by one column per field name.
pub const CSV_BASE_COLUMNS: [&str; 5] = ["file", "line_number", "timestamp", "matched", "line"];

/// Separator between criterion ids inside the `matched` CSV cell.
const MATCHED_SEPARATOR: &str = ";";

/// CSV sink with a header fixed at construction.
///
/// The header is written immediately, so an empty result set still yields
/// a valid file with just the header row.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    columns: Vec<String>,
    destination: String,
}

impl<W: Write> CsvExporter<W> {
    pub fn new(
        writer: W,
        columns: Vec<String>,
        destination: impl Into<String>,
    ) -> Result<Self, ExportError> {
        let destination = destination.into();
        let mut writer = csv::Writer::from_writer(writer);

        let header = CSV_BASE_COLUMNS
            .iter()
            .copied()
            .chain(columns.iter().map(String::as_str));
        writer
            .write_record(header)
            .map_err(|e| ExportError::Csv {
                destination: destination.clone(),
                source: e,
            })?;

        Ok(Self {
            writer,
            columns,
            destination,
        })
    }

    pub fn into_inner(self) -> Result<W, ExportError> {
        let destination = self.destination;
        self.writer.into_inner().map_err(|e| ExportError::Io {
            destination,
            source: e.into_error(),
        })
    }
}

impl<W: Write> RecordSink for CsvExporter<W> {
    fn write_record(&mut self, record: &ResultRecord) -> Result<(), ExportError> {
        let timestamp = record
            .timestamp
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default();
        let file = record.source_file.display().to_string();
        let line_number = record.line_number.to_string();
        let matched = record.matched.join(MATCHED_SEPARATOR);

        let base = [
            file.as_str(),
            line_number.as_str(),
            timestamp.as_str(),
            matched.as_str(),
            record.raw_text.as_str(),
        ];
        let fields = self
            .columns
            .iter()
            .map(|name| record.fields.get(name).map(String::as_str).unwrap_or(""));

        self.writer
            .write_record(base.into_iter().chain(fields))
            .map_err(|e| ExportError::Csv {
                destination: self.destination.clone(),
                source: e,
            })
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush().map_err(|e| ExportError::Io {
            destination: self.destination.clone(),
            source: e,
        })
    }
}

// =============================================================================
// JSON Lines
// =============================================================================

/// One compact JSON object per record, newline-terminated.
pub struct JsonlExporter<W: Write> {
    writer: W,
    destination: String,
}

impl<W: Write> JsonlExporter<W> {
    pub fn new(writer: W, destination: impl Into<String>) -> Self {
        Self {
            writer,
            destination: destination.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonlExporter<W> {
    fn write_record(&mut self, record: &ResultRecord) -> Result<(), ExportError> {
        serde_json::to_writer(&mut self.writer, record).map_err(|e| ExportError::Json {
            destination: self.destination.clone(),
            source: e,
        })?;
        self.writer.write_all(b"\n").map_err(|e| ExportError::Io {
            destination: self.destination.clone(),
            source: e,
        })
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush().map_err(|e| ExportError::Io {
            destination: self.destination.clone(),
            source: e,
        })
    }
}

// =============================================================================
// Inline console rendering
// =============================================================================

/// `file|line|timestamp|criteria| key=value ... raw line`
///
/// Missing timestamps render as `-`. Fields are in name order.
pub struct InlineExporter<W: Write> {
    writer: W,
    destination: String,
}

impl<W: Write> InlineExporter<W> {
    pub fn new(writer: W, destination: impl Into<String>) -> Self {
        Self {
            writer,
            destination: destination.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Render one record in the inline console format (no trailing newline).
pub fn render_inline(record: &ResultRecord) -> String {
    let timestamp = record
        .timestamp
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(|| "-".to_string());

    let mut out = format!(
        "{}|{}|{}|{}|",
        record.source_file.display(),
        record.line_number,
        timestamp,
        record.matched.join(",")
    );
    for (name, value) in &record.fields {
        out.push(' ');
        out.push_str(name);
        out.push('=');
        out.push_str(value);
    }
    out.push(' ');
    out.push_str(&record.raw_text);
    out
}

impl<W: Write> RecordSink for InlineExporter<W> {
    fn write_record(&mut self, record: &ResultRecord) -> Result<(), ExportError> {
        writeln!(self.writer, "{}", render_inline(record)).map_err(|e| ExportError::Io {
            destination: self.destination.clone(),
            source: e,
        })
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush().map_err(|e| ExportError::Io {
            destination: self.destination.clone(),
            source: e,
        })
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Build the sink for `format` over `writer`. CSV columns come from the
/// configuration's selected profiles.
pub fn create_sink<W: Write + Send + 'static>(
    format: OutputFormat,
    writer: W,
    destination: impl Into<String>,
    config: &SearchConfig,
) -> Result<Box<dyn RecordSink + Send>, ExportError> {
    let destination = destination.into();
    tracing::debug!(format = format.label(), destination = %destination, "Creating result sink");

    let sink: Box<dyn RecordSink + Send> = match format {
        OutputFormat::Console => Box::new(InlineExporter::new(writer, destination)),
        OutputFormat::Jsonl => Box::new(JsonlExporter::new(writer, destination)),
        OutputFormat::Csv => Box::new(CsvExporter::new(
            writer,
            config.field_columns(),
            destination,
        )?),
    };
    Ok(sink)
}
