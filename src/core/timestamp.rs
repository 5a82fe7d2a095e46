// logsift - core/timestamp.rs
//
// Timestamp extraction: finds a line's timestamp with configured
// regex + chrono-format pairs and converts it to a comparable UTC instant.
// Core layer: pure logic, no I/O.
//
// Rules:
//   - The first pattern whose regex matches decides. A parse failure on that
//     match means "no timestamp"; later patterns are not consulted.
//   - Formats with an explicit offset (%z, %:z, %#z, %+, rfc3339, rfc2822)
//     keep their offset. Everything else is interpreted in the ZonePolicy,
//     which is also used for window bounds.
//   - Year-less formats (BSD syslog) get the current year injected, or the
//     previous one when the current year would put the line in the future.

use crate::core::model::ZonePolicy;
use crate::util::constants;
use crate::util::error::ConfigError;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use regex::Regex;

/// Name of the capture group holding the timestamp text. When a pattern has
/// no such group the whole match is used.
pub const TIMESTAMP_GROUP: &str = "ts";

/// How the captured text is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampFormat {
    /// RFC 3339 / ISO 8601 with offset or `Z`.
    Rfc3339,
    /// RFC 2822 (mail / some syslog forwarders).
    Rfc2822,
    /// A chrono strftime format string.
    Strftime {
        format: String,
        zoned: bool,
        yearless: bool,
    },
}

impl TimestampFormat {
    /// Build from a config string. `rfc3339` and `rfc2822` are keywords;
    /// anything else is a strftime format and is validated here.
    pub fn parse(format: &str) -> Result<Self, ConfigError> {
        match format.trim().to_ascii_lowercase().as_str() {
            "" => {
                return Err(ConfigError::InvalidTimestampFormat {
                    format: format.to_string(),
                    reason: "format is empty".to_string(),
                })
            }
            "rfc3339" | "iso8601" => return Ok(TimestampFormat::Rfc3339),
            "rfc2822" => return Ok(TimestampFormat::Rfc2822),
            _ => {}
        }

        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidTimestampFormat {
                format: format.to_string(),
                reason: "unrecognised strftime specifier".to_string(),
            });
        }

        let zoned = ["%z", "%:z", "%::z", "%#z", "%+"]
            .iter()
            .any(|spec| format.contains(spec));
        let yearless = !["%Y", "%y", "%C", "%G", "%+", "%s"]
            .iter()
            .any(|spec| format.contains(spec));

        Ok(TimestampFormat::Strftime {
            format: format.to_string(),
            zoned,
            yearless,
        })
    }
}

/// A compiled timestamp pattern.
#[derive(Debug, Clone)]
pub struct TimestampPattern {
    pub regex: Regex,
    pub format: TimestampFormat,
}

/// Compile a regex + format pair, failing fast on either.
pub fn compile_pattern(regex: &str, format: &str) -> Result<TimestampPattern, ConfigError> {
    if regex.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(ConfigError::PatternTooLong {
            field: "timestamp.patterns.regex",
            length: regex.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }
    let compiled = Regex::new(regex).map_err(|e| ConfigError::InvalidTimestampPattern {
        pattern: regex.to_string(),
        source: e,
    })?;
    Ok(TimestampPattern {
        regex: compiled,
        format: TimestampFormat::parse(format)?,
    })
}

/// Built-in pattern set, used when timestamps are enabled but none are
/// configured. Ordered from most to least specific.
pub fn default_patterns() -> Result<Vec<TimestampPattern>, ConfigError> {
    const DEFAULTS: &[(&str, &str)] = &[
        // 2025-08-10T10:00:00.123+02:00 / ...Z
        (
            r"(?P<ts>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2}))",
            "rfc3339",
        ),
        // 2025-08-10 10:00:00[.123]  (also log4j comma millis)
        (
            r"(?P<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:[.,]\d+)?)",
            "%Y-%m-%d %H:%M:%S%.f",
        ),
        // 2025-08-10T10:00:00[.123]
        (
            r"(?P<ts>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:[.,]\d+)?)",
            "%Y-%m-%dT%H:%M:%S%.f",
        ),
        // Apache / Nginx access: [10/Aug/2025:10:00:00 +0000]
        (
            r"\[(?P<ts>\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4})\]",
            "%d/%b/%Y:%H:%M:%S %z",
        ),
        // HAProxy accept date: [10/Aug/2025:10:00:00.123]
        (
            r"\[(?P<ts>\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2}(?:\.\d+)?)\]",
            "%d/%b/%Y:%H:%M:%S%.f",
        ),
        // Nginx error log: 2025/08/10 10:00:00
        (
            r"(?P<ts>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})",
            "%Y/%m/%d %H:%M:%S",
        ),
        // BSD syslog: Aug 10 10:00:00
        (
            r"^(?P<ts>[A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2})",
            "%b %e %H:%M:%S",
        ),
    ];

    DEFAULTS
        .iter()
        .map(|(regex, format)| compile_pattern(regex, format))
        .collect()
}

/// Extracts timestamps from raw lines.
#[derive(Debug, Clone, Default)]
pub struct TimestampExtractor {
    patterns: Vec<TimestampPattern>,
    zone: ZonePolicy,
}

impl TimestampExtractor {
    pub fn new(patterns: Vec<TimestampPattern>, zone: ZonePolicy) -> Self {
        Self { patterns, zone }
    }

    /// An extractor that never finds a timestamp.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.patterns.is_empty()
    }

    pub fn zone(&self) -> ZonePolicy {
        self.zone
    }

    pub fn patterns(&self) -> &[TimestampPattern] {
        &self.patterns
    }

    /// Find and parse the line's timestamp. `None` when no pattern matches
    /// or when the first matching pattern captured an invalid date/time.
    pub fn extract(&self, line: &str) -> Option<DateTime<Utc>> {
        for pattern in &self.patterns {
            let Some(caps) = pattern.regex.captures(line) else {
                continue;
            };
            let raw = caps
                .name(TIMESTAMP_GROUP)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str())?;
            return parse_with_format(raw, &pattern.format, self.zone);
        }
        None
    }
}

/// Parse `raw` with `format`, resolving zone-less values via `zone`.
pub fn parse_with_format(
    raw: &str,
    format: &TimestampFormat,
    zone: ZonePolicy,
) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    match format {
        TimestampFormat::Rfc3339 => {
            let normalised = trimmed.replace(',', ".");
            DateTime::parse_from_rfc3339(&normalised)
                .or_else(|_| DateTime::parse_from_str(&normalised, "%Y-%m-%dT%H:%M:%S%.f%z"))
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        TimestampFormat::Rfc2822 => DateTime::parse_from_rfc2822(trimmed)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        TimestampFormat::Strftime {
            format,
            zoned,
            yearless,
        } => {
            // Comma decimal separator (log4j) -> dot, so %.f accepts it.
            let text = if trimmed.contains(',') && !format.contains(',') {
                trimmed.replace(',', ".")
            } else {
                trimmed.to_string()
            };

            if *zoned {
                return DateTime::parse_from_str(&text, format)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc));
            }

            if *yearless {
                return parse_yearless(&text, format, zone, Utc::now());
            }

            if let Ok(ndt) = NaiveDateTime::parse_from_str(&text, format) {
                return resolve_naive(ndt, zone);
            }
            // Date-only formats resolve to midnight.
            NaiveDate::parse_from_str(&text, format)
                .ok()
                .and_then(|nd| nd.and_hms_opt(0, 0, 0))
                .and_then(|ndt| resolve_naive(ndt, zone))
        }
    }
}

/// Interpret a zone-less date/time. Ambiguous local times (DST fold) take
/// the earlier instant; non-existent ones (DST gap) yield `None`.
pub fn resolve_naive(ndt: NaiveDateTime, zone: ZonePolicy) -> Option<DateTime<Utc>> {
    match zone {
        ZonePolicy::Utc => Some(ndt.and_utc()),
        ZonePolicy::Local => Local
            .from_local_datetime(&ndt)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Infer the year of a year-less timestamp relative to `now`. A December
/// line read in January belongs to last year.
fn parse_yearless(
    text: &str,
    format: &str,
    zone: ZonePolicy,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let year_format = format!("%Y {format}");
    let parse_in = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{year} {text}"), &year_format)
            .ok()
            .and_then(|ndt| resolve_naive(ndt, zone))
    };

    let year = match zone {
        ZonePolicy::Utc => now.year(),
        ZonePolicy::Local => now.with_timezone(&Local).year(),
    };
    let ts = parse_in(year)?;
    let tolerance = TimeDelta::hours(constants::YEARLESS_FUTURE_TOLERANCE_HOURS);
    if ts > now + tolerance {
        // Feb 29 has no previous-year counterpart; keep the current year.
        parse_in(year - 1).or(Some(ts))
    } else {
        Some(ts)
    }
}

/// Parse a `--since` / `--until` value.
///
/// Accepted: RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`,
/// `YYYY-MM-DD HH:MM`, `YYYY-MM-DD` (midnight). Zone-less values use `zone`.
pub fn parse_window_bound(
    value: &str,
    zone: ZonePolicy,
    field: &'static str,
) -> Result<DateTime<Utc>, ConfigError> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });

    naive
        .and_then(|ndt| resolve_naive(ndt, zone))
        .ok_or_else(|| ConfigError::InvalidWindowBound {
            field,
            value: value.to_string(),
        })
}
