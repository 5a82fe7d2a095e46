// logsift - core/matcher.rs
//
// Match engine: evaluates a line against the configured keyword/regex
// criteria and combination mode.
// Core layer: pure logic, no I/O. Patterns are compiled once at config load
// so per-line evaluation never re-parses a pattern.

use crate::core::model::{CriterionKind, MatchCriterion, MatchMode};
use crate::util::constants;
use crate::util::error::ConfigError;
use regex::RegexBuilder;

/// Compile a criterion into its immutable runtime form.
///
/// Keywords are escaped so they match as literal substrings; regexes use
/// search (not full-match) semantics. Length is bounded; pathological
/// patterns beyond that are the caller's responsibility.
pub fn compile_criterion(
    kind: CriterionKind,
    pattern: &str,
    case_sensitive: bool,
) -> Result<MatchCriterion, ConfigError> {
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(ConfigError::PatternTooLong {
            field: "search criteria",
            length: pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }

    let source = match kind {
        CriterionKind::Keyword => regex::escape(pattern),
        CriterionKind::Regex => pattern.to_string(),
    };

    let regex = RegexBuilder::new(&source)
        .case_insensitive(!case_sensitive)
        .size_limit(constants::REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| ConfigError::InvalidCriterion {
            pattern: pattern.to_string(),
            source: e,
        })?;

    Ok(MatchCriterion {
        id: format!("{}:{pattern}", kind.id_prefix()),
        kind,
        pattern: pattern.to_string(),
        case_sensitive,
        regex,
    })
}

/// Outcome of evaluating one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome<'a> {
    pub accepted: bool,
    /// Identifiers of the criteria that fired, in configuration order.
    pub fired: Vec<&'a str>,
}

/// Borrowed view over the compiled criteria plus the combination policy.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    criteria: &'a [MatchCriterion],
    mode: MatchMode,
    match_all_lines: bool,
}

impl<'a> Matcher<'a> {
    pub fn new(criteria: &'a [MatchCriterion], mode: MatchMode, match_all_lines: bool) -> Self {
        Self {
            criteria,
            mode,
            match_all_lines,
        }
    }

    /// Evaluate `text`. Side-effect free.
    pub fn evaluate(&self, text: &str) -> MatchOutcome<'a> {
        if self.criteria.is_empty() {
            return MatchOutcome {
                accepted: self.match_all_lines,
                fired: Vec::new(),
            };
        }

        let mut fired = Vec::new();
        for criterion in self.criteria {
            if criterion.regex.is_match(text) {
                fired.push(criterion.id.as_str());
            } else if self.mode == MatchMode::All {
                // One miss decides ALL mode; no need to test the rest.
                return MatchOutcome {
                    accepted: false,
                    fired,
                };
            }
        }

        let accepted = match self.mode {
            MatchMode::Any => !fired.is_empty(),
            MatchMode::All => fired.len() == self.criteria.len(),
        };
        MatchOutcome { accepted, fired }
    }
}
