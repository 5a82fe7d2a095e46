// logsift - core/config.rs
//
// The validated, immutable search configuration and its builder.
//
// Everything that can fail (criterion regexes, window bounds, timestamp
// formats, profile selection, encoding labels, globs) fails here, before a
// single file is opened. A built `SearchConfig` is read-only for the rest
// of the run and is shared by reference with every worker.

use crate::core::extract;
use crate::core::matcher::{self, Matcher};
use crate::core::model::{
    CriterionKind, DecodePolicy, FieldProfile, MatchCriterion, MatchMode, TimeWindow, ZonePolicy,
};
use crate::core::source::DecodeSettings;
use crate::core::timestamp::{self, TimestampExtractor};
use crate::util::constants;
use crate::util::error::ConfigError;
use std::time::Duration;

/// Validated search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub criteria: Vec<MatchCriterion>,
    pub mode: MatchMode,
    pub match_all_lines: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Default case sensitivity applied to criteria that do not set their own.
    pub case_sensitive: bool,
    /// Selected field profiles, in the order they are tried.
    pub profiles: Vec<FieldProfile>,
    pub timestamps: TimestampExtractor,
    pub window: TimeWindow,
    pub decode: DecodeSettings,
}

impl SearchConfig {
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(&self.criteria, self.mode, self.match_all_lines)
    }

    /// Field columns for tabular output: union of the selected profiles'
    /// group names.
    pub fn field_columns(&self) -> Vec<String> {
        extract::field_union(&self.profiles)
    }
}

/// How a run is executed. Independent of what is searched for.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Keep files open and stream appended lines until cancelled.
    pub follow: bool,
    /// Process files on a worker pool.
    pub parallel: bool,
    /// Pool size for parallel mode; 0 picks the number of CPUs.
    pub worker_threads: usize,
    /// Follow-mode poll interval.
    pub poll_interval: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            follow: false,
            parallel: false,
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            poll_interval: Duration::from_millis(constants::FOLLOW_POLL_INTERVAL_MS),
        }
    }
}

/// One criterion before compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionSpec {
    pub kind: CriterionKind,
    pub pattern: String,
    /// `None` inherits the config-wide default.
    pub case_sensitive: Option<bool>,
}

/// Collects raw settings and validates them in `build`.
#[derive(Debug, Clone)]
pub struct SearchConfigBuilder {
    criteria: Vec<CriterionSpec>,
    mode: MatchMode,
    match_all_lines: bool,
    include: Vec<String>,
    exclude: Vec<String>,
    case_sensitive: bool,
    available_profiles: Vec<FieldProfile>,
    selected_profiles: Option<Vec<String>>,
    timestamps_enabled: bool,
    timestamp_patterns: Vec<(String, String)>,
    zone: ZonePolicy,
    since: Option<String>,
    until: Option<String>,
    encoding: String,
    decode_policy: DecodePolicy,
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self {
            criteria: Vec::new(),
            mode: MatchMode::default(),
            match_all_lines: false,
            include: Vec::new(),
            exclude: Vec::new(),
            case_sensitive: true,
            available_profiles: Vec::new(),
            selected_profiles: None,
            timestamps_enabled: true,
            timestamp_patterns: Vec::new(),
            zone: ZonePolicy::default(),
            since: None,
            until: None,
            encoding: constants::DEFAULT_ENCODING.to_string(),
            decode_policy: DecodePolicy::default(),
        }
    }
}

impl SearchConfigBuilder {
    pub fn keyword(self, pattern: impl Into<String>) -> Self {
        self.criterion(CriterionKind::Keyword, pattern, None)
    }

    pub fn regex(self, pattern: impl Into<String>) -> Self {
        self.criterion(CriterionKind::Regex, pattern, None)
    }

    pub fn criterion(
        mut self,
        kind: CriterionKind,
        pattern: impl Into<String>,
        case_sensitive: Option<bool>,
    ) -> Self {
        self.criteria.push(CriterionSpec {
            kind,
            pattern: pattern.into(),
            case_sensitive,
        });
        self
    }

    /// Drop every criterion added so far.
    pub fn clear_criteria(mut self) -> Self {
        self.criteria.clear();
        self
    }

    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn match_all_lines(mut self, enabled: bool) -> Self {
        self.match_all_lines = enabled;
        self
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    /// Profiles that may be selected. Without an explicit selection all of
    /// them are used, in this order.
    pub fn available_profiles(mut self, profiles: Vec<FieldProfile>) -> Self {
        self.available_profiles = profiles;
        self
    }

    /// Select profiles by id, in the order given. An empty list disables
    /// field extraction.
    pub fn select_profiles<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_profiles = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps_enabled = enabled;
        self
    }

    /// Add a timestamp pattern. When none are added the built-in set is used.
    pub fn timestamp_pattern(mut self, regex: impl Into<String>, format: impl Into<String>) -> Self {
        self.timestamp_patterns.push((regex.into(), format.into()));
        self
    }

    pub fn zone(mut self, zone: ZonePolicy) -> Self {
        self.zone = zone;
        self
    }

    pub fn since(mut self, value: impl Into<String>) -> Self {
        self.since = Some(value.into());
        self
    }

    pub fn until(mut self, value: impl Into<String>) -> Self {
        self.until = Some(value.into());
        self
    }

    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Validate and compile everything.
    pub fn build(self) -> Result<SearchConfig, ConfigError> {
        if self.criteria.len() > constants::MAX_CRITERIA {
            return Err(ConfigError::TooManyCriteria {
                count: self.criteria.len(),
                max: constants::MAX_CRITERIA,
            });
        }

        let criteria = self
            .criteria
            .iter()
            .map(|spec| {
                matcher::compile_criterion(
                    spec.kind,
                    &spec.pattern,
                    spec.case_sensitive.unwrap_or(self.case_sensitive),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        if criteria.is_empty() && !self.match_all_lines {
            return Err(ConfigError::EmptyCriteria);
        }

        for pattern in self.include.iter().chain(&self.exclude) {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source: e,
            })?;
        }

        let window = TimeWindow {
            since: self
                .since
                .as_deref()
                .map(|v| timestamp::parse_window_bound(v, self.zone, "since"))
                .transpose()?,
            until: self
                .until
                .as_deref()
                .map(|v| timestamp::parse_window_bound(v, self.zone, "until"))
                .transpose()?,
        };
        if let (Some(since), Some(until)) = (window.since, window.until) {
            if since > until {
                return Err(ConfigError::InvalidWindow { since, until });
            }
        }

        let timestamps = if self.timestamps_enabled {
            let patterns = if self.timestamp_patterns.is_empty() {
                timestamp::default_patterns()?
            } else {
                self.timestamp_patterns
                    .iter()
                    .map(|(regex, format)| timestamp::compile_pattern(regex, format))
                    .collect::<Result<Vec<_>, _>>()?
            };
            TimestampExtractor::new(patterns, self.zone)
        } else {
            if !window.is_unbounded() {
                tracing::warn!("Time window set but timestamp parsing is disabled; window has no effect");
            }
            TimestampExtractor::disabled()
        };

        let profiles = match self.selected_profiles {
            None => self.available_profiles,
            Some(ids) => {
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    let profile = self
                        .available_profiles
                        .iter()
                        .find(|p| p.id == id)
                        .ok_or_else(|| ConfigError::UnknownProfile { id: id.clone() })?;
                    if !selected.iter().any(|p: &FieldProfile| p.id == id) {
                        selected.push(profile.clone());
                    }
                }
                selected
            }
        };

        let decode = DecodeSettings::from_label(&self.encoding, self.decode_policy)?;

        tracing::debug!(
            criteria = criteria.len(),
            mode = ?self.mode,
            match_all_lines = self.match_all_lines,
            profiles = profiles.len(),
            timestamps = timestamps.is_enabled(),
            since = ?window.since,
            until = ?window.until,
            encoding = decode.label(),
            "Search configuration built"
        );

        Ok(SearchConfig {
            criteria,
            mode: self.mode,
            match_all_lines: self.match_all_lines,
            include: self.include,
            exclude: self.exclude,
            case_sensitive: self.case_sensitive,
            profiles,
            timestamps,
            window,
            decode,
        })
    }
}
