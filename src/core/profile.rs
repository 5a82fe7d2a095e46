// logsift - core/profile.rs
//
// Field profile loading and validation.
// Core layer: accepts TOML strings, never touches the filesystem.
// I/O is handled by app::profile_mgr which feeds content here.

use crate::core::model::FieldProfile;
use crate::util::constants;
use crate::util::error::ProfileError;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::path::Path;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw TOML profile definition as deserialized from a .toml file.
/// This is validated and compiled into a `FieldProfile` for runtime use.
#[derive(Debug, Deserialize)]
pub struct ProfileDefinition {
    pub profile: ProfileMeta,
    #[serde(default)]
    pub patterns: Vec<PatternDef>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileMeta {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PatternDef {
    pub regex: String,
}

// =============================================================================
// Profile validation and compilation
// =============================================================================

/// Parse a TOML string into a `ProfileDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_profile_toml(
    toml_content: &str,
    source_path: &Path,
) -> Result<ProfileDefinition, ProfileError> {
    toml::from_str(toml_content).map_err(|e| ProfileError::TomlParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

/// Validate a `ProfileDefinition` and compile it into a runtime `FieldProfile`.
///
/// Validates:
/// - `profile.id` and `profile.name` are non-empty
/// - at least one pattern, and no more than the per-profile bound
/// - every pattern compiles, is within the length bound, and has at least
///   one named capture group
pub fn validate_and_compile(
    def: ProfileDefinition,
    is_builtin: bool,
) -> Result<FieldProfile, ProfileError> {
    let id = def.profile.id.trim().to_string();

    if id.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: "(empty)".to_string(),
            field: "profile.id",
        });
    }
    if def.profile.name.trim().is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: id,
            field: "profile.name",
        });
    }
    if def.patterns.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: id,
            field: "patterns",
        });
    }
    if def.patterns.len() > constants::MAX_PATTERNS_PER_PROFILE {
        return Err(ProfileError::TooManyPatterns {
            profile_id: id,
            count: def.patterns.len(),
            max: constants::MAX_PATTERNS_PER_PROFILE,
        });
    }

    let mut patterns = Vec::with_capacity(def.patterns.len());
    for (index, pattern) in def.patterns.iter().enumerate() {
        let regex = compile_regex(&id, index, &pattern.regex)?;
        if regex.capture_names().flatten().next().is_none() {
            return Err(ProfileError::NoNamedGroups {
                profile_id: id,
                pattern_index: index,
            });
        }
        patterns.push(regex);
    }

    tracing::trace!(
        profile_id = %id,
        version = %def.profile.version,
        patterns = patterns.len(),
        "Compiled field profile"
    );

    Ok(FieldProfile {
        id,
        name: def.profile.name,
        description: def.profile.description,
        patterns,
        is_builtin,
    })
}

/// Compile a pattern with a length bound so hostile profiles cannot feed the
/// regex compiler arbitrarily large input.
fn compile_regex(profile_id: &str, index: usize, pattern: &str) -> Result<Regex, ProfileError> {
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(ProfileError::RegexTooLong {
            profile_id: profile_id.to_string(),
            pattern_index: index,
            length: pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }

    RegexBuilder::new(pattern)
        .size_limit(constants::REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| ProfileError::InvalidRegex {
            profile_id: profile_id.to_string(),
            pattern_index: index,
            pattern: pattern.to_string(),
            source: e,
        })
}

// =============================================================================
// Built-in profiles (embedded at compile time)
// =============================================================================

/// Embedded TOML content for built-in profiles, in default selection order.
/// Each tuple is (filename, TOML content).
///
/// More specific formats come first: `apache-combined` lines also satisfy
/// `apache-common`, and `haproxy-http` is a superset of `haproxy-simple`.
pub fn builtin_profile_sources() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "haproxy_http.toml",
            include_str!("../../profiles/haproxy_http.toml"),
        ),
        (
            "haproxy_simple.toml",
            include_str!("../../profiles/haproxy_simple.toml"),
        ),
        (
            "apache_combined.toml",
            include_str!("../../profiles/apache_combined.toml"),
        ),
        (
            "apache_common.toml",
            include_str!("../../profiles/apache_common.toml"),
        ),
        (
            "nginx_error.toml",
            include_str!("../../profiles/nginx_error.toml"),
        ),
        ("iis_w3c.toml", include_str!("../../profiles/iis_w3c.toml")),
    ]
}

/// Load and validate all built-in profiles.
///
/// Invalid profiles are logged and skipped (non-fatal).
pub fn load_builtin_profiles() -> Vec<FieldProfile> {
    let mut profiles = Vec::new();
    let mut failures = 0usize;

    for (filename, content) in builtin_profile_sources() {
        let path = format!("<builtin>/{filename}");
        match parse_profile_toml(content, Path::new(&path))
            .and_then(|def| validate_and_compile(def, true))
        {
            Ok(profile) => {
                tracing::debug!(profile_id = %profile.id, "Loaded built-in profile");
                profiles.push(profile);
            }
            Err(e) => {
                // Built-in profile failures are bugs, but the run can continue.
                tracing::error!(file = filename, error = %e, "Failed to load built-in profile");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        tracing::warn!(count = failures, "Some built-in profiles failed to load");
    }

    profiles
}

// =============================================================================
// Tests
// =============================================================================
