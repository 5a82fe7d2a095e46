// logsift - core/discovery.rs
//
// Input file selection: expands include entries (literal files, directories,
// glob patterns) into an ordered, de-duplicated file list and drops
// excluded paths.
//
// Only metadata is read here, never file contents.
//
//   - A directory entry is walked with `walkdir` up to `max_depth`; its files
//     are kept when the file name matches one of `directory_include`.
//   - A glob entry is expanded with the `glob` crate (`**` recurses).
//   - A literal path that does not exist is kept, so the orchestrator can
//     report it as a skipped file with the proper reason.
//   - Exclude patterns are tested against the full path and against each
//     path component, so both `**/archive/**` and `*.bak` work.
//   - Per-entry I/O errors are non-fatal and collected as warnings.

use crate::util::constants;
use crate::util::error::ConfigError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Files, directories or glob patterns to search, in order.
    pub include: Vec<String>,

    /// Glob patterns for paths to drop.
    pub exclude: Vec<String>,

    /// File-name globs applied to files found under directory entries.
    pub directory_include: Vec<String>,

    /// Maximum directory recursion depth for directory entries.
    pub max_depth: usize,

    /// Maximum number of files returned.
    pub max_files: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: constants::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            directory_include: constants::DEFAULT_DIRECTORY_INCLUDE
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_depth: constants::DEFAULT_MAX_DEPTH,
            max_files: constants::ABSOLUTE_MAX_FILES,
        }
    }
}

/// Outcome of a discovery pass.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Selected files, in include order, without duplicates.
    pub files: Vec<PathBuf>,

    /// Non-fatal problems (unreadable directories, glob I/O errors,
    /// truncation).
    pub warnings: Vec<String>,
}

// =============================================================================
// Discovery
// =============================================================================

/// Expand `config.include` into a file list.
///
/// Returns `Err` only for malformed glob patterns; everything else is a
/// warning.
pub fn discover_files(config: &DiscoveryConfig) -> Result<Discovery, ConfigError> {
    let exclude = compile_patterns(&config.exclude)?;
    let directory_include = compile_patterns(&config.directory_include)?;
    let max_files = config.max_files.min(constants::ABSOLUTE_MAX_FILES);

    tracing::debug!(
        include = ?config.include,
        exclude = ?config.exclude,
        max_depth = config.max_depth,
        "Discovery starting"
    );

    let mut result = Discovery::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut candidates: Vec<PathBuf> = Vec::new();

    for entry in &config.include {
        let path = Path::new(entry);
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => walk_directory(
                path,
                config.max_depth,
                &directory_include,
                &exclude,
                &mut candidates,
                &mut result.warnings,
            ),
            Ok(_) => candidates.push(path.to_path_buf()),
            Err(_) if is_glob(entry) => {
                expand_glob(entry, &mut candidates, &mut result.warnings)?
            }
            Err(e) => {
                // Kept so the run reports it as skipped with the real reason.
                tracing::debug!(path = entry, error = %e, "Include entry not accessible");
                candidates.push(path.to_path_buf());
            }
        }
    }

    for path in candidates {
        if is_excluded(&path, &exclude) {
            tracing::trace!(file = %path.display(), "Excluded by pattern");
            continue;
        }
        if seen.insert(path.clone()) {
            result.files.push(path);
        }
    }

    if result.files.len() > max_files {
        result.warnings.push(format!(
            "{} files selected, only the first {max_files} are searched",
            result.files.len()
        ));
        tracing::warn!(
            found = result.files.len(),
            limit = max_files,
            "File list truncated"
        );
        result.files.truncate(max_files);
    }

    tracing::debug!(
        files = result.files.len(),
        warnings = result.warnings.len(),
        "Discovery complete"
    );

    Ok(result)
}

fn walk_directory(
    root: &Path,
    max_depth: usize,
    name_patterns: &[glob::Pattern],
    exclude: &[glob::Pattern],
    out: &mut Vec<PathBuf>,
    warnings: &mut Vec<String>,
) {
    let walker = walkdir::WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // Prune excluded directories so their subtrees are never visited.
            e.depth() == 0 || !e.file_type().is_dir() || !is_excluded_dir(e.path(), exclude)
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                let msg = format!("Cannot access '{path_str}': {e}");
                tracing::debug!(warning = %msg, "Discovery warning");
                warnings.push(msg);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            warnings.push(format!(
                "Skipping '{}': non-UTF-8 filename",
                entry.path().display()
            ));
            continue;
        };

        if name_patterns.iter().any(|p| p.matches(name)) {
            out.push(entry.into_path());
        } else {
            tracing::trace!(file = name, "Not matched by directory include patterns");
        }
    }
}

fn expand_glob(
    pattern: &str,
    out: &mut Vec<PathBuf>,
    warnings: &mut Vec<String>,
) -> Result<(), ConfigError> {
    let paths = glob::glob(pattern).map_err(|e| ConfigError::InvalidGlob {
        pattern: pattern.to_string(),
        source: e,
    })?;

    let mut matched = 0usize;
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => {
                matched += 1;
                out.push(path);
            }
            Ok(_) => {}
            Err(e) => {
                let msg = format!("Cannot access '{}': {}", e.path().display(), e.error());
                tracing::debug!(warning = %msg, "Discovery warning");
                warnings.push(msg);
            }
        }
    }

    if matched == 0 {
        tracing::debug!(pattern, "Include pattern matched no files");
    }
    Ok(())
}

// =============================================================================
// Glob helpers
// =============================================================================

fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| ConfigError::InvalidGlob {
                pattern: p.clone(),
                source: e,
            })
        })
        .collect()
}

fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Whether `path` matches an exclude pattern, either as a whole or through
/// one of its components (for patterns without a separator).
pub fn is_excluded(path: &Path, exclude: &[glob::Pattern]) -> bool {
    exclude.iter().any(|pattern| {
        pattern.matches_path(path)
            || (!pattern.as_str().contains('/')
                && path
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .any(|name| pattern.matches(name)))
    })
}

/// Directory pruning: a directory is excluded when its own name matches a
/// component pattern, or when anything inside it would match a
/// `.../name/**` pattern.
fn is_excluded_dir(dir: &Path, exclude: &[glob::Pattern]) -> bool {
    let child = dir.join("x");
    exclude.iter().any(|pattern| {
        let text = pattern.as_str();
        if text.contains('/') {
            text.ends_with("/**") && pattern.matches_path(&child)
        } else {
            dir.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| pattern.matches(name))
        }
    })
}
