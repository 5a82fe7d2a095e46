// logsift - app/profile_mgr.rs
//
// Loads field profiles from the built-in set (embedded in the binary) and
// from user TOML files on disk. A user profile replaces the built-in with
// the same id; two user files declaring the same id is an error.

use crate::core::model::FieldProfile;
use crate::core::profile;
use crate::util::constants;
use crate::util::error::ProfileError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Load all available profiles: built-in first, then user-defined overrides.
///
/// Invalid user profiles are logged and skipped. Returns the merged list
/// and every non-fatal error encountered.
pub fn load_all_profiles(
    user_profile_dir: Option<&Path>,
) -> (Vec<FieldProfile>, Vec<ProfileError>) {
    let mut profiles = profile::load_builtin_profiles();
    let mut errors = Vec::new();

    tracing::debug!(builtin_count = profiles.len(), "Loaded built-in profiles");

    if let Some(dir) = user_profile_dir {
        if dir.is_dir() {
            let (user_profiles, user_errors) = load_user_profiles(dir);
            errors.extend(user_errors);

            for user_profile in user_profiles {
                if let Some(pos) = profiles.iter().position(|p| p.id == user_profile.id) {
                    tracing::info!(
                        profile_id = %user_profile.id,
                        "User profile overrides built-in"
                    );
                    profiles[pos] = user_profile;
                } else {
                    tracing::debug!(profile_id = %user_profile.id, "Loaded user profile");
                    profiles.push(user_profile);
                }
            }
        } else {
            tracing::debug!(
                dir = %dir.display(),
                "User profile directory does not exist, skipping"
            );
        }
    }

    if profiles.len() > constants::MAX_PROFILES {
        tracing::warn!(
            count = profiles.len(),
            max = constants::MAX_PROFILES,
            "Too many profiles loaded, truncating"
        );
        errors.push(ProfileError::TooManyProfiles {
            count: profiles.len(),
            max: constants::MAX_PROFILES,
        });
        profiles.truncate(constants::MAX_PROFILES);
    }

    for e in &errors {
        tracing::warn!(error = %e, "Profile not loaded");
    }
    tracing::debug!(total = profiles.len(), "Profile loading complete");

    (profiles, errors)
}

/// Load `*.toml` profiles from `dir`, in file name order.
fn load_user_profiles(dir: &Path) -> (Vec<FieldProfile>, Vec<ProfileError>) {
    let mut profiles: Vec<FieldProfile> = Vec::new();
    let mut errors = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(ProfileError::Io {
                path: dir.to_path_buf(),
                source: e,
            });
            return (profiles, errors);
        }
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => errors.push(ProfileError::Io {
                path: dir.to_path_buf(),
                source: e,
            }),
        }
    }
    paths.retain(|p| p.extension().and_then(|e| e.to_str()) == Some("toml"));
    paths.sort();

    for path in paths {
        match load_profile_file(&path) {
            Ok(p) => {
                if let Some(first) = seen.get(&p.id) {
                    errors.push(ProfileError::DuplicateId {
                        id: p.id.clone(),
                        path1: first.clone(),
                        path2: path.clone(),
                    });
                    continue;
                }
                seen.insert(p.id.clone(), path.clone());
                profiles.push(p);
            }
            Err(e) => errors.push(e),
        }
    }

    (profiles, errors)
}

fn load_profile_file(path: &Path) -> Result<FieldProfile, ProfileError> {
    let io_err = |e| ProfileError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > constants::MAX_PROFILE_FILE_SIZE {
        return Err(ProfileError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            max_size: constants::MAX_PROFILE_FILE_SIZE,
        });
    }

    let content = std::fs::read_to_string(path).map_err(io_err)?;
    let def = profile::parse_profile_toml(&content, path)?;
    profile::validate_and_compile(def, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CUSTOM: &str = r#"
[profile]
id = "app-kv"
name = "Application key/value"

[[patterns]]
regex = 'user=(?P<user>\S+) action=(?P<action>\S+)'
"#;

    #[test]
    fn test_builtins_without_user_dir() {
        let (profiles, errors) = load_all_profiles(None);
        assert!(errors.is_empty());
        let ids: Vec<&str> = profiles.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids[0], "haproxy-http");
        assert!(ids.contains(&"iis-w3c"));
    }

    #[test]
    fn test_user_profile_added_and_override() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.toml"), CUSTOM).unwrap();
        std::fs::write(
            dir.path().join("nginx.toml"),
            "[profile]\nid = \"nginx-error\"\nname = \"Mine\"\n\n[[patterns]]\nregex = '(?P<message>.*)'\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (profiles, errors) = load_all_profiles(Some(dir.path()));
        assert!(errors.is_empty(), "{errors:?}");

        let nginx = profiles.iter().find(|p| p.id == "nginx-error").unwrap();
        assert_eq!(nginx.name, "Mine");
        assert!(!nginx.is_builtin);
        assert!(profiles.iter().any(|p| p.id == "app-kv"));
    }

    #[test]
    fn test_invalid_and_duplicate_profiles_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.toml"), CUSTOM).unwrap();
        std::fs::write(dir.path().join("b.toml"), CUSTOM).unwrap();
        std::fs::write(
            dir.path().join("c.toml"),
            "[profile]\nid = \"bad\"\nname = \"Bad\"\n\n[[patterns]]\nregex = '(unclosed'\n",
        )
        .unwrap();

        let (profiles, errors) = load_all_profiles(Some(dir.path()));
        assert_eq!(profiles.iter().filter(|p| p.id == "app-kv").count(), 1);
        assert!(!profiles.iter().any(|p| p.id == "bad"));
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ProfileError::DuplicateId { id, .. } if id == "app-kv")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ProfileError::InvalidRegex { .. })));
    }
}
