//! Path normalization helpers shared by config loading and the CLI.

use std::path::{Path, PathBuf};

/// Expand a leading `~` to the user's home directory. Paths without a
/// leading `~` are returned unchanged.
pub fn expand_tilde(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) if stripped.as_os_str().is_empty() => home,
        Some(home) => home.join(stripped),
        None => path.to_path_buf(),
    }
}

/// Resolve a path to absolute, expanding `~` first and falling back to the
/// original (non-canonicalized) path when the target does not yet exist.
pub fn resolve_or_original(path: impl AsRef<Path>) -> PathBuf {
    let expanded = expand_tilde(path);
    expanded.canonicalize().unwrap_or(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_bare_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~"), home);
    }

    #[test]
    fn expands_tilde_with_subpath() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~/.casbak/the_source"), home.join(".casbak/the_source"));
    }

    #[test]
    fn leaves_absolute_path_unchanged() {
        assert_eq!(expand_tilde("/var/lib/casbak"), PathBuf::from("/var/lib/casbak"));
    }

    #[test]
    fn resolve_or_original_falls_back_for_missing_path() {
        let result = resolve_or_original("/definitely/does/not/exist/xyz");
        assert_eq!(result, PathBuf::from("/definitely/does/not/exist/xyz"));
    }
}
