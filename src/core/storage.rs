//! Filesystem path resolution for the failover spool and dead-letter
//! directories, adapted from the teacher's `utils/file.rs::expand_path`.

use std::path::{Path, PathBuf};

/// Expand `~`, leave absolute paths untouched, and resolve bare/relative
/// paths against the current working directory. Creates the directory
/// (and any parents) if it does not already exist.
pub fn resolve_directory(path: &Path) -> std::io::Result<PathBuf> {
    let expanded = expand_path(path);
    std::fs::create_dir_all(&expanded)?;
    Ok(expanded)
}

fn expand_path(path: &Path) -> PathBuf {
    let as_str = path.to_string_lossy();
    if let Some(rest) = as_str.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_passes_through() {
        let resolved = expand_path(Path::new("failover"));
        assert_eq!(resolved, PathBuf::from("failover"));
    }

    #[test]
    fn absolute_path_passes_through() {
        let resolved = expand_path(Path::new("/var/spool/forge"));
        assert_eq!(resolved, PathBuf::from("/var/spool/forge"));
    }

    #[test]
    fn tilde_path_expands_against_home() {
        std::env::set_var("HOME", "/home/forge");
        let resolved = expand_path(Path::new("~/spool"));
        assert_eq!(resolved, PathBuf::from("/home/forge/spool"));
    }

    #[test]
    fn resolve_directory_creates_missing_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested").join("spool");
        let resolved = resolve_directory(&target).unwrap();
        assert!(resolved.is_dir());
    }
}
