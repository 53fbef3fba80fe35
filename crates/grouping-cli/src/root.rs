use grouping_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the event root directory.
///
/// Priority:
/// 1. `--root` flag / `GROUPING_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.grouping/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_event_dir(&cwd).unwrap_or(cwd)
}

fn find_event_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| paths::grouping_dir(dir).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_root(Some(dir.path())), dir.path());
    }

    #[test]
    fn finds_grouping_dir_from_nested_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".grouping")).unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_event_dir(&nested).as_deref(), Some(dir.path()));
    }
}
