use std::path::{Path, PathBuf};

pub const GROUPING_DIR: &str = ".grouping";
pub const CONFIG_FILE: &str = ".grouping/config.yaml";
pub const STORE_FILE: &str = ".grouping/store.redb";

pub fn grouping_dir(root: &Path) -> PathBuf {
    root.join(GROUPING_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_FILE)
}

/// Whether `root` holds an initialized event directory.
pub fn is_initialized(root: &Path) -> bool {
    config_path(root).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_grouping_dir() {
        let root = Path::new("/tmp/event");
        assert_eq!(config_path(root), root.join(".grouping").join("config.yaml"));
        assert_eq!(store_path(root), root.join(".grouping").join("store.redb"));
        assert!(store_path(root).starts_with(grouping_dir(root)));
    }

    #[test]
    fn initialized_once_config_exists() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!is_initialized(dir.path()));
        std::fs::create_dir_all(grouping_dir(dir.path())).unwrap();
        std::fs::write(config_path(dir.path()), "version: 1\n").unwrap();
        assert!(is_initialized(dir.path()));
    }
}
