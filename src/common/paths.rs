use directories::BaseDirs;
use std::path::{Path, PathBuf};

const REGISTRY_FILE_NAME: &str = ".faces.bin";

/// Default registry location: a dotfile in the user's home directory,
/// falling back to the working directory when no home can be resolved.
pub fn default_registry_path() -> PathBuf {
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(REGISTRY_FILE_NAME),
        None => PathBuf::from(REGISTRY_FILE_NAME),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
