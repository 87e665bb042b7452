use std::path::{Path, PathBuf};

/// The environment variable prefix for application configuration.
/// Nested keys are separated by `__`, e.g. `MEMCAST__DATASTORE__BASE_DIR`.
pub const CONFIG_ENV_PREFIX: &str = "MEMCAST__";

/// Returns the home directory of the current user, if known.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|x| !x.is_empty())
        .map(PathBuf::from)
}

/// Expands a leading `~` in the path against the given home directory.
/// Paths without a leading `~` component are returned unchanged.
pub fn expand_home(path: impl AsRef<Path>, home: &Path) -> PathBuf {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home.to_path_buf(),
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Returns whether the path starts with a `~` component.
pub fn is_home_relative(path: impl AsRef<Path>) -> bool {
    path.as_ref().starts_with("~")
}
