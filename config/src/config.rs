use std::path::PathBuf;

/// Expands `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.into_owned())
}

/// Default data directory: `~/.picochain`.
pub fn default_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".picochain")
}
