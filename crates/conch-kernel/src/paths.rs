//! XDG base directory paths for conch.
//!
//! | Purpose | XDG Variable | Default |
//! |---------|--------------|---------|
//! | Data | `$XDG_DATA_HOME` | `~/.local/share` |
//!
//! Only persistent data lives on disk: the REPL's line history.
//!
//! ```
//! use conch_kernel::paths::{data_dir, history_file};
//!
//! assert!(history_file().starts_with(data_dir()));
//! ```

use std::path::PathBuf;

use directories::BaseDirs;

/// The user's home directory, or `/` when none can be determined.
pub fn home_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// `$XDG_DATA_HOME`, falling back to `~/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".local").join("share"))
}

/// conch's data directory: `$XDG_DATA_HOME/conch`.
pub fn data_dir() -> PathBuf {
    xdg_data_home().join("conch")
}

/// Where the REPL keeps its line history.
pub fn history_file() -> PathBuf {
    data_dir().join("history")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_dir_is_absolute() {
        assert!(home_dir().is_absolute());
    }

    #[test]
    fn data_paths_build_on_xdg_data_home() {
        assert_eq!(data_dir(), xdg_data_home().join("conch"));
        assert!(history_file().ends_with("conch/history"));
    }
}
