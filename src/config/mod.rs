// Configuration management module
// Settings come from an optional TOML file, then the environment (including
// a `.env` file), then command line flags.

pub mod settings;

pub use settings::{Config, ConfigArgs, ConfigError, DEFAULT_MAX_CHARS, DatabaseConfig, QueryConfig};

use std::path::{Path, PathBuf};

/// Load variables from a `.env` file in the working directory or its
/// parents. Variables already set in the environment are left alone.
///
/// Returns the file that was loaded, if any.
#[inline]
pub fn load_dotenv() -> Option<PathBuf> {
    let dir = std::env::current_dir().ok()?;
    load_dotenv_from(&dir)
}

/// Load the first `.env` found in `dir` or its ancestors
#[inline]
pub fn load_dotenv_from(dir: &Path) -> Option<PathBuf> {
    let path = dir
        .ancestors()
        .map(|ancestor| ancestor.join(".env"))
        .find(|candidate| candidate.is_file())?;
    dotenvy::from_path(&path).ok()?;
    Some(path)
}
