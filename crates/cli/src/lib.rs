//! `starmap` command-line frontend over `starmap_core`.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod commands;

/// Turn a path argument into an absolute path.
///
/// Existing inputs are canonicalized. Outputs that do not exist yet keep
/// their spelling and are anchored at the working directory.
pub fn resolve_path_arg(arg: &str) -> Result<PathBuf> {
    let path = Path::new(arg);
    if let Ok(existing) = path.canonicalize() {
        return Ok(existing);
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("Failed to read the working directory")?;
    Ok(cwd.join(path))
}
