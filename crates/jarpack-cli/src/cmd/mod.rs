//! Command implementations.

pub mod build;
pub mod repackage;

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::ProjectFile;
use crate::creator::load_project;

/// Load the project file named by `--config`, or the one in the working
/// directory.
fn project(config: Option<&Path>) -> Result<ProjectFile> {
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    load_project(config, &cwd).context("Failed to load project file")
}
