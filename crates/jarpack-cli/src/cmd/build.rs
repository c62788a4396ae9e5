//! Build command

use anyhow::{Context, Result};
use std::path::Path;

use crate::BuildArgs;

/// Assemble the bundle and print its checksum and location.
pub async fn build(config: Option<&Path>, args: &BuildArgs) -> Result<()> {
    let mut project = super::project(config)?;
    project.apply(args);

    let tool = project.build_tool().context("Invalid build configuration")?;
    let output_dir = project.output_dir();
    let output = tool
        .build_to(project.base_name(), &output_dir)
        .await
        .with_context(|| format!("Failed to build {}", project.project_spec()))?;

    println!("{}  {}", output.sha256, output.path.display());
    Ok(())
}
