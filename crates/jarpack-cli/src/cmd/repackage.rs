//! Repackage command

use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::ResolutionArgs;

/// Filter `WEB-INF/lib/` of `file` (or the project artifact) in place.
pub async fn repackage(
    config: Option<&Path>,
    file: Option<&Path>,
    args: &ResolutionArgs,
) -> Result<()> {
    let mut project = super::project(config)?;
    project.apply_resolution(args);

    let target = match file {
        Some(file) => file.to_path_buf(),
        None => project
            .project_artifact()
            .context("No file given and [project] names no artifact")?,
    };
    if project.project.packaging != "war" && file.is_none() {
        bail!(
            "Only web archives can be repackaged, packaging is '{}'",
            project.project.packaging
        );
    }

    let tool = project.build_tool().context("Invalid build configuration")?;
    let report = tool
        .repackage_war(&target)
        .await
        .with_context(|| format!("Failed to repackage {}", target.display()))?;

    println!(
        "{}: kept {}, removed {}, added {}",
        target.display(),
        report.kept.len(),
        report.removed.len(),
        report.added.len()
    );
    for name in &report.removed {
        println!("  - {name}");
    }
    for name in &report.added {
        println!("  + {name}");
    }
    Ok(())
}
