//! Build setups the CLI knows how to create.

use std::path::{Path, PathBuf};

use jarpack_core::{BuildToolCreator, Result, select_creator};

use crate::config::{PROJECT_FILE, ProjectFile};

/// Loads `jarpack.toml` from a directory.
#[derive(Debug, Clone)]
pub struct ProjectFileCreator {
    dir: PathBuf,
}

impl ProjectFileCreator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(PROJECT_FILE)
    }
}

impl BuildToolCreator for ProjectFileCreator {
    type Output = ProjectFile;

    fn name(&self) -> &str {
        PROJECT_FILE
    }

    fn can_execute(&self) -> bool {
        self.path().is_file()
    }

    fn create(&self) -> Result<ProjectFile> {
        ProjectFile::load(&self.path())
    }
}

/// Load the project: `config` if given, otherwise whichever registered
/// creator applies to `dir`.
pub fn load_project(config: Option<&Path>, dir: &Path) -> Result<ProjectFile> {
    if let Some(path) = config {
        return ProjectFile::load(path);
    }
    let creators: Vec<Box<dyn BuildToolCreator<Output = ProjectFile>>> =
        vec![Box::new(ProjectFileCreator::new(dir))];
    select_creator(&creators)?.create()
}
