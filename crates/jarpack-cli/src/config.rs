//! The `jarpack.toml` project file.
//!
//! ```toml
//! repositories = ["~/.m2/repository"]
//!
//! [project]
//! group_id = "com.acme"
//! artifact_id = "shop"
//! version = "1.0"
//! packaging = "war"
//! artifact = "target/shop-1.0.war"
//!
//! [[dependencies]]
//! group_id = "org.wildfly.swarm"
//! artifact_id = "jaxrs"
//! version = "2017.10.0"
//!
//! [bundle]
//! detect = "when_missing"
//! properties = { "swarm.http.port" = "8081" }
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jarpack_core::{
    BuildError, BuildTool, CatalogEntry, DeclaredProject, DefaultArtifactResolver,
    FractionCatalog, FractionDetectionMode, LocalRepository, PlatformCoordinates, ProjectAsset,
    ResolutionCache, Result,
};
use jarpack_schema::{ArtifactSpec, FractionDescriptor};
use serde::Deserialize;

use crate::{BuildArgs, ResolutionArgs};

/// Name of the project file looked up in the working directory.
pub const PROJECT_FILE: &str = "jarpack.toml";

/// Environment variable listing repository roots, `PATH`-style.
pub const REPOSITORY_ENV: &str = "JARPACK_REPOSITORY";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    #[serde(default)]
    pub repositories: Vec<PathBuf>,
    pub project: ProjectSection,
    #[serde(default)]
    pub dependencies: Vec<ArtifactSpec>,
    #[serde(default)]
    pub bundle: BundleSection,
    #[serde(default)]
    pub platform: PlatformCoordinates,
    #[serde(default)]
    pub fraction_catalog: Vec<CatalogEntry>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default = "default_packaging")]
    pub packaging: String,
    /// Packaged project file.
    pub artifact: Option<PathBuf>,
    /// Entry name inside the bundle.
    pub name: Option<String>,
}

fn default_packaging() -> String {
    "jar".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleSection {
    pub main_class: Option<String>,
    pub hollow: bool,
    pub bundle_dependencies: bool,
    /// Embed application dependencies under `m2repo/` as well.
    pub embed_application_dependencies: bool,
    pub executable: bool,
    pub executable_script: Option<PathBuf>,
    pub resources_dir: Option<PathBuf>,
    /// Extra module directories. `None` means `modules/` if it exists.
    pub modules: Option<Vec<PathBuf>>,
    pub fractions: Vec<String>,
    pub detect: FractionDetectionMode,
    pub properties: BTreeMap<String, String>,
    pub properties_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub base_name: Option<String>,
    pub workers: Option<usize>,
}

impl Default for BundleSection {
    fn default() -> Self {
        Self {
            main_class: None,
            hollow: false,
            bundle_dependencies: true,
            embed_application_dependencies: false,
            executable: false,
            executable_script: None,
            resources_dir: None,
            modules: None,
            fractions: Vec::new(),
            detect: FractionDetectionMode::default(),
            properties: BTreeMap::new(),
            properties_file: None,
            output_dir: None,
            base_name: None,
            workers: None,
        }
    }
}

impl ProjectFile {
    /// Read and validate a project file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildError::archive_io(path, e))?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base_dir)
            .map_err(|e| BuildError::Configuration(format!("{}: {e}", path.display())))
    }

    /// Parse project file text; relative paths resolve against `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self, String> {
        let mut file: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        file.base_dir = base_dir.to_path_buf();
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), String> {
        if !matches!(self.project.packaging.as_str(), "jar" | "war") {
            return Err(format!(
                "unsupported packaging '{}', expected jar or war",
                self.project.packaging
            ));
        }
        if self.bundle.workers == Some(0) {
            return Err("workers must be at least 1".into());
        }
        self.fractions()?;
        Ok(())
    }

    /// Apply command-line overrides for a build.
    pub fn apply(&mut self, args: &BuildArgs) {
        let bundle = &mut self.bundle;
        bundle.hollow |= args.hollow;
        bundle.executable |= args.executable;
        if args.thin {
            bundle.bundle_dependencies = false;
        }
        if args.main_class.is_some() {
            bundle.main_class.clone_from(&args.main_class);
        }
        if !args.modules.is_empty() {
            bundle
                .modules
                .get_or_insert_with(Vec::new)
                .extend(args.modules.iter().cloned());
        }
        bundle.fractions.extend(args.fractions.iter().cloned());
        if let Some(mode) = args.detect {
            bundle.detect = mode;
        }
        if args.output_dir.is_some() {
            bundle.output_dir.clone_from(&args.output_dir);
        }
        self.apply_resolution(&args.resolution);
    }

    /// Apply command-line repository and worker overrides.
    pub fn apply_resolution(&mut self, args: &ResolutionArgs) {
        if !args.repositories.is_empty() {
            self.repositories.clone_from(&args.repositories);
        }
        if args.workers.is_some() {
            self.bundle.workers = args.workers;
        }
    }

    /// Resolve `path` against the project directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Repository roots: the file's list, then `$JARPACK_REPOSITORY`, then
    /// `~/.m2/repository`.
    pub fn repository_roots(&self) -> Vec<PathBuf> {
        if !self.repositories.is_empty() {
            return self
                .repositories
                .iter()
                .map(|p| self.resolve_path(&expand_home(p)))
                .collect();
        }
        if let Some(value) = std::env::var_os(REPOSITORY_ENV).filter(|v| !v.is_empty()) {
            return std::env::split_paths(&value).collect();
        }
        dirs::home_dir()
            .map(|home| vec![home.join(".m2").join("repository")])
            .unwrap_or_default()
    }

    /// Coordinate of the project itself; the type is its packaging.
    pub fn project_spec(&self) -> ArtifactSpec {
        ArtifactSpec::new(
            &self.project.group_id,
            &self.project.artifact_id,
            &self.project.version,
        )
        .with_type(&self.project.packaging)
    }

    /// Packaged project file, if configured.
    pub fn project_artifact(&self) -> Option<PathBuf> {
        self.project.artifact.as_deref().map(|p| self.resolve_path(p))
    }

    /// Configured fractions, parsed.
    pub fn fractions(&self) -> Result<Vec<FractionDescriptor>, String> {
        self.bundle
            .fractions
            .iter()
            .map(|f| FractionDescriptor::parse(f, &self.platform.group_id).map_err(|e| e.to_string()))
            .collect()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(
            self.bundle
                .output_dir
                .as_deref()
                .unwrap_or_else(|| Path::new("target")),
        )
    }

    pub fn base_name(&self) -> &str {
        self.bundle
            .base_name
            .as_deref()
            .unwrap_or(&self.project.artifact_id)
    }

    fn module_dirs(&self) -> Vec<PathBuf> {
        match &self.bundle.modules {
            Some(dirs) => dirs.iter().map(|d| self.resolve_path(d)).collect(),
            None => {
                let default = self.base_dir.join("modules");
                if default.is_dir() { vec![default] } else { Vec::new() }
            }
        }
    }

    /// Properties from `properties_file`, overlaid by the `properties` table.
    pub fn properties(&self) -> Result<BTreeMap<String, String>> {
        let mut merged = match &self.bundle.properties_file {
            Some(file) => {
                let path = self.resolve_path(file);
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| BuildError::archive_io(&path, e))?;
                crate::properties::parse(&text)
            }
            None => BTreeMap::new(),
        };
        merged.extend(self.bundle.properties.clone());
        Ok(merged)
    }

    /// Wire a [`BuildTool`] over the configured repositories.
    pub fn build_tool(&self) -> Result<BuildTool> {
        let roots = self.repository_roots();
        tracing::debug!("Repository roots: {:?}", roots);

        let repository = Arc::new(LocalRepository::new(roots));
        let mut resolver = DefaultArtifactResolver::new(repository, Arc::new(ResolutionCache::new()));
        if let Some(workers) = self.bundle.workers {
            resolver = resolver.with_workers(workers);
        }
        let project = DeclaredProject::new(
            Arc::new(resolver.clone()),
            self.platform.group_id.clone(),
            self.dependencies.iter().cloned(),
        );

        let fractions = self.fractions().map_err(BuildError::Configuration)?;
        let catalog = FractionCatalog::new(
            self.platform.group_id.clone(),
            self.fraction_catalog.iter().cloned(),
        );
        let bundle = &self.bundle;

        let mut tool = BuildTool::new(resolver, Box::new(project), self.platform.clone())
            .properties(self.properties()?)
            .bundle_dependencies(bundle.bundle_dependencies)
            .embed_application_dependencies(bundle.embed_application_dependencies)
            .hollow(bundle.hollow)
            .executable(bundle.executable)
            .fractions(fractions)
            .fraction_catalog(catalog)
            .fraction_detection_mode(bundle.detect)
            .additional_modules(self.module_dirs());

        if let Some(main_class) = &bundle.main_class {
            tool = tool.main_class(main_class);
        }
        if let Some(script) = &bundle.executable_script {
            tool = tool.executable_script(self.resolve_path(script));
        }
        if let Some(dir) = &bundle.resources_dir {
            tool = tool.resources_dir(self.resolve_path(dir));
        }
        if let Some(artifact) = self.project_artifact() {
            tool = tool.project_asset(ProjectAsset::artifact(
                self.project_spec(),
                artifact,
                self.project.name.clone(),
            ));
        }
        Ok(tool)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
