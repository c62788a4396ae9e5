//! Bundle assembly.
//!
//! [`BuildTool`] turns a classified dependency graph into one runnable
//! archive. A build runs these stages in order, exactly once:
//!
//! | Stage | Result in the bundle |
//! |---|---|
//! | Analyze | dependencies resolved and classified |
//! | Bootstrap | loader (unless shaded) and bootstrap jar expanded at the root |
//! | Launch manifest | `META-INF/MANIFEST.MF` naming the platform entry point |
//! | Bundle manifest | [`BundleManifest::CLASSPATH_LOCATION`] |
//! | Extra modules | configured module trees under `modules/` |
//! | Project asset | application content under `_bootstrap/` (skipped when hollow) |
//! | Repository | dependency jars under `m2repo/` (skipped in thin mode) |
//! | Resources | resource directory overlaid at the root |
//!
//! [`BuildTool::build_to`] then writes the archive, optionally behind a
//! launch script. Nothing is written to the output directory until every
//! stage succeeded.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use jarpack_schema::{
    ArtifactSpec, BundleManifest, FractionDescriptor, REPOSITORY_ROOT, ResolvedArtifact,
};
use sha2::{Digest, Sha256};

use crate::archive::{Archive, jar_contains_prefix};
use crate::dependency_manager::DependencyManager;
use crate::error::{BuildError, Result};
use crate::fractions::{
    FractionCatalog, FractionDetectionMode, FractionDetector, PackageUsageDetector,
};
use crate::modules::MODULES_PREFIX;
use crate::platform::PlatformCoordinates;
use crate::project::ProjectHelper;
use crate::repackage::{FilterReport, filter_lib_dir, repackage_file, write_atomically};
use crate::resolver::DefaultArtifactResolver;

/// Directory inside the bundle holding the application content.
pub const BOOTSTRAP_DIR: &str = "_bootstrap";

/// Property holding the build time (`yyyy-MM-ddTHH:mmZ`, UTC).
pub const BUILD_TIMESTAMP_PROPERTY: &str = "jarpack.bundle.build.timestamp";

/// Property holding the user who ran the build.
pub const BUILD_USER_PROPERTY: &str = "jarpack.bundle.build.user";

/// Property naming the application content entry.
pub const APP_ARTIFACT_PROPERTY: &str = "jarpack.app.artifact";

const DEFAULT_LAUNCH_SCRIPT: &str = include_str!("launch.sh");

/// The application content placed in the bundle.
#[derive(Debug, Clone)]
pub enum ProjectAsset {
    /// The project's packaged artifact on disk.
    Artifact {
        /// Coordinate of the project; its type is the packaging.
        spec: ArtifactSpec,
        /// Packaged file.
        path: PathBuf,
        /// Entry name inside the bundle.
        name: String,
    },
    /// Content assembled in memory.
    Archive {
        /// Entry name inside the bundle.
        name: String,
        /// The content.
        archive: Archive,
    },
}

impl ProjectAsset {
    /// Packaged project artifact. `name` defaults to `<artifactId>.<type>`.
    pub fn artifact(spec: ArtifactSpec, path: impl Into<PathBuf>, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| format!("{}.{}", spec.artifact_id(), spec.type_()));
        Self::Artifact {
            spec,
            path: path.into(),
            name,
        }
    }

    /// In-memory project content.
    pub fn archive(name: impl Into<String>, archive: Archive) -> Self {
        Self::Archive {
            name: name.into(),
            archive,
        }
    }

    /// Entry name, without any directory part.
    pub fn name(&self) -> &str {
        let name = match self {
            Self::Artifact { name, .. } | Self::Archive { name, .. } => name.as_str(),
        };
        name.rsplit('/').next().unwrap_or(name)
    }

    /// Returns `true` for web archives, whose library directory is filtered.
    pub fn is_web_archive(&self) -> bool {
        match self {
            Self::Artifact { spec, .. } => spec.type_() == "war",
            Self::Archive { .. } => self.name().ends_with(".war"),
        }
    }

    fn load(&self) -> Result<Archive> {
        match self {
            Self::Artifact { path, .. } => Archive::import_zip(path),
            Self::Archive { archive, .. } => Ok(archive.clone()),
        }
    }
}

/// Where a bundle was written and its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    /// Output file.
    pub path: PathBuf,
    /// Hex SHA-256 of the whole file, launch script included.
    pub sha256: String,
}

/// Assembles one bundle. Consumed by [`build`](Self::build),
/// [`build_to`](Self::build_to) or [`repackage_war`](Self::repackage_war).
pub struct BuildTool {
    archive: Archive,
    dependency_manager: DependencyManager,
    resolver: DefaultArtifactResolver,
    project_asset: Option<ProjectAsset>,
    fractions: BTreeSet<FractionDescriptor>,
    catalog: FractionCatalog,
    detector: Option<Box<dyn FractionDetector>>,
    detection_mode: FractionDetectionMode,
    additional_modules: Vec<PathBuf>,
    resources_dir: Option<PathBuf>,
    main_class: Option<String>,
    properties: BTreeMap<String, String>,
    bundle_dependencies: bool,
    embed_application_dependencies: bool,
    hollow: bool,
    executable: bool,
    executable_script: Option<PathBuf>,
}

impl std::fmt::Debug for BuildTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildTool")
            .field("dependency_manager", &self.dependency_manager)
            .field("project_asset", &self.project_asset.as_ref().map(ProjectAsset::name))
            .field("fractions", &self.fractions)
            .field("detection_mode", &self.detection_mode)
            .field("additional_modules", &self.additional_modules)
            .field("hollow", &self.hollow)
            .field("bundle_dependencies", &self.bundle_dependencies)
            .field(
                "embed_application_dependencies",
                &self.embed_application_dependencies,
            )
            .field("executable", &self.executable)
            .finish_non_exhaustive()
    }
}

impl BuildTool {
    /// Create a build over `project`, resolving extra artifacts through
    /// `resolver`.
    pub fn new(
        resolver: DefaultArtifactResolver,
        project: Box<dyn ProjectHelper>,
        platform: PlatformCoordinates,
    ) -> Self {
        let catalog = FractionCatalog::new(platform.group_id.clone(), Vec::new());
        Self {
            archive: Archive::new(),
            dependency_manager: DependencyManager::new(project, platform),
            resolver,
            project_asset: None,
            fractions: BTreeSet::new(),
            catalog,
            detector: None,
            detection_mode: FractionDetectionMode::default(),
            additional_modules: Vec::new(),
            resources_dir: None,
            main_class: None,
            properties: BTreeMap::new(),
            bundle_dependencies: true,
            embed_application_dependencies: false,
            hollow: false,
            executable: false,
            executable_script: None,
        }
    }

    /// Application entry point recorded in the bundle manifest.
    pub fn main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = Some(main_class.into());
        self
    }

    /// Add manifest properties. Later values replace earlier ones.
    pub fn properties<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `false` selects thin mode: dependencies are checked but not embedded.
    pub fn bundle_dependencies(mut self, bundle: bool) -> Self {
        self.bundle_dependencies = bundle;
        self
    }

    /// Also embed application dependencies under `m2repo/`.
    ///
    /// Off by default: the repository then holds only platform and module
    /// dependencies. Ignored for hollow bundles and web archives, which get
    /// their application jars elsewhere.
    pub fn embed_application_dependencies(mut self, embed: bool) -> Self {
        self.embed_application_dependencies = embed;
        self
    }

    /// Application content placed under `_bootstrap/`.
    pub fn project_asset(mut self, asset: ProjectAsset) -> Self {
        self.project_asset = Some(asset);
        self
    }

    /// Require `fraction` in addition to the declared dependencies.
    pub fn fraction(mut self, fraction: FractionDescriptor) -> Self {
        self.fractions.insert(fraction);
        self
    }

    /// Require every fraction in `fractions`.
    pub fn fractions(mut self, fractions: impl IntoIterator<Item = FractionDescriptor>) -> Self {
        self.fractions.extend(fractions);
        self
    }

    /// Catalog consulted by fraction detection.
    pub fn fraction_catalog(mut self, catalog: FractionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the default [`PackageUsageDetector`].
    pub fn fraction_detector(mut self, detector: Box<dyn FractionDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// When to run fraction detection. Defaults to
    /// [`FractionDetectionMode::WhenMissing`].
    pub fn fraction_detection_mode(mut self, mode: FractionDetectionMode) -> Self {
        self.detection_mode = mode;
        self
    }

    /// Copy the module tree at `dir` under `modules/`.
    pub fn additional_module(mut self, dir: impl Into<PathBuf>) -> Self {
        self.additional_modules.push(dir.into());
        self
    }

    /// Copy every module tree in `dirs` under `modules/`.
    pub fn additional_modules(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.additional_modules.extend(dirs);
        self
    }

    /// Directory whose content is copied to the bundle root, if it exists.
    pub fn resources_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resources_dir = Some(dir.into());
        self
    }

    /// Prefix the written file with a launch script and mark it executable.
    pub fn executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    /// Launch script used instead of the built-in one.
    pub fn executable_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.executable_script = Some(script.into());
        self
    }

    /// A hollow bundle carries no application content.
    pub fn hollow(mut self, hollow: bool) -> Self {
        self.hollow = hollow;
        self
    }

    /// Output location for `base_name` in `dir`.
    pub fn output_file(base_name: &str, dir: &Path) -> PathBuf {
        dir.join(format!("{base_name}-bundle.jar"))
    }

    /// Run every stage and return the assembled archive.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Configuration`] before any resolution for invalid
    /// options, [`BuildError::Resolution`] for unresolvable coordinates and
    /// [`BuildError::MissingBootstrap`] when no bootstrap jar is available.
    pub async fn build(mut self) -> Result<Archive> {
        self.assemble().await?;
        Ok(self.archive)
    }

    /// Run every stage and write `<dir>/<base_name>-bundle.jar`.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build), plus [`BuildError::ArchiveIo`] if the
    /// file cannot be written. A previous output file is kept on failure.
    pub async fn build_to(mut self, base_name: &str, dir: &Path) -> Result<BundleOutput> {
        self.assemble().await?;

        let out = Self::output_file(base_name, dir);
        std::fs::create_dir_all(dir).map_err(|e| BuildError::archive_io(dir, e))?;

        let stub = if self.executable {
            Some(self.launch_script()?)
        } else {
            None
        };
        write_atomically(&self.archive, &out, stub.as_deref())?;
        if self.executable {
            mark_executable(&out);
        }

        let sha256 = sha256_file(&out)?;
        tracing::info!("Wrote {} ({} entries)", out.display(), self.archive.len());
        Ok(BundleOutput { path: out, sha256 })
    }

    /// Filter the web archive at `file` in place so that `WEB-INF/lib/` holds
    /// exactly the application's jars. The previous file is kept as
    /// `<file>.original` when possible.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution fails or the archive cannot be
    /// rewritten.
    pub async fn repackage_war(mut self, file: &Path) -> Result<FilterReport> {
        tracing::info!("Repackaging .war: {}", file.display());
        self.dependency_manager.analyze_dependencies().await?;
        repackage_file(file, self.dependency_manager.application_dependencies())
    }

    async fn assemble(&mut self) -> Result<()> {
        self.validate()?;

        tracing::info!("Analyzing dependencies");
        self.dependency_manager.analyze_dependencies().await?;

        self.add_bootstrap().await?;
        self.add_jar_manifest();
        self.add_bundle_manifest()?;
        self.add_additional_modules()?;
        self.add_project_asset()?;
        self.populate_repository().await?;
        self.add_resources()?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        match &self.project_asset {
            None if !self.hollow => {
                return Err(BuildError::Configuration(
                    "a project artifact is required unless the bundle is hollow".into(),
                ));
            }
            Some(ProjectAsset::Artifact { spec, path, .. }) => {
                if !matches!(spec.type_(), "jar" | "war") {
                    return Err(BuildError::Configuration(format!(
                        "unsupported packaging '{}' for {}",
                        spec.type_(),
                        spec
                    )));
                }
                if !self.hollow && !path.is_file() {
                    return Err(BuildError::Configuration(format!(
                        "project artifact {} does not exist",
                        path.display()
                    )));
                }
            }
            _ => {}
        }

        if let Some(script) = self.executable_script.as_ref().filter(|s| !s.is_file()) {
            return Err(BuildError::Configuration(format!(
                "launch script {} does not exist",
                script.display()
            )));
        }

        if let Some(dir) = self.additional_modules.iter().find(|d| !d.is_dir()) {
            return Err(BuildError::Configuration(format!(
                "module directory {} does not exist",
                dir.display()
            )));
        }

        if let Some(f) = self
            .fractions
            .iter()
            .find(|f| self.catalog.complete(f).version.is_none())
        {
            return Err(BuildError::Configuration(format!(
                "fraction {f} has no version and is not in the catalog"
            )));
        }

        Ok(())
    }

    async fn add_bootstrap(&mut self) -> Result<()> {
        let mode = self.detection_mode;
        let has_bootstrap = self.dependency_manager.find_bootstrap_jar().is_some();
        if mode == FractionDetectionMode::Force
            || (mode == FractionDetectionMode::WhenMissing && !has_bootstrap)
        {
            tracing::info!("Scanning for needed fractions with mode: {}", mode);
            self.detect_fractions()?;
        }

        if !self.fractions.is_empty() {
            self.add_fractions().await?;
        }

        let platform = self.dependency_manager.platform().clone();
        let Some(bootstrap) = self.dependency_manager.find_bootstrap_jar().cloned() else {
            if mode == FractionDetectionMode::Never {
                tracing::error!("No platform dependencies found and fraction detection disabled");
            }
            return Err(BuildError::MissingBootstrap {
                group_id: platform.group_id,
                artifact_id: platform.bootstrap_artifact_id,
            });
        };

        tracing::info!("Adding bootstrap {}", bootstrap.spec());
        if !jar_contains_prefix(bootstrap.path(), &platform.loader_probe)? {
            let loader = self.dependency_manager.find_loader_jar().cloned().ok_or(
                BuildError::MissingBootstrap {
                    group_id: platform.loader_group_id,
                    artifact_id: platform.loader_artifact_id,
                },
            )?;
            self.archive.expand_jar(loader.path())?;
        }
        self.archive.expand_jar(bootstrap.path())?;
        Ok(())
    }

    fn detect_fractions(&mut self) -> Result<()> {
        let asset = match &self.project_asset {
            Some(asset) if !self.hollow => asset,
            _ => {
                tracing::info!("No application content to scan");
                return Ok(());
            }
        };
        let content = asset.load()?;

        let default_detector;
        let detector: &dyn FractionDetector = match &self.detector {
            Some(detector) => detector.as_ref(),
            None => {
                default_detector = PackageUsageDetector::new(&self.catalog)?;
                &default_detector
            }
        };

        let detected: BTreeSet<_> = detector
            .detect(&content)?
            .into_iter()
            .filter(|f| !self.fractions.contains(f))
            .collect();

        let mut names: Vec<String> = detected.iter().map(FractionDescriptor::av).collect();
        names.sort();
        tracing::info!(
            "Detected {}fractions: {}",
            if self.fractions.is_empty() { "" } else { "additional " },
            names.join(", ")
        );

        self.fractions.extend(detected);
        Ok(())
    }

    async fn add_fractions(&mut self) -> Result<()> {
        let mut all: BTreeSet<FractionDescriptor> =
            self.fractions.iter().map(|f| self.catalog.complete(f)).collect();
        for fraction in &self.fractions {
            for dep in self.catalog.dependencies_of(fraction)? {
                let present = self
                    .dependency_manager
                    .find_artifact(&dep.group_id, &dep.artifact_id, None, None, None, true)
                    .is_some();
                if !present {
                    all.insert(dep);
                }
            }
        }

        let platform_group = &self.dependency_manager.platform().group_id;
        let specs = all
            .iter()
            .map(|f| {
                f.to_spec().ok_or_else(|| {
                    BuildError::Configuration(format!("no version known for fraction {f}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut names: Vec<String> = specs
            .iter()
            .map(|s| {
                if s.group_id() == platform_group {
                    format!("{}:{}", s.artifact_id(), s.version())
                } else {
                    s.msc_gav()
                }
            })
            .collect();
        names.sort();
        tracing::info!("Adding fractions: {}", names.join(", "));

        for spec in specs {
            self.dependency_manager.add_dependency(spec);
        }
        self.dependency_manager.analyze_dependencies().await
    }

    fn add_jar_manifest(&mut self) {
        let manifest = format!(
            "Manifest-Version: 1.0\r\nCreated-By: {}\r\nMain-Class: {}\r\n\r\n",
            crate::CREATED_BY,
            self.dependency_manager.platform().entry_point
        );
        self.archive.add_bytes("META-INF/MANIFEST.MF", manifest);
    }

    fn add_bundle_manifest(&mut self) -> Result<()> {
        let mut properties = self.properties.clone();
        properties.insert(BUILD_TIMESTAMP_PROPERTY.to_string(), build_timestamp());
        properties.insert(BUILD_USER_PROPERTY.to_string(), build_user());
        let asset_name = match &self.project_asset {
            Some(asset) if !self.hollow => Some(asset.name().to_string()),
            _ => None,
        };
        if let Some(name) = &asset_name {
            properties.insert(APP_ARTIFACT_PROPERTY.to_string(), name.clone());
        }

        let manifest: &mut BundleManifest = self.dependency_manager.manifest_mut();
        manifest.properties.extend(properties);
        manifest.main_class.clone_from(&self.main_class);
        manifest.hollow = self.hollow;
        manifest.bundle_dependencies = self.bundle_dependencies;
        manifest.asset = asset_name;

        let text = manifest.to_toml().map_err(|e| {
            BuildError::Configuration(format!("cannot serialize bundle manifest: {e}"))
        })?;
        self.archive.add_bytes(BundleManifest::CLASSPATH_LOCATION, text);
        Ok(())
    }

    fn add_additional_modules(&mut self) -> Result<()> {
        for dir in &self.additional_modules {
            let count = self
                .archive
                .import_directory(dir, MODULES_PREFIX.trim_end_matches('/'))?;
            tracing::info!("Added {} module files from {}", count, dir.display());
            self.dependency_manager.add_additional_module(dir);
        }
        Ok(())
    }

    fn add_project_asset(&mut self) -> Result<()> {
        if self.hollow {
            return Ok(());
        }
        let Some(asset) = &self.project_asset else {
            return Ok(());
        };
        let entry = format!("{BOOTSTRAP_DIR}/{}", asset.name());

        if asset.is_web_archive() {
            let mut content = asset.load()?;
            filter_lib_dir(&mut content, self.dependency_manager.application_dependencies());
            self.archive.add_bytes(&entry, content.to_bytes()?);
        } else {
            match asset {
                ProjectAsset::Artifact { path, .. } => self.archive.add_file(&entry, path.clone()),
                ProjectAsset::Archive { archive, .. } => {
                    self.archive.add_bytes(&entry, archive.to_bytes()?);
                }
            }
        }
        tracing::info!("Added project content as {}", entry);
        Ok(())
    }

    fn embeds_application_dependencies(&self) -> bool {
        self.embed_application_dependencies
            && !self.hollow
            && self
                .project_asset
                .as_ref()
                .is_some_and(|a| !a.is_web_archive())
    }

    async fn populate_repository(&mut self) -> Result<()> {
        let dm = &self.dependency_manager;

        let mut candidates: Vec<&ResolvedArtifact> =
            dm.non_application_dependencies().iter().collect();
        if self.embeds_application_dependencies() {
            candidates.extend(dm.application_dependencies());
        }

        let mut ready: BTreeSet<ResolvedArtifact> = BTreeSet::new();
        let mut pending: Vec<ArtifactSpec> = Vec::new();
        for artifact in candidates {
            if !dm.is_exploded_bootstrap(artifact.spec()) {
                ready.insert(artifact.clone());
            }
        }
        for spec in dm.module_dependencies() {
            if dm.is_exploded_bootstrap(spec) || ready.contains(spec) {
                continue;
            }
            match dm.all_dependencies().get(spec) {
                Some(artifact) => {
                    ready.insert(artifact.clone());
                }
                None => pending.push(spec.clone()),
            }
        }

        tracing::info!(
            "Resolving {} out of {} artifacts",
            pending.len(),
            ready.len() + pending.len()
        );
        let resolved = if pending.is_empty() {
            BTreeSet::new()
        } else {
            self.resolver.resolve_all_non_transitively(pending).await?
        };

        if !self.bundle_dependencies {
            tracing::info!(
                "Thin bundle: {} artifacts left to the launch-time repository",
                ready.len() + resolved.len()
            );
            return Ok(());
        }

        for artifact in ready.iter().chain(&resolved) {
            let entry = format!("{REPOSITORY_ROOT}/{}", artifact.spec().repo_path(true));
            self.archive.add_file(&entry, artifact.path());
        }
        Ok(())
    }

    fn add_resources(&mut self) -> Result<()> {
        let Some(dir) = &self.resources_dir else {
            return Ok(());
        };
        if !dir.is_dir() {
            return Ok(());
        }
        let count = self.archive.import_directory(dir, "")?;
        tracing::info!("Added {} resources from {}", count, dir.display());
        Ok(())
    }

    fn launch_script(&self) -> Result<Vec<u8>> {
        match &self.executable_script {
            Some(path) => std::fs::read(path).map_err(|e| BuildError::archive_io(path, e)),
            None => Ok(DEFAULT_LAUNCH_SCRIPT.as_bytes().to_vec()),
        }
    }
}

/// Build time as `yyyy-MM-ddTHH:mmZ` in UTC, honouring `SOURCE_DATE_EPOCH`.
fn build_timestamp() -> String {
    let now = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(chrono::Utc::now);
    now.format("%Y-%m-%dT%H:%MZ").to_string()
}

fn build_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| BuildError::archive_io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| BuildError::archive_io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(unix)]
fn mark_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)) {
        tracing::error!("Failed to set executable flag on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) {}
