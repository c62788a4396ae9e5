//! Dependency classification for one build.
//!
//! The [`DependencyManager`] drives the project's resolution, decides which
//! artifacts belong on the platform boot path, collects module dependencies,
//! and owns the [`BundleManifest`] until the assembler serializes it.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use jarpack_schema::{ArtifactSpec, BundleManifest, FractionManifest, ResolvedArtifact, Scope};
use zip::ZipArchive;

use crate::error::{BuildError, Result};
use crate::modules::{find_module_descriptors, scan_module_directory};
use crate::platform::PlatformCoordinates;
use crate::project::ProjectHelper;

/// Entry that marks a jar built against the platform's configuration API.
pub const CONFIG_MODULES_MARKER: &str = "wildfly-swarm-modules.conf";

/// What a jar reveals about its role on the platform.
#[derive(Debug, Default)]
struct PlatformJar {
    fraction: Option<FractionManifest>,
    config_modules: bool,
}

fn inspect_jar(jar: &Path) -> Result<PlatformJar> {
    let file = File::open(jar).map_err(|e| BuildError::archive_io(jar, e))?;
    let mut zip = ZipArchive::new(file)?;
    let config_modules = zip.file_names().any(|n| n == CONFIG_MODULES_MARKER);

    let fraction = match zip.by_name(FractionManifest::CLASSPATH_LOCATION) {
        Ok(mut entry) => {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| BuildError::archive_io(jar, e))?;
            let manifest = FractionManifest::from_toml(&text).map_err(|e| {
                BuildError::descriptor(
                    format!("{}!/{}", jar.display(), FractionManifest::CLASSPATH_LOCATION),
                    e,
                )
            })?;
            Some(manifest)
        }
        Err(zip::result::ZipError::FileNotFound) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(PlatformJar {
        fraction,
        config_modules,
    })
}

/// Resolves, classifies and records the dependencies of one build.
pub struct DependencyManager {
    project: Box<dyn ProjectHelper>,
    platform: PlatformCoordinates,
    manifest: BundleManifest,
    module_dependencies: BTreeSet<ArtifactSpec>,
}

impl std::fmt::Debug for DependencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyManager")
            .field("platform", &self.platform)
            .field("manifest", &self.manifest)
            .field("module_dependencies", &self.module_dependencies)
            .finish_non_exhaustive()
    }
}

impl DependencyManager {
    /// Create a manager over `project`.
    pub fn new(project: Box<dyn ProjectHelper>, platform: PlatformCoordinates) -> Self {
        Self {
            project,
            platform,
            manifest: BundleManifest::new(),
            module_dependencies: BTreeSet::new(),
        }
    }

    /// Resolve the project, classify platform jars, record the application
    /// dependencies in the manifest and collect module dependencies.
    ///
    /// Safe to call again after [`add_dependency`](Self::add_dependency).
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Resolution`] if the project cannot be resolved.
    pub async fn analyze_dependencies(&mut self) -> Result<()> {
        self.project.resolve_dependencies().await?;

        self.analyze_fraction_manifests();

        self.manifest.dependencies = self
            .project
            .application_dependencies()
            .iter()
            .map(|a| a.spec().maven_gav())
            .collect();

        self.analyze_module_dependencies();
        Ok(())
    }

    /// Record fraction jars as bootstrap artifacts and the modules they name
    /// as bootstrap modules. Unreadable jars are logged and skipped.
    pub fn analyze_fraction_manifests(&mut self) {
        for artifact in self.project.all_dependencies() {
            if artifact.spec().type_() != "jar" {
                continue;
            }
            let jar = match inspect_jar(artifact.path()) {
                Ok(jar) => jar,
                Err(e) => {
                    tracing::warn!("Skipping platform analysis of {}: {}", artifact.spec(), e);
                    continue;
                }
            };

            if let Some(fraction) = &jar.fraction {
                if let Some(module) = &fraction.module {
                    self.manifest.add_bootstrap_module(module.clone());
                }
                self.manifest.add_bootstrap_artifact(artifact.spec().maven_gav());
            }
            if jar.config_modules {
                self.manifest.add_bootstrap_artifact(artifact.spec().maven_gav());
            }
        }
    }

    /// Union the artifacts declared by module descriptors packaged in any
    /// resolved jar into the module dependencies.
    pub fn analyze_module_dependencies(&mut self) {
        let jars: Vec<&ResolvedArtifact> = self
            .project
            .all_dependencies()
            .iter()
            .filter(|a| a.spec().type_() == "jar")
            .collect();

        for artifact in jars {
            match find_module_descriptors(artifact.path()) {
                Ok(analyzers) => {
                    for analyzer in analyzers {
                        self.module_dependencies
                            .extend(analyzer.dependencies().iter().cloned());
                    }
                }
                Err(e) => tracing::warn!("Skipping module analysis of {}: {}", artifact.spec(), e),
            }
        }
    }

    /// Scan an extra module directory and union its module dependencies.
    pub fn add_additional_module(&mut self, dir: &Path) {
        for analyzer in scan_module_directory(dir) {
            tracing::debug!(
                "Module {} declares {} artifacts",
                analyzer.name().unwrap_or("<unnamed>"),
                analyzer.dependencies().len()
            );
            self.module_dependencies
                .extend(analyzer.dependencies().iter().cloned());
        }
    }

    /// First resolved dependency matching every given field.
    pub fn find_artifact(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: Option<&str>,
        type_: Option<&str>,
        classifier: Option<&str>,
        include_test_scope: bool,
    ) -> Option<&ResolvedArtifact> {
        self.project.all_dependencies().iter().find(|a| {
            let spec = a.spec();
            spec.group_id() == group_id
                && spec.artifact_id() == artifact_id
                && version.is_none_or(|v| spec.version() == v)
                && type_.is_none_or(|t| spec.type_() == t)
                && classifier.is_none_or(|c| spec.classifier() == Some(c))
                && (include_test_scope || spec.scope() != Scope::Test)
        })
    }

    /// The platform bootstrap jar, if resolved.
    pub fn find_bootstrap_jar(&self) -> Option<&ResolvedArtifact> {
        self.find_artifact(
            &self.platform.group_id,
            &self.platform.bootstrap_artifact_id,
            None,
            Some("jar"),
            None,
            false,
        )
    }

    /// The module loader jar, if resolved.
    pub fn find_loader_jar(&self) -> Option<&ResolvedArtifact> {
        self.find_artifact(
            &self.platform.loader_group_id,
            &self.platform.loader_artifact_id,
            None,
            Some("jar"),
            None,
            false,
        )
    }

    /// Declare another dependency; it is resolved on the next analysis.
    pub fn add_dependency(&mut self, spec: ArtifactSpec) {
        self.project.add_dependency(spec);
    }

    /// Returns `true` for the artifacts expanded into the bundle root.
    pub fn is_exploded_bootstrap(&self, spec: &ArtifactSpec) -> bool {
        self.platform.is_exploded_bootstrap(spec)
    }

    /// Every resolved dependency.
    pub fn all_dependencies(&self) -> &BTreeSet<ResolvedArtifact> {
        self.project.all_dependencies()
    }

    /// Dependencies supplied by the platform.
    pub fn non_application_dependencies(&self) -> &BTreeSet<ResolvedArtifact> {
        self.project.all_non_application_dependencies()
    }

    /// Dependencies only the application supplies.
    pub fn application_dependencies(&self) -> &BTreeSet<ResolvedArtifact> {
        self.project.application_dependencies()
    }

    /// Artifacts required by module descriptors.
    pub fn module_dependencies(&self) -> &BTreeSet<ArtifactSpec> {
        &self.module_dependencies
    }

    /// Coordinates of the platform artifacts.
    pub fn platform(&self) -> &PlatformCoordinates {
        &self.platform
    }

    /// The manifest being built.
    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Mutable access to the manifest being built.
    pub fn manifest_mut(&mut self) -> &mut BundleManifest {
        &mut self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::DeclaredProject;
    use crate::test_support::{FakeResolver, write_jar};
    use std::sync::Arc;

    fn platform() -> PlatformCoordinates {
        PlatformCoordinates {
            group_id: "org.platform".into(),
            ..PlatformCoordinates::default()
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        manager: DependencyManager,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeResolver::new());

        let widgets = ArtifactSpec::new("com.acme", "widgets", "1.2");
        let widgets_jar = dir.path().join("widgets-1.2.jar");
        write_jar(&widgets_jar, &[("com/acme/Widget.class", b"x".as_slice())]);
        fake.add(&widgets, &widgets_jar, &[]);

        let core = ArtifactSpec::new("org.platform", "core", "9.0");
        let core_jar = dir.path().join("core-9.0.jar");
        write_jar(
            &core_jar,
            &[
                (
                    FractionManifest::CLASSPATH_LOCATION,
                    b"module = \"org.platform.core\"\n".as_slice(),
                ),
                (
                    "modules/org/platform/core/main/module.xml",
                    br#"<module name="org.platform.core"><resources><artifact name="${org.platform:extra:9.0}"/></resources></module>"#.as_slice(),
                ),
            ],
        );
        fake.add(&core, &core_jar, &[]);

        let config = ArtifactSpec::new("org.platform", "config-api", "9.0");
        let config_jar = dir.path().join("config-api-9.0.jar");
        write_jar(&config_jar, &[(CONFIG_MODULES_MARKER, b"".as_slice())]);
        fake.add(&config, &config_jar, &[]);

        let broken = ArtifactSpec::new("org.platform", "broken", "9.0");
        let broken_jar = dir.path().join("broken-9.0.jar");
        write_jar(
            &broken_jar,
            &[(FractionManifest::CLASSPATH_LOCATION, b"module = [".as_slice())],
        );
        fake.add(&broken, &broken_jar, &[]);

        let garbage = ArtifactSpec::new("org.platform", "garbage", "9.0");
        let garbage_jar = dir.path().join("garbage-9.0.jar");
        std::fs::write(&garbage_jar, b"not a zip").unwrap();
        fake.add(&garbage, &garbage_jar, &[]);

        let project = DeclaredProject::new(
            fake,
            "org.platform",
            [widgets, core, config, broken, garbage],
        );
        Fixture {
            _dir: dir,
            manager: DependencyManager::new(Box::new(project), platform()),
        }
    }

    #[tokio::test]
    async fn test_classification_records_bootstrap_entries() {
        let mut fx = fixture();
        fx.manager.analyze_dependencies().await.unwrap();
        let manifest = fx.manager.manifest();

        assert_eq!(
            manifest.bootstrap_artifacts.iter().collect::<Vec<_>>(),
            vec!["org.platform:config-api:9.0", "org.platform:core:9.0"]
        );
        assert_eq!(
            manifest.bootstrap_modules.iter().collect::<Vec<_>>(),
            vec!["org.platform.core"]
        );
        assert_eq!(
            manifest.dependencies.iter().collect::<Vec<_>>(),
            vec!["com.acme:widgets:1.2"]
        );
    }

    #[tokio::test]
    async fn test_module_dependencies_from_jars_and_directories() {
        let mut fx = fixture();
        fx.manager.analyze_dependencies().await.unwrap();

        let extra = ArtifactSpec::new("org.platform", "extra", "9.0");
        assert!(fx.manager.module_dependencies().contains(&extra));

        let modules = tempfile::tempdir().unwrap();
        let main = modules.path().join("org/acme/logging/main");
        std::fs::create_dir_all(&main).unwrap();
        std::fs::write(
            main.join("module.xml"),
            r#"<module name="org.acme.logging"><resources><artifact name="${org.acme:logging:2.0}"/></resources></module>"#,
        )
        .unwrap();
        fx.manager.add_additional_module(modules.path());

        assert!(
            fx.manager
                .module_dependencies()
                .contains(&ArtifactSpec::new("org.acme", "logging", "2.0"))
        );
        assert!(fx.manager.module_dependencies().contains(&extra));
    }

    #[tokio::test]
    async fn test_find_artifact_filters() {
        let mut fx = fixture();
        fx.manager.analyze_dependencies().await.unwrap();

        assert!(
            fx.manager
                .find_artifact("org.platform", "core", None, None, None, false)
                .is_some()
        );
        assert!(
            fx.manager
                .find_artifact("org.platform", "core", Some("8.0"), None, None, false)
                .is_none()
        );
        assert!(
            fx.manager
                .find_artifact("org.platform", "core", None, Some("war"), None, false)
                .is_none()
        );
        assert!(fx.manager.find_bootstrap_jar().is_none());
    }
}
