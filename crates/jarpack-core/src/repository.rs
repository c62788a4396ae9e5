//! Resolver backed by local repositories in the standard layout.
//!
//! Files are located at `<root>/<repo_path>`; transitive dependencies come
//! from the `<artifactId>-<version>.pom` stored next to each artifact.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jarpack_schema::{ArtifactSpec, ResolvedArtifact, Scope};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{BuildError, Result};
use crate::resolver::ArtifactResolver;

/// Ordered list of repository roots searched on every lookup.
#[derive(Debug, Clone, Default)]
pub struct LocalRepository {
    roots: Vec<PathBuf>,
}

impl LocalRepository {
    /// Create a repository over `roots`, searched in order.
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// The configured roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// First existing file for `spec`.
    pub fn locate(&self, spec: &ArtifactSpec) -> Option<PathBuf> {
        let rel = spec.repo_path(true);
        self.roots
            .iter()
            .map(|root| root.join(&rel))
            .find(|path| path.is_file())
    }

    /// Direct dependencies of `spec` that are followed transitively.
    ///
    /// Reads the adjacent POM; a missing POM means no dependencies. Optional
    /// edges and `test`/`provided`/`system` edges are dropped, and the child
    /// inherits the parent's scope unless the parent is `compile`.
    ///
    /// # Errors
    ///
    /// Returns an error if the POM exists but cannot be read.
    pub fn dependencies_of(&self, spec: &ArtifactSpec) -> Result<Vec<ArtifactSpec>> {
        let pom_spec = ArtifactSpec::new(spec.group_id(), spec.artifact_id(), spec.version())
            .with_type("pom");
        let Some(pom_path) = self.locate(&pom_spec) else {
            return Ok(Vec::new());
        };
        let text = std::fs::read_to_string(&pom_path)
            .map_err(|e| BuildError::archive_io(&pom_path, e))?;

        let pom = match PomModel::parse(&text, &pom_path) {
            Ok(pom) => pom,
            Err(e) => {
                tracing::warn!("Ignoring dependencies of {}: {}", spec, e);
                return Ok(Vec::new());
            }
        };

        Ok(pom.runtime_dependencies(spec))
    }

    fn collect(&self, specs: &[ArtifactSpec], transitive: bool) -> Result<BTreeSet<ResolvedArtifact>> {
        let mut seen = HashSet::new();
        let mut out = BTreeSet::new();
        let mut queue: VecDeque<ArtifactSpec> = specs
            .iter()
            .filter(|s| s.scope() != Scope::System)
            .cloned()
            .collect();

        while let Some(spec) = queue.pop_front() {
            let key = (
                spec.group_id().to_string(),
                spec.artifact_id().to_string(),
                spec.type_().to_string(),
                spec.classifier().map(str::to_string),
            );
            if !seen.insert(key) {
                continue;
            }

            let path = self
                .locate(&spec)
                .ok_or_else(|| BuildError::resolution(&spec))?;
            if transitive {
                queue.extend(self.dependencies_of(&spec)?);
            }
            out.insert(ResolvedArtifact::new(spec, path));
        }

        Ok(out)
    }
}

#[async_trait]
impl ArtifactResolver for LocalRepository {
    async fn resolve(&self, spec: &ArtifactSpec) -> Result<Option<ResolvedArtifact>> {
        let repo = self.clone();
        let spec = spec.clone();
        tokio::task::spawn_blocking(move || {
            repo.locate(&spec)
                .map(|path| ResolvedArtifact::new(spec, path))
        })
        .await
        .map_err(|e| BuildError::Io(std::io::Error::other(e)))
    }

    async fn resolve_all(
        &self,
        specs: &[ArtifactSpec],
        transitive: bool,
    ) -> Result<BTreeSet<ResolvedArtifact>> {
        let repo = self.clone();
        let specs = specs.to_vec();
        tokio::task::spawn_blocking(move || repo.collect(&specs, transitive))
            .await
            .map_err(|e| BuildError::Io(std::io::Error::other(e)))?
    }
}

#[derive(Debug, Default, Clone)]
struct PomDependency {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    type_: Option<String>,
    classifier: Option<String>,
    scope: Option<String>,
    optional: bool,
}

#[derive(Debug, Default)]
struct PomModel {
    group_id: Option<String>,
    version: Option<String>,
    parent_group_id: Option<String>,
    parent_version: Option<String>,
    properties: HashMap<String, String>,
    dependencies: Vec<PomDependency>,
    managed: Vec<PomDependency>,
}

const DEPENDENCY: &str = "project/dependencies/dependency";
const MANAGED_DEPENDENCY: &str = "project/dependencyManagement/dependencies/dependency";

impl PomModel {
    fn parse(text: &str, location: &Path) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut pom = Self::default();
        let mut path: Vec<String> = Vec::new();
        let mut current: Option<PomDependency> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| BuildError::descriptor(location.display(), e))?;
            match event {
                Event::Start(e) => {
                    path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    let joined = path.join("/");
                    if joined == DEPENDENCY || joined == MANAGED_DEPENDENCY {
                        current = Some(PomDependency::default());
                    }
                }
                Event::End(_) => {
                    let joined = path.join("/");
                    if joined == DEPENDENCY {
                        pom.dependencies.extend(current.take());
                    } else if joined == MANAGED_DEPENDENCY {
                        pom.managed.extend(current.take());
                    }
                    path.pop();
                }
                Event::Text(t) => {
                    let value = t
                        .unescape()
                        .map_err(|e| BuildError::descriptor(location.display(), e))?
                        .into_owned();
                    pom.apply(&path, value, current.as_mut());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(pom)
    }

    fn apply(&mut self, path: &[String], value: String, dep: Option<&mut PomDependency>) {
        let Some((leaf, parents)) = path.split_last() else {
            return;
        };
        let parent = parents.join("/");

        if parent == DEPENDENCY || parent == MANAGED_DEPENDENCY {
            let Some(dep) = dep else {
                return;
            };
            match leaf.as_str() {
                "groupId" => dep.group_id = Some(value),
                "artifactId" => dep.artifact_id = Some(value),
                "version" => dep.version = Some(value),
                "type" => dep.type_ = Some(value),
                "classifier" => dep.classifier = Some(value),
                "scope" => dep.scope = Some(value),
                "optional" => dep.optional = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
            return;
        }

        match (parent.as_str(), leaf.as_str()) {
            ("project", "groupId") => self.group_id = Some(value),
            ("project", "version") => self.version = Some(value),
            ("project/parent", "groupId") => self.parent_group_id = Some(value),
            ("project/parent", "version") => self.parent_version = Some(value),
            ("project/properties", key) => {
                self.properties.insert(key.to_string(), value);
            }
            _ => {}
        }
    }

    fn interpolate(&self, value: &str, owner: &ArtifactSpec) -> Option<String> {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let end = rest[start..].find('}')? + start;
            let key = &rest[start + 2..end];
            let replacement = match key {
                "project.version" | "pom.version" | "version" => self
                    .version
                    .clone()
                    .or_else(|| self.parent_version.clone())
                    .unwrap_or_else(|| owner.version().to_string()),
                "project.groupId" | "pom.groupId" | "groupId" => self
                    .group_id
                    .clone()
                    .or_else(|| self.parent_group_id.clone())
                    .unwrap_or_else(|| owner.group_id().to_string()),
                other => self.properties.get(other)?.clone(),
            };
            out.push_str(&replacement);
            rest = &rest[end + 1..];
        }
        out.push_str(rest);
        Some(out)
    }

    fn managed_version(&self, group_id: &str, artifact_id: &str) -> Option<&str> {
        self.managed
            .iter()
            .find(|m| {
                m.group_id.as_deref() == Some(group_id) && m.artifact_id.as_deref() == Some(artifact_id)
            })
            .and_then(|m| m.version.as_deref())
    }

    fn runtime_dependencies(&self, owner: &ArtifactSpec) -> Vec<ArtifactSpec> {
        let mut out = Vec::new();
        for dep in &self.dependencies {
            if dep.optional {
                continue;
            }
            let scope = match dep.scope.as_deref().unwrap_or_default().parse::<Scope>() {
                Ok(scope) if scope.is_includable() => scope,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping dependency of {}: {}", owner, e);
                    continue;
                }
            };

            let group_id = dep.group_id.as_deref().and_then(|g| self.interpolate(g, owner));
            let artifact_id = dep.artifact_id.as_deref().and_then(|a| self.interpolate(a, owner));
            let (Some(group_id), Some(artifact_id)) = (group_id, artifact_id) else {
                tracing::warn!("Skipping incomplete dependency declared by {}", owner);
                continue;
            };
            let version = dep
                .version
                .as_deref()
                .or_else(|| self.managed_version(&group_id, &artifact_id))
                .and_then(|v| self.interpolate(v, owner));
            let Some(version) = version else {
                tracing::warn!(
                    "Skipping {}:{} declared by {}: version not resolvable",
                    group_id,
                    artifact_id,
                    owner
                );
                continue;
            };

            let scope = if owner.scope() == Scope::Compile {
                scope
            } else {
                owner.scope()
            };
            out.push(
                ArtifactSpec::new(group_id, artifact_id, version)
                    .with_type(dep.type_.clone().unwrap_or_default())
                    .with_classifier(dep.classifier.clone())
                    .with_scope(scope),
            );
        }
        out
    }
}
