//! The project's declared dependencies and the sets derived from them.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use jarpack_schema::{ArtifactSpec, ResolvedArtifact, Scope};

use crate::error::Result;
use crate::resolver::ArtifactResolver;

/// Supplies the project's dependencies and the three derived views over them.
///
/// The views are only valid after [`resolve_dependencies`](Self::resolve_dependencies);
/// adding a dependency invalidates them until the next resolution.
#[async_trait]
pub trait ProjectHelper: Send + Sync {
    /// Resolve the dependency graph if it changed since the last call.
    async fn resolve_dependencies(&mut self) -> Result<()>;

    /// Transitive closure of the declared dependencies, minus test scope.
    fn all_dependencies(&self) -> &BTreeSet<ResolvedArtifact>;

    /// Dependencies supplied by the platform rather than the application.
    fn all_non_application_dependencies(&self) -> &BTreeSet<ResolvedArtifact>;

    /// Dependencies only the application supplies.
    fn application_dependencies(&self) -> &BTreeSet<ResolvedArtifact>;

    /// Declare another direct dependency.
    fn add_dependency(&mut self, spec: ArtifactSpec);
}

/// [`ProjectHelper`] over an explicit list of direct dependencies.
pub struct DeclaredProject {
    directs: BTreeSet<ArtifactSpec>,
    resolver: Arc<dyn ArtifactResolver>,
    platform_group: String,
    dirty: bool,
    all: BTreeSet<ResolvedArtifact>,
    non_application: BTreeSet<ResolvedArtifact>,
    application: BTreeSet<ResolvedArtifact>,
}

impl std::fmt::Debug for DeclaredProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclaredProject")
            .field("directs", &self.directs)
            .field("platform_group", &self.platform_group)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl DeclaredProject {
    /// Create a project whose platform artifacts live in `platform_group`.
    pub fn new(
        resolver: Arc<dyn ArtifactResolver>,
        platform_group: impl Into<String>,
        directs: impl IntoIterator<Item = ArtifactSpec>,
    ) -> Self {
        Self {
            directs: directs.into_iter().collect(),
            resolver,
            platform_group: platform_group.into(),
            dirty: true,
            all: BTreeSet::new(),
            non_application: BTreeSet::new(),
            application: BTreeSet::new(),
        }
    }

    /// Declared direct dependencies.
    pub fn direct_dependencies(&self) -> &BTreeSet<ArtifactSpec> {
        &self.directs
    }

    fn is_platform(&self, spec: &ArtifactSpec) -> bool {
        spec.group_id() == self.platform_group
    }
}

fn versionless(spec: &ArtifactSpec) -> (&str, &str, &str, Option<&str>) {
    (
        spec.group_id(),
        spec.artifact_id(),
        spec.type_(),
        spec.classifier(),
    )
}

#[async_trait]
impl ProjectHelper for DeclaredProject {
    async fn resolve_dependencies(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let roots: Vec<_> = self
            .directs
            .iter()
            .filter(|s| s.scope().is_bundleable())
            .cloned()
            .collect();
        let mut all = self.resolver.resolve_all(&roots, true).await?;
        all.retain(|a| a.spec().scope() != Scope::Test);

        let app_roots: Vec<_> = roots
            .iter()
            .filter(|s| s.scope().is_includable() && !self.is_platform(s))
            .cloned()
            .collect();
        let app_closure = if app_roots.is_empty() {
            BTreeSet::new()
        } else {
            self.resolver.resolve_all(&app_roots, true).await?
        };

        // Versions come from `all`; the closure only says which artifacts
        // the application reaches.
        let reachable: HashSet<_> = app_closure.iter().map(|a| versionless(a.spec())).collect();
        let application: BTreeSet<_> = all
            .iter()
            .filter(|a| reachable.contains(&versionless(a.spec())) && !self.is_platform(a.spec()))
            .cloned()
            .collect();
        let non_application = all.difference(&application).cloned().collect();

        tracing::debug!(
            "Resolved {} dependencies ({} application)",
            all.len(),
            application.len()
        );

        self.all = all;
        self.application = application;
        self.non_application = non_application;
        self.dirty = false;
        Ok(())
    }

    fn all_dependencies(&self) -> &BTreeSet<ResolvedArtifact> {
        &self.all
    }

    fn all_non_application_dependencies(&self) -> &BTreeSet<ResolvedArtifact> {
        &self.non_application
    }

    fn application_dependencies(&self) -> &BTreeSet<ResolvedArtifact> {
        &self.application
    }

    fn add_dependency(&mut self, spec: ArtifactSpec) {
        if self.directs.insert(spec) {
            self.dirty = true;
        }
    }
}
