//! Artifact resolution capability and the build-scoped resolution cache.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use jarpack_schema::{ArtifactSpec, ResolvedArtifact, Scope};

use crate::error::{BuildError, Result};

/// Resolves coordinates to local files.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    /// Resolve one coordinate. `Ok(None)` means no repository has it.
    async fn resolve(&self, spec: &ArtifactSpec) -> Result<Option<ResolvedArtifact>>;

    /// Resolve a batch, optionally with everything it transitively needs.
    ///
    /// Specs in `system` scope are skipped. A coordinate that cannot be
    /// resolved fails the whole batch with [`BuildError::Resolution`].
    async fn resolve_all(
        &self,
        specs: &[ArtifactSpec],
        transitive: bool,
    ) -> Result<BTreeSet<ResolvedArtifact>>;
}

/// Coordinate → file map shared by every resolution of one build.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<ArtifactSpec, PathBuf>>,
}

impl ResolutionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached resolution for `spec`.
    pub fn get(&self, spec: &ArtifactSpec) -> Option<ResolvedArtifact> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(spec)
            .map(|path| ResolvedArtifact::new(spec.clone(), path.clone()))
    }

    /// Remember a resolution.
    pub fn insert(&self, artifact: &ResolvedArtifact) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(artifact.spec().clone(), artifact.path().to_path_buf());
    }

    /// Number of cached coordinates.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps a resolver with a [`ResolutionCache`] and a bounded worker pool.
#[derive(Clone)]
pub struct DefaultArtifactResolver {
    inner: Arc<dyn ArtifactResolver>,
    cache: Arc<ResolutionCache>,
    workers: usize,
}

impl std::fmt::Debug for DefaultArtifactResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultArtifactResolver")
            .field("cached", &self.cache.len())
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl DefaultArtifactResolver {
    /// Wrap `inner`, sharing `cache`. The pool defaults to the CPU count.
    pub fn new(inner: Arc<dyn ArtifactResolver>, cache: Arc<ResolutionCache>) -> Self {
        Self {
            inner,
            cache,
            workers: num_cpus::get(),
        }
    }

    /// Bound the number of concurrent lookups (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Resolve every spec on its own, without dependencies, in parallel.
    ///
    /// # Errors
    ///
    /// Fails with [`BuildError::Resolution`] as soon as one coordinate yields
    /// no file; remaining lookups are abandoned.
    pub async fn resolve_all_non_transitively(
        &self,
        specs: impl IntoIterator<Item = ArtifactSpec>,
    ) -> Result<BTreeSet<ResolvedArtifact>> {
        let specs: Vec<_> = specs
            .into_iter()
            .filter(|s| s.scope() != Scope::System)
            .collect();
        tracing::debug!(
            "Resolving {} artifacts with {} workers",
            specs.len(),
            self.workers
        );

        stream::iter(specs)
            .map(|spec| async move {
                self.resolve(&spec)
                    .await?
                    .ok_or_else(|| BuildError::resolution(&spec))
            })
            .buffer_unordered(self.workers)
            .try_collect()
            .await
    }
}

#[async_trait]
impl ArtifactResolver for DefaultArtifactResolver {
    async fn resolve(&self, spec: &ArtifactSpec) -> Result<Option<ResolvedArtifact>> {
        if let Some(hit) = self.cache.get(spec) {
            return Ok(Some(hit));
        }
        let resolved = self.inner.resolve(spec).await?;
        if let Some(artifact) = &resolved {
            self.cache.insert(artifact);
        }
        Ok(resolved)
    }

    async fn resolve_all(
        &self,
        specs: &[ArtifactSpec],
        transitive: bool,
    ) -> Result<BTreeSet<ResolvedArtifact>> {
        if !transitive {
            return self.resolve_all_non_transitively(specs.to_vec()).await;
        }
        let resolved = self.inner.resolve_all(specs, true).await?;
        for artifact in &resolved {
            self.cache.insert(artifact);
        }
        Ok(resolved)
    }
}
