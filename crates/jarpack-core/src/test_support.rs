use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use jarpack_schema::{ArtifactSpec, ResolvedArtifact, Scope};
use zip::write::SimpleFileOptions;

use crate::error::{BuildError, Result};
use crate::resolver::ArtifactResolver;

/// Write a zip file with the given entries.
pub(crate) fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// In-memory resolver with canned files and dependency edges.
#[derive(Default)]
pub(crate) struct FakeResolver {
    artifacts: Mutex<HashMap<ArtifactSpec, (PathBuf, Vec<ArtifactSpec>)>>,
    lookups: AtomicUsize,
}

impl FakeResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, spec: &ArtifactSpec, path: impl Into<PathBuf>, deps: &[ArtifactSpec]) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(spec.clone(), (path.into(), deps.to_vec()));
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn lookup(&self, spec: &ArtifactSpec) -> Option<(PathBuf, Vec<ArtifactSpec>)> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.artifacts.lock().unwrap().get(spec).cloned()
    }
}

#[async_trait]
impl ArtifactResolver for FakeResolver {
    async fn resolve(&self, spec: &ArtifactSpec) -> Result<Option<ResolvedArtifact>> {
        Ok(self
            .lookup(spec)
            .map(|(path, _)| ResolvedArtifact::new(spec.clone(), path)))
    }

    async fn resolve_all(
        &self,
        specs: &[ArtifactSpec],
        transitive: bool,
    ) -> Result<BTreeSet<ResolvedArtifact>> {
        let mut out = BTreeSet::new();
        let mut queue: VecDeque<ArtifactSpec> = specs
            .iter()
            .filter(|s| s.scope() != Scope::System)
            .cloned()
            .collect();
        while let Some(spec) = queue.pop_front() {
            if out.contains(&spec) {
                continue;
            }
            let (path, deps) = self
                .lookup(&spec)
                .ok_or_else(|| BuildError::resolution(&spec))?;
            if transitive {
                queue.extend(deps.into_iter().map(|d| d.with_scope(spec.scope())));
            }
            out.insert(ResolvedArtifact::new(spec, path));
        }
        Ok(out)
    }
}
