//! Platform module ("fraction") catalog and usage detection.

use std::collections::{BTreeMap, BTreeSet};

use jarpack_schema::FractionDescriptor;
use regex::bytes::RegexSet;
use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::error::{BuildError, Result};

/// When to scan the application for the fractions it uses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FractionDetectionMode {
    /// Only when no bootstrap artifact is declared.
    #[default]
    #[value(name = "when_missing")]
    WhenMissing,
    /// Always, adding to whatever is declared.
    Force,
    /// Never; the declared dependencies must be complete.
    Never,
}

impl std::fmt::Display for FractionDetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::WhenMissing => "when_missing",
            Self::Force => "force",
            Self::Never => "never",
        })
    }
}

/// One known fraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    /// Package prefixes whose use implies this fraction, as `a/b/c` or `a.b.c`.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Other fractions this one needs, as `artifact` or `group:artifact`.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl CatalogEntry {
    /// Versioned descriptor for this entry.
    pub fn descriptor(&self) -> FractionDescriptor {
        FractionDescriptor::new(
            &self.group_id,
            &self.artifact_id,
            Some(self.version.clone()),
        )
    }
}

/// The fractions a build knows about, keyed by group and artifact.
#[derive(Debug, Clone, Default)]
pub struct FractionCatalog {
    default_group: String,
    entries: BTreeMap<(String, String), CatalogEntry>,
}

impl FractionCatalog {
    /// Build a catalog. Dependencies without a group use `default_group`.
    pub fn new(default_group: impl Into<String>, entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            default_group: default_group.into(),
            entries: entries
                .into_iter()
                .map(|e| ((e.group_id.clone(), e.artifact_id.clone()), e))
                .collect(),
        }
    }

    /// Look up a fraction.
    pub fn get(&self, group_id: &str, artifact_id: &str) -> Option<&CatalogEntry> {
        self.entries
            .get(&(group_id.to_string(), artifact_id.to_string()))
    }

    /// All entries, sorted by coordinate.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Fill in a missing version from the catalog.
    pub fn complete(&self, fraction: &FractionDescriptor) -> FractionDescriptor {
        match (&fraction.version, self.get(&fraction.group_id, &fraction.artifact_id)) {
            (None, Some(entry)) => entry.descriptor(),
            _ => fraction.clone(),
        }
    }

    /// Direct dependencies of a fraction, versions filled from the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Configuration`] for a malformed dependency entry.
    pub fn dependencies_of(&self, fraction: &FractionDescriptor) -> Result<Vec<FractionDescriptor>> {
        let Some(entry) = self.get(&fraction.group_id, &fraction.artifact_id) else {
            return Ok(Vec::new());
        };
        entry
            .dependencies
            .iter()
            .map(|d| {
                FractionDescriptor::parse(d, &self.default_group)
                    .map(|parsed| self.complete(&parsed))
                    .map_err(|e| {
                        BuildError::Configuration(format!(
                            "fraction {} lists bad dependency: {e}",
                            entry.artifact_id
                        ))
                    })
            })
            .collect()
    }
}

/// Finds the fractions an application needs.
pub trait FractionDetector: Send + Sync {
    /// Fractions used by the application content in `archive`.
    fn detect(&self, archive: &Archive) -> Result<BTreeSet<FractionDescriptor>>;
}

/// Detects fractions by looking for catalog package names inside the
/// application's class files.
///
/// Class files reference other classes by internal name (`a/b/C`), so a
/// plain byte search over each `.class` entry finds every package it uses.
#[derive(Debug)]
pub struct PackageUsageDetector {
    patterns: RegexSet,
    owners: Vec<FractionDescriptor>,
}

impl PackageUsageDetector {
    /// Build a detector over every catalog entry that lists packages.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Configuration`] if the patterns cannot be compiled.
    pub fn new(catalog: &FractionCatalog) -> Result<Self> {
        let mut patterns = Vec::new();
        let mut owners = Vec::new();
        for entry in catalog.entries() {
            for package in &entry.packages {
                let internal = package.trim_end_matches(['.', '/']).replace('.', "/");
                if internal.is_empty() {
                    continue;
                }
                patterns.push(format!("{}/", regex::escape(&internal)));
                owners.push(entry.descriptor());
            }
        }
        let patterns = RegexSet::new(&patterns)
            .map_err(|e| BuildError::Configuration(format!("invalid fraction package pattern: {e}")))?;
        Ok(Self { patterns, owners })
    }
}

impl FractionDetector for PackageUsageDetector {
    fn detect(&self, archive: &Archive) -> Result<BTreeSet<FractionDescriptor>> {
        let mut found = BTreeSet::new();
        if self.patterns.is_empty() {
            return Ok(found);
        }
        for path in archive.paths().filter(|p| p.ends_with(".class")) {
            let Some(bytes) = archive.read(path)? else {
                continue;
            };
            for index in self.patterns.matches(&bytes).iter() {
                found.insert(self.owners[index].clone());
            }
        }
        Ok(found)
    }
}
