//! The bundle manifest consumed by the launcher at startup.
//!
//! Serialized as TOML at [`BundleManifest::CLASSPATH_LOCATION`] inside the
//! bundle. All list fields are sets so the serialized form is sorted and
//! free of duplicates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Build-time description of how to bootstrap a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Application main class, if the user overrides the platform default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    /// `true` when the bundle carries no application content.
    #[serde(default)]
    pub hollow: bool,

    /// `true` when dependencies are embedded; `false` when the launcher must
    /// resolve them from an external repository.
    #[serde(default = "default_true")]
    pub bundle_dependencies: bool,

    /// Entry name of the application content inside the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,

    /// Platform modules that must be on the boot path.
    #[serde(default)]
    pub bootstrap_modules: BTreeSet<String>,

    /// Coordinates of artifacts that must be on the boot path.
    #[serde(default)]
    pub bootstrap_artifacts: BTreeSet<String>,

    /// Coordinates of the application's own dependencies.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    /// Arbitrary configuration properties.
    // Kept last: TOML tables must follow plain values.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for BundleManifest {
    fn default() -> Self {
        Self {
            main_class: None,
            hollow: false,
            bundle_dependencies: true,
            asset: None,
            bootstrap_modules: BTreeSet::new(),
            bootstrap_artifacts: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            properties: BTreeMap::new(),
        }
    }
}

impl BundleManifest {
    /// Fixed location of the manifest inside a bundle.
    pub const CLASSPATH_LOCATION: &'static str = "META-INF/bundle-manifest.toml";

    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a platform module that must be on the boot path.
    pub fn add_bootstrap_module(&mut self, module: impl Into<String>) {
        self.bootstrap_modules.insert(module.into());
    }

    /// Record an artifact coordinate that must be on the boot path.
    pub fn add_bootstrap_artifact(&mut self, gav: impl Into<String>) {
        self.bootstrap_artifacts.insert(gav.into());
    }

    /// Record an application dependency coordinate.
    pub fn add_dependency(&mut self, gav: impl Into<String>) {
        self.dependencies.insert(gav.into());
    }

    /// Set (or replace) a configuration property.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Render the manifest as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Parse a manifest previously written by [`to_toml`](Self::to_toml).
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid TOML for this schema.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_survives_toml() {
        let mut manifest = BundleManifest::new();
        manifest.main_class = Some("com.acme.Main".into());
        manifest.asset = Some("_bootstrap/shop.war".into());
        manifest.add_bootstrap_module("org.platform.core");
        manifest.add_bootstrap_artifact("org.platform:core:9.0");
        manifest.add_dependency("com.acme:widgets:1.2");
        manifest.add_dependency("com.acme:widgets:1.2");
        manifest.set_property("jarpack.app.artifact", "shop.war");

        let text = manifest.to_toml().unwrap();
        let parsed = BundleManifest::from_toml(&text).unwrap();

        assert_eq!(parsed, manifest);
        assert_eq!(parsed.dependencies.len(), 1);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let parsed = BundleManifest::from_toml("hollow = true\n").unwrap();
        assert!(parsed.hollow);
        assert!(parsed.bundle_dependencies);
        assert!(parsed.bootstrap_artifacts.is_empty());
    }
}
