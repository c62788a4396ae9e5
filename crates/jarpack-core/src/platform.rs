//! Identity of the platform runtime a bundle is assembled against.

use jarpack_schema::ArtifactSpec;
use serde::{Deserialize, Serialize};

/// Coordinates of the platform's own artifacts.
///
/// The defaults describe the stock platform; embedders targeting a fork
/// override them through the `[platform]` table of the project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformCoordinates {
    /// Group shared by every platform artifact. Artifacts in this group are
    /// never application dependencies.
    pub group_id: String,
    /// Artifact id of the mandatory bootstrap jar (in `group_id`).
    pub bootstrap_artifact_id: String,
    /// Group of the low-level module loader.
    pub loader_group_id: String,
    /// Artifact id of the low-level module loader.
    pub loader_artifact_id: String,
    /// Entry-name prefix that shows the loader is already shaded into the
    /// bootstrap jar.
    pub loader_probe: String,
    /// Entry point written to the launch manifest.
    pub entry_point: String,
}

impl Default for PlatformCoordinates {
    fn default() -> Self {
        Self {
            group_id: "org.wildfly.swarm".to_string(),
            bootstrap_artifact_id: "bootstrap".to_string(),
            loader_group_id: "org.jboss.modules".to_string(),
            loader_artifact_id: "jboss-modules".to_string(),
            loader_probe: "org/jboss/modules/ModuleLoader".to_string(),
            entry_point: "org.wildfly.swarm.bootstrap.Main".to_string(),
        }
    }
}

impl PlatformCoordinates {
    /// Returns `true` if the spec belongs to the platform group.
    pub fn is_platform(&self, spec: &ArtifactSpec) -> bool {
        spec.group_id() == self.group_id
    }

    /// Returns `true` if the spec is the bootstrap jar.
    pub fn is_bootstrap(&self, spec: &ArtifactSpec) -> bool {
        spec.group_id() == self.group_id && spec.artifact_id() == self.bootstrap_artifact_id
    }

    /// Returns `true` if the spec is the module loader jar.
    pub fn is_loader(&self, spec: &ArtifactSpec) -> bool {
        spec.group_id() == self.loader_group_id && spec.artifact_id() == self.loader_artifact_id
    }

    /// Returns `true` for the two artifacts whose contents are expanded
    /// straight into the bundle root and therefore need no repository entry.
    pub fn is_exploded_bootstrap(&self, spec: &ArtifactSpec) -> bool {
        self.is_bootstrap(spec) || self.is_loader(spec)
    }
}
