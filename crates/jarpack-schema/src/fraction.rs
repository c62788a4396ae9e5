//! Platform module ("fraction") descriptors.

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactSpec, CoordinateError};

/// Descriptor embedded in a fraction jar at
/// [`FractionManifest::CLASSPATH_LOCATION`].
///
/// Its presence marks the jar as part of the platform boot path; `module`
/// names the platform module the jar provides, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FractionManifest {
    /// Group of the fraction artifact.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Artifact id of the fraction.
    #[serde(default)]
    pub artifact_id: Option<String>,
    /// Fraction version.
    #[serde(default)]
    pub version: Option<String>,
    /// Human-readable name.
    #[serde(default)]
    pub name: Option<String>,
    /// Platform module provided by the fraction.
    #[serde(default)]
    pub module: Option<String>,
    /// Stability level, informational only.
    #[serde(default)]
    pub stability: Option<String>,
}

impl FractionManifest {
    /// Location of the descriptor inside a fraction jar.
    pub const CLASSPATH_LOCATION: &'static str = "META-INF/fraction-manifest.toml";

    /// Parse a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid TOML for this schema.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

/// Reference to a fraction by coordinate, version optional.
///
/// Ordering and equality ignore the version so that a user-declared fraction
/// and a detected one for the same artifact collapse together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FractionDescriptor {
    /// Fraction group.
    pub group_id: String,
    /// Fraction artifact id.
    pub artifact_id: String,
    /// Version, when known.
    #[serde(default)]
    pub version: Option<String>,
}

impl FractionDescriptor {
    /// Create a descriptor.
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version,
        }
    }

    /// Parse `group:artifact:version`, `group:artifact`, `artifact:version` or
    /// `artifact`. Two-segment input is read as `group:artifact` when the first
    /// segment contains a `.`, otherwise as `artifact:version`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::InvalidCoordinate`] for empty segments or
    /// more than three segments.
    pub fn parse(s: &str, default_group: &str) -> Result<Self, CoordinateError> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoordinateError::InvalidCoordinate(s.to_string()));
        }

        let descriptor = match parts.as_slice() {
            [a] => Self::new(default_group, *a, None),
            [g, a] if g.contains('.') => Self::new(*g, *a, None),
            [a, v] => Self::new(default_group, *a, Some((*v).to_string())),
            [g, a, v] => Self::new(*g, *a, Some((*v).to_string())),
            _ => return Err(CoordinateError::InvalidCoordinate(s.to_string())),
        };

        Ok(descriptor)
    }

    /// `artifact:version`, or just `artifact` when the version is unknown.
    pub fn av(&self) -> String {
        match &self.version {
            Some(v) => format!("{}:{v}", self.artifact_id),
            None => self.artifact_id.clone(),
        }
    }

    /// Convert to a `jar` spec.
    ///
    /// Returns `None` when no version is known.
    pub fn to_spec(&self) -> Option<ArtifactSpec> {
        self.version
            .as_ref()
            .map(|v| ArtifactSpec::new(&self.group_id, &self.artifact_id, v))
    }

    /// Build a descriptor from a spec, keeping its version.
    pub fn from_spec(spec: &ArtifactSpec) -> Self {
        Self::new(
            spec.group_id(),
            spec.artifact_id(),
            Some(spec.version().to_string()),
        )
    }

    fn key(&self) -> (&str, &str) {
        (&self.group_id, &self.artifact_id)
    }
}

impl PartialEq for FractionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for FractionDescriptor {}

impl Ord for FractionDescriptor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for FractionDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for FractionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group_id, self.av())
    }
}
