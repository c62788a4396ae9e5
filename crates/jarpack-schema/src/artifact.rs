//! Artifact coordinates and resolved artifacts.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default artifact type when none is declared.
pub const DEFAULT_TYPE: &str = "jar";

/// Errors raised while parsing coordinates, scopes, or repository paths.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinateError {
    /// The coordinate string does not have a supported number of segments.
    #[error("Invalid artifact coordinate '{0}': expected group:artifact[:type[:classifier]]:version")]
    InvalidCoordinate(String),

    /// A required coordinate component is empty.
    #[error("Empty {field} in artifact coordinate '{input}'")]
    EmptyField {
        /// Name of the empty component.
        field: &'static str,
        /// The offending input.
        input: String,
    },

    /// The scope string is not one of the known dependency scopes.
    #[error("Unknown dependency scope '{0}'")]
    UnknownScope(String),

    /// The path does not follow the standard repository layout.
    #[error("Invalid repository path '{0}'")]
    InvalidRepoPath(String),
}

/// Dependency scope, following the usual build-tool conventions.
///
/// `Test` and `System` scoped artifacts never end up in a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Needed to compile and run (default).
    #[default]
    Compile,
    /// Needed only at runtime.
    Runtime,
    /// Supplied by the container at runtime.
    Provided,
    /// Needed only for tests.
    Test,
    /// Supplied by an explicit path on the host system.
    System,
}

impl Scope {
    /// Return the lowercase name of the scope.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Runtime => "runtime",
            Self::Provided => "provided",
            Self::Test => "test",
            Self::System => "system",
        }
    }

    /// Returns `true` for scopes that can ever be bundled.
    pub fn is_bundleable(self) -> bool {
        !matches!(self, Self::Test | Self::System)
    }

    /// Returns `true` for scopes whose artifacts the application itself ships.
    pub fn is_includable(self) -> bool {
        matches!(self, Self::Compile | Self::Runtime)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "compile" => Ok(Self::Compile),
            "runtime" => Ok(Self::Runtime),
            "provided" => Ok(Self::Provided),
            "test" => Ok(Self::Test),
            "system" => Ok(Self::System),
            other => Err(CoordinateError::UnknownScope(other.to_string())),
        }
    }
}

/// Identity and metadata of one resolvable artifact.
///
/// Equality, hashing and ordering only look at the identity tuple
/// `(group_id, artifact_id, version, type, classifier)`. The scope is carried
/// along as metadata, so a set of specs deduplicates by coordinate no matter
/// which scope each occurrence was declared with.
///
/// A spec never carries a file. Resolution produces a separate
/// [`ResolvedArtifact`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    group_id: String,
    artifact_id: String,
    version: String,
    #[serde(rename = "type", default = "default_type")]
    type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    classifier: Option<String>,
    #[serde(default)]
    scope: Scope,
}

fn default_type() -> String {
    DEFAULT_TYPE.to_string()
}

impl ArtifactSpec {
    /// Create a `jar` spec in `compile` scope.
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            type_: default_type(),
            classifier: None,
            scope: Scope::Compile,
        }
    }

    /// Replace the artifact type (extension), e.g. `war`.
    pub fn with_type(mut self, type_: impl Into<String>) -> Self {
        let type_ = type_.into();
        self.type_ = if type_.is_empty() { default_type() } else { type_ };
        self
    }

    /// Set the classifier. Empty strings clear it.
    pub fn with_classifier(mut self, classifier: Option<impl Into<String>>) -> Self {
        self.classifier = classifier.map(Into::into).filter(|c: &String| !c.is_empty());
        self
    }

    /// Set the scope. Scope is not part of the identity.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Group identifier, e.g. `com.acme`.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Artifact identifier, e.g. `widgets`.
    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    /// Version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Artifact type, which is also its file extension.
    pub fn type_(&self) -> &str {
        &self.type_
    }

    /// Optional classifier.
    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    /// Declared scope.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Coordinate in the form used by dependency declarations:
    /// `group:artifact:version`, or `group:artifact:type[:classifier]:version`
    /// when the type is not `jar` or a classifier is present.
    pub fn maven_gav(&self) -> String {
        let mut gav = format!("{}:{}:", self.group_id, self.artifact_id);
        if self.type_ != DEFAULT_TYPE || self.classifier.is_some() {
            gav.push_str(&self.type_);
            gav.push(':');
            if let Some(classifier) = &self.classifier {
                gav.push_str(classifier);
                gav.push(':');
            }
        }
        gav.push_str(&self.version);
        gav
    }

    /// Coordinate in the form used by module descriptors:
    /// `group:artifact:version[:classifier]`.
    pub fn msc_gav(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}:{}:{}:{c}",
                self.group_id, self.artifact_id, self.version
            ),
            None => format!("{}:{}:{}", self.group_id, self.artifact_id, self.version),
        }
    }

    /// File name inside the repository:
    /// `<artifactId>-<version>[-<classifier>].<type>`.
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{c}.{}", self.artifact_id, self.version, self.type_),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.type_),
        }
    }

    /// Directory (or, with `with_file`, file) path relative to a repository root:
    /// `<group/as/path>/<artifactId>/<version>[/<file>]`.
    ///
    /// Always uses `/` separators, independent of the host platform.
    pub fn repo_path(&self, with_file: bool) -> String {
        let mut path = format!(
            "{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version
        );
        if with_file {
            path.push('/');
            path.push_str(&self.file_name());
        }
        path
    }

    /// Parse a repository-relative file path produced by
    /// [`repo_path(true)`](Self::repo_path) back into a spec.
    ///
    /// The type is taken from the text after the last `.` of the file name, so
    /// multi-dot extensions are not supported.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::InvalidRepoPath`] if the path has too few
    /// segments or the file name does not start with `<artifactId>-<version>`.
    pub fn parse_repo_path(path: &str) -> Result<Self, CoordinateError> {
        let invalid = || CoordinateError::InvalidRepoPath(path.to_string());

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.len() < 4 || segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }

        let n = segments.len();
        let file = segments[n - 1];
        let version = segments[n - 2];
        let artifact_id = segments[n - 3];
        let group_id = segments[..n - 3].join(".");

        let prefix = format!("{artifact_id}-{version}");
        let rest = file.strip_prefix(&prefix).ok_or_else(invalid)?;
        let dot = rest.rfind('.').ok_or_else(invalid)?;
        let (head, type_) = (&rest[..dot], &rest[dot + 1..]);
        if type_.is_empty() {
            return Err(invalid());
        }

        let classifier = if head.is_empty() {
            None
        } else {
            let c = head.strip_prefix('-').ok_or_else(invalid)?;
            if c.is_empty() {
                return Err(invalid());
            }
            Some(c)
        };

        Ok(Self::new(group_id, artifact_id, version)
            .with_type(type_)
            .with_classifier(classifier))
    }

    fn identity(&self) -> (&str, &str, &str, &str, Option<&str>) {
        (
            &self.group_id,
            &self.artifact_id,
            &self.version,
            &self.type_,
            self.classifier.as_deref(),
        )
    }
}

impl PartialEq for ArtifactSpec {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ArtifactSpec {}

impl Hash for ArtifactSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl Ord for ArtifactSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl PartialOrd for ArtifactSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ArtifactSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.maven_gav())
    }
}

impl FromStr for ArtifactSpec {
    type Err = CoordinateError;

    /// Accepts `g:a:v`, `g:a:t:v` and `g:a:t:c:v`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (g, a, t, c, v) = match parts.as_slice() {
            [g, a, v] => (*g, *a, DEFAULT_TYPE, None, *v),
            [g, a, t, v] => (*g, *a, *t, None, *v),
            [g, a, t, c, v] => (*g, *a, *t, Some(*c), *v),
            _ => return Err(CoordinateError::InvalidCoordinate(s.to_string())),
        };

        for (field, value) in [("groupId", g), ("artifactId", a), ("version", v)] {
            if value.is_empty() {
                return Err(CoordinateError::EmptyField {
                    field,
                    input: s.to_string(),
                });
            }
        }

        Ok(Self::new(g, a, v).with_type(t).with_classifier(c))
    }
}

/// An [`ArtifactSpec`] paired with the local file it resolved to.
///
/// Equality and ordering delegate to the spec, so sets of resolved artifacts
/// deduplicate by coordinate and can be queried with a bare `&ArtifactSpec`.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    spec: ArtifactSpec,
    path: PathBuf,
}

impl ResolvedArtifact {
    /// Pair a spec with its resolved file.
    pub fn new(spec: ArtifactSpec, path: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            path: path.into(),
        }
    }

    /// The coordinate that was resolved.
    pub fn spec(&self) -> &ArtifactSpec {
        &self.spec
    }

    /// The local file backing the artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Split into spec and path.
    pub fn into_parts(self) -> (ArtifactSpec, PathBuf) {
        (self.spec, self.path)
    }
}

impl PartialEq for ResolvedArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

impl Eq for ResolvedArtifact {}

impl Hash for ResolvedArtifact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.spec.hash(state);
    }
}

impl Ord for ResolvedArtifact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.spec.cmp(&other.spec)
    }
}

impl PartialOrd for ResolvedArtifact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Borrow<ArtifactSpec> for ResolvedArtifact {
    fn borrow(&self) -> &ArtifactSpec {
        &self.spec
    }
}

impl std::fmt::Display for ResolvedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.spec, self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_maven_gav_omits_default_type() {
        let spec = ArtifactSpec::new("com.acme", "widgets", "1.2");
        assert_eq!(spec.maven_gav(), "com.acme:widgets:1.2");

        let war = spec.clone().with_type("war");
        assert_eq!(war.maven_gav(), "com.acme:widgets:war:1.2");

        let sources = spec.with_classifier(Some("sources"));
        assert_eq!(sources.maven_gav(), "com.acme:widgets:jar:sources:1.2");
        assert_eq!(sources.msc_gav(), "com.acme:widgets:1.2:sources");
    }

    #[test]
    fn test_equality_ignores_scope() {
        let compile = ArtifactSpec::new("com.acme", "widgets", "1.2");
        let runtime = compile.clone().with_scope(Scope::Runtime);
        assert_eq!(compile, runtime);

        let set: BTreeSet<_> = [compile, runtime].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_repo_path_layout() {
        let spec = ArtifactSpec::new("org.platform", "core", "9.0");
        assert_eq!(spec.repo_path(false), "org/platform/core/9.0");
        assert_eq!(spec.repo_path(true), "org/platform/core/9.0/core-9.0.jar");

        let classified = spec.with_classifier(Some("linux-x86_64")).with_type("so");
        assert_eq!(
            classified.repo_path(true),
            "org/platform/core/9.0/core-9.0-linux-x86_64.so"
        );
    }

    #[test]
    fn test_repo_path_parses_back() {
        let specs = [
            ArtifactSpec::new("org.platform", "core", "9.0"),
            ArtifactSpec::new("io.netty", "netty-transport-native-epoll", "4.1.100.Final")
                .with_classifier(Some("linux-x86_64")),
            ArtifactSpec::new("com.acme", "web", "1.0-SNAPSHOT").with_type("war"),
        ];
        for spec in specs {
            let parsed = ArtifactSpec::parse_repo_path(&spec.repo_path(true)).unwrap();
            assert_eq!(parsed, spec);
            assert_eq!(parsed.classifier(), spec.classifier());
            assert_eq!(parsed.type_(), spec.type_());
        }
    }

    #[test]
    fn test_parse_repo_path_rejects_mismatched_file() {
        assert!(ArtifactSpec::parse_repo_path("org/platform/core/9.0/other-9.0.jar").is_err());
        assert!(ArtifactSpec::parse_repo_path("core/9.0/core-9.0.jar").is_err());
        assert!(ArtifactSpec::parse_repo_path("org/platform/core/9.0/core-9.0-.jar").is_err());
    }

    #[test]
    fn test_from_str_forms() {
        let spec: ArtifactSpec = "com.acme:widgets:1.2".parse().unwrap();
        assert_eq!(spec.type_(), "jar");

        let spec: ArtifactSpec = "com.acme:widgets:war:1.2".parse().unwrap();
        assert_eq!(spec.type_(), "war");

        let spec: ArtifactSpec = "com.acme:widgets:jar:tests:1.2".parse().unwrap();
        assert_eq!(spec.classifier(), Some("tests"));

        assert!("com.acme:widgets".parse::<ArtifactSpec>().is_err());
        assert!("com.acme::1.2".parse::<ArtifactSpec>().is_err());
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("".parse::<Scope>().unwrap(), Scope::Compile);
        assert_eq!("system".parse::<Scope>().unwrap(), Scope::System);
        assert!(!Scope::Test.is_bundleable());
        assert!(Scope::Provided.is_bundleable());
        assert!(!Scope::Provided.is_includable());
        assert!("import".parse::<Scope>().is_err());
    }

    #[test]
    fn test_resolved_artifact_lookup_by_spec() {
        let spec = ArtifactSpec::new("com.acme", "widgets", "1.2");
        let set: BTreeSet<ResolvedArtifact> =
            [ResolvedArtifact::new(spec.clone(), "/tmp/widgets-1.2.jar")]
                .into_iter()
                .collect();
        assert!(set.contains(&spec));
        assert_eq!(
            set.get(&spec).map(|r| r.path().to_path_buf()),
            Some(PathBuf::from("/tmp/widgets-1.2.jar"))
        );
    }
}
