pub mod archive;
pub mod builder;
pub mod creator;
pub mod dependency_manager;
pub mod error;
pub mod fractions;
pub mod modules;
pub mod platform;
pub mod project;
pub mod repackage;
pub mod repository;
pub mod resolver;

#[cfg(test)]
mod test_support;

pub use archive::{Archive, Asset};
pub use builder::{BuildTool, BundleOutput, ProjectAsset};
pub use creator::{BuildToolCreator, select_creator};
pub use dependency_manager::DependencyManager;
pub use error::{BuildError, Result};
pub use fractions::{
    CatalogEntry, FractionCatalog, FractionDetectionMode, FractionDetector, PackageUsageDetector,
};
pub use modules::ModuleAnalyzer;
pub use platform::PlatformCoordinates;
pub use project::{DeclaredProject, ProjectHelper};
pub use repository::LocalRepository;
pub use resolver::{ArtifactResolver, DefaultArtifactResolver, ResolutionCache};

/// Tool identification written to the `Created-By` header of bundles.
pub const CREATED_BY: &str = concat!("jarpack-core/", env!("CARGO_PKG_VERSION"));
