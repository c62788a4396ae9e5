//! Error taxonomy for dependency analysis and bundle assembly.

use std::path::PathBuf;
use thiserror::Error;

/// Every failure a build can surface.
///
/// `DescriptorParse` is the only variant the pipeline recovers from locally
/// (the offending artifact is logged and skipped). Everything else aborts the
/// build before an output file is published.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A coordinate could not be resolved to a local file.
    #[error("Failed to resolve artifact {coordinate}")]
    Resolution { coordinate: String },

    /// The platform bootstrap artifact (or its module loader) is absent.
    #[error(
        "No {group_id}:{artifact_id} artifact found; declare a platform dependency \
         or enable fraction detection"
    )]
    MissingBootstrap {
        group_id: String,
        artifact_id: String,
    },

    /// A module or fraction descriptor could not be parsed.
    #[error("Malformed descriptor in {location}: {reason}")]
    DescriptorParse { location: String, reason: String },

    /// Reading or writing an archive failed.
    #[error("Archive I/O failed for {}: {source}", path.display())]
    ArchiveIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid combination of build options.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl BuildError {
    /// Create a [`BuildError::Resolution`] naming the failing coordinate.
    pub fn resolution(coordinate: impl std::fmt::Display) -> Self {
        Self::Resolution {
            coordinate: coordinate.to_string(),
        }
    }

    /// Create a [`BuildError::DescriptorParse`].
    pub fn descriptor(location: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::DescriptorParse {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wrap an I/O error with the archive path it concerns.
    pub fn archive_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArchiveIo {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
