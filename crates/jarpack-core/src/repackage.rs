//! Web archive library filtering.
//!
//! A web archive built by the project's own tooling carries every dependency
//! in `WEB-INF/lib/`. When the platform supplies some of them at runtime they
//! must not be bundled twice, so the library directory is reduced to exactly
//! the application's own jars.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, Permissions};
use std::path::{Path, PathBuf};

use jarpack_schema::{ArtifactSpec, ResolvedArtifact};
use tempfile::NamedTempFile;

use crate::archive::Archive;
use crate::error::{BuildError, Result};

/// Library directory of a web archive.
pub const WEB_INF_LIB: &str = "WEB-INF/lib/";

/// Suffix of the backup written next to a repackaged file.
pub const BACKUP_SUFFIX: &str = ".original";

/// Name a dependency gets inside `WEB-INF/lib/`.
pub fn lib_file_name(spec: &ArtifactSpec) -> String {
    format!("{}-{}.{}", spec.artifact_id(), spec.version(), spec.type_())
}

/// Outcome of [`filter_lib_dir`], as library file names.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterReport {
    /// Application jars already present.
    pub kept: Vec<String>,
    /// Jars removed because the application does not own them.
    pub removed: Vec<String>,
    /// Application jars that were missing and have been added.
    pub added: Vec<String>,
}

/// Reduce the direct children of `WEB-INF/lib/` to the application's jars.
///
/// Entries matching an application dependency are kept, every other entry is
/// deleted, and application dependencies with no entry are added from their
/// resolved files.
pub fn filter_lib_dir(archive: &mut Archive, application: &BTreeSet<ResolvedArtifact>) -> FilterReport {
    let mut wanted: BTreeMap<String, &ResolvedArtifact> = application
        .iter()
        .map(|a| (lib_file_name(a.spec()), a))
        .collect();

    let mut report = FilterReport::default();
    for path in archive.paths_under(WEB_INF_LIB) {
        let name = &path[WEB_INF_LIB.len()..];
        if name.contains('/') {
            continue;
        }
        if wanted.remove(name).is_some() {
            report.kept.push(name.to_string());
        } else {
            archive.delete(&path);
            report.removed.push(name.to_string());
        }
    }

    for (name, artifact) in wanted {
        archive.add_file(&format!("{WEB_INF_LIB}{name}"), artifact.path());
        report.added.push(name);
    }

    tracing::debug!(
        "Filtered {}: kept {}, removed {}, added {}",
        WEB_INF_LIB,
        report.kept.len(),
        report.removed.len(),
        report.added.len()
    );
    report
}

/// Move `file` to `<file>.original`, falling back to copy and delete.
///
/// Returns the backup path, or `None` if no backup could be made; the
/// original file is left in place in that case.
pub fn backup_original(file: &Path) -> Option<PathBuf> {
    let mut backup = file.as_os_str().to_owned();
    backup.push(BACKUP_SUFFIX);
    let backup = PathBuf::from(backup);

    if std::fs::rename(file, &backup).is_ok() {
        return Some(backup);
    }

    tracing::info!("Fallback file move: {}", file.display());
    if let Err(e) = std::fs::copy(file, &backup) {
        tracing::warn!("Could not back up {}: {}", file.display(), e);
        return None;
    }
    if let Err(e) = std::fs::remove_file(file) {
        tracing::warn!("Could not remove {} after backup: {}", file.display(), e);
    }
    Some(backup)
}

/// Write `archive` to `dest` through a temporary file in the same directory.
///
/// An existing `dest` keeps its permissions; a new file gets mode 0644.
///
/// # Errors
///
/// Returns [`BuildError::ArchiveIo`] if the file cannot be written or moved
/// into place. `dest` is untouched on failure.
pub fn write_atomically(archive: &Archive, dest: &Path, stub: Option<&[u8]>) -> Result<()> {
    let permissions = std::fs::metadata(dest).ok().map(|m| m.permissions());
    write_with_permissions(archive, dest, stub, permissions)
}

fn write_with_permissions(
    archive: &Archive,
    dest: &Path,
    stub: Option<&[u8]>,
    permissions: Option<Permissions>,
) -> Result<()> {
    use std::io::Write;

    let dir = match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BuildError::archive_io(dir, e))?;
    if let Some(stub) = stub {
        tmp.write_all(stub)
            .map_err(|e| BuildError::archive_io(tmp.path(), e))?;
    }
    archive.write_zip(tmp.as_file_mut())?;
    set_permissions(tmp.as_file(), permissions)
        .map_err(|e| BuildError::archive_io(tmp.path(), e))?;
    tmp.persist(dest)
        .map_err(|e| BuildError::archive_io(dest, e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_permissions(file: &File, permissions: Option<Permissions>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(permissions.unwrap_or_else(|| Permissions::from_mode(0o644)))
}

#[cfg(not(unix))]
fn set_permissions(file: &File, permissions: Option<Permissions>) -> std::io::Result<()> {
    match permissions {
        Some(permissions) => file.set_permissions(permissions),
        None => Ok(()),
    }
}

/// Filter the web archive at `file` in place, keeping a backup.
///
/// The rewritten file keeps the permissions of the original.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or the result cannot be
/// written.
pub fn repackage_file(file: &Path, application: &BTreeSet<ResolvedArtifact>) -> Result<FilterReport> {
    let permissions = std::fs::metadata(file).ok().map(|m| m.permissions());
    let source = backup_original(file).unwrap_or_else(|| file.to_path_buf());
    let mut archive = Archive::import_zip(&source)?;
    let report = filter_lib_dir(&mut archive, application);
    write_with_permissions(&archive, file, None, permissions)?;
    tracing::info!("Repackaged .war: {}", file.display());
    Ok(report)
}
