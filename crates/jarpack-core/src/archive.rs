//! In-memory archive model.
//!
//! An [`Archive`] is a sorted map from entry path to [`Asset`]. Entries are
//! only materialized when the archive is exported, so large repository jars
//! stay on disk until then. Export writes entries in path order with a fixed
//! timestamp, which makes the output a pure function of the entry set.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{BuildError, Result};

/// Content of a single archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    /// Bytes held in memory.
    Bytes(Vec<u8>),
    /// A file on disk, read at export time.
    File(PathBuf),
}

impl Asset {
    /// Read the full content of the asset.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ArchiveIo`] if a file-backed asset cannot be read.
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::File(path) => std::fs::read(path).map_err(|e| BuildError::archive_io(path, e)),
        }
    }
}

/// A mutable collection of archive entries keyed by `/`-separated path.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    entries: BTreeMap<String, Asset>,
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').replace('\\', "/")
}

impl Archive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an entry.
    pub fn add(&mut self, path: &str, asset: Asset) {
        self.entries.insert(normalize(path), asset);
    }

    /// Add an in-memory entry.
    pub fn add_bytes(&mut self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.add(path, Asset::Bytes(bytes.into()));
    }

    /// Add an entry backed by a file on disk.
    pub fn add_file(&mut self, path: &str, file: impl Into<PathBuf>) {
        self.add(path, Asset::File(file.into()));
    }

    /// Remove an entry, returning `true` if it existed.
    pub fn delete(&mut self, path: &str) -> bool {
        self.entries.remove(&normalize(path)).is_some()
    }

    /// Returns `true` if the archive holds an entry at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize(path))
    }

    /// Look up an entry.
    pub fn get(&self, path: &str) -> Option<&Asset> {
        self.entries.get(&normalize(path))
    }

    /// Read an entry's content, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a file-backed entry cannot be read.
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.get(path).map(Asset::read).transpose()
    }

    /// All entry paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entry paths starting with `prefix`, sorted.
    pub fn paths_under(&self, prefix: &str) -> Vec<String> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load every file entry of a zip file into memory.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ArchiveIo`] if the file cannot be opened and a
    /// zip error if it is not a valid archive.
    pub fn import_zip(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| BuildError::archive_io(path, e))?;
        Self::import_zip_reader(file)
    }

    /// Load every file entry of a zip stream into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is not a valid zip archive.
    pub fn import_zip_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader)?;
        let mut archive = Self::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
            entry.read_to_end(&mut bytes)?;
            archive.add_bytes(entry.name(), bytes);
        }
        Ok(archive)
    }

    /// Copy the entries of a jar into this archive, skipping directories and
    /// anything under `META-INF/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the jar cannot be read.
    pub fn expand_jar(&mut self, jar: &Path) -> Result<usize> {
        let expanded = Self::import_zip(jar)?;
        let mut count = 0;
        for (path, asset) in expanded.entries {
            if path.starts_with("META-INF") {
                continue;
            }
            self.entries.insert(path, asset);
            count += 1;
        }
        tracing::debug!("Expanded {} entries from {}", count, jar.display());
        Ok(count)
    }

    /// Add every file below `dir` under `prefix` (use `""` for the root).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be walked.
    pub fn import_directory(&mut self, dir: &Path, prefix: &str) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BuildError::archive_io(dir, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(dir) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let path = if prefix.is_empty() {
                rel
            } else {
                format!("{}/{rel}", prefix.trim_end_matches('/'))
            };
            self.add_file(&path, entry.path());
            count += 1;
        }
        Ok(count)
    }

    /// Write the archive as a zip stream.
    ///
    /// # Errors
    ///
    /// Returns an error if an asset cannot be read or the stream fails.
    pub fn write_zip<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut zip = ZipWriter::new(writer);
        for (path, asset) in &self.entries {
            zip.start_file(path.as_str(), options)?;
            zip.write_all(&asset.read()?)?;
        }
        Ok(zip.finish()?)
    }

    /// Export the archive into a byte buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if an asset cannot be read.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.write_zip(Cursor::new(Vec::new()))?.into_inner())
    }
}

/// Returns `true` if the jar has an entry whose name starts with `prefix`.
///
/// # Errors
///
/// Returns an error if the jar cannot be opened or is not a zip file.
pub fn jar_contains_prefix(jar: &Path, prefix: &str) -> Result<bool> {
    let file = File::open(jar).map_err(|e| BuildError::archive_io(jar, e))?;
    let zip = ZipArchive::new(file)?;
    Ok(zip.file_names().any(|name| name.starts_with(prefix)))
}
