//! Module descriptor (`module.xml`) analysis.
//!
//! A module descriptor names a module and lists the binary artifacts it loads
//! as `<artifact name="${group:artifact:version[:classifier]}"/>` entries under
//! `<resources>`. Those artifacts are needed at runtime even though no POM
//! declares them, so they are collected as module dependencies.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use jarpack_schema::ArtifactSpec;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{BuildError, Result};

/// File name of a module descriptor.
pub const MODULE_DESCRIPTOR: &str = "module.xml";

/// Prefix of module descriptors packaged inside jars, and of the module tree
/// inside a bundle.
pub const MODULES_PREFIX: &str = "modules/";

/// Maximum depth of a module directory scan.
pub const MODULE_SCAN_DEPTH: usize = 20;

/// Artifacts declared by one module descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleAnalyzer {
    name: Option<String>,
    dependencies: BTreeSet<ArtifactSpec>,
}

impl ModuleAnalyzer {
    /// Parse descriptor text. `location` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DescriptorParse`] if the XML is malformed.
    pub fn parse(xml: &str, location: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut analyzer = Self::default();
        let mut path: Vec<String> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| BuildError::descriptor(location, e))?;
            match event {
                Event::Start(e) => {
                    analyzer.visit(&path, &e, location)?;
                    path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                }
                Event::Empty(e) => analyzer.visit(&path, &e, location)?,
                Event::End(_) => {
                    path.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(analyzer)
    }

    /// Parse a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path).map_err(|e| BuildError::archive_io(path, e))?;
        Self::parse(&xml, &path.display().to_string())
    }

    /// Declared module name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Artifacts the module loads.
    pub fn dependencies(&self) -> &BTreeSet<ArtifactSpec> {
        &self.dependencies
    }

    fn visit(&mut self, path: &[String], element: &BytesStart<'_>, location: &str) -> Result<()> {
        let local = element.local_name();
        let attribute = |name: &str| -> Result<Option<String>> {
            element
                .try_get_attribute(name)
                .map_err(|e| BuildError::descriptor(location, e))?
                .map(|a| {
                    a.unescape_value()
                        .map(|v| v.into_owned())
                        .map_err(|e| BuildError::descriptor(location, e))
                })
                .transpose()
        };

        match (path, local.as_ref()) {
            ([], b"module" | b"module-alias") => self.name = attribute("name")?,
            ([root, resources], b"artifact") if root == "module" && resources == "resources" => {
                let Some(name) = attribute("name")? else {
                    return Err(BuildError::descriptor(location, "artifact without a name"));
                };
                match parse_artifact_name(&name) {
                    Some(spec) => {
                        self.dependencies.insert(spec);
                    }
                    None => tracing::warn!(
                        "Skipping artifact '{}' in {}: no version",
                        name,
                        location
                    ),
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Parse `${g:a:v[:c]}` (optionally with a `?…` suffix) into a `jar` spec.
fn parse_artifact_name(name: &str) -> Option<ArtifactSpec> {
    let name = name.trim();
    let name = name
        .strip_prefix("${")
        .and_then(|n| n.strip_suffix('}'))
        .unwrap_or(name);
    let name = name.split('?').next().unwrap_or(name);

    let parts: Vec<&str> = name.split(':').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    match parts.as_slice() {
        [g, a, v] => Some(ArtifactSpec::new(*g, *a, *v)),
        [g, a, v, c] => Some(ArtifactSpec::new(*g, *a, *v).with_classifier(Some(*c))),
        _ => None,
    }
}

fn is_packaged_descriptor(name: &str) -> bool {
    name.starts_with(MODULES_PREFIX) && name.ends_with(MODULE_DESCRIPTOR)
}

/// Parse every `modules/**/module.xml` entry of a jar.
///
/// Malformed descriptors are logged and skipped.
///
/// # Errors
///
/// Returns an error if the jar itself cannot be read.
pub fn find_module_descriptors(jar: &Path) -> Result<Vec<ModuleAnalyzer>> {
    let file = File::open(jar).map_err(|e| BuildError::archive_io(jar, e))?;
    let mut zip = ZipArchive::new(file)?;

    let names: Vec<String> = zip
        .file_names()
        .filter(|n| is_packaged_descriptor(n))
        .map(str::to_string)
        .collect();

    let mut analyzers = Vec::with_capacity(names.len());
    for name in names {
        let mut xml = String::new();
        zip.by_name(&name)?
            .read_to_string(&mut xml)
            .map_err(|e| BuildError::archive_io(jar, e))?;
        match ModuleAnalyzer::parse(&xml, &format!("{}!/{name}", jar.display())) {
            Ok(analyzer) => analyzers.push(analyzer),
            Err(e) => tracing::warn!("{}", e),
        }
    }
    Ok(analyzers)
}

/// Parse every `module.xml` below `dir`, at most [`MODULE_SCAN_DEPTH`] deep.
///
/// Unreadable or malformed descriptors are logged and skipped.
pub fn scan_module_directory(dir: &Path) -> Vec<ModuleAnalyzer> {
    WalkDir::new(dir)
        .max_depth(MODULE_SCAN_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable path under {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && e.file_name() == MODULE_DESCRIPTOR)
        .filter_map(|e| match ModuleAnalyzer::from_path(e.path()) {
            Ok(analyzer) => Some(analyzer),
            Err(err) => {
                tracing::warn!("{}", err);
                None
            }
        })
        .collect()
}
