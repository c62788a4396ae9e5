//! jarpack - assemble self-contained application bundles
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Reads a `jarpack.toml` project file, resolves the declared dependencies
//! from local repositories and writes one runnable bundle.
//!
//! # Bundle Layout
//!
//! ```text
//! shop-bundle.jar
//! ├── META-INF/MANIFEST.MF             # platform entry point
//! ├── META-INF/bundle-manifest.toml    # boot path, app deps, properties
//! ├── org/...                          # expanded bootstrap (and loader)
//! ├── modules/                         # extra module descriptors
//! ├── _bootstrap/shop.jar              # application content
//! └── m2repo/<group>/<artifact>/...    # embedded repository
//! ```

pub mod cmd;
pub mod config;
pub mod creator;
pub mod properties;

use clap::{Args, Parser, Subcommand};
use jarpack_core::FractionDetectionMode;
use std::path::PathBuf;

pub use config::ProjectFile;
pub use creator::ProjectFileCreator;

#[derive(Debug, Parser)]
#[command(name = "jarpack")]
#[command(author, version, about = "jarpack - assemble self-contained application bundles")]
pub struct Cli {
    /// Project file to use instead of ./jarpack.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Assemble the bundle
    Build(BuildArgs),
    /// Reduce a .war's WEB-INF/lib to the application's own jars, in place
    Repackage {
        /// Web archive to rewrite (defaults to the project artifact)
        file: Option<PathBuf>,
        #[command(flatten)]
        resolution: ResolutionArgs,
    },
}

/// Options shared by every command that resolves dependencies.
#[derive(Debug, Clone, Default, Args)]
pub struct ResolutionArgs {
    /// Local repository root, searched in order (repeatable)
    #[arg(long = "repository", value_name = "DIR")]
    pub repositories: Vec<PathBuf>,

    /// Concurrent artifact lookups
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Overrides for the `[bundle]` table of the project file.
#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
    /// Build without application content
    #[arg(long)]
    pub hollow: bool,

    /// Do not embed dependencies; the launcher resolves them at startup
    #[arg(long)]
    pub thin: bool,

    /// Prepend a launch script so the bundle runs directly
    #[arg(long)]
    pub executable: bool,

    /// Application main class
    #[arg(long)]
    pub main_class: Option<String>,

    /// Extra module directory (repeatable)
    #[arg(long = "module", value_name = "DIR")]
    pub modules: Vec<PathBuf>,

    /// Extra fraction as group:artifact[:version] or artifact[:version] (repeatable)
    #[arg(long = "fraction", value_name = "COORD")]
    pub fractions: Vec<String>,

    /// When to scan the application for the fractions it uses
    #[arg(long, value_enum)]
    pub detect: Option<FractionDetectionMode>,

    /// Directory the bundle is written to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub resolution: ResolutionArgs,
}
