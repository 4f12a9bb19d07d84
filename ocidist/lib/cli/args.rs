use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{merge::OutputTarget, oci::PlatformSpec};

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// `ocidist` inspects OCI image layouts and flattens image layers into a single tarball
#[derive(Debug, Parser)]
#[command(name = "ocidist", author, about, version, styles=styles::styles())]
pub struct OcidistArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<OcidistSubcommand>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum OcidistSubcommand {
    /// Flatten an image's layers into a single filesystem tar
    #[command(name = "merge")]
    Merge {
        /// Image name or root descriptor digest
        #[arg(required = true)]
        name: String,

        /// Path to the OCI layout
        #[arg(short, long, env = "OCIDIST_LAYOUT")]
        path: PathBuf,

        /// Output file, or `-` for stdout
        #[arg(short, long, default_value = "-")]
        target: OutputTarget,

        /// Platform to select from a multi-platform index, as os/arch[/variant]
        #[arg(long, env = "OCIDIST_PLATFORM")]
        platform: Option<PlatformSpec>,

        /// Architecture to select, keeping the platform's os
        #[arg(long)]
        arch: Option<String>,

        /// Emit only the topmost copy of a path written by several layers
        #[arg(long)]
        last_wins: bool,

        /// Check every layer blob against its digest before merging
        #[arg(long)]
        verify: bool,
    },

    /// Create or list OCI layouts
    #[command(name = "layout", subcommand)]
    Layout(LayoutSubcommand),

    /// Print the manifest an image name resolves to
    #[command(name = "manifest")]
    Manifest {
        /// Image name or root descriptor digest
        #[arg(required = true)]
        name: String,

        /// Path to the OCI layout
        #[arg(short, long, env = "OCIDIST_LAYOUT")]
        path: PathBuf,

        /// Platform to select from a multi-platform index, as os/arch[/variant]
        #[arg(long, env = "OCIDIST_PLATFORM")]
        platform: Option<PlatformSpec>,

        /// Pretty print the manifest
        #[arg(long)]
        format: bool,

        /// Print the manifest digest before the manifest
        #[arg(long)]
        hash: bool,
    },

    /// Print the image configuration an image name resolves to
    #[command(name = "config")]
    Config {
        /// Image name or root descriptor digest
        #[arg(required = true)]
        name: String,

        /// Path to the OCI layout
        #[arg(short, long, env = "OCIDIST_LAYOUT")]
        path: PathBuf,

        /// Platform to select from a multi-platform index, as os/arch[/variant]
        #[arg(long, env = "OCIDIST_PLATFORM")]
        platform: Option<PlatformSpec>,
    },

    /// Copy a blob out of a layout
    #[command(name = "blob")]
    Blob {
        /// Blob digest, as algorithm:hex
        #[arg(required = true)]
        digest: String,

        /// Path to the OCI layout
        #[arg(short, long, env = "OCIDIST_LAYOUT")]
        path: PathBuf,

        /// Output file, or `-` for stdout
        #[arg(short, long, default_value = "-")]
        target: OutputTarget,
    },
}

/// Layout management subcommands
#[derive(Debug, Subcommand)]
pub enum LayoutSubcommand {
    /// Create an empty layout if none exists
    #[command(name = "init")]
    Init {
        /// Path to the OCI layout
        #[arg(short, long, env = "OCIDIST_LAYOUT")]
        path: PathBuf,
    },

    /// List the entries of a layout's root index
    #[command(name = "list")]
    List {
        /// Path to the OCI layout
        #[arg(short, long, env = "OCIDIST_LAYOUT")]
        path: PathBuf,
    },
}

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Combines `--platform` and `--arch` into the platform to resolve for.
pub fn effective_platform(platform: Option<PlatformSpec>, arch: Option<String>) -> PlatformSpec {
    let platform = platform.unwrap_or_default();
    match arch {
        Some(arch) => platform.with_architecture(arch),
        None => platform,
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
