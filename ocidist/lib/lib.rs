//! `ocidist` inspects OCI image layouts and flattens image layers into a single filesystem
//! tarball.
//!
//! # Overview
//!
//! Given a content-addressable OCI layout on disk and an image name, ocidist:
//! - Resolves the name to an image manifest, picking a platform out of a multi-platform index
//! - Reads every layer blob as an uncompressed tar stream
//! - Applies `.wh.` whiteouts and `.wh..wh..opq` opaque markers across the layer chain
//! - Writes the surviving entries, headers and content untouched, as one tar
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use ocidist::{
//!     management::{self, MergeImageConfig},
//!     merge::OutputTarget,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MergeImageConfig::builder()
//!         .layout("/path/to/layout")
//!         .name("alpine:3.20")
//!         .platform("linux/arm64".parse()?)
//!         .target(OutputTarget::File("rootfs.tar".into()))
//!         .build();
//!
//!     let summary = management::merge_image(config).await?;
//!     println!("{} entries written", summary.entries_emitted);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`management`] - Async command orchestration
//! - [`merge`] - Whiteout handling, the two-pass layer merge and the output writer
//! - [`oci`] - Layout access, descriptor classification and image resolution
//! - [`utils`] - Common constants and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod management;
pub mod merge;
pub mod oci;
pub mod utils;

pub use error::*;
