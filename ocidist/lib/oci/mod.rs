//! On-disk OCI image layouts.
//!
//! This module provides functionality for:
//! - Opening and initializing content-addressable layout directories
//! - Classifying descriptors as images or indexes by media type
//! - Resolving an image name, and a platform within a multi-platform index, to a manifest
//! - Reading layer blobs as uncompressed tar streams

mod layer;
mod layout;
mod node;
mod platform;
mod resolve;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use layer::*;
pub use layout::*;
pub use node::*;
pub use platform::*;
pub use resolve::*;
