//! Layer flattening.
//!
//! This module turns an ordered chain of layer tar streams into a single tar stream holding the
//! entries a union mount of those layers would show:
//!
//! 1. Index pass
//!    - Reads only entry headers, bottom layer first
//!    - Applies `.wh.<name>` whiteouts and `.wh..wh..opq` opaque markers to lower layers
//!    - Records every surviving path and the last layer that wrote it
//!
//! 2. Emit pass
//!    - Reopens each layer in the same order
//!    - Copies surviving entries verbatim, headers and content
//!    - Never emits a marker
//!
//! # Examples
//!
//! ```no_run
//! use std::{fs::File, io};
//!
//! use ocidist::merge::{apply_layers, BoxedLayerSource};
//!
//! # fn example() -> anyhow::Result<()> {
//! let layers: Vec<BoxedLayerSource> = vec![
//!     Box::new(|| File::open("base.tar")),
//!     Box::new(|| File::open("app.tar")),
//! ];
//!
//! apply_layers(io::stdout(), &layers)?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod index;
mod source;
mod whiteout;
mod writer;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use engine::*;
pub use index::*;
pub use source::*;
pub use whiteout::*;
pub use writer::*;
