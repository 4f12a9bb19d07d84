//! Utility functions and types.

mod file;
mod path;
mod term;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use file::*;
pub use path::*;
pub use term::*;
