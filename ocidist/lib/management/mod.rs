//! Command orchestration for the `ocidist` binary.
//!
//! Every function here is async and runs the synchronous layout and merge code on tokio's
//! blocking pool.

mod inspect;
mod layout;
mod merge;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use inspect::*;
pub use layout::*;
pub use merge::*;
