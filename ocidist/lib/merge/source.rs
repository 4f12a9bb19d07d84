use std::io::{self, Read};

use crate::{OcidistError, OcidistResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A boxed layer source, as consumed by [`LayerMerger`](super::LayerMerger).
pub type BoxedLayerSource = Box<dyn LayerSource>;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Produces the uncompressed tar stream of one layer.
///
/// The merge engine opens every source twice, once per pass, so implementations must hand out
/// a fresh stream on each call.
pub trait LayerSource: Send + Sync {
    /// Opens a new stream positioned at the start of the layer.
    fn open(&self) -> OcidistResult<Box<dyn Read + Send>>;

    /// A short human readable label used in logs.
    fn describe(&self) -> String {
        "layer".to_string()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<F, R> LayerSource for F
where
    F: Fn() -> io::Result<R> + Send + Sync,
    R: Read + Send + 'static,
{
    fn open(&self) -> OcidistResult<Box<dyn Read + Send>> {
        let reader = self().map_err(OcidistError::Io)?;
        Ok(Box::new(reader))
    }
}
