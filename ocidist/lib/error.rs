use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an ocidist-related operation.
pub type OcidistResult<T> = Result<T, OcidistError>;

/// An error that occurred while resolving, reading or flattening an image.
#[derive(pretty_error_debug::Debug, Error)]
pub enum OcidistError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A name, digest or platform is absent from the layout.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path is not a usable OCI layout.
    #[error("invalid oci layout at {path}: {reason}")]
    InvalidLayout {
        /// The layout root.
        path: PathBuf,

        /// Why the layout was rejected.
        reason: String,
    },

    /// An index, manifest or config blob does not parse.
    #[error("corrupt {what} in layout {layout}: {reason}")]
    Corrupt {
        /// The layout root.
        layout: PathBuf,

        /// The object that failed to parse, usually a digest.
        what: String,

        /// The parser error.
        reason: String,
    },

    /// A blob's content does not hash to its digest.
    #[error("digest mismatch for {digest}: content hashes to {actual}")]
    DigestMismatch {
        /// The expected digest.
        digest: String,

        /// The hex digest actually computed.
        actual: String,
    },

    /// A layer's tar structure could not be parsed.
    #[error("malformed archive in layer {layer}: {source}")]
    MalformedArchive {
        /// Index of the layer, bottom-most is 0.
        layer: usize,

        /// The underlying tar error.
        #[source]
        source: io::Error,
    },

    /// A layer stream could not be opened.
    #[error("failed to open layer {layer}: {source}")]
    LayerOpen {
        /// Index of the layer, bottom-most is 0.
        layer: usize,

        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Writing an entry to the output archive failed.
    #[error("failed to write {path} from layer {layer}: {source}")]
    OutputWrite {
        /// Index of the layer the entry came from.
        layer: usize,

        /// The entry path.
        path: String,

        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The merge was cancelled at a layer boundary.
    #[error("merge cancelled before layer {0}")]
    Cancelled(usize),

    /// A platform string could not be parsed.
    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    /// A digest string could not be parsed.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// A layer has a media type that cannot be unpacked as tar.
    #[error("unsupported layer media type: {0}")]
    UnsupportedMediaType(String),

    /// Binary output was requested on a terminal.
    #[error("refusing to write binary output to a terminal; pass --target <FILE> or redirect stdout")]
    TerminalOutput,

    /// A digest uses an algorithm we cannot verify.
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),

    /// An error that occurred when serializing JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred when building OCI spec types.
    #[error("oci spec error: {0}")]
    OciSpec(#[from] oci_spec::OciSpecError),

    /// An error that occurred when a blocking task failed to join.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),
}

/// The coarse category of an [`OcidistError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcidistErrorKind {
    /// A name, digest or platform is absent.
    NotFound,

    /// Layout metadata or blob content is damaged.
    Corrupt,

    /// A layer tar stream is structurally invalid.
    MalformedArchive,

    /// Opening, reading or writing a stream failed.
    Io,

    /// The caller supplied an unusable value.
    Invalid,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OcidistError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> OcidistError {
        OcidistError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns the category this error belongs to.
    pub fn kind(&self) -> OcidistErrorKind {
        match self {
            OcidistError::NotFound(_) => OcidistErrorKind::NotFound,
            OcidistError::InvalidLayout { .. }
            | OcidistError::Corrupt { .. }
            | OcidistError::DigestMismatch { .. }
            | OcidistError::Json(_) => OcidistErrorKind::Corrupt,
            OcidistError::MalformedArchive { .. } => OcidistErrorKind::MalformedArchive,
            OcidistError::Io(_)
            | OcidistError::LayerOpen { .. }
            | OcidistError::OutputWrite { .. }
            | OcidistError::Cancelled(_)
            | OcidistError::JoinError(_)
            | OcidistError::Custom(_) => OcidistErrorKind::Io,
            OcidistError::InvalidPlatform(_)
            | OcidistError::InvalidDigest(_)
            | OcidistError::UnsupportedMediaType(_)
            | OcidistError::UnsupportedDigestAlgorithm(_)
            | OcidistError::TerminalOutput
            | OcidistError::OciSpec(_) => OcidistErrorKind::Invalid,
        }
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `OcidistResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> OcidistResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
