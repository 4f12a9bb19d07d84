//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The file that marks a directory as an OCI image layout.
pub const OCI_LAYOUT_FILENAME: &str = "oci-layout";

/// The root index of an OCI image layout.
pub const OCI_INDEX_FILENAME: &str = "index.json";

/// The sub directory of an OCI image layout where blobs are stored by digest.
pub const OCI_BLOBS_SUBDIR: &str = "blobs";

/// The layout version written by [`crate::oci::OciLayout::open_or_init`].
pub const OCI_LAYOUT_VERSION: &str = "1.0.0";

/// The annotation holding an image's reference name in a layout index.
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// The annotation containerd uses for the full image name.
pub const ANNOTATION_CONTAINERD_IMAGE_NAME: &str = "io.containerd.image.name";

/// The annotation used to mark attestation manifests inside an index.
pub const DOCKER_REFERENCE_TYPE_ANNOTATION: &str = "vnd.docker.reference.type";

/// The path given on the command line to mean standard input/output.
pub const STDIO_PATH: &str = "-";
