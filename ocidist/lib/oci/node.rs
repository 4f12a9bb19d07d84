use oci_spec::image::{Descriptor, MediaType};

use crate::utils::DOCKER_REFERENCE_TYPE_ANNOTATION;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Docker schema 2 image manifest.
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker schema 2 manifest list.
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A descriptor classified by the kind of document it points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedNode {
    /// A single-platform image manifest.
    Image(Descriptor),

    /// An index or manifest list fanning out to per-platform manifests.
    Index(Descriptor),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ResolvedNode {
    /// Classifies `descriptor` by its declared media type.
    ///
    /// Returns `None` for anything that is neither a manifest nor an index.
    pub fn classify(descriptor: &Descriptor) -> Option<Self> {
        let media_type = descriptor.media_type();
        if is_image_media_type(media_type) {
            Some(ResolvedNode::Image(descriptor.clone()))
        } else if is_index_media_type(media_type) {
            Some(ResolvedNode::Index(descriptor.clone()))
        } else {
            None
        }
    }

    /// The descriptor this node was classified from.
    pub fn descriptor(&self) -> &Descriptor {
        match self {
            ResolvedNode::Image(d) | ResolvedNode::Index(d) => d,
        }
    }

    /// A short label for logs and listings.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolvedNode::Image(_) => "image",
            ResolvedNode::Index(_) => "index",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns true for OCI image manifests and Docker schema 2 manifests.
pub fn is_image_media_type(media_type: &MediaType) -> bool {
    let media_type = media_type.to_string();
    media_type == MediaType::ImageManifest.to_string() || media_type == DOCKER_MANIFEST_MEDIA_TYPE
}

/// Returns true for OCI image indexes and Docker manifest lists.
pub fn is_index_media_type(media_type: &MediaType) -> bool {
    let media_type = media_type.to_string();
    media_type == MediaType::ImageIndex.to_string() || media_type == DOCKER_MANIFEST_LIST_MEDIA_TYPE
}

/// Returns true if the descriptor is an attestation or other reference artifact rather than a
/// runnable image.
pub fn is_attestation(descriptor: &Descriptor) -> bool {
    descriptor
        .annotations()
        .as_ref()
        .is_some_and(|a| a.contains_key(DOCKER_REFERENCE_TYPE_ANNOTATION))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use oci_spec::image::{DescriptorBuilder, Digest};

    use super::*;

    fn descriptor(media_type: &str) -> anyhow::Result<Descriptor> {
        let digest: Digest = format!("sha256:{}", "a".repeat(64)).parse()?;
        Ok(DescriptorBuilder::default()
            .media_type(media_type)
            .digest(digest)
            .size(10_u64)
            .build()?)
    }

    #[test]
    fn test_node_classify_by_media_type() -> anyhow::Result<()> {
        let cases = [
            ("application/vnd.oci.image.manifest.v1+json", Some("image")),
            (DOCKER_MANIFEST_MEDIA_TYPE, Some("image")),
            ("application/vnd.oci.image.index.v1+json", Some("index")),
            (DOCKER_MANIFEST_LIST_MEDIA_TYPE, Some("index")),
            ("application/vnd.oci.image.layer.v1.tar", None),
            ("application/vnd.in-toto+json", None),
        ];

        for (media_type, expected) in cases {
            let node = ResolvedNode::classify(&descriptor(media_type)?);
            assert_eq!(node.as_ref().map(|n| n.kind()), expected, "{media_type}");
        }
        Ok(())
    }

    #[test]
    fn test_node_detects_attestations() -> anyhow::Result<()> {
        let plain = descriptor(DOCKER_MANIFEST_MEDIA_TYPE)?;
        assert!(!is_attestation(&plain));

        let mut annotations = HashMap::new();
        annotations.insert(
            DOCKER_REFERENCE_TYPE_ANNOTATION.to_string(),
            "attestation-manifest".to_string(),
        );
        let mut attestation = plain.clone();
        attestation.set_annotations(Some(annotations));
        assert!(is_attestation(&attestation));
        Ok(())
    }
}
