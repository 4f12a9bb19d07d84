use getset::Getters;
use oci_spec::image::{Descriptor, ImageManifest};

use crate::{
    merge::BoxedLayerSource,
    utils::{ANNOTATION_CONTAINERD_IMAGE_NAME, ANNOTATION_REF_NAME},
    OcidistError, OcidistResult,
};

use super::{is_attestation, BlobLayer, OciLayout, PlatformSpec, ResolvedNode};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A single-platform image located in a layout.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ResolvedImage {
    /// The manifest descriptor.
    descriptor: Descriptor,

    /// The parsed manifest.
    manifest: ImageManifest,

    /// The index the manifest was selected from, if any.
    index: Option<Descriptor>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ResolvedImage {
    /// The image's layers, bottom-most first.
    pub fn layers(&self) -> &[Descriptor] {
        self.manifest.layers()
    }

    /// Opens a layer source for every layer of the image.
    ///
    /// With `verify` set each layer blob is hashed against its digest first.
    pub fn layer_sources(
        &self,
        layout: &OciLayout,
        verify: bool,
    ) -> OcidistResult<Vec<BoxedLayerSource>> {
        self.layers()
            .iter()
            .map(|descriptor| -> OcidistResult<BoxedLayerSource> {
                if verify {
                    layout.verify_blob(descriptor)?;
                }

                Ok(Box::new(BlobLayer::new(layout, descriptor)?))
            })
            .collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolves `name` to a single-platform image inside `layout`.
///
/// A root entry naming an image manifest wins outright. Otherwise a root entry naming an index is
/// opened and its first child matching `platform` is taken. `name` may also be the digest of a
/// root entry.
///
/// ## Errors
///
/// * [`OcidistError::NotFound`] if nothing in the root index carries `name`, or if the matching
///   index has no child for `platform`.
/// * [`OcidistError::Corrupt`] if the root index, the index or the manifest cannot be parsed.
pub fn resolve_image(
    layout: &OciLayout,
    name: &str,
    platform: &PlatformSpec,
) -> OcidistResult<ResolvedImage> {
    let root = layout.root_index()?;
    let nodes = find_named(root.manifests(), name);

    if let Some(descriptor) = nodes.iter().find_map(|node| match node {
        ResolvedNode::Image(d) => Some(d),
        ResolvedNode::Index(_) => None,
    }) {
        tracing::debug!("{name} resolves to image {}", descriptor.digest());
        return Ok(ResolvedImage {
            manifest: layout.read_manifest(descriptor)?,
            descriptor: descriptor.clone(),
            index: None,
        });
    }

    let Some(index_descriptor) = nodes.iter().find_map(|node| match node {
        ResolvedNode::Index(d) => Some(d),
        ResolvedNode::Image(_) => None,
    }) else {
        return Err(OcidistError::NotFound(format!(
            "image {name} in layout {}",
            layout.get_root().display()
        )));
    };

    tracing::debug!(
        "{name} resolves to index {}, selecting {platform}",
        index_descriptor.digest()
    );

    let index = layout.read_index(index_descriptor)?;
    let descriptor = select_platform(index.manifests(), platform).ok_or_else(|| {
        OcidistError::NotFound(format!(
            "platform {platform} in index {} for {name}",
            index_descriptor.digest()
        ))
    })?;

    tracing::debug!("selected manifest {} for {platform}", descriptor.digest());
    Ok(ResolvedImage {
        manifest: layout.read_manifest(descriptor)?,
        descriptor: descriptor.clone(),
        index: Some(index_descriptor.clone()),
    })
}

/// Returns every manifest or index descriptor named `name`, in listed order.
pub fn find_named(descriptors: &[Descriptor], name: &str) -> Vec<ResolvedNode> {
    descriptors
        .iter()
        .filter(|d| descriptor_name(d) == Some(name) || d.digest().to_string() == name)
        .filter_map(ResolvedNode::classify)
        .collect()
}

/// Picks the first image manifest in `descriptors` whose platform satisfies `platform`.
///
/// Attestation manifests and entries without a platform never match.
pub fn select_platform<'a>(
    descriptors: &'a [Descriptor],
    platform: &PlatformSpec,
) -> Option<&'a Descriptor> {
    descriptors.iter().find(|d| {
        !is_attestation(d)
            && matches!(ResolvedNode::classify(d), Some(ResolvedNode::Image(_)))
            && d.platform().as_ref().is_some_and(|p| platform.matches(p))
    })
}

/// The name a root index entry is known by.
pub fn descriptor_name(descriptor: &Descriptor) -> Option<&str> {
    let annotations = descriptor.annotations().as_ref()?;
    annotations
        .get(ANNOTATION_REF_NAME)
        .or_else(|| annotations.get(ANNOTATION_CONTAINERD_IMAGE_NAME))
        .map(String::as_str)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use oci_spec::image::{
        Arch, DescriptorBuilder, ImageIndexBuilder, ImageManifestBuilder, MediaType, Os,
        PlatformBuilder,
    };
    use tempfile::TempDir;

    use crate::OcidistErrorKind;

    use super::*;

    #[test]
    fn test_resolve_direct_image_without_platform() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let manifest = helper::push_manifest(&layout, b"base")?;
        layout.push_root_descriptor(helper::named(manifest.clone(), "alpine:3.20"))?;

        // A platform that matches nothing is irrelevant for direct images.
        let image = resolve_image(&layout, "alpine:3.20", &"plan9/mips".parse()?)?;
        assert_eq!(image.get_descriptor().digest(), manifest.digest());
        assert!(image.get_index().is_none());
        assert_eq!(image.layers().len(), 1);
        Ok(())
    }

    #[test]
    fn test_resolve_index_by_platform() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let amd64 = helper::push_manifest(&layout, b"amd64")?;
        let arm64 = helper::push_manifest(&layout, b"arm64")?;
        let index = helper::push_index(
            &layout,
            vec![
                helper::with_platform(amd64.clone(), "amd64", None)?,
                helper::with_platform(arm64.clone(), "arm64", Some("v8"))?,
            ],
        )?;
        layout.push_root_descriptor(helper::named(index.clone(), "busybox"))?;

        let image = resolve_image(&layout, "busybox", &"linux/arm64".parse()?)?;
        assert_eq!(image.get_descriptor().digest(), arm64.digest());
        assert_eq!(image.get_index().as_ref().map(|d| d.digest()), Some(index.digest()));

        let err = resolve_image(&layout, "busybox", &"linux/s390x".parse()?).unwrap_err();
        assert_eq!(err.kind(), OcidistErrorKind::NotFound);
        Ok(())
    }

    #[test]
    fn test_resolve_first_matching_child_wins() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let first = helper::push_manifest(&layout, b"first")?;
        let second = helper::push_manifest(&layout, b"second")?;
        let index = helper::push_index(
            &layout,
            vec![
                helper::with_platform(first.clone(), "amd64", None)?,
                helper::with_platform(second, "amd64", None)?,
            ],
        )?;
        layout.push_root_descriptor(helper::named(index, "dup"))?;

        let image = resolve_image(&layout, "dup", &"linux/amd64".parse()?)?;
        assert_eq!(image.get_descriptor().digest(), first.digest());
        Ok(())
    }

    #[test]
    fn test_resolve_skips_attestations() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let attestation = helper::push_manifest(&layout, b"attestation")?;
        let real = helper::push_manifest(&layout, b"real")?;

        let mut attestation = helper::with_platform(attestation, "amd64", None)?;
        let mut annotations = HashMap::new();
        annotations.insert(
            crate::utils::DOCKER_REFERENCE_TYPE_ANNOTATION.to_string(),
            "attestation-manifest".to_string(),
        );
        attestation.set_annotations(Some(annotations));

        let index = helper::push_index(
            &layout,
            vec![attestation, helper::with_platform(real.clone(), "amd64", None)?],
        )?;
        layout.push_root_descriptor(helper::named(index, "signed"))?;

        let image = resolve_image(&layout, "signed", &"linux/amd64".parse()?)?;
        assert_eq!(image.get_descriptor().digest(), real.digest());
        Ok(())
    }

    #[test]
    fn test_resolve_unknown_name_is_not_found() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let manifest = helper::push_manifest(&layout, b"x")?;
        layout.push_root_descriptor(helper::named(manifest, "present"))?;

        let err = resolve_image(&layout, "absent", &PlatformSpec::host()).unwrap_err();
        assert_eq!(err.kind(), OcidistErrorKind::NotFound);
        Ok(())
    }

    #[test]
    fn test_resolve_by_digest_and_containerd_name() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let manifest = helper::push_manifest(&layout, b"containerd")?;

        let mut annotations = HashMap::new();
        annotations.insert(
            ANNOTATION_CONTAINERD_IMAGE_NAME.to_string(),
            "docker.io/library/debian:12".to_string(),
        );
        let mut root = manifest.clone();
        root.set_annotations(Some(annotations));
        layout.push_root_descriptor(root)?;

        let image = resolve_image(&layout, "docker.io/library/debian:12", &PlatformSpec::host())?;
        assert_eq!(image.get_descriptor().digest(), manifest.digest());

        let by_digest = resolve_image(
            &layout,
            &manifest.digest().to_string(),
            &PlatformSpec::host(),
        )?;
        assert_eq!(by_digest.get_descriptor().digest(), manifest.digest());
        Ok(())
    }

    #[test]
    fn test_resolve_corrupt_index_blob() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let index = layout.write_blob(MediaType::ImageIndex, b"{ broken")?;
        layout.push_root_descriptor(helper::named(index, "broken"))?;

        let err = resolve_image(&layout, "broken", &PlatformSpec::host()).unwrap_err();
        assert_eq!(err.kind(), OcidistErrorKind::Corrupt);
        Ok(())
    }

    mod helper {
        use super::*;

        /// Writes an empty config, one layer holding `seed`, and a manifest referencing both.
        pub(super) fn push_manifest(
            layout: &OciLayout,
            seed: &[u8],
        ) -> anyhow::Result<Descriptor> {
            let config = layout.write_blob(MediaType::ImageConfig, b"{}")?;
            let layer = layout.write_blob(MediaType::ImageLayer, seed)?;
            let manifest = ImageManifestBuilder::default()
                .schema_version(2_u32)
                .media_type(MediaType::ImageManifest)
                .config(config)
                .layers(vec![layer])
                .build()?;
            Ok(layout.write_blob(
                MediaType::ImageManifest,
                &serde_json::to_vec(&manifest)?,
            )?)
        }

        pub(super) fn push_index(
            layout: &OciLayout,
            children: Vec<Descriptor>,
        ) -> anyhow::Result<Descriptor> {
            let index = ImageIndexBuilder::default()
                .schema_version(2_u32)
                .media_type(MediaType::ImageIndex)
                .manifests(children)
                .build()?;
            Ok(layout.write_blob(MediaType::ImageIndex, &serde_json::to_vec(&index)?)?)
        }

        pub(super) fn with_platform(
            descriptor: Descriptor,
            architecture: &str,
            variant: Option<&str>,
        ) -> anyhow::Result<Descriptor> {
            let mut platform = PlatformBuilder::default()
                .os(Os::Linux)
                .architecture(Arch::from(architecture));
            if let Some(variant) = variant {
                platform = platform.variant(variant.to_string());
            }
            let platform = platform.build()?;
            Ok(DescriptorBuilder::default()
                .media_type(descriptor.media_type().clone())
                .digest(descriptor.digest().clone())
                .size(descriptor.size())
                .platform(platform)
                .build()?)
        }

        pub(super) fn named(mut descriptor: Descriptor, name: &str) -> Descriptor {
            let mut annotations = HashMap::new();
            annotations.insert(ANNOTATION_REF_NAME.to_string(), name.to_string());
            descriptor.set_annotations(Some(annotations));
            descriptor
        }
    }
}
