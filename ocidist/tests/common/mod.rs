#![allow(dead_code)]

use std::{collections::HashMap, io::Read, io::Write, path::Path};

use flate2::{write::GzEncoder, Compression};
use oci_spec::image::{
    Arch, Descriptor, DescriptorBuilder, ImageIndexBuilder, ImageManifestBuilder, MediaType, Os,
    PlatformBuilder,
};
use ocidist::{oci::OciLayout, utils::ANNOTATION_REF_NAME};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

pub const LAYER_TAR: &str = "application/vnd.oci.image.layer.v1.tar";

pub const LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

pub const LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";

const CONFIG: &str = r#"{"architecture":"amd64","os":"linux","rootfs":{"type":"layers","diff_ids":[]},"config":{}}"#;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds a tar from `(name, content)` pairs, writing names into the raw header as given.
///
/// Names ending in `/` become directories.
pub fn tar_layer(files: &[(&str, &str)]) -> anyhow::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_ustar();
        let (entry_type, mode) = if name.ends_with('/') {
            (tar::EntryType::Directory, 0o755)
        } else {
            (tar::EntryType::Regular, 0o644)
        };
        header.set_entry_type(entry_type);
        header.as_mut_bytes()[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_mtime(1_700_000_000);
        header.set_cksum();
        builder.append(&header, content.as_bytes())?;
    }
    Ok(builder.into_inner()?)
}

pub fn gzip(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

pub fn zstd(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    Ok(zstd::encode_all(bytes, 0)?)
}

/// Writes a config, the given layers and a manifest into `layout` and returns the manifest
/// descriptor. Nothing is added to the root index.
pub fn push_manifest(
    layout: &OciLayout,
    layers: Vec<(&str, Vec<u8>)>,
) -> anyhow::Result<Descriptor> {
    let config = layout.write_blob(MediaType::ImageConfig, CONFIG.as_bytes())?;
    let layers = layers
        .into_iter()
        .map(|(media_type, bytes)| layout.write_blob(media_type, &bytes))
        .collect::<Result<Vec<_>, _>>()?;

    let manifest = ImageManifestBuilder::default()
        .schema_version(2_u32)
        .media_type(MediaType::ImageManifest)
        .config(config)
        .layers(layers)
        .build()?;

    Ok(layout.write_blob(MediaType::ImageManifest, &serde_json::to_vec(&manifest)?)?)
}

/// Writes an index over `children` and returns its descriptor.
pub fn push_index(layout: &OciLayout, children: Vec<Descriptor>) -> anyhow::Result<Descriptor> {
    let index = ImageIndexBuilder::default()
        .schema_version(2_u32)
        .media_type(MediaType::ImageIndex)
        .manifests(children)
        .build()?;
    Ok(layout.write_blob(MediaType::ImageIndex, &serde_json::to_vec(&index)?)?)
}

/// Returns `descriptor` tagged with a linux platform.
pub fn for_platform(descriptor: &Descriptor, architecture: &str) -> anyhow::Result<Descriptor> {
    let platform = PlatformBuilder::default()
        .os(Os::Linux)
        .architecture(Arch::from(architecture))
        .build()?;
    Ok(DescriptorBuilder::default()
        .media_type(descriptor.media_type().clone())
        .digest(descriptor.digest().clone())
        .size(descriptor.size())
        .platform(platform)
        .build()?)
}

/// Adds `descriptor` to the root index under `name`.
pub fn tag(layout: &OciLayout, descriptor: &Descriptor, name: &str) -> anyhow::Result<()> {
    let mut descriptor = descriptor.clone();
    let mut annotations = HashMap::new();
    annotations.insert(ANNOTATION_REF_NAME.to_string(), name.to_string());
    descriptor.set_annotations(Some(annotations));
    layout.push_root_descriptor(descriptor)?;
    Ok(())
}

/// Reads a tar into `(name, content)` pairs, in order.
pub fn read_entries(reader: impl Read) -> anyhow::Result<Vec<(String, String)>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        entries.push((name, content));
    }
    Ok(entries)
}

pub fn read_names(path: &Path) -> anyhow::Result<Vec<String>> {
    Ok(read_entries(std::fs::File::open(path)?)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

/// Lists the files left in `dir`, ignoring the layout directory.
pub fn stray_files(dir: &Path) -> anyhow::Result<Vec<String>> {
    Ok(std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "layout")
        .collect())
}
