use std::{
    io::{self, Write},
    path::PathBuf,
};

use oci_spec::image::Descriptor;

use crate::{
    merge::{OutputSink, OutputTarget},
    oci::{parse_digest, resolve_image, OciLayout, PlatformSpec},
    OcidistResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A resolved document together with the exact bytes it was stored as.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// The descriptor the bytes were read through.
    pub descriptor: Descriptor,

    /// The verified blob bytes.
    pub raw: Vec<u8>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RawDocument {
    /// Renders the document, re-indented when `pretty` is set.
    pub fn render(&self, pretty: bool) -> OcidistResult<String> {
        if !pretty {
            return Ok(String::from_utf8_lossy(&self.raw).into_owned());
        }

        let value: serde_json::Value = serde_json::from_slice(&self.raw)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Fetches the manifest `name` resolves to for `platform`.
pub async fn inspect_manifest(
    layout: impl Into<PathBuf>,
    name: impl Into<String>,
    platform: PlatformSpec,
) -> OcidistResult<RawDocument> {
    let (layout, name) = (layout.into(), name.into());
    tokio::task::spawn_blocking(move || -> OcidistResult<RawDocument> {
        let layout = OciLayout::open(layout)?;
        let image = resolve_image(&layout, &name, &platform)?;
        let descriptor = image.get_descriptor().clone();
        let raw = layout.read_verified(&descriptor)?;
        Ok(RawDocument { descriptor, raw })
    })
    .await?
}

/// Fetches the image configuration of the image `name` resolves to for `platform`.
pub async fn inspect_config(
    layout: impl Into<PathBuf>,
    name: impl Into<String>,
    platform: PlatformSpec,
) -> OcidistResult<RawDocument> {
    let (layout, name) = (layout.into(), name.into());
    tokio::task::spawn_blocking(move || -> OcidistResult<RawDocument> {
        let layout = OciLayout::open(layout)?;
        let image = resolve_image(&layout, &name, &platform)?;
        let descriptor = image.get_manifest().config().clone();

        // Parse once so a damaged config is reported as corrupt rather than printed.
        layout.read_config(&descriptor)?;
        let raw = layout.read_verified(&descriptor)?;
        Ok(RawDocument { descriptor, raw })
    })
    .await?
}

/// Copies the blob for `digest` to `target` after checking it hashes to `digest`.
///
/// Returns the number of bytes written.
pub async fn copy_blob(
    layout: impl Into<PathBuf>,
    digest: impl Into<String>,
    target: OutputTarget,
) -> OcidistResult<u64> {
    let (layout, digest) = (layout.into(), digest.into());
    tokio::task::spawn_blocking(move || -> OcidistResult<u64> {
        let layout = OciLayout::open(layout)?;
        let digest = parse_digest(&digest)?;

        layout.verify_digest(&digest)?;

        let mut blob = layout.open_blob(&digest)?;
        let mut sink = OutputSink::create(&target)?;
        let copied = io::copy(&mut blob, &mut sink)?;
        sink.flush()?;
        sink.commit()?;

        tracing::info!("copied {copied} bytes of {digest} to {target}");
        Ok(copied)
    })
    .await?
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
