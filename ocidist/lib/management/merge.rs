use std::{future::Future, io, path::PathBuf};

use getset::Getters;
use typed_builder::TypedBuilder;

use crate::{
    merge::{LayerMerger, MergeOptions, MergeSummary, OutputTarget, StreamWriter},
    oci::{resolve_image, OciLayout, PlatformSpec},
    OcidistResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Everything needed to flatten one image from a layout.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct MergeImageConfig {
    /// The layout root.
    #[builder(setter(into))]
    layout: PathBuf,

    /// The image name, as annotated in the root index, or a root descriptor digest.
    #[builder(setter(into))]
    name: String,

    /// The platform to select when the name refers to an index.
    #[builder(default)]
    platform: PlatformSpec,

    /// Where the flattened tar goes.
    target: OutputTarget,

    /// Merge engine options.
    #[builder(default)]
    options: MergeOptions,

    /// Hash every layer blob against its digest before merging.
    #[builder(default)]
    verify: bool,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolves an image in a layout and writes its flattened root filesystem as a single tar.
///
/// Resolution happens before the output is opened, so a missing name or platform never creates
/// a file. On any later failure, including cancellation, the staged output is discarded and an
/// existing file at the target is left as it was.
///
/// ## Errors
///
/// Returns an error if:
/// * The layout does not exist or is not a valid OCI layout
/// * The name or platform cannot be resolved
/// * A layer is missing, corrupt or not a readable tar stream
/// * Writing the output fails
pub async fn merge_image(config: MergeImageConfig) -> OcidistResult<MergeSummary> {
    tokio::task::spawn_blocking(move || merge_image_blocking(&config)).await?
}

/// Runs [`merge_image`] until it finishes or `interrupt` resolves.
///
/// When `interrupt` resolves with `Ok` the merge is cancelled at its next layer boundary and
/// fails with [`OcidistError::Cancelled`](crate::OcidistError::Cancelled). When it resolves with
/// an error, such as a signal handler that could not be installed, the merge simply runs to
/// completion.
pub async fn merge_image_interruptible(
    mut config: MergeImageConfig,
    interrupt: impl Future<Output = io::Result<()>>,
) -> OcidistResult<MergeSummary> {
    let cancel = config.options.get_cancel().clone().unwrap_or_default();
    config.options = MergeOptions::builder()
        .duplicate_policy(*config.options.get_duplicate_policy())
        .cancel(cancel.clone())
        .build();

    let merge = merge_image(config);
    tokio::pin!(merge);

    tokio::select! {
        result = &mut merge => result,
        signal = interrupt => {
            match signal {
                Ok(()) => {
                    tracing::warn!("interrupted, cancelling merge");
                    cancel.cancel();
                }
                Err(e) => tracing::warn!("cannot listen for interrupts: {e}"),
            }
            merge.await
        }
    }
}

fn merge_image_blocking(config: &MergeImageConfig) -> OcidistResult<MergeSummary> {
    let layout = OciLayout::open(&config.layout)?;
    let image = resolve_image(&layout, &config.name, &config.platform)?;
    tracing::info!(
        "merging {} ({}, {} layers) into {}",
        config.name,
        image.get_descriptor().digest(),
        image.layers().len(),
        config.target
    );

    let layers = image.layer_sources(&layout, config.verify)?;
    let mut writer = StreamWriter::create(config.target.clone())?;
    let summary = LayerMerger::new(config.options.clone()).merge_into(&layers, writer.archive())?;
    writer.finish()?;

    tracing::info!(
        "emitted {} entries, skipped {}, applied {} whiteouts",
        summary.entries_emitted,
        summary.entries_skipped,
        summary.whiteouts
    );

    Ok(summary)
}
