use std::io::{self, Read, Write};

use getset::Getters;
use tar::{Archive, Builder, Entry, EntryType};
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::{OcidistError, OcidistResult};

use super::{BoxedLayerSource, EntryKind, FileIndex, LayerSource};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const PAX_PATH: &str = "path";

const PAX_LINKPATH: &str = "linkpath";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What to emit when a surviving path was written by more than one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Emit every occurrence from every layer, in layer order.
    #[default]
    Union,

    /// Emit only the occurrences from the highest layer that wrote the path.
    LastWins,
}

/// Options controlling a merge.
#[derive(Debug, Clone, Default, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct MergeOptions {
    /// How duplicate paths across layers are emitted.
    #[builder(default)]
    duplicate_policy: DuplicatePolicy,

    /// Checked before each layer in both passes.
    #[builder(default, setter(strip_option))]
    cancel: Option<CancellationToken>,
}

/// Counters collected while merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Number of layers processed.
    pub layers: usize,

    /// Regular entries seen during the index pass.
    pub entries_indexed: usize,

    /// Entries written to the output.
    pub entries_emitted: usize,

    /// Entries dropped during the emit pass, markers included.
    pub entries_skipped: usize,

    /// Whiteout and opaque markers applied.
    pub whiteouts: usize,

    /// Paths surviving after the last layer.
    pub surviving_paths: usize,
}

/// Flattens an ordered chain of layers into a single tar stream.
///
/// The first pass reads only headers and computes the [`FileIndex`] of paths that survive every
/// whiteout. The second pass reopens each layer and copies surviving entries, header and content,
/// to the output in layer-then-entry order.
#[derive(Debug, Clone, Default)]
pub struct LayerMerger {
    options: MergeOptions,
}

struct TrackedReader<'a, R> {
    inner: R,
    failed: &'a mut bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LayerMerger {
    /// Creates a merger with the given options.
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Merges `layers`, bottom-most first, into `archive` and finishes it.
    pub fn merge_into<W: Write>(
        &self,
        layers: &[BoxedLayerSource],
        archive: &mut Builder<W>,
    ) -> OcidistResult<MergeSummary> {
        let mut summary = MergeSummary {
            layers: layers.len(),
            ..Default::default()
        };

        let index = self.build_index(layers, &mut summary)?;
        summary.surviving_paths = index.len();
        tracing::debug!(
            "file index built: {} surviving paths, {} markers applied",
            summary.surviving_paths,
            summary.whiteouts
        );

        for (layer, source) in layers.iter().enumerate() {
            self.check_cancelled(layer)?;
            self.emit_layer(layer, source.as_ref(), &index, archive, &mut summary)?;
        }

        archive.finish()?;

        Ok(summary)
    }

    /// Runs only the index pass and returns the surviving paths.
    pub fn index(&self, layers: &[BoxedLayerSource]) -> OcidistResult<FileIndex> {
        self.build_index(layers, &mut MergeSummary::default())
    }

    fn build_index(
        &self,
        layers: &[BoxedLayerSource],
        summary: &mut MergeSummary,
    ) -> OcidistResult<FileIndex> {
        let mut index = FileIndex::new();
        for (layer, source) in layers.iter().enumerate() {
            self.check_cancelled(layer)?;
            index_layer(layer, source.as_ref(), &mut index, summary)?;
        }

        Ok(index)
    }

    fn emit_layer<W: Write>(
        &self,
        layer: usize,
        source: &dyn LayerSource,
        index: &FileIndex,
        archive: &mut Builder<W>,
        summary: &mut MergeSummary,
    ) -> OcidistResult<()> {
        tracing::debug!("emitting layer {layer} ({})", source.describe());

        let mut input = Archive::new(open_layer(layer, source)?);
        let entries = input
            .entries()
            .map_err(|source| OcidistError::MalformedArchive { layer, source })?;

        for entry in entries {
            let mut entry = entry.map_err(|source| OcidistError::MalformedArchive { layer, source })?;
            if is_skipped(&entry) {
                continue;
            }

            let raw = entry.path_bytes().into_owned();
            let keep = match EntryKind::classify(&raw) {
                Some(EntryKind::Regular { path }) => self.survives(index, &path, layer),
                _ => false,
            };

            let name = display_name(&raw);
            if !keep {
                tracing::trace!("layer {layer}: skipping {name}");
                summary.entries_skipped += 1;
                continue;
            }

            tracing::trace!("layer {layer}: writing {name}");
            copy_entry(layer, &name, &mut entry, archive)?;
            summary.entries_emitted += 1;
        }

        Ok(())
    }

    fn survives(&self, index: &FileIndex, path: &[u8], layer: usize) -> bool {
        match self.options.duplicate_policy {
            DuplicatePolicy::Union => index.contains(path),
            DuplicatePolicy::LastWins => index.last_layer(path) == Some(layer),
        }
    }

    fn check_cancelled(&self, layer: usize) -> OcidistResult<()> {
        match &self.options.cancel {
            Some(token) if token.is_cancelled() => {
                tracing::warn!("merge cancelled before layer {layer}");
                Err(OcidistError::Cancelled(layer))
            }
            _ => Ok(()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Merges `layers` into `writer` with default options, returning the writer once the archive
/// trailer has been written.
pub fn apply_layers<W: Write>(writer: W, layers: &[BoxedLayerSource]) -> OcidistResult<W> {
    let mut archive = Builder::new(writer);
    LayerMerger::default().merge_into(layers, &mut archive)?;
    Ok(archive.into_inner()?)
}

/// Indexes one layer. Its markers apply to what lower layers left behind before its own
/// entries are recorded.
fn index_layer(
    layer: usize,
    source: &dyn LayerSource,
    index: &mut FileIndex,
    summary: &mut MergeSummary,
) -> OcidistResult<()> {
    tracing::debug!("indexing layer {layer} ({})", source.describe());

    let mut input = Archive::new(open_layer(layer, source)?);
    let entries = input
        .entries()
        .map_err(|source| OcidistError::MalformedArchive { layer, source })?;

    let mut markers = Vec::new();
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| OcidistError::MalformedArchive { layer, source })?;
        if is_skipped(&entry) {
            continue;
        }

        let raw = entry.path_bytes();
        match EntryKind::classify(&raw) {
            Some(EntryKind::Regular { path }) => paths.push(path),
            Some(marker) => markers.push(marker),
            None => tracing::warn!(
                "layer {layer}: ignoring whiteout without a name: {}",
                display_name(&raw)
            ),
        }
    }

    for marker in markers {
        let removed = match &marker {
            EntryKind::Opaque { dir } => index.remove_children(dir),
            EntryKind::Whiteout { target } => index.remove_subtree(target),
            EntryKind::Regular { .. } => 0,
        };
        tracing::trace!("layer {layer}: {marker:?} removed {removed} paths");
        summary.whiteouts += 1;
    }

    summary.entries_indexed += paths.len();
    for path in paths {
        index.record(path, layer);
    }

    Ok(())
}

fn open_layer(layer: usize, source: &dyn LayerSource) -> OcidistResult<Box<dyn Read + Send>> {
    source.open().map_err(|e| match e {
        OcidistError::Io(source) => OcidistError::LayerOpen { layer, source },
        other => other,
    })
}

fn is_skipped<R: Read>(entry: &Entry<'_, R>) -> bool {
    entry.header().entry_type() == EntryType::XGlobalHeader
}

/// Entry names are raw bytes; this rendering is only for logs and errors.
fn display_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Copies one entry verbatim. Names that came from GNU long-name records are carried over as PAX
/// records, since the raw header only holds a truncated copy.
fn copy_entry<R: Read, W: Write>(
    layer: usize,
    raw: &str,
    entry: &mut Entry<'_, R>,
    archive: &mut Builder<W>,
) -> OcidistResult<()> {
    let malformed = |source| OcidistError::MalformedArchive { layer, source };
    let write_failed = |source| OcidistError::OutputWrite {
        layer,
        path: raw.to_string(),
        source,
    };

    // The reader expands sparse data, so the on-disk header no longer describes the content.
    if entry.header().entry_type() == EntryType::GNUSparse {
        return Err(malformed(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot copy gnu sparse entry {raw}"),
        )));
    }

    let header = entry.header().clone();
    let mut extensions: Vec<(String, Vec<u8>)> = Vec::new();
    if let Some(pax) = entry.pax_extensions().map_err(malformed)? {
        for extension in pax {
            let extension = extension.map_err(malformed)?;
            let key = extension
                .key()
                .map_err(|e| malformed(io::Error::new(io::ErrorKind::InvalidData, e)))?;
            extensions.push((key.to_string(), extension.value_bytes().to_vec()));
        }
    }

    let has_key = |extensions: &[(String, Vec<u8>)], key: &str| {
        extensions.iter().any(|(k, _)| k == key)
    };

    let full_path = entry.path_bytes().into_owned();
    if header.path_bytes().as_ref() != full_path.as_slice() && !has_key(&extensions, PAX_PATH) {
        extensions.push((PAX_PATH.to_string(), full_path));
    }

    if let Some(link) = entry.link_name_bytes() {
        let link = link.into_owned();
        if header.link_name_bytes().as_deref() != Some(link.as_slice())
            && !has_key(&extensions, PAX_LINKPATH)
        {
            extensions.push((PAX_LINKPATH.to_string(), link));
        }
    }

    if !extensions.is_empty() {
        archive
            .append_pax_extensions(extensions.iter().map(|(k, v)| (k.as_str(), v.as_slice())))
            .map_err(write_failed)?;
    }

    let mut read_failed = false;
    let result = archive.append(
        &header,
        TrackedReader {
            inner: entry,
            failed: &mut read_failed,
        },
    );

    match result {
        Ok(()) => Ok(()),
        Err(source) if read_failed => Err(malformed(source)),
        Err(source) => Err(write_failed(source)),
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<R: Read> Read for TrackedReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|_| *self.failed = true)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
