use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::PathBuf,
};

use flate2::read::MultiGzDecoder;
use oci_spec::image::{Descriptor, MediaType};

use crate::{merge::LayerSource, OcidistError, OcidistResult};

use super::OciLayout;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How a layer blob is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCompression {
    /// Plain tar.
    None,

    /// gzip, possibly multi-member.
    Gzip,

    /// zstd.
    Zstd,

    /// Sniff the first bytes of the blob.
    Detect,
}

/// A layer stored as a blob in an [`OciLayout`].
#[derive(Debug, Clone)]
pub struct BlobLayer {
    path: PathBuf,
    digest: String,
    compression: LayerCompression,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LayerCompression {
    /// Picks a decompressor from a layer media type.
    ///
    /// Types that mention tar without naming a known compression fall back to
    /// [`Detect`](LayerCompression::Detect).
    pub fn from_media_type(media_type: &MediaType) -> OcidistResult<Self> {
        let media_type = media_type.to_string();
        if media_type.ends_with("+gzip") || media_type.ends_with(".tar.gzip") {
            Ok(LayerCompression::Gzip)
        } else if media_type.ends_with("+zstd") {
            Ok(LayerCompression::Zstd)
        } else if media_type.ends_with(".tar") {
            Ok(LayerCompression::None)
        } else if media_type.contains("tar") {
            Ok(LayerCompression::Detect)
        } else {
            Err(OcidistError::UnsupportedMediaType(media_type))
        }
    }

    fn sniff(header: &[u8]) -> Self {
        if header.starts_with(GZIP_MAGIC) {
            LayerCompression::Gzip
        } else if header.starts_with(ZSTD_MAGIC) {
            LayerCompression::Zstd
        } else {
            LayerCompression::None
        }
    }
}

impl BlobLayer {
    /// Creates a layer for `descriptor`, failing early if the blob is absent.
    pub fn new(layout: &OciLayout, descriptor: &Descriptor) -> OcidistResult<Self> {
        let compression = LayerCompression::from_media_type(descriptor.media_type())?;
        let path = layout.blob_path(descriptor.digest());
        if !path.is_file() {
            return Err(OcidistError::NotFound(format!(
                "layer blob {} in layout {}",
                descriptor.digest(),
                layout.get_root().display()
            )));
        }

        Ok(Self {
            path,
            digest: descriptor.digest().to_string(),
            compression,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl LayerSource for BlobLayer {
    fn open(&self) -> OcidistResult<Box<dyn Read + Send>> {
        let mut reader = BufReader::new(File::open(&self.path)?);

        let compression = match self.compression {
            LayerCompression::Detect => LayerCompression::sniff(reader.fill_buf()?),
            other => other,
        };

        tracing::trace!("opening {} as {compression:?}", self.digest);
        let stream: Box<dyn Read + Send> = match compression {
            LayerCompression::Gzip => Box::new(MultiGzDecoder::new(reader)),
            LayerCompression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(reader)?),
            LayerCompression::None | LayerCompression::Detect => Box::new(reader),
        };

        Ok(stream)
    }

    fn describe(&self) -> String {
        self.digest.clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};
    use tempfile::TempDir;

    use super::*;

    fn tar_with(name: &str, content: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, content)?;
        Ok(builder.into_inner()?)
    }

    fn gzip(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes)?;
        Ok(encoder.finish()?)
    }

    fn first_entry(layer: &BlobLayer) -> anyhow::Result<(String, String)> {
        let mut archive = tar::Archive::new(layer.open()?);
        let mut entry = archive.entries()?.next().expect("one entry")?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        Ok((name, content))
    }

    #[test]
    fn test_layer_compression_from_media_type() -> anyhow::Result<()> {
        let cases = [
            ("application/vnd.oci.image.layer.v1.tar", LayerCompression::None),
            ("application/vnd.oci.image.layer.v1.tar+gzip", LayerCompression::Gzip),
            ("application/vnd.oci.image.layer.v1.tar+zstd", LayerCompression::Zstd),
            (
                "application/vnd.docker.image.rootfs.diff.tar.gzip",
                LayerCompression::Gzip,
            ),
            (
                "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip",
                LayerCompression::Gzip,
            ),
            ("application/x-tar-custom", LayerCompression::Detect),
        ];

        for (media_type, expected) in cases {
            assert_eq!(
                LayerCompression::from_media_type(&MediaType::from(media_type))?,
                expected,
                "{media_type}"
            );
        }

        assert!(matches!(
            LayerCompression::from_media_type(&MediaType::from("application/json")),
            Err(OcidistError::UnsupportedMediaType(_))
        ));
        Ok(())
    }

    #[test]
    fn test_blob_layer_reads_each_compression() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let tar = tar_with("etc/hostname", b"box")?;

        let blobs = [
            ("application/vnd.oci.image.layer.v1.tar", tar.clone()),
            ("application/vnd.oci.image.layer.v1.tar+gzip", gzip(&tar)?),
            (
                "application/vnd.oci.image.layer.v1.tar+zstd",
                zstd::encode_all(tar.as_slice(), 0)?,
            ),
            ("application/vnd.example.tarball", gzip(&tar)?),
            ("application/vnd.example.tar.unknown", tar.clone()),
        ];

        for (media_type, bytes) in blobs {
            let descriptor = layout.write_blob(media_type, &bytes)?;
            let layer = BlobLayer::new(&layout, &descriptor)?;

            // Each open yields a fresh stream.
            for _ in 0..2 {
                assert_eq!(
                    first_entry(&layer)?,
                    ("etc/hostname".to_string(), "box".to_string()),
                    "{media_type}"
                );
            }
        }
        Ok(())
    }

    #[test]
    fn test_blob_layer_missing_blob() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let layout = OciLayout::open_or_init(dir.path())?;
        let descriptor = layout.write_blob(MediaType::ImageLayer, b"")?;
        std::fs::remove_file(layout.blob_path(descriptor.digest()))?;

        let err = BlobLayer::new(&layout, &descriptor).unwrap_err();
        assert!(matches!(err, OcidistError::NotFound(_)));
        Ok(())
    }
}
