use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use oci_spec::image::{
    Descriptor, DescriptorBuilder, Digest, DigestAlgorithm, ImageIndex, ImageIndexBuilder,
    ImageManifest, MediaType,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{
    merge::{OutputSink, OutputTarget},
    utils::{
        self, OCI_BLOBS_SUBDIR, OCI_INDEX_FILENAME, OCI_LAYOUT_FILENAME, OCI_LAYOUT_VERSION,
    },
    OcidistError, OcidistResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const CONFIG_REQUIRED_FIELDS: [&str; 3] = ["architecture", "os", "rootfs"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A content-addressable OCI image layout on disk.
///
/// ```text
/// <root>/
/// ├── oci-layout
/// ├── index.json
/// └── blobs/
///     └── sha256/
///         └── <hex>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayoutMarker {
    #[serde(rename = "imageLayoutVersion")]
    image_layout_version: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OciLayout {
    /// Opens an existing layout.
    ///
    /// ## Errors
    ///
    /// Returns [`OcidistError::InvalidLayout`] if the directory, its `oci-layout` marker or its
    /// `index.json` is missing, or if the marker names an unknown layout version.
    pub fn open(root: impl Into<PathBuf>) -> OcidistResult<Self> {
        let root = root.into();
        let invalid = |reason: String| OcidistError::InvalidLayout {
            path: root.clone(),
            reason,
        };

        if !root.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }

        let marker_path = root.join(OCI_LAYOUT_FILENAME);
        let marker = fs::read(&marker_path)
            .map_err(|e| invalid(format!("cannot read {OCI_LAYOUT_FILENAME}: {e}")))?;
        let marker: LayoutMarker = serde_json::from_slice(&marker)
            .map_err(|e| invalid(format!("cannot parse {OCI_LAYOUT_FILENAME}: {e}")))?;
        if marker.image_layout_version != OCI_LAYOUT_VERSION {
            return Err(invalid(format!(
                "unsupported layout version {}",
                marker.image_layout_version
            )));
        }

        if !root.join(OCI_INDEX_FILENAME).is_file() {
            return Err(invalid(format!("missing {OCI_INDEX_FILENAME}")));
        }

        tracing::debug!("opened oci layout at {}", root.display());
        Ok(Self { root })
    }

    /// Opens the layout at `root`, creating an empty one first if nothing is there.
    ///
    /// Only write-side callers should use this. Readers use [`open`](Self::open) so a mistyped
    /// path is reported rather than silently turned into an empty layout.
    pub fn open_or_init(root: impl Into<PathBuf>) -> OcidistResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(OCI_BLOBS_SUBDIR).join(DigestAlgorithm::Sha256.to_string()))?;

        let marker_path = root.join(OCI_LAYOUT_FILENAME);
        if !marker_path.exists() {
            let marker = LayoutMarker {
                image_layout_version: OCI_LAYOUT_VERSION.to_string(),
            };
            write_atomic(&marker_path, &serde_json::to_vec(&marker)?)?;
            tracing::info!("initialized oci layout at {}", root.display());
        }

        let index_path = root.join(OCI_INDEX_FILENAME);
        if !index_path.exists() {
            let index = ImageIndexBuilder::default()
                .schema_version(2_u32)
                .media_type(MediaType::ImageIndex)
                .manifests(Vec::<Descriptor>::new())
                .build()?;
            write_atomic(&index_path, &serde_json::to_vec_pretty(&index)?)?;
        }

        Self::open(root)
    }

    /// The layout root.
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Where the blob for `digest` lives: `blobs/<algorithm>/<hex>`.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join(OCI_BLOBS_SUBDIR)
            .join(digest.algorithm().to_string())
            .join(digest.digest())
    }

    /// Opens the blob for `digest`.
    ///
    /// A missing blob is reported as [`OcidistError::NotFound`].
    pub fn open_blob(&self, digest: &Digest) -> OcidistResult<File> {
        let path = self.blob_path(digest);
        File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => OcidistError::NotFound(format!(
                "blob {digest} in layout {}",
                self.root.display()
            )),
            _ => OcidistError::Io(e),
        })
    }

    /// Reads the whole blob for `digest`.
    pub fn read_blob(&self, digest: &Digest) -> OcidistResult<Vec<u8>> {
        let mut bytes = Vec::new();
        io::Read::read_to_end(&mut self.open_blob(digest)?, &mut bytes)?;
        Ok(bytes)
    }

    /// Hashes the blob behind `descriptor` and checks it against the descriptor's digest.
    pub fn verify_blob(&self, descriptor: &Descriptor) -> OcidistResult<()> {
        self.verify_digest(descriptor.digest())
    }

    /// Hashes the blob stored under `digest` and checks it against `digest`.
    pub fn verify_digest(&self, digest: &Digest) -> OcidistResult<()> {
        let mut blob = self.open_blob(digest)?;
        let actual = utils::get_reader_hash(&mut blob, digest.algorithm())?;
        if actual != digest.digest() {
            return Err(OcidistError::DigestMismatch {
                digest: digest.to_string(),
                actual,
            });
        }

        tracing::trace!("verified blob {digest}");
        Ok(())
    }

    /// Parses `index.json`.
    pub fn root_index(&self) -> OcidistResult<ImageIndex> {
        let path = self.root.join(OCI_INDEX_FILENAME);
        let file = File::open(&path)?;
        ImageIndex::from_reader(io::BufReader::new(file))
            .map_err(|e| self.corrupt(OCI_INDEX_FILENAME, e))
    }

    /// Verifies and parses the index blob behind `descriptor`.
    pub fn read_index(&self, descriptor: &Descriptor) -> OcidistResult<ImageIndex> {
        let bytes = self.read_verified(descriptor)?;
        ImageIndex::from_reader(bytes.as_slice())
            .map_err(|e| self.corrupt(&descriptor.digest().to_string(), e))
    }

    /// Verifies and parses the image manifest blob behind `descriptor`.
    pub fn read_manifest(&self, descriptor: &Descriptor) -> OcidistResult<ImageManifest> {
        let bytes = self.read_verified(descriptor)?;
        ImageManifest::from_reader(bytes.as_slice())
            .map_err(|e| self.corrupt(&descriptor.digest().to_string(), e))
    }

    /// Verifies the image configuration blob behind `descriptor` and parses it as a JSON object.
    ///
    /// Only the fields every image configuration must carry are checked; optional ones such as
    /// `history` or `config` may be absent.
    pub fn read_config(
        &self,
        descriptor: &Descriptor,
    ) -> OcidistResult<serde_json::Map<String, serde_json::Value>> {
        let bytes = self.read_verified(descriptor)?;
        let what = descriptor.digest().to_string();
        let config = match serde_json::from_slice(&bytes) {
            Ok(serde_json::Value::Object(config)) => config,
            Ok(_) => return Err(self.corrupt(&what, "image configuration is not an object")),
            Err(e) => return Err(self.corrupt(&what, e)),
        };

        if let Some(field) = CONFIG_REQUIRED_FIELDS
            .iter()
            .find(|field| !config.contains_key(**field))
        {
            return Err(self.corrupt(&what, format!("missing field `{field}`")));
        }

        Ok(config)
    }

    /// Stores `bytes` as a sha256-addressed blob and returns its descriptor.
    pub fn write_blob(
        &self,
        media_type: impl Into<MediaType>,
        bytes: &[u8],
    ) -> OcidistResult<Descriptor> {
        let hex = hex::encode(Sha256::digest(bytes));
        let digest = parse_digest(&format!("{}:{hex}", DigestAlgorithm::Sha256))?;

        let path = self.blob_path(&digest);
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            write_atomic(&path, bytes)?;
            tracing::debug!("wrote blob {digest} ({} bytes)", bytes.len());
        }

        Ok(DescriptorBuilder::default()
            .media_type(media_type)
            .digest(digest)
            .size(bytes.len() as u64)
            .build()?)
    }

    /// Appends `descriptor` to `index.json`.
    pub fn push_root_descriptor(&self, descriptor: Descriptor) -> OcidistResult<()> {
        let mut index = self.root_index()?;
        let mut manifests = index.manifests().clone();
        manifests.push(descriptor);
        index.set_manifests(manifests);

        write_atomic(
            &self.root.join(OCI_INDEX_FILENAME),
            &serde_json::to_vec_pretty(&index)?,
        )
    }

    /// Reads the blob behind `descriptor`, failing if it does not hash to the descriptor's digest.
    pub fn read_verified(&self, descriptor: &Descriptor) -> OcidistResult<Vec<u8>> {
        let digest = descriptor.digest();
        let bytes = self.read_blob(digest)?;
        let actual = utils::get_reader_hash(&mut bytes.as_slice(), digest.algorithm())?;
        if actual != digest.digest() {
            return Err(OcidistError::DigestMismatch {
                digest: digest.to_string(),
                actual,
            });
        }

        Ok(bytes)
    }

    fn corrupt(&self, what: &str, error: impl std::fmt::Display) -> OcidistError {
        OcidistError::Corrupt {
            layout: self.root.clone(),
            what: what.to_string(),
            reason: error.to_string(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses an `<algorithm>:<hex>` digest string.
pub fn parse_digest(value: &str) -> OcidistResult<Digest> {
    Digest::from_str(value).map_err(|e| OcidistError::InvalidDigest(format!("{value}: {e}")))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> OcidistResult<()> {
    let mut sink = OutputSink::create(&OutputTarget::File(path.to_path_buf()))?;
    sink.write_all(bytes)?;
    sink.commit()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
