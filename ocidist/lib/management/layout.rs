use std::{fmt, path::PathBuf};

use crate::{
    oci::{descriptor_name, OciLayout, ResolvedNode},
    OcidistResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One row of `layout list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    /// The annotated name, if any.
    pub name: Option<String>,

    /// `image`, `index` or `other`.
    pub kind: String,

    /// The descriptor media type.
    pub media_type: String,

    /// The descriptor digest.
    pub digest: String,

    /// `os/arch[/variant]`, if the descriptor carries a platform.
    pub platform: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an empty layout at `path`, or leaves an existing one untouched.
pub async fn init_layout(path: impl Into<PathBuf>) -> OcidistResult<OciLayout> {
    let path = path.into();
    tokio::task::spawn_blocking(move || OciLayout::open_or_init(path)).await?
}

/// Lists the entries of a layout's root index.
pub async fn list_layout(path: impl Into<PathBuf>) -> OcidistResult<Vec<LayoutEntry>> {
    let path = path.into();
    tokio::task::spawn_blocking(move || -> OcidistResult<Vec<LayoutEntry>> {
        let layout = OciLayout::open(path)?;
        let index = layout.root_index()?;
        let entries = index
            .manifests()
            .iter()
            .map(|descriptor| LayoutEntry {
                name: descriptor_name(descriptor).map(String::from),
                kind: ResolvedNode::classify(descriptor)
                    .map(|node| node.kind())
                    .unwrap_or("other")
                    .to_string(),
                media_type: descriptor.media_type().to_string(),
                digest: descriptor.digest().to_string(),
                platform: descriptor.platform().as_ref().map(|p| {
                    let mut platform = format!("{}/{}", p.os(), p.architecture());
                    if let Some(variant) = p.variant() {
                        platform.push('/');
                        platform.push_str(variant);
                    }
                    platform
                }),
            })
            .collect();

        Ok(entries)
    })
    .await?
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for LayoutEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.name.as_deref().unwrap_or("<none>"),
            self.kind,
            self.digest,
            self.platform.as_deref().unwrap_or("-"),
            self.media_type
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
