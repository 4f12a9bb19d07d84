//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The basename prefix that marks a whiteout entry.
pub const WHITEOUT_PREFIX: &[u8] = b".wh.";

/// The basename that marks its directory as opaque.
pub const WHITEOUT_OPAQUE: &[u8] = b".wh..wh..opq";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How a single tar entry affects the merged filesystem.
///
/// Paths are raw name bytes normalized with [`normalize_path`]. Tar names need not be UTF-8, so
/// they are never decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// `<dir>/.wh..wh..opq`: hide everything lower layers put under `dir`.
    Opaque {
        /// The directory being made opaque. Empty for the root.
        dir: Vec<u8>,
    },

    /// `<dir>/.wh.<name>`: delete `<dir>/<name>` and its subtree.
    Whiteout {
        /// The path being deleted.
        target: Vec<u8>,
    },

    /// A plain filesystem entry.
    Regular {
        /// The path being created or replaced.
        path: Vec<u8>,
    },
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EntryKind {
    /// Classifies a raw tar entry name.
    ///
    /// Returns `None` for a bare `.wh.` marker, which names nothing.
    pub fn classify(raw: &[u8]) -> Option<Self> {
        let path = normalize_path(raw);
        let (dir, base) = match path.iter().rposition(|b| *b == b'/') {
            Some(slash) => (&path[..slash], &path[slash + 1..]),
            None => (&path[..0], path.as_slice()),
        };

        if base == WHITEOUT_OPAQUE {
            return Some(EntryKind::Opaque { dir: dir.to_vec() });
        }

        if let Some(name) = base.strip_prefix(WHITEOUT_PREFIX) {
            if name.is_empty() {
                return None;
            }

            return Some(EntryKind::Whiteout {
                target: join(dir, name),
            });
        }

        Some(EntryKind::Regular { path })
    }

    /// Returns true for whiteout and opaque markers.
    pub fn is_marker(&self) -> bool {
        !matches!(self, EntryKind::Regular { .. })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Normalizes a raw tar entry name into the key used by the file index.
///
/// Leading `/` and `./`, `.` components and trailing slashes are dropped, and `..` is resolved
/// without escaping the root. The root itself normalizes to the empty name. Bytes other than
/// `/` and `.` are kept as they are.
///
/// ## Examples
///
/// ```
/// use ocidist::merge::normalize_path;
///
/// assert_eq!(normalize_path(b"/etc/foo"), b"etc/foo");
/// assert_eq!(normalize_path(b"./a/b/"), b"a/b");
/// assert_eq!(normalize_path(b"a/./c/../b"), b"a/b");
/// assert_eq!(normalize_path(b"./"), b"");
/// ```
pub fn normalize_path(raw: &[u8]) -> Vec<u8> {
    let mut parts: Vec<&[u8]> = Vec::new();
    for component in raw.split(|b| *b == b'/') {
        match component {
            b"" | b"." => {}
            b".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join(&b'/')
}

fn join(dir: &[u8], name: &[u8]) -> Vec<u8> {
    if dir.is_empty() {
        name.to_vec()
    } else {
        [dir, name].join(&b'/')
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
