use std::collections::BTreeMap;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The set of paths that survive the layers seen so far.
///
/// Each surviving path remembers the highest layer that wrote it. Keys are normalized raw name
/// bytes, so every strict descendant of `dir` sorts into the contiguous range starting at `dir/`.
#[derive(Debug, Default, Clone)]
pub struct FileIndex {
    entries: BTreeMap<Vec<u8>, usize>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FileIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `path` as present, written by `layer`.
    pub fn record(&mut self, path: impl Into<Vec<u8>>, layer: usize) {
        self.entries.insert(path.into(), layer);
    }

    /// Removes `path` and every strict descendant. Returns how many paths were removed.
    pub fn remove_subtree(&mut self, path: impl AsRef<[u8]>) -> usize {
        let path = path.as_ref();
        let removed = usize::from(self.entries.remove(path).is_some());
        removed + self.remove_children(path)
    }

    /// Removes every strict descendant of `dir` but keeps `dir` itself.
    ///
    /// The empty name denotes the root. Returns how many paths were removed.
    pub fn remove_children(&mut self, dir: impl AsRef<[u8]>) -> usize {
        let dir = dir.as_ref();
        let doomed: Vec<Vec<u8>> = if dir.is_empty() {
            self.entries
                .keys()
                .filter(|key| !key.is_empty())
                .cloned()
                .collect()
        } else {
            let mut prefix = dir.to_vec();
            prefix.push(b'/');
            self.entries
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .map(|(key, _)| key.clone())
                .collect()
        };

        for key in &doomed {
            self.entries.remove(key);
        }

        doomed.len()
    }

    /// Returns true if `path` survives.
    pub fn contains(&self, path: impl AsRef<[u8]>) -> bool {
        self.entries.contains_key(path.as_ref())
    }

    /// Returns the highest layer that wrote `path`, if it survives.
    pub fn last_layer(&self, path: impl AsRef<[u8]>) -> Option<usize> {
        self.entries.get(path.as_ref()).copied()
    }

    /// Returns the number of surviving paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing survives.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over surviving paths in sorted byte order.
    pub fn paths(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(Vec::as_slice)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
