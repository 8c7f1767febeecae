//! Point-in-time view of the watched trees.

use std::{
    collections::{btree_map, BTreeMap},
    ops::Bound,
    path::{Path, PathBuf},
    sync::Arc,
};

use pollwatch_types::event::FileInfo;

/// Mapping from absolute path to the metadata observed for it during one scan.
///
/// Paths are unique and kept in component order, so every entry below a directory directly
/// follows the directory itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, FileInfo>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&FileInfo> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Iterates over all entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &FileInfo)> {
        self.entries.iter().map(|(path, info)| (path.as_path(), info))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Iterates over `dir` and everything below it.
    pub fn entries_under<'a>(
        &'a self,
        dir: &'a Path,
    ) -> impl Iterator<Item = (&'a Path, &'a FileInfo)> + 'a {
        self.entries
            .range::<Path, _>((Bound::Included(dir), Bound::Unbounded))
            .take_while(move |(path, _)| path.starts_with(dir))
            .map(|(path, info)| (path.as_path(), info))
    }

    pub(crate) fn insert(&mut self, path: PathBuf, info: FileInfo) -> Option<FileInfo> {
        self.entries.insert(path, info)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) {
        self.entries.retain(|path, _| keep(path));
    }

    /// Adds the entries of `other` whose path is not present yet.
    pub(crate) fn merge_absent(&mut self, other: Snapshot) {
        for (path, info) in other.entries {
            self.entries.entry(path).or_insert(info);
        }
    }

    /// Copies `dir` and everything below it from `previous` unless already present.
    pub(crate) fn carry_forward(&mut self, previous: &Snapshot, dir: &Path) {
        for (path, info) in previous.entries_under(dir) {
            if let btree_map::Entry::Vacant(entry) = self.entries.entry(path.to_path_buf()) {
                entry.insert(info.clone());
            }
        }
    }
}

impl FromIterator<(PathBuf, FileInfo)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (PathBuf, FileInfo)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a PathBuf, &'a FileInfo);
    type IntoIter = btree_map::Iter<'a, PathBuf, FileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Holds the snapshot of the last completed poll.
///
/// Readers get a shared handle to it; replacing the snapshot never mutates one that has been
/// handed out.
#[derive(Debug, Default)]
pub(crate) struct SnapshotStore {
    current: Arc<Snapshot>,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: Arc::new(initial),
        }
    }

    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    /// Installs `next` as the current snapshot.
    pub fn replace(&mut self, next: Snapshot) -> Arc<Snapshot> {
        std::mem::replace(&mut self.current, Arc::new(next))
    }

    /// Edits the current snapshot in place, copying it first if it is shared.
    pub fn update(&mut self, edit: impl FnOnce(&mut Snapshot)) {
        edit(Arc::make_mut(&mut self.current));
    }
}
