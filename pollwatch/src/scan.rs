//! Walks registered roots through a [`DirLister`] and builds snapshots.

use std::path::{Path, PathBuf};

use crate::{
    error::{Disposition, Scope},
    fs::DirLister,
    snapshot::Snapshot,
    Error, RecursiveMode, Result,
};

/// A registered watch root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Root {
    pub path: PathBuf,
    pub mode: RecursiveMode,
}

impl Root {
    pub fn new(path: PathBuf, mode: RecursiveMode) -> Self {
        Self { path, mode }
    }

    /// Whether an entry at `path` belongs to this root.
    pub fn covers(&self, path: &Path) -> bool {
        match self.mode {
            RecursiveMode::Recursive => path.starts_with(&self.path),
            RecursiveMode::NonRecursive => {
                path == self.path || path.parent() == Some(self.path.as_path())
            }
        }
    }
}

/// Result of scanning a single root for registration.
#[derive(Debug, Default)]
pub(crate) struct RootScan {
    pub snapshot: Snapshot,
    /// Errors below the root; the affected directories are left unexpanded.
    pub skipped: Vec<Error>,
}

/// Result of scanning every root during a poll cycle.
#[derive(Debug, Default)]
pub(crate) struct CycleScan {
    pub snapshot: Snapshot,
    /// Directories whose contents could not be read this time.
    pub unreadable: Vec<PathBuf>,
    /// Roots that no longer exist.
    pub lost: Vec<PathBuf>,
    /// Errors about roots, lost or unreadable.
    pub root_errors: Vec<Error>,
    /// Errors below roots.
    pub skipped: Vec<Error>,
}

pub(crate) struct Scanner<'a> {
    lister: &'a dyn DirLister,
    ignore_hidden: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(lister: &'a dyn DirLister, ignore_hidden: bool) -> Self {
        Self {
            lister,
            ignore_hidden,
        }
    }

    /// Scans a root that is about to be registered.
    ///
    /// Errors about the root itself are returned; errors below it are collected in
    /// [`RootScan::skipped`].
    pub fn scan_root(&self, root: &Root) -> Result<RootScan> {
        let mut scan = RootScan::default();
        let recurse = root.mode.is_recursive();

        let info = self
            .lister
            .stat(&root.path)
            .map_err(|err| reject(err, &root.path))?;
        let is_dir = info.is_dir();
        scan.snapshot.insert(root.path.clone(), info);

        if is_dir {
            self.expand(
                &root.path,
                recurse,
                &mut scan.snapshot,
                &mut Vec::new(),
                &mut scan.skipped,
            )
            .map_err(|err| reject(err, &root.path))?;
        }

        Ok(scan)
    }

    /// Scans all `roots`, applying the per-root error policy.
    pub fn scan_all(&self, roots: &[Root]) -> CycleScan {
        let mut scan = CycleScan::default();

        for root in roots {
            if let Err(err) = self.scan_one(root, &mut scan) {
                match err.kind.disposition(Scope::Root) {
                    Disposition::RootLost => {
                        log::debug!("root {:?} is gone", root.path);
                        scan.lost.push(root.path.clone());
                    }
                    _ => {
                        log::debug!("root {:?} is unreadable: {err}", root.path);
                        scan.unreadable.push(root.path.clone());
                    }
                }
                scan.root_errors.push(with_path(err, &root.path));
            }
        }

        scan
    }

    fn scan_one(&self, root: &Root, scan: &mut CycleScan) -> Result<()> {
        let info = self.lister.stat(&root.path)?;
        let is_dir = info.is_dir();
        scan.snapshot.insert(root.path.clone(), info);

        if is_dir {
            self.expand(
                &root.path,
                root.mode.is_recursive(),
                &mut scan.snapshot,
                &mut scan.unreadable,
                &mut scan.skipped,
            )?;
        }
        Ok(())
    }

    /// Lists `root` and, when `recurse` is set, every directory below it.
    ///
    /// A failure to list `root` itself is returned. Failures below it skip the directory
    /// concerned, which is recorded in `unreadable`.
    fn expand(
        &self,
        root: &Path,
        recurse: bool,
        out: &mut Snapshot,
        unreadable: &mut Vec<PathBuf>,
        skipped: &mut Vec<Error>,
    ) -> Result<()> {
        let mut pending = self.list_into(root, recurse, out)?;

        while let Some(dir) = pending.pop() {
            match self.list_into(&dir, recurse, out) {
                Ok(mut more) => pending.append(&mut more),
                Err(err) => {
                    debug_assert_eq!(
                        err.kind.disposition(Scope::Descendant),
                        Disposition::SkipNode
                    );
                    log::warn!("skipping {dir:?}: {err}");
                    skipped.push(with_path(err, &dir));
                    unreadable.push(dir);
                }
            }
        }
        Ok(())
    }

    /// Inserts the children of `dir` into `out`, returning the sub-directories to descend into.
    fn list_into(&self, dir: &Path, recurse: bool, out: &mut Snapshot) -> Result<Vec<PathBuf>> {
        let mut subdirs = Vec::new();
        for entry in self.lister.list(dir)? {
            if self.ignore_hidden && is_hidden(&entry.name) {
                continue;
            }
            let path = dir.join(&entry.name);
            if recurse && entry.info.is_dir() {
                subdirs.push(path.clone());
            }
            out.insert(path, entry.info);
        }
        Ok(subdirs)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn reject(err: Error, root: &Path) -> Error {
    debug_assert_eq!(
        err.kind.disposition(Scope::Registration),
        Disposition::Reject
    );
    with_path(err, root)
}

fn with_path(err: Error, path: &Path) -> Error {
    if err.paths.is_empty() {
        err.add_path(path.to_path_buf())
    } else {
        err
    }
}
