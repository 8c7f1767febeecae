//! Access to the file system, as consumed by the scanner.
//!
//! The watcher never touches the file system directly: everything goes through a
//! [`DirLister`]. [`FsLister`] is the implementation backed by the real file system; tests and
//! embedders may provide their own.

use std::{
    ffi::OsString,
    fs::{self, File, Metadata},
    io::{self, Read},
    path::Path,
    sync::Arc,
};

use pollwatch_types::event::{FileInfo, FileKind};
use walkdir::WalkDir;
use xxhash_rust::xxh3::Xxh3;

use crate::{Error, Result};

/// One child of a listed directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// File name of the entry, without any directory component.
    pub name: OsString,

    /// Metadata of the entry. Symbolic links are described, not followed.
    pub info: FileInfo,
}

impl DirEntry {
    pub fn new(name: impl Into<OsString>, info: FileInfo) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }
}

/// Directory listing capability.
///
/// Implementations report failures with one of the closed error kinds
/// ([`ErrorKind::PathNotFound`](crate::ErrorKind::PathNotFound),
/// [`ErrorKind::PermissionDenied`](crate::ErrorKind::PermissionDenied),
/// [`ErrorKind::InvalidPath`](crate::ErrorKind::InvalidPath) or
/// [`ErrorKind::Io`](crate::ErrorKind::Io)). The scanner decides from the kind and the location
/// of the failure whether a node is skipped, a registration is rejected or a root is lost.
pub trait DirLister: Send + Sync + 'static {
    /// Metadata of `path` itself.
    fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// The immediate children of the directory at `path`.
    fn list(&self, path: &Path) -> Result<Vec<DirEntry>>;
}

impl<L: DirLister + ?Sized> DirLister for Arc<L> {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        (**self).stat(path)
    }

    fn list(&self, path: &Path) -> Result<Vec<DirEntry>> {
        (**self).list(path)
    }
}

impl<L: DirLister + ?Sized> DirLister for Box<L> {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        (**self).stat(path)
    }

    fn list(&self, path: &Path) -> Result<Vec<DirEntry>> {
        (**self).list(path)
    }
}

/// [`DirLister`] backed by `std::fs`.
///
/// `stat` follows a symbolic link so that a root given as a link is watched through it;
/// listed children are described with `lstat` semantics and links below a root are never
/// followed.
#[derive(Clone, Debug, Default)]
pub struct FsLister {
    compare_contents: bool,
}

impl FsLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash the contents of every regular file that is stated or listed.
    pub fn with_compare_contents(mut self, compare_contents: bool) -> Self {
        self.compare_contents = compare_contents;
        self
    }

    fn describe(&self, path: &Path, metadata: &Metadata) -> FileInfo {
        let mut info = info_from_metadata(metadata);
        if self.compare_contents && info.is_file() {
            match hash_file(path) {
                Ok(hash) => info.content_hash = Some(hash),
                // the metadata is still useful on its own
                Err(err) => log::trace!("unable to hash {path:?}: {err}"),
            }
        }
        info
    }
}

impl DirLister for FsLister {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let metadata = fs::metadata(path).map_err(|e| Error::io(e).add_path(path.into()))?;
        Ok(self.describe(path, &metadata))
    }

    fn list(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    let err = err
                        .into_io_error()
                        .map(Error::io)
                        .unwrap_or_else(|| Error::generic("unable to read directory"));
                    return Err(err.add_path(path.into()));
                }
                Err(err) => {
                    // gone between readdir and stat
                    log::trace!("skipping entry of {path:?}: {err}");
                    continue;
                }
            };

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    log::trace!("skipping {:?}: {err}", entry.path());
                    continue;
                }
            };

            let info = self.describe(entry.path(), &metadata);
            entries.push(DirEntry::new(entry.file_name(), info));
        }

        Ok(entries)
    }
}

fn info_from_metadata(metadata: &Metadata) -> FileInfo {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Dir
    } else if file_type.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };

    FileInfo {
        kind,
        size: metadata.len(),
        mtime: metadata.modified().ok(),
        mode: mode(metadata),
        file_id: file_id(metadata),
        content_hash: None,
    }
}

#[cfg(unix)]
fn mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

#[cfg(unix)]
fn file_id(metadata: &Metadata) -> Option<pollwatch_types::event::FileId> {
    use std::os::unix::fs::MetadataExt;

    Some(pollwatch_types::event::FileId::new(
        metadata.dev(),
        metadata.ino(),
    ))
}

#[cfg(not(unix))]
fn file_id(_metadata: &Metadata) -> Option<pollwatch_types::event::FileId> {
    None
}

fn hash_file(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.digest())
}
