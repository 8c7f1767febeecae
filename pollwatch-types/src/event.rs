//! The `Event` record, the `Op` classification and the metadata it carries.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::SystemTime,
};

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of change an event describes.
///
/// Every event produced by one poll cycle carries exactly one of these. A path never shows up
/// under two different operations within the same cycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Op {
    /// A path that was not present in the previous scan.
    Create,

    /// The size, modification time or (when content comparison is enabled) the content of a
    /// path changed between two scans.
    Write,

    /// A path that disappeared and could not be correlated with a newly created one.
    Remove,

    /// A path that moved to a new name within the same parent directory.
    ///
    /// The event carries both the new path and the old path.
    Rename,

    /// A path that moved to a different parent directory.
    ///
    /// The event carries both the new path and the old path.
    Move,

    /// Only the permission bits or the kind tag of a path changed.
    Chmod,
}

impl Op {
    /// All operations, in their canonical order.
    pub const ALL: [Op; 6] = [
        Op::Create,
        Op::Write,
        Op::Remove,
        Op::Rename,
        Op::Move,
        Op::Chmod,
    ];

    /// Returns the single-bit mask for this operation.
    pub fn mask(self) -> OpMask {
        match self {
            Op::Create => OpMask::CREATE,
            Op::Write => OpMask::WRITE,
            Op::Remove => OpMask::REMOVE,
            Op::Rename => OpMask::RENAME,
            Op::Move => OpMask::MOVE,
            Op::Chmod => OpMask::CHMOD,
        }
    }

    /// Indicates whether the operation carries an old path.
    pub fn is_name_change(self) -> bool {
        matches!(self, Op::Rename | Op::Move)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::Create => "CREATE",
            Op::Write => "WRITE",
            Op::Remove => "REMOVE",
            Op::Rename => "RENAME",
            Op::Move => "MOVE",
            Op::Chmod => "CHMOD",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// A set of operations a consumer wants to receive.
    ///
    /// The default is [`OpMask::ALL`]. An empty mask admits nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use pollwatch_types::event::{Op, OpMask};
    ///
    /// // Only creations and removals
    /// let mask = OpMask::CREATE | OpMask::REMOVE;
    /// assert!(mask.matches(Op::Create));
    /// assert!(!mask.matches(Op::Write));
    ///
    /// // Built from a list of operations
    /// let names: OpMask = [Op::Rename, Op::Move].into_iter().collect();
    /// assert_eq!(names, OpMask::NAME);
    /// ```
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct OpMask: u32 {
        /// Admit [`Op::Create`].
        const CREATE = 0b0000_0001;

        /// Admit [`Op::Write`].
        const WRITE = 0b0000_0010;

        /// Admit [`Op::Remove`].
        const REMOVE = 0b0000_0100;

        /// Admit [`Op::Rename`].
        const RENAME = 0b0000_1000;

        /// Admit [`Op::Move`].
        const MOVE = 0b0001_0000;

        /// Admit [`Op::Chmod`].
        const CHMOD = 0b0010_0000;

        /// Both name changes: rename and move.
        const NAME = Self::RENAME.bits() | Self::MOVE.bits();

        /// Every operation.
        const ALL = Self::CREATE.bits()
            | Self::WRITE.bits()
            | Self::REMOVE.bits()
            | Self::NAME.bits()
            | Self::CHMOD.bits();
    }
}

impl Default for OpMask {
    fn default() -> Self {
        OpMask::ALL
    }
}

impl OpMask {
    /// Returns whether the given operation is part of this mask.
    pub fn matches(&self, op: Op) -> bool {
        self.contains(op.mask())
    }
}

impl From<Op> for OpMask {
    fn from(op: Op) -> Self {
        op.mask()
    }
}

impl FromIterator<Op> for OpMask {
    fn from_iter<T: IntoIterator<Item = Op>>(iter: T) -> Self {
        iter.into_iter()
            .fold(OpMask::empty(), |mask, op| mask | op.mask())
    }
}

/// The kind tag of a file system entry.
///
/// Symbolic links are reported as links; they are never resolved.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum FileKind {
    /// A regular file.
    #[default]
    File,

    /// A directory.
    Dir,

    /// A symbolic link.
    Symlink,

    /// Anything else: sockets, fifos, devices.
    Other,
}

/// Unique identifier of a file on a device.
///
/// On Unix this is the device id together with the inode number. Identifiers may be reused
/// once a file is gone, so they are only ever compared together with other metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileId {
    /// Device ID
    pub device: u64,

    /// Inode number
    pub inode: u64,
}

impl FileId {
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }
}

/// Metadata of one watched path as recorded by a scan.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileInfo {
    /// Directory, regular file, symlink or other.
    pub kind: FileKind,

    /// Length in bytes as reported by the file system.
    pub size: u64,

    /// Last modification time, if the platform reports one.
    pub mtime: Option<SystemTime>,

    /// Permission bits. On platforms without Unix modes this only reflects the read-only flag.
    pub mode: u32,

    /// Stable file identity, when the platform provides one.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub file_id: Option<FileId>,

    /// Hash of the file contents, only recorded for regular files when content comparison is
    /// enabled.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub content_hash: Option<u64>,
}

impl FileInfo {
    /// Creates an entry of the given kind with empty metadata.
    pub fn new(kind: FileKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Sets the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Sets the modification time.
    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Sets the permission bits.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the file identity.
    pub fn with_file_id(mut self, file_id: FileId) -> Self {
        self.file_id = Some(file_id);
        self
    }

    /// Sets the content hash.
    pub fn with_content_hash(mut self, hash: u64) -> Self {
        self.content_hash = Some(hash);
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// A classified change to one path.
///
/// Events are built by the diff engine and never mutated afterwards. For [`Op::Rename`] and
/// [`Op::Move`], `path` is the new location and `old_path` the previous one; every other
/// operation leaves `old_path` empty.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    /// What happened.
    pub op: Op,

    /// The path the event is about. For name changes this is the new path.
    pub path: PathBuf,

    /// The previous path of a renamed or moved entry.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub old_path: Option<PathBuf>,

    /// Metadata of the entry. For removals this is the last recorded state.
    pub info: FileInfo,
}

impl Event {
    /// Creates a new `Event`.
    pub fn new(op: Op, path: PathBuf, info: FileInfo) -> Self {
        Self {
            op,
            path,
            old_path: None,
            info,
        }
    }

    /// Sets the old path.
    pub fn with_old_path(mut self, old_path: PathBuf) -> Self {
        self.old_path = Some(old_path);
        self
    }

    /// Returns the paths of this event, the old path first if there is one.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.old_path
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.path.as_path()))
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old_path {
            Some(old_path) => write!(
                f,
                "{} {:?} -> {:?}",
                self.op,
                old_path.display(),
                self.path.display()
            ),
            None => write!(f, "{} {:?}", self.op, self.path.display()),
        }
    }
}
