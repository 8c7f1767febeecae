//! Error types

use std::error::Error as StdError;
use std::path::PathBuf;
use std::{fmt, io};

/// Type alias to use this library's [`Error`] type in a Result
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds
///
/// The set is closed: every failure reported by a [`DirLister`](crate::fs::DirLister) is
/// classified into one of these before the watcher decides what to do with it, see
/// [`ErrorKind::disposition`].
#[derive(Debug)]
pub enum ErrorKind {
    /// The path does not exist.
    PathNotFound,

    /// The path exists but may not be read.
    PermissionDenied,

    /// The path is malformed or names something that cannot be watched this way.
    InvalidPath,

    /// Any other I/O error.
    Io(io::Error),

    /// Tried to remove a root that was never registered.
    WatchNotFound,

    /// Every registered root disappeared; polling cannot continue.
    RootsLost,

    /// `start` was called while the watcher is already populating or polling.
    AlreadyRunning,

    /// Generic error
    ///
    /// May be used in cases where a platform specific error is mapped to this type, or for opaque
    /// internal errors.
    Generic(String),
}

/// Where in a scan an error was encountered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Validating a root passed to `add` / `add_recursive`.
    Registration,
    /// A registered root, re-examined at the start of a poll cycle.
    Root,
    /// Anything below a root.
    Descendant,
}

/// What the watcher does about an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Fail the registration and return the error to the caller.
    Reject,
    /// Leave the node out of the snapshot and keep walking its siblings.
    SkipNode,
    /// The root is gone; its entries are dropped from the snapshot.
    RootLost,
    /// The root is still there but unreadable; keep its last known entries.
    KeepLast,
}

impl ErrorKind {
    /// The policy table mapping an error kind, in a given scope, to the action taken.
    pub(crate) fn disposition(&self, scope: Scope) -> Disposition {
        match (scope, self) {
            (Scope::Registration, _) => Disposition::Reject,
            (Scope::Descendant, _) => Disposition::SkipNode,
            (Scope::Root, ErrorKind::PathNotFound) => Disposition::RootLost,
            (Scope::Root, _) => Disposition::KeepLast,
        }
    }
}

/// Watcher error.
#[derive(Debug)]
pub struct Error {
    /// Kind of the error.
    pub kind: ErrorKind,

    /// Relevant paths to the error, if any.
    pub paths: Vec<PathBuf>,

    /// The I/O error a classified kind was made from.
    cause: Option<io::Error>,
}

impl Error {
    /// Adds a path to the error.
    pub fn add_path(mut self, path: PathBuf) -> Self {
        self.paths.push(path);
        self
    }

    /// Replaces the paths for the error.
    pub fn set_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.paths = paths;
        self
    }

    /// Creates a new Error with empty paths given its kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            paths: Vec::new(),
            cause: None,
        }
    }

    /// Creates a new generic Error from a message.
    pub fn generic(msg: &str) -> Self {
        Self::new(ErrorKind::Generic(msg.into()))
    }

    /// Creates a new i/o Error from a stdlib `io::Error`.
    ///
    /// The error is classified into [`ErrorKind::PathNotFound`], [`ErrorKind::PermissionDenied`]
    /// or [`ErrorKind::InvalidPath`] when its `io::ErrorKind` allows; anything else stays
    /// [`ErrorKind::Io`].
    pub fn io(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::PathNotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput => ErrorKind::InvalidPath,
            _ => match err.raw_os_error() {
                Some(code) if is_invalid_path_code(code) => ErrorKind::InvalidPath,
                _ => return Self::new(ErrorKind::Io(err)),
            },
        };
        Self {
            cause: Some(err),
            ..Self::new(kind)
        }
    }

    /// Similar to [`Error::io`], but specifically handles [`io::ErrorKind::NotFound`].
    pub fn path_not_found() -> Self {
        Self::new(ErrorKind::PathNotFound)
    }

    /// Creates a new "permission denied" error.
    pub fn permission_denied() -> Self {
        Self::new(ErrorKind::PermissionDenied)
    }

    /// Creates a new "invalid path" error.
    pub fn invalid_path() -> Self {
        Self::new(ErrorKind::InvalidPath)
    }

    /// Creates a new "watch not found" error.
    pub fn watch_not_found() -> Self {
        Self::new(ErrorKind::WatchNotFound)
    }

    /// Creates a new "roots lost" error.
    pub fn roots_lost() -> Self {
        Self::new(ErrorKind::RootsLost)
    }

    /// Creates a new "already running" error.
    pub fn already_running() -> Self {
        Self::new(ErrorKind::AlreadyRunning)
    }

    /// Returns whether this error means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::PathNotFound)
    }

    /// Returns whether this error means the path could not be read.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.kind, ErrorKind::PermissionDenied)
    }
}

#[cfg(unix)]
fn is_invalid_path_code(code: i32) -> bool {
    matches!(code, libc::ENOTDIR | libc::ENAMETOOLONG | libc::ELOOP)
}

#[cfg(windows)]
fn is_invalid_path_code(code: i32) -> bool {
    use windows_sys::Win32::Foundation::{ERROR_DIRECTORY, ERROR_INVALID_NAME};

    matches!(code as u32, ERROR_INVALID_NAME | ERROR_DIRECTORY)
}

#[cfg(not(any(unix, windows)))]
fn is_invalid_path_code(_code: i32) -> bool {
    false
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error = match self.kind {
            ErrorKind::PathNotFound => "No path was found.".into(),
            ErrorKind::PermissionDenied => "Permission denied.".into(),
            ErrorKind::InvalidPath => "Invalid path.".into(),
            ErrorKind::Io(ref err) => err.to_string(),
            ErrorKind::WatchNotFound => "No watch was found.".into(),
            ErrorKind::RootsLost => "All watched roots are gone.".into(),
            ErrorKind::AlreadyRunning => "The watcher is already running.".into(),
            ErrorKind::Generic(ref err) => err.clone(),
        };

        if self.paths.is_empty() {
            write!(f, "{error}")
        } else {
            write!(f, "{} about {:?}", error, self.paths)
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self.kind {
            ErrorKind::Io(ref cause) => Some(cause),
            _ => self
                .cause
                .as_ref()
                .map(|cause| cause as &(dyn StdError + 'static)),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err)
    }
}

#[test]
fn display_formatted_errors() {
    let expected = "Some error";

    assert_eq!(expected, format!("{}", Error::generic(expected)));

    assert_eq!(
        expected,
        format!("{}", Error::io(io::Error::new(io::ErrorKind::Other, expected)))
    );
}

#[test]
fn display_includes_paths() {
    let err = Error::path_not_found().add_path(PathBuf::from("/nope"));
    assert_eq!(r#"No path was found. about ["/nope"]"#, err.to_string());
}

#[test]
fn io_errors_are_classified() {
    let not_found = Error::io(io::Error::from(io::ErrorKind::NotFound));
    assert!(not_found.is_not_found());
    assert!(not_found.source().is_some());

    let denied = Error::io(io::Error::from(io::ErrorKind::PermissionDenied));
    assert!(denied.is_permission_denied());

    let invalid = Error::io(io::Error::from(io::ErrorKind::InvalidInput));
    assert!(matches!(invalid.kind, ErrorKind::InvalidPath));

    let other = Error::io(io::Error::from(io::ErrorKind::Interrupted));
    assert!(matches!(other.kind, ErrorKind::Io(_)));
    assert!(other.source().is_some());
}

#[cfg(unix)]
#[test]
fn path_errnos_are_invalid_paths() {
    for code in [libc::ENOTDIR, libc::ENAMETOOLONG, libc::ELOOP] {
        let err = Error::io(io::Error::from_raw_os_error(code));
        assert!(matches!(err.kind, ErrorKind::InvalidPath), "{code}");
    }

    let err = Error::io(io::Error::from_raw_os_error(libc::EIO));
    assert!(matches!(err.kind, ErrorKind::Io(_)));
}

#[test]
fn classified_errors_keep_their_cause() {
    let err = Error::io(io::Error::new(io::ErrorKind::PermissionDenied, "no entry"))
        .add_path(PathBuf::from("/locked"));

    assert!(err.is_permission_denied());
    assert_eq!(err.source().map(|cause| cause.to_string()), Some("no entry".into()));
    assert!(Error::permission_denied().source().is_none());
}

#[test]
fn disposition_table() {
    use Disposition::*;

    for kind in [
        ErrorKind::PathNotFound,
        ErrorKind::PermissionDenied,
        ErrorKind::InvalidPath,
        ErrorKind::Generic("x".into()),
    ] {
        assert_eq!(kind.disposition(Scope::Registration), Reject);
        assert_eq!(kind.disposition(Scope::Descendant), SkipNode);
    }

    assert_eq!(ErrorKind::PathNotFound.disposition(Scope::Root), RootLost);
    assert_eq!(ErrorKind::PermissionDenied.disposition(Scope::Root), KeepLast);
    assert_eq!(ErrorKind::InvalidPath.disposition(Scope::Root), KeepLast);
}
