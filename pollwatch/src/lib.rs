//! Portable, poll-based file system change watcher
//!
//! # Installation
//!
//! ```toml
//! [dependencies]
//! pollwatch = "0.1.0"
//! ```
//!
//! ## Features
//!
//! - `serde` for serialization of events
//!
//! # How it works
//!
//! A [`PollWatcher`] keeps a [`Snapshot`] of everything below its registered roots. Every poll
//! interval it scans the roots again, compares the new snapshot with the previous one and
//! sends one [`Event`] per difference:
//!
//! - [`Op::Create`], [`Op::Remove`] for paths that appeared or disappeared,
//! - [`Op::Rename`], [`Op::Move`] for a removed path that matches a created one,
//! - [`Op::Write`] for a changed size, modification time or content hash,
//! - [`Op::Chmod`] for changed permissions.
//!
//! The first scan only establishes the baseline and produces no events.
//!
//! ```no_run
//! use std::{thread, time::Duration};
//!
//! use crossbeam_channel::select;
//! use pollwatch::{Config, Op, PollWatcher};
//!
//! let watcher = PollWatcher::new(Config::default());
//! watcher.filter_ops(Op::Create);
//! watcher.add_recursive(".")?;
//!
//! let poller = watcher.clone();
//! let handle = thread::spawn(move || poller.start(Duration::from_secs(1)));
//! watcher.wait();
//!
//! loop {
//!     select! {
//!         recv(watcher.events()) -> event => println!("{}", event.unwrap()),
//!         recv(watcher.errors()) -> err => println!("error: {}", err.unwrap()),
//!         recv(watcher.closed()) -> _ => break,
//!     }
//! }
//!
//! handle.join().unwrap()?;
//! # Ok::<(), pollwatch::Error>(())
//! ```
//!
//! # Known Problems
//!
//! ### Timestamp resolution
//!
//! Writes are detected through the modification time and size reported by the file system. Two
//! writes of the same size within one timestamp tick are seen as one, or not at all when the
//! size did not change. [`Config::with_compare_contents`] hashes file contents to work around
//! this, at the cost of reading every file on every poll.
//!
//! ### Renames
//!
//! Renames are inferred by matching metadata, not observed. A file that is removed while
//! another one with identical size and modification time is created may be reported as a
//! rename. On Unix the inode number is compared as well, which rules out most mismatches.
//!
//! ### Symbolic links
//!
//! Links below a root are reported as links and never followed. A root given as a link is
//! resolved.

pub use config::{Config, RecursiveMode};
pub use error::{Error, ErrorKind, Result};
pub use fs::{DirEntry, DirLister, FsLister};
pub use lifecycle::State;
pub use poll::PollWatcher;
pub use pollwatch_types::event::{self, Event, FileId, FileInfo, FileKind, Op, OpMask};
pub use snapshot::Snapshot;

mod config;
mod diff;
mod error;
mod filter;
pub mod fs;
mod lifecycle;
pub mod poll;
mod scan;
mod snapshot;

#[cfg(test)]
pub(crate) mod test;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_safe() {
        let _lister: Box<dyn DirLister> = Box::new(FsLister::new());
    }

    #[test]
    fn test_debug_impl() {
        macro_rules! assert_debug_impl {
            ($t:ty) => {{
                trait NeedsDebug: std::fmt::Debug {}
                impl NeedsDebug for $t {}
            }};
        }

        assert_debug_impl!(Config);
        assert_debug_impl!(DirEntry);
        assert_debug_impl!(Error);
        assert_debug_impl!(ErrorKind);
        assert_debug_impl!(FsLister);
        assert_debug_impl!(PollWatcher);
        assert_debug_impl!(RecursiveMode);
        assert_debug_impl!(Snapshot);
        assert_debug_impl!(State);
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<PollWatcher>();
        assert_send_sync::<Error>();
        assert_send_sync::<Snapshot>();
    }
}
