//! Configuration types

use pollwatch_types::event::OpMask;

/// Indicates whether only the provided directory or its sub-directories as well should be watched
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum RecursiveMode {
    /// Watch all sub-directories as well, including directories created after installing the watch
    Recursive,

    /// Watch only the provided directory and its immediate children
    NonRecursive,
}

impl RecursiveMode {
    pub(crate) fn is_recursive(&self) -> bool {
        match *self {
            RecursiveMode::Recursive => true,
            RecursiveMode::NonRecursive => false,
        }
    }
}

/// Watcher configuration
///
/// ```rust
/// # use pollwatch::{Config, OpMask};
/// let config = Config::default()
///     .with_ops(OpMask::CREATE | OpMask::REMOVE)
///     .with_compare_contents(true);
/// ```
///
/// The filter set can also be replaced at runtime with
/// [`PollWatcher::filter_ops`](crate::PollWatcher::filter_ops); everything else is fixed once the
/// watcher is built.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Config {
    /// See [Config::with_ops]
    ops: OpMask,

    /// See [Config::with_compare_contents]
    compare_contents: bool,

    /// See [Config::with_ignore_hidden]
    ignore_hidden: bool,

    /// See [Config::with_report_subtree_errors]
    report_subtree_errors: bool,

    /// See [Config::with_channel_capacity]
    channel_capacity: usize,
}

impl Config {
    /// Initial set of operations delivered on the event channel.
    ///
    /// The default is [`OpMask::ALL`]. An empty mask delivers nothing.
    pub fn with_ops(mut self, ops: OpMask) -> Self {
        self.ops = ops;
        self
    }

    /// Returns current setting
    pub fn ops(&self) -> OpMask {
        self.ops
    }

    /// Evaluate the contents of regular files with a fast hashing algorithm.
    ///
    /// A changed hash is reported as a write even when size and modification time did not
    /// change, and renames are only correlated when the hashes agree. This is useful for
    /// pseudo file systems that don't maintain modification times, but every file has to be
    /// read on every poll.
    ///
    /// Off by default.
    pub fn with_compare_contents(mut self, compare_contents: bool) -> Self {
        self.compare_contents = compare_contents;
        self
    }

    /// Returns current setting
    pub fn compare_contents(&self) -> bool {
        self.compare_contents
    }

    /// Skip entries whose name starts with a dot. Roots themselves are never skipped.
    ///
    /// Off by default.
    pub fn with_ignore_hidden(mut self, ignore_hidden: bool) -> Self {
        self.ignore_hidden = ignore_hidden;
        self
    }

    /// Returns current setting
    pub fn ignore_hidden(&self) -> bool {
        self.ignore_hidden
    }

    /// Send errors about unreadable entries below a root on the error channel.
    ///
    /// Those entries are always skipped and logged; by default they are not reported, so that a
    /// single unreadable sub-directory doesn't flood consumers on every poll.
    pub fn with_report_subtree_errors(mut self, report: bool) -> Self {
        self.report_subtree_errors = report;
        self
    }

    /// Returns current setting
    pub fn report_subtree_errors(&self) -> bool {
        self.report_subtree_errors
    }

    /// Capacity of the event and error channels.
    ///
    /// With the default of `0` every send waits for a receiver, so a slow consumer stalls the
    /// next scan instead of events piling up in memory.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Returns current setting
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ops: OpMask::ALL,
            compare_contents: false,
            ignore_hidden: false,
            report_subtree_errors: false,
            channel_capacity: 0,
        }
    }
}
