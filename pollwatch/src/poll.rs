//! Generic Watcher implementation based on polling
//!
//! Checks the registered roots in an interval and compares each new scan with the previous one.
//! Works on every platform that provides directory listings and file metadata, at the cost of
//! latency (up to one interval) and of walking every watched tree on every poll.

use std::{
    collections::HashSet,
    env, fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use pollwatch_types::event::{Event, OpMask};

use crate::{
    diff::diff,
    filter::OpFilter,
    fs::{DirLister, FsLister},
    lifecycle::{Lifecycle, State},
    scan::{CycleScan, Root, Scanner},
    snapshot::{Snapshot, SnapshotStore},
    Config, Error, RecursiveMode, Result,
};

/// Registered roots, shared between callers and the poll loop.
#[derive(Debug, Default)]
struct Registry {
    roots: Vec<Root>,
    /// Set once the baseline scan took its list of roots.
    populated: bool,
    /// Entries of roots registered after the baseline scan, waiting to join the baseline.
    seeds: Vec<Snapshot>,
    /// Roots were added or removed since the last cycle.
    changed: bool,
}

struct CycleInput {
    roots: Vec<Root>,
    seeds: Vec<Snapshot>,
    changed: bool,
}

impl Registry {
    fn take_cycle(&mut self) -> CycleInput {
        CycleInput {
            roots: self.roots.clone(),
            seeds: std::mem::take(&mut self.seeds),
            changed: std::mem::replace(&mut self.changed, false),
        }
    }
}

struct Inner {
    config: Config,
    lister: Box<dyn DirLister>,
    filter: OpFilter,
    lifecycle: Lifecycle,
    registry: Mutex<Registry>,
    published: Mutex<Arc<Snapshot>>,

    event_tx: Sender<Event>,
    event_rx: Receiver<Event>,
    error_tx: Sender<Error>,
    error_rx: Receiver<Error>,

    /// Dropped to request shutdown.
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,

    /// Dropped once the watcher is closed.
    closed_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
}

/// Polling based `Watcher` implementation.
///
/// The watcher is driven by three calls: roots are registered with [`add`](Self::add) or
/// [`add_recursive`](Self::add_recursive), [`start`](Self::start) runs the poll loop on the
/// calling thread until [`close`](Self::close) is called from another one, and
/// [`wait`](Self::wait) blocks until the baseline snapshot is built. Changes are delivered on
/// [`events`](Self::events), non-fatal failures on [`errors`](Self::errors).
///
/// Handles are cheap to clone and all refer to the same watcher.
///
/// ```no_run
/// # use std::{thread, time::Duration};
/// # use pollwatch::{Config, PollWatcher};
/// let watcher = PollWatcher::new(Config::default());
/// watcher.add_recursive("/tmp/watched")?;
///
/// let poller = watcher.clone();
/// let handle = thread::spawn(move || poller.start(Duration::from_millis(100)));
/// watcher.wait();
///
/// for event in watcher.events().iter().take(1) {
///     println!("{event}");
/// }
///
/// watcher.close();
/// handle.join().unwrap()?;
/// # Ok::<(), pollwatch::Error>(())
/// ```
#[derive(Clone)]
pub struct PollWatcher {
    inner: Arc<Inner>,
}

impl PollWatcher {
    /// Create a new [`PollWatcher`] observing the real file system.
    pub fn new(config: Config) -> Self {
        let lister = FsLister::new().with_compare_contents(config.compare_contents());
        Self::with_lister(config, lister)
    }

    /// Create a new [`PollWatcher`] that reads the file system through `lister`.
    ///
    /// [`Config::with_compare_contents`] is up to the lister; it has no effect here.
    pub fn with_lister<L: DirLister>(config: Config, lister: L) -> Self {
        let (event_tx, event_rx) = bounded(config.channel_capacity());
        let (error_tx, error_rx) = bounded(config.channel_capacity());
        let (close_tx, close_rx) = bounded(0);
        let (closed_tx, closed_rx) = bounded(0);

        Self {
            inner: Arc::new(Inner {
                config,
                lister: Box::new(lister),
                filter: OpFilter::new(config.ops()),
                lifecycle: Lifecycle::new(),
                registry: Mutex::new(Registry::default()),
                published: Mutex::default(),
                event_tx,
                event_rx,
                error_tx,
                error_rx,
                close_tx: Mutex::new(Some(close_tx)),
                close_rx,
                closed_tx: Mutex::new(Some(closed_tx)),
                closed_rx,
            }),
        }
    }

    /// Replaces the set of operations delivered on the event channel.
    ///
    /// Takes effect from the next poll cycle.
    pub fn filter_ops(&self, ops: impl Into<OpMask>) {
        let ops = ops.into();
        log::debug!("filtering ops {ops:?}");
        self.inner.filter.configure(ops);
    }

    /// Watches `path` and its immediate children.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<()> {
        self.register(path.as_ref(), RecursiveMode::NonRecursive)
    }

    /// Watches `path` and everything below it.
    ///
    /// Only problems with `path` itself are returned. Entries below it that cannot be read
    /// are skipped and logged.
    pub fn add_recursive(&self, path: impl AsRef<Path>) -> Result<()> {
        self.register(path.as_ref(), RecursiveMode::Recursive)
    }

    /// Stops watching a root registered earlier. Its entries are forgotten without events.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = absolute(path.as_ref())?;
        let mut registry = self.inner.registry.lock();

        let before = registry.roots.len();
        registry.roots.retain(|root| root.path != path);
        if registry.roots.len() == before {
            return Err(Error::watch_not_found().add_path(path));
        }

        registry.changed = true;
        log::debug!("unwatched {path:?}");
        Ok(())
    }

    /// Blocks until the baseline snapshot is built, or the watcher is closed.
    pub fn wait(&self) {
        self.inner.lifecycle.wait_for(State::Ready);
    }

    /// Runs the poll loop on the calling thread.
    ///
    /// Builds the baseline snapshot, releases [`wait`](Self::wait)ers and then polls every
    /// `interval` until [`close`](Self::close) is called. Returns `Ok(())` after a requested
    /// close, including when the watcher was closed before it was started, and an error when
    /// polling could not continue. Either way the [`closed`](Self::closed) signal fires.
    pub fn start(&self, interval: Duration) -> Result<()> {
        let previous = self
            .inner
            .lifecycle
            .transition(|state| (state == State::Idle).then_some(State::Populating));
        match previous {
            State::Idle => {}
            State::Closing | State::Closed => {
                log::debug!("watcher closed before it was started");
                return Ok(());
            }
            _ => return Err(Error::already_running()),
        }

        let _closed = CloseOnExit(&self.inner);
        let result = self.inner.run(interval);
        if let Err(err) = &result {
            log::error!("poll loop stopped: {err}");
        }
        result
    }

    /// Requests the poll loop to stop.
    ///
    /// The loop exits before its next scan, or immediately when it is waiting for a consumer to
    /// take an event. Calling this more than once has no further effect.
    pub fn close(&self) {
        let requested = self.inner.close_tx.lock().take().is_some();
        if !requested {
            return;
        }

        let previous = self.inner.lifecycle.transition(|state| match state {
            State::Idle => Some(State::Closed),
            State::Populating | State::Ready | State::Running => Some(State::Closing),
            State::Closing | State::Closed => None,
        });
        log::debug!("close requested in state {previous:?}");

        if previous == State::Idle {
            self.inner.fire_closed();
        }
    }

    /// Events detected by the poll loop.
    pub fn events(&self) -> &Receiver<Event> {
        &self.inner.event_rx
    }

    /// Non-fatal errors, like a root that disappeared or became unreadable.
    ///
    /// Each failing path is reported once, when it starts failing. Unless the channel has a
    /// capacity, the loop waits for this channel to be read just like for
    /// [`events`](Self::events).
    pub fn errors(&self) -> &Receiver<Error> {
        &self.inner.error_rx
    }

    /// Fires once the watcher is closed.
    ///
    /// No value is ever sent: the channel is disconnected when the watcher closes, after which
    /// every receive returns immediately, for every receiver.
    pub fn closed(&self) -> &Receiver<()> {
        &self.inner.closed_rx
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.inner.lifecycle.state()
    }

    /// Whether the watcher reached [`State::Closed`].
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// The snapshot the last poll cycle ended with.
    pub fn watched_files(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.published.lock())
    }

    fn register(&self, path: &Path, mode: RecursiveMode) -> Result<()> {
        let path = absolute(path)?;
        let root = Root::new(path, mode);

        let scan = self.inner.scanner().scan_root(&root)?;
        for err in &scan.skipped {
            log::warn!("skipping unreadable entry below {:?}: {err}", root.path);
        }

        let mut registry = self.inner.registry.lock();
        registry.roots.retain(|r| r.path != root.path);
        log::debug!("watching {:?} ({mode:?})", root.path);
        registry.roots.push(root);
        registry.changed = true;
        if registry.populated {
            registry.seeds.push(scan.snapshot);
        }
        Ok(())
    }
}

impl fmt::Debug for PollWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollWatcher")
            .field("state", &self.state())
            .field("roots", &self.inner.registry.lock().roots)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn scanner(&self) -> Scanner<'_> {
        Scanner::new(&*self.lister, self.config.ignore_hidden())
    }

    fn run(&self, interval: Duration) -> Result<()> {
        let mut poller = Poller::new(self);
        poller.populate()?;

        self.lifecycle.advance(State::Ready);
        self.lifecycle.advance(State::Running);
        log::debug!("polling every {interval:?}");

        loop {
            select! {
                recv(self.close_rx) -> _ => break,
                default(interval) => {}
            }

            let cycle = poller.poll_once()?;
            if !self.deliver(cycle.errors, cycle.events) {
                break;
            }
            poller.commit(cycle.next);
        }

        Ok(())
    }

    /// Sends everything a cycle produced. Returns `false` when close was requested meanwhile.
    fn deliver(&self, errors: Vec<Error>, events: Vec<Event>) -> bool {
        for error in errors {
            if !self.send(&self.error_tx, error) {
                return false;
            }
        }
        for event in events {
            log::trace!("{event}");
            if !self.send(&self.event_tx, event) {
                return false;
            }
        }
        true
    }

    fn send<T>(&self, tx: &Sender<T>, msg: T) -> bool {
        select! {
            send(tx, msg) -> res => res.is_ok(),
            recv(self.close_rx) -> _ => false,
        }
    }

    fn publish(&self, snapshot: &Arc<Snapshot>) {
        *self.published.lock() = Arc::clone(snapshot);
    }

    fn fire_closed(&self) {
        if self.closed_tx.lock().take().is_some() {
            log::debug!("watcher closed");
        }
    }
}

/// Moves the watcher to `Closed` and fires the signal when the poll loop ends, however it ends.
struct CloseOnExit<'a>(&'a Inner);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.close_tx.lock().take();
        self.0.lifecycle.advance(State::Closed);
        self.0.fire_closed();
    }
}

/// What one poll cycle produced.
struct Cycle {
    events: Vec<Event>,
    errors: Vec<Error>,
    next: Snapshot,
}

/// State owned by the poll loop.
struct Poller<'a> {
    inner: &'a Inner,
    scanner: Scanner<'a>,
    store: SnapshotStore,
    /// Paths that failed during the last scan.
    failing: HashSet<PathBuf>,
}

impl<'a> Poller<'a> {
    fn new(inner: &'a Inner) -> Self {
        Self {
            inner,
            scanner: inner.scanner(),
            store: SnapshotStore::default(),
            failing: HashSet::new(),
        }
    }

    /// Builds the baseline. Nothing is reported for it.
    fn populate(&mut self) -> Result<()> {
        let roots = {
            let mut registry = self.inner.registry.lock();
            registry.populated = true;
            registry.seeds.clear();
            registry.changed = false;
            registry.roots.clone()
        };

        let started = Instant::now();
        let scan = self.scanner.scan_all(&roots);
        check_roots(&roots, &scan)?;

        // failures are reported from the first cycle on, once consumers listen
        for err in &scan.root_errors {
            log::warn!("{err}");
        }

        log::debug!(
            "baseline of {} roots with {} entries in {:?}",
            roots.len(),
            scan.snapshot.len(),
            started.elapsed()
        );
        self.commit(scan.snapshot);
        Ok(())
    }

    fn poll_once(&mut self) -> Result<Cycle> {
        let started = Instant::now();
        let roots = self.absorb();

        let scan = self.scanner.scan_all(&roots);
        check_roots(&roots, &scan)?;

        let previous = self.store.current();
        let mut next = scan.snapshot;
        for dir in &scan.unreadable {
            next.carry_forward(previous, dir);
        }

        let events = self.inner.filter.screen(diff(previous, &next));
        let errors = self.fresh_errors(scan.root_errors, scan.skipped);

        log::debug!(
            "poll cycle: {} entries, {} events, {} errors in {:?}",
            next.len(),
            events.len(),
            errors.len(),
            started.elapsed()
        );
        Ok(Cycle {
            events,
            errors,
            next,
        })
    }

    /// Applies registry changes to the baseline and returns the roots to scan.
    fn absorb(&mut self) -> Vec<Root> {
        let input = self.inner.registry.lock().take_cycle();
        if input.seeds.is_empty() && !input.changed {
            return input.roots;
        }

        let roots = input.roots;
        self.store.update(|baseline| {
            for seed in input.seeds {
                baseline.merge_absent(seed);
            }
            if input.changed {
                baseline.retain(|path| roots.iter().any(|root| root.covers(path)));
            }
        });
        roots
    }

    /// Keeps the errors about paths that were fine in the previous cycle.
    fn fresh_errors(&mut self, root_errors: Vec<Error>, skipped: Vec<Error>) -> Vec<Error> {
        let mut failing = HashSet::new();
        let mut fresh = Vec::new();

        let report_skipped = self.inner.config.report_subtree_errors();
        let tagged = root_errors
            .into_iter()
            .map(|err| (err, true))
            .chain(skipped.into_iter().map(|err| (err, report_skipped)));

        for (err, report) in tagged {
            let Some(path) = err.paths.first().cloned() else {
                fresh.extend(report.then_some(err));
                continue;
            };
            if !self.failing.contains(&path) {
                log::warn!("{err}");
                if report {
                    fresh.push(err);
                }
            }
            failing.insert(path);
        }

        for path in self.failing.difference(&failing) {
            log::info!("{path:?} can be read again");
        }
        self.failing = failing;
        fresh
    }

    fn commit(&mut self, next: Snapshot) {
        self.store.replace(next);
        self.inner.publish(self.store.current());
    }
}

fn check_roots(roots: &[Root], scan: &CycleScan) -> Result<()> {
    if !roots.is_empty() && scan.lost.len() >= roots.len() {
        return Err(Error::roots_lost().set_paths(scan.lost.clone()));
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(Error::invalid_path().add_path(path.into()));
    }
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    Ok(path.components().collect())
}
