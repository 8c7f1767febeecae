#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    process,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use pollwatch::{Config, Event, Op, PollWatcher, Result};
use tempfile::TempDir;

pub const INTERVAL: Duration = Duration::from_millis(50);
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Collects events until nothing arrived for `quiet`.
pub fn recv_events_until_quiet(rx: &Receiver<Event>, quiet: Duration) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match rx.recv_timeout(quiet) {
            Ok(event) => events.push(event),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => panic!("unexpected channel disconnection"),
        }
    }
    events
}

/// Receives events until one matches `op` and `path`. Returns everything received.
pub fn recv_until(rx: &Receiver<Event>, op: Op, path: &Path) -> Vec<Event> {
    let start = Instant::now();
    let mut events = Vec::new();

    while start.elapsed() < TIMEOUT {
        match rx.recv_timeout(TIMEOUT.saturating_sub(start.elapsed())) {
            Ok(event) => {
                let found = event.op == op && event.path == path;
                events.push(event);
                if found {
                    return events;
                }
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => panic!("unexpected channel disconnection"),
        }
    }
    panic!("no {op} event for {path:?}, received {events:#?}");
}

pub fn fail_after(test_name: &'static str, duration: Duration) -> impl Drop {
    struct SuccessOnDrop(Arc<AtomicBool>);
    impl Drop for SuccessOnDrop {
        fn drop(&mut self) {
            self.0.store(true, SeqCst)
        }
    }

    let finished = SuccessOnDrop(Arc::new(AtomicBool::new(false)));
    // timeout the test to catch deadlocks
    {
        let finished = finished.0.clone();
        thread::spawn(move || {
            thread::sleep(duration);
            if !finished.load(SeqCst) {
                println!("test `{test_name}` timed out");
                process::abort();
            }
        });
    }
    finished
}

/// A temporary directory with a canonical path, so that event paths compare equal to it.
pub struct TestDir {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }
}

pub fn testdir() -> TestDir {
    let dir = tempfile::tempdir().expect("Unable to create tempdir");
    let path = std::fs::canonicalize(dir.path()).unwrap_or_else(|e| {
        panic!(
            "unable to canonicalize tempdir path {:?}: {e:?}",
            dir.path()
        )
    });
    TestDir { _dir: dir, path }
}

/// A watcher running its poll loop on a background thread.
pub struct Running {
    pub watcher: PollWatcher,
    handle: Option<JoinHandle<Result<()>>>,
}

impl Running {
    /// Registers `root` recursively, starts polling and waits for the baseline.
    pub fn recursive(root: &Path, config: Config) -> Self {
        let watcher = PollWatcher::new(config);
        watcher
            .add_recursive(root)
            .unwrap_or_else(|e| panic!("Unable to watch {root:?}: {e:#?}"));
        Self::start(watcher)
    }

    pub fn start(watcher: PollWatcher) -> Self {
        let poller = watcher.clone();
        let handle = thread::spawn(move || poller.start(INTERVAL));
        watcher.wait();
        Self {
            watcher,
            handle: Some(handle),
        }
    }

    pub fn events(&self) -> &Receiver<Event> {
        self.watcher.events()
    }

    /// Closes the watcher and returns what `start` returned.
    pub fn stop(mut self) -> Result<()> {
        self.watcher.close();
        let handle = self.handle.take().expect("started");
        handle.join().expect("poll loop panicked")
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.watcher.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn summary(events: &[Event]) -> Vec<(Op, PathBuf)> {
    events.iter().map(|e| (e.op, e.path.clone())).collect()
}
