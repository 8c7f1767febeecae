#![allow(dead_code)] // not all helpers are used by every test module

use std::{
    collections::{BTreeMap, HashSet},
    fmt::Debug,
    ops::Bound,
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use pollwatch_types::event::{Event, FileId, FileInfo, FileKind, Op};

use crate::{
    fs::{DirEntry, DirLister},
    Error, PollWatcher, Result, Snapshot,
};

pub fn time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// A regular file entry.
pub fn file(size: u64, secs: u64) -> FileInfo {
    FileInfo::new(FileKind::File)
        .with_size(size)
        .with_mtime(time(secs))
        .with_mode(0o644)
}

pub fn file_with_id(size: u64, secs: u64, inode: u64) -> FileInfo {
    file(size, secs).with_file_id(FileId::new(1, inode))
}

pub fn dir(secs: u64) -> FileInfo {
    FileInfo::new(FileKind::Dir)
        .with_mtime(time(secs))
        .with_mode(0o755)
}

pub fn snapshot(entries: impl IntoIterator<Item = (&'static str, FileInfo)>) -> Snapshot {
    entries
        .into_iter()
        .map(|(path, info)| (PathBuf::from(path), info))
        .collect()
}

/// In-memory file system.
///
/// Every mutation advances a clock by one second and stamps the touched entries and their
/// parent directories with it, so no two mutations share a modification time. Entries keep
/// their inode across renames.
#[derive(Clone, Default)]
pub struct MemLister {
    fs: Arc<Mutex<MemFs>>,
}

#[derive(Default)]
struct MemFs {
    nodes: BTreeMap<PathBuf, FileInfo>,
    denied: HashSet<PathBuf>,
    clock: u64,
    next_inode: u64,
}

impl MemFs {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        time(self.clock)
    }

    fn node(&mut self, kind: FileKind, size: u64, now: SystemTime) -> FileInfo {
        self.next_inode += 1;
        let mode = if kind == FileKind::Dir { 0o755 } else { 0o644 };
        FileInfo::new(kind)
            .with_size(size)
            .with_mtime(now)
            .with_mode(mode)
            .with_file_id(FileId::new(1, self.next_inode))
    }

    fn touch_parent(&mut self, path: &Path, now: SystemTime) {
        if let Some(info) = path.parent().and_then(|p| self.nodes.get_mut(p)) {
            info.mtime = Some(now);
        }
    }

    fn mkdir_all(&mut self, path: &Path, now: SystemTime) {
        let mut missing: Vec<_> = path
            .ancestors()
            .take_while(|p| p.parent().is_some() && !self.nodes.contains_key(*p))
            .map(Path::to_path_buf)
            .collect();
        missing.reverse();

        for dir in missing {
            let info = self.node(FileKind::Dir, 0, now);
            self.touch_parent(&dir, now);
            self.nodes.insert(dir, info);
        }
    }

    /// A strict ancestor of `path` may not be read.
    fn blocked(&self, path: &Path) -> bool {
        path.ancestors().skip(1).any(|p| self.denied.contains(p))
    }

    fn subtree(&self, path: &Path) -> Vec<PathBuf> {
        self.nodes
            .range::<Path, _>((Bound::Included(path), Bound::Unbounded))
            .take_while(|(p, _)| p.starts_with(path))
            .map(|(p, _)| p.clone())
            .collect()
    }
}

impl MemLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory and its missing parents.
    pub fn mkdir(&self, path: impl AsRef<Path>) {
        let mut fs = self.fs.lock();
        let now = fs.tick();
        fs.mkdir_all(path.as_ref(), now);
    }

    /// Creates or overwrites a file, creating missing parents.
    pub fn write(&self, path: impl AsRef<Path>, contents: &[u8]) {
        let path = path.as_ref();
        let mut fs = self.fs.lock();
        let now = fs.tick();
        if let Some(parent) = path.parent() {
            fs.mkdir_all(parent, now);
        }

        let size = contents.len() as u64;
        match fs.nodes.get_mut(path) {
            Some(info) => {
                info.size = size;
                info.mtime = Some(now);
            }
            None => {
                let info = fs.node(FileKind::File, size, now);
                fs.touch_parent(path, now);
                fs.nodes.insert(path.to_path_buf(), info);
            }
        }
    }

    /// Removes an entry and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut fs = self.fs.lock();
        let now = fs.tick();
        for p in fs.subtree(path) {
            fs.nodes.remove(&p);
        }
        fs.touch_parent(path, now);
    }

    /// Moves an entry and everything below it. Metadata is preserved.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) {
        let (from, to) = (from.as_ref(), to.as_ref());
        let mut fs = self.fs.lock();
        let now = fs.tick();
        for p in fs.subtree(from) {
            if let Some(info) = fs.nodes.remove(&p) {
                let rest = p.strip_prefix(from).unwrap();
                let target = if rest.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(rest)
                };
                fs.nodes.insert(target, info);
            }
        }
        fs.touch_parent(from, now);
        fs.touch_parent(to, now);
    }

    pub fn chmod(&self, path: impl AsRef<Path>, mode: u32) {
        if let Some(info) = self.fs.lock().nodes.get_mut(path.as_ref()) {
            info.mode = mode;
        }
    }

    /// Makes a directory unlistable, and everything below it unreachable.
    pub fn deny(&self, path: impl AsRef<Path>) {
        self.fs.lock().denied.insert(path.as_ref().to_path_buf());
    }

    pub fn allow(&self, path: impl AsRef<Path>) {
        self.fs.lock().denied.remove(path.as_ref());
    }
}

impl DirLister for MemLister {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let fs = self.fs.lock();
        if fs.blocked(path) {
            return Err(Error::permission_denied().add_path(path.into()));
        }
        fs.nodes
            .get(path)
            .cloned()
            .ok_or_else(|| Error::path_not_found().add_path(path.into()))
    }

    fn list(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let fs = self.fs.lock();
        if fs.blocked(path) || fs.denied.contains(path) {
            return Err(Error::permission_denied().add_path(path.into()));
        }
        match fs.nodes.get(path) {
            None => return Err(Error::path_not_found().add_path(path.into())),
            Some(info) if !info.is_dir() => {
                return Err(Error::invalid_path().add_path(path.into()))
            }
            Some(_) => {}
        }

        Ok(fs
            .nodes
            .range::<Path, _>((Bound::Included(path), Bound::Unbounded))
            .take_while(|(p, _)| p.starts_with(path))
            .filter(|(p, _)| p.parent() == Some(path))
            .filter_map(|(p, info)| Some(DirEntry::new(p.file_name()?, info.clone())))
            .collect())
    }
}

/// Runs [`PollWatcher::start`] on its own thread.
pub fn spawn_start(watcher: &PollWatcher, interval: Duration) -> JoinHandle<Result<()>> {
    let watcher = watcher.clone();
    thread::spawn(move || watcher.start(interval))
}

/// Asserts that the closed signal has fired.
pub fn assert_closed(closed: &Receiver<()>) {
    match closed.recv_timeout(Duration::from_secs(5)) {
        Err(RecvTimeoutError::Disconnected) => {}
        other => panic!("closed signal did not fire: {other:?}"),
    }
}

/// Waits for events from the watcher and provides some helper methods
pub struct EventReceiver<'a> {
    pub rx: &'a Receiver<Event>,
    pub timeout: Duration,
}

impl<'a> EventReceiver<'a> {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(rx: &'a Receiver<Event>) -> Self {
        Self {
            rx,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn recv(&mut self) -> Event {
        self.rx
            .recv_timeout(self.timeout)
            .unwrap_or_else(|e| panic!("Unable to wait the next event: {e:?}"))
    }

    /// Waits for the expected events in any order, ignoring unexpected ones.
    ///
    /// Returns everything received on the way.
    pub fn wait_unordered<P: AsRef<Path> + Debug>(
        &mut self,
        expected: impl IntoIterator<Item = (Op, P)>,
    ) -> Vec<Event> {
        let mut expected: Vec<(Op, PathBuf)> = expected
            .into_iter()
            .map(|(op, path)| (op, path.as_ref().to_path_buf()))
            .collect();
        let mut received = Vec::new();
        let deadline = Instant::now() + self.timeout;

        while !expected.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(event) => {
                    expected.retain(|(op, path)| !(*op == event.op && *path == event.path));
                    received.push(event);
                }
                Err(e) => panic!(
                    "Still expecting {expected:#?} after receiving {received:#?}: {e:?}"
                ),
            }
        }
        received
    }

    /// Ensures that nothing is waiting in the channel.
    pub fn ensure_empty(&mut self) {
        if let Ok(event) = self.rx.try_recv() {
            panic!("Unexpected event was received: {event:#?}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_lister_lists_children_only() {
        let fs = MemLister::new();
        fs.mkdir("/r/a/b");
        fs.write("/r/c", b"abc");

        let names: Vec<_> = fs
            .list(Path::new("/r"))
            .unwrap()
            .into_iter()
            .map(|e| e.name.into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(fs.stat(Path::new("/r/c")).unwrap().size, 3);
    }

    #[test]
    fn mem_lister_rename_keeps_identity() {
        let fs = MemLister::new();
        fs.write("/r/x", b"foo");
        let before = fs.stat(Path::new("/r/x")).unwrap();

        fs.rename("/r/x", "/r/y");

        assert!(fs.stat(Path::new("/r/x")).unwrap_err().is_not_found());
        assert_eq!(fs.stat(Path::new("/r/y")).unwrap(), before);
        assert!(fs.stat(Path::new("/r")).unwrap().mtime > before.mtime);
    }

    #[test]
    fn mem_lister_denied_directory() {
        let fs = MemLister::new();
        fs.write("/r/d/x", b"x");
        fs.deny("/r/d");

        assert!(fs.stat(Path::new("/r/d")).is_ok());
        assert!(fs.list(Path::new("/r/d")).unwrap_err().is_permission_denied());
        assert!(fs.stat(Path::new("/r/d/x")).unwrap_err().is_permission_denied());

        fs.allow("/r/d");
        assert_eq!(fs.list(Path::new("/r/d")).unwrap().len(), 1);
    }
}
