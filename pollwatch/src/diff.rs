//! Computes the events that turn one snapshot into the next.
//!
//! Paths present only in the old snapshot are removals, paths present only in the new one are
//! creations. Before those are reported, removals are paired with creations that look like the
//! same file system object under a new name:
//!
//! * Directories are paired first, one tree level at a time, so that a directory is paired
//!   before its contents. Everything else is paired once all directories are settled.
//! * A removed path is translated through the directory renames found so far. If a creation of
//!   the same kind exists at the translated path, the two are paired even when the metadata
//!   changed on the way. These pairs are made before any matching by metadata.
//! * Otherwise the candidates are the creations whose signature (kind, size, modification time,
//!   plus file identity and content hash where both sides know them) equals the removed entry's.
//!   A creation that a pending removal will inherit through a renamed directory is not a
//!   candidate. The closest one in the tree wins, ties are broken by path order.
//!
//! A pair within the same parent directory is a [`Op::Rename`], anything else a [`Op::Move`].
//! Every path ends up in at most one event and every pairing is one-to-one.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    time::SystemTime,
};

use pollwatch_types::event::{Event, FileInfo, FileKind, Op};

use crate::snapshot::Snapshot;

type Entry<'a> = (&'a Path, &'a FileInfo);

/// Returns the events between `prev` and `next`.
///
/// The result is ordered: renames and moves by new path, then removals deepest first, then
/// creations, writes and mode changes by path.
pub(crate) fn diff(prev: &Snapshot, next: &Snapshot) -> Vec<Event> {
    let mut pairing = Pairing::default();
    let mut writes = Vec::new();
    let mut chmods = Vec::new();

    for (path, info) in next.iter() {
        match prev.get(path) {
            None => pairing.add_create(path, info),
            Some(old) => match change(old, info) {
                Some(Op::Write) => writes.push(Event::new(Op::Write, path.into(), info.clone())),
                Some(_) => chmods.push(Event::new(Op::Chmod, path.into(), info.clone())),
                None => {}
            },
        }
    }

    let mut removes: Vec<Entry> = prev
        .iter()
        .filter(|(path, _)| !next.contains(path))
        .collect();
    removes.sort_by(|(a, _), (b, _)| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));
    let (dirs, others): (Vec<Entry>, Vec<Entry>) =
        removes.into_iter().partition(|(_, info)| info.is_dir());

    let mut levels: BTreeMap<usize, Vec<Entry>> = BTreeMap::new();
    for (path, info) in dirs {
        pairing.pending.insert(path, info);
        levels.entry(depth(path)).or_default().push((path, info));
    }

    let mut unpaired = Vec::new();
    for level in levels.into_values().chain([others]) {
        for (old_path, old_info) in pairing.inherit(level) {
            let paired = pairing
                .closest(old_path, old_info)
                .is_some_and(|new_path| pairing.pair(old_path, new_path));
            if !paired {
                pairing.pending.remove(old_path);
                unpaired.push(Event::new(Op::Remove, old_path.into(), old_info.clone()));
            }
        }
    }

    let mut events = pairing.names;
    events.sort_by(|a, b| a.path.cmp(&b.path));
    unpaired.sort_by(|a, b| b.path.cmp(&a.path));

    events.append(&mut unpaired);
    events.extend(
        pairing
            .creates
            .into_iter()
            .map(|(path, info)| Event::new(Op::Create, path.into(), info.clone())),
    );
    events.append(&mut writes);
    events.append(&mut chmods);
    events
}

/// The part of an entry's signature that can be hashed.
type Bucket = (FileKind, u64, Option<SystemTime>);

fn bucket(info: &FileInfo) -> Bucket {
    (info.kind, info.size, info.mtime)
}

/// Pairing state of one diff.
#[derive(Default)]
struct Pairing<'a> {
    /// Creations not paired yet.
    creates: BTreeMap<&'a Path, &'a FileInfo>,
    /// The same creations, grouped by signature.
    buckets: HashMap<Bucket, BTreeSet<&'a Path>>,
    /// Directory removals not decided yet.
    pending: BTreeMap<&'a Path, &'a FileInfo>,
    /// Old directory path to new directory path.
    moved_dirs: HashMap<&'a Path, &'a Path>,
    /// New directory path to old directory path.
    renamed_to: HashMap<&'a Path, &'a Path>,
    names: Vec<Event>,
}

impl<'a> Pairing<'a> {
    fn add_create(&mut self, path: &'a Path, info: &'a FileInfo) {
        self.creates.insert(path, info);
        self.buckets.entry(bucket(info)).or_default().insert(path);
    }

    /// Pairs every removal that has a creation waiting at its translated path and returns the
    /// others.
    fn inherit(&mut self, removes: Vec<Entry<'a>>) -> Vec<Entry<'a>> {
        removes
            .into_iter()
            .filter(|&(old_path, old_info)| {
                !self
                    .inherited(old_path, old_info)
                    .is_some_and(|new_path| self.pair(old_path, new_path))
            })
            .collect()
    }

    fn inherited(&self, old_path: &Path, old_info: &FileInfo) -> Option<&'a Path> {
        let translated = translate(old_path, &self.moved_dirs)?;
        let (path, info) = self.creates.get_key_value(translated.as_path())?;
        (info.kind == old_info.kind).then_some(*path)
    }

    /// The best creation with the same signature as the removed entry.
    fn closest(&self, old_path: &Path, old_info: &FileInfo) -> Option<&'a Path> {
        let translated = translate(old_path, &self.moved_dirs);
        let anchor = translated.as_deref().unwrap_or(old_path);

        self.buckets
            .get(&bucket(old_info))?
            .iter()
            .copied()
            .filter(|path| {
                self.creates
                    .get(path)
                    .is_some_and(|info| same_signature(old_info, info))
            })
            .filter(|path| !self.reserved(path, old_path))
            .min_by_key(|path| (distance(anchor, path), *path))
    }

    /// `candidate` is what another pending removal turns into through a renamed directory.
    fn reserved(&self, candidate: &Path, claimant: &Path) -> bool {
        let Some(info) = self.creates.get(candidate) else {
            return false;
        };
        let heir = candidate.ancestors().skip(1).find_map(|ancestor| {
            let from = self.renamed_to.get(ancestor)?;
            Some(from.join(candidate.strip_prefix(ancestor).ok()?))
        });
        heir.is_some_and(|heir| {
            heir != claimant
                && self
                    .pending
                    .get(heir.as_path())
                    .is_some_and(|pending| pending.kind == info.kind)
                && translate(&heir, &self.moved_dirs).as_deref() == Some(candidate)
        })
    }

    /// Records `old_path` as renamed or moved to `new_path`.
    fn pair(&mut self, old_path: &'a Path, new_path: &'a Path) -> bool {
        let Some(new_info) = self.creates.remove(new_path) else {
            return false;
        };
        if let Some(paths) = self.buckets.get_mut(&bucket(new_info)) {
            paths.remove(new_path);
        }
        self.pending.remove(old_path);
        if new_info.is_dir() {
            self.moved_dirs.insert(old_path, new_path);
            self.renamed_to.insert(new_path, old_path);
        }

        let op = if old_path.parent() == new_path.parent() {
            Op::Rename
        } else {
            Op::Move
        };
        self.names.push(
            Event::new(op, new_path.into(), new_info.clone()).with_old_path(old_path.into()),
        );
        true
    }
}

/// Classifies the difference between two observations of the same path.
fn change(old: &FileInfo, new: &FileInfo) -> Option<Op> {
    if old.size != new.size
        || old.mtime != new.mtime
        || differ(old.file_id, new.file_id)
        || differ(old.content_hash, new.content_hash)
    {
        Some(Op::Write)
    } else if old.mode != new.mode || old.kind != new.kind {
        Some(Op::Chmod)
    } else {
        None
    }
}

fn same_signature(a: &FileInfo, b: &FileInfo) -> bool {
    a.kind == b.kind
        && a.size == b.size
        && a.mtime == b.mtime
        && !differ(a.file_id, b.file_id)
        && !differ(a.content_hash, b.content_hash)
}

/// Both sides are known and disagree.
fn differ<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a != b)
}

/// Rewrites `path` through the nearest ancestor directory that was renamed.
fn translate(path: &Path, moved_dirs: &HashMap<&Path, &Path>) -> Option<PathBuf> {
    path.ancestors().skip(1).find_map(|ancestor| {
        let to = moved_dirs.get(ancestor)?;
        let rest = path.strip_prefix(ancestor).ok()?;
        Some(to.join(rest))
    })
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

/// Number of edges between two paths in the tree.
fn distance(a: &Path, b: &Path) -> usize {
    let common = a
        .components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .count();
    depth(a) + depth(b) - 2 * common
}
