//! Registry of objects whose upload has not been committed yet
//!
//! A write-open registers a phantom entry under its key and the entry stays
//! until the upload is closed, removed or renamed away. Stat, listing and
//! read-open consult the registry first so a half-written file is visible to
//! every session of this process before it exists in the store.

use bucketio_common::{FileEntry, FileMode, KeyPath};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Permission bits reported for in-flight uploads
pub const PHANTOM_PERM: u32 = 0o600;

/// Bytes accumulated for an in-flight upload
pub trait PhantomContent: Send + Sync {
    /// Copy of everything written so far
    fn snapshot(&self) -> Bytes;

    fn size(&self) -> u64;
}

impl PhantomContent for Bytes {
    fn snapshot(&self) -> Bytes {
        self.clone()
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PhantomState {
    key: KeyPath,
    size: u64,
}

/// Consistent view of a phantom entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhantomSnapshot {
    pub key: KeyPath,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl PhantomSnapshot {
    /// Directory entry describing the in-flight file
    #[must_use]
    pub fn to_entry(&self) -> FileEntry {
        FileEntry::new(
            self.key.base(),
            self.last_modified,
            self.size,
            FileMode::file(PHANTOM_PERM),
        )
    }
}

/// One in-flight upload
///
/// The key and size change while the upload runs (rename, writes), so they
/// sit behind a lock; reads go through [`PhantomObject::snapshot`] to get
/// both at once.
pub struct PhantomObject {
    state: Mutex<PhantomState>,
    last_modified: DateTime<Utc>,
    content: Arc<dyn PhantomContent>,
    discarded: AtomicBool,
}

impl PhantomObject {
    pub fn new(
        key: KeyPath,
        last_modified: DateTime<Utc>,
        content: Arc<dyn PhantomContent>,
    ) -> Self {
        Self {
            state: Mutex::new(PhantomState { key, size: 0 }),
            last_modified,
            content,
            discarded: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn key(&self) -> KeyPath {
        self.state.lock().key.clone()
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    pub fn set_size(&self, size: u64) {
        self.state.lock().size = size;
    }

    #[must_use]
    pub const fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    #[must_use]
    pub fn snapshot(&self) -> PhantomSnapshot {
        let state = self.state.lock();
        PhantomSnapshot {
            key: state.key.clone(),
            size: state.size,
            last_modified: self.last_modified,
        }
    }

    /// Bytes written so far
    #[must_use]
    pub fn content(&self) -> Bytes {
        self.content.snapshot()
    }

    /// Mark the upload as abandoned; its close will not commit
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    fn set_key(&self, key: KeyPath) {
        self.state.lock().key = key;
    }
}

impl fmt::Debug for PhantomObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PhantomObject")
            .field("key", &state.key)
            .field("size", &state.size)
            .field("last_modified", &self.last_modified)
            .field("content_size", &self.content.size())
            .field("discarded", &self.is_discarded())
            .finish()
    }
}

/// Process-wide map from key to in-flight upload
///
/// Lock order is registry, then entry. Entry locks are never held while
/// taking the registry lock.
#[derive(Default)]
pub struct PhantomRegistry {
    entries: RwLock<BTreeMap<KeyPath, Arc<PhantomObject>>>,
}

impl PhantomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `info` under its key
    ///
    /// Returns false, leaving the registry untouched, when the key is
    /// already taken.
    pub fn add(&self, info: Arc<PhantomObject>) -> bool {
        let mut entries = self.entries.write();
        let key = info.key();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, info);
        true
    }

    #[must_use]
    pub fn get(&self, key: &KeyPath) -> Option<Arc<PhantomObject>> {
        self.entries.read().get(key).cloned()
    }

    pub fn remove(&self, key: &KeyPath) -> Option<Arc<PhantomObject>> {
        self.entries.write().remove(key)
    }

    /// Remove the mapping only if it still points at this exact entry
    pub fn remove_by_ref(&self, info: &Arc<PhantomObject>) -> bool {
        let mut entries = self.entries.write();
        let key = info.key();
        match entries.get(&key) {
            Some(current) if Arc::ptr_eq(current, info) => {
                entries.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Move the entry at `src` to `dest`
    ///
    /// The entry's own key is updated under the same lock. An entry already
    /// registered at `dest` is replaced and discarded. Returns false when
    /// nothing is registered at `src`.
    pub fn rename(&self, src: &KeyPath, dest: &KeyPath) -> bool {
        let mut entries = self.entries.write();
        let Some(info) = entries.remove(src) else {
            return false;
        };
        info.set_key(dest.clone());
        if let Some(displaced) = entries.insert(dest.clone(), info) {
            displaced.discard();
        }
        true
    }

    /// Entries exactly one level below `prefix`
    #[must_use]
    pub fn list(&self, prefix: &KeyPath) -> Vec<Arc<PhantomObject>> {
        let entries = self.entries.read();
        entries
            .range((Bound::Excluded(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.is_prefixed_by(prefix))
            .filter(|(key, _)| key.is_child_of(prefix))
            .map(|(_, info)| Arc::clone(info))
            .collect()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for PhantomRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhantomRegistry")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phantom(segments: &[&str]) -> Arc<PhantomObject> {
        Arc::new(PhantomObject::new(
            KeyPath::from_segments(segments.iter().copied()),
            DateTime::UNIX_EPOCH,
            Arc::new(Bytes::new()),
        ))
    }

    fn key(segments: &[&str]) -> KeyPath {
        KeyPath::from_segments(segments.iter().copied())
    }

    #[test]
    fn test_add() {
        let registry = PhantomRegistry::new();
        assert!(registry.add(phantom(&["", "a", "b"])));
        assert_eq!(registry.size(), 1);
        assert!(!registry.add(phantom(&["", "a", "b"])));
        assert_eq!(registry.size(), 1);
        assert!(registry.add(phantom(&["", "a", "c"])));
        assert_eq!(registry.size(), 2);
        // a registered key may coexist with entries below it
        assert!(registry.add(phantom(&["", "a", "b", "c"])));
        assert_eq!(registry.size(), 3);
    }

    #[test]
    fn test_remove() {
        let registry = PhantomRegistry::new();
        let o1 = phantom(&["", "a", "b"]);
        let o2 = phantom(&["", "a", "b"]);
        let o3 = phantom(&["", "a", "c"]);
        let o4 = phantom(&["", "a", "b", "c"]);
        assert!(registry.add(Arc::clone(&o1)));
        assert!(!registry.add(Arc::clone(&o2)));
        assert!(registry.add(Arc::clone(&o3)));
        assert!(registry.add(Arc::clone(&o4)));
        assert_eq!(registry.size(), 3);

        let removed = registry.remove(&key(&["", "a", "c"])).unwrap();
        assert!(Arc::ptr_eq(&removed, &o3));
        assert!(registry.get(&key(&["", "a", "c"])).is_none());
        assert_eq!(registry.size(), 2);
        assert!(registry.remove(&key(&["", "a", "c"])).is_none());
        assert_eq!(registry.size(), 2);

        // the rejected duplicate never replaced the original
        let removed = registry.remove(&key(&["", "a", "b"])).unwrap();
        assert!(Arc::ptr_eq(&removed, &o1));
        assert_eq!(registry.size(), 1);
        assert!(registry.get(&key(&["", "a", "b"])).is_none());
        assert!(registry.get(&key(&["", "a", "b", "c"])).is_some());
    }

    #[test]
    fn test_remove_by_ref() {
        let registry = PhantomRegistry::new();
        let original = phantom(&["a"]);
        let other = phantom(&["a"]);
        assert!(registry.add(Arc::clone(&original)));

        assert!(!registry.remove_by_ref(&other));
        assert_eq!(registry.size(), 1);
        assert!(registry.remove_by_ref(&original));
        assert!(registry.is_empty());
        assert!(!registry.remove_by_ref(&original));
    }

    #[test]
    fn test_rename() {
        let registry = PhantomRegistry::new();
        let info = phantom(&["dir", "tmp"]);
        assert!(registry.add(Arc::clone(&info)));

        assert!(registry.rename(&key(&["dir", "tmp"]), &key(&["dir", "final"])));
        assert!(registry.get(&key(&["dir", "tmp"])).is_none());
        let moved = registry.get(&key(&["dir", "final"])).unwrap();
        assert!(Arc::ptr_eq(&moved, &info));
        assert_eq!(info.key(), key(&["dir", "final"]));

        // the renamed entry can still be removed by reference
        assert!(registry.remove_by_ref(&info));
        assert!(registry.is_empty());

        assert!(!registry.rename(&key(&["missing"]), &key(&["x"])));
    }

    #[test]
    fn test_rename_replaces_destination() {
        let registry = PhantomRegistry::new();
        let src = phantom(&["src"]);
        let dest = phantom(&["dest"]);
        registry.add(Arc::clone(&src));
        registry.add(Arc::clone(&dest));

        assert!(registry.rename(&key(&["src"]), &key(&["dest"])));
        assert_eq!(registry.size(), 1);
        assert!(Arc::ptr_eq(&registry.get(&key(&["dest"])).unwrap(), &src));
        assert!(dest.is_discarded());
        assert!(!src.is_discarded());
    }

    #[test]
    fn test_list_immediate_children() {
        let registry = PhantomRegistry::new();
        registry.add(phantom(&["a"]));
        registry.add(phantom(&["a", "b"]));
        registry.add(phantom(&["a", "c"]));
        registry.add(phantom(&["a", "c", "d"]));
        registry.add(phantom(&["a0", "e"]));
        registry.add(phantom(&["b"]));

        let names: Vec<KeyPath> = registry
            .list(&key(&["a"]))
            .iter()
            .map(|info| info.key())
            .collect();
        assert_eq!(names, vec![key(&["a", "b"]), key(&["a", "c"])]);

        let root: Vec<KeyPath> = registry
            .list(&KeyPath::root())
            .iter()
            .map(|info| info.key())
            .collect();
        assert_eq!(root, vec![key(&["a"]), key(&["b"])]);

        assert!(registry.list(&key(&["b"])).is_empty());
    }

    #[test]
    fn test_snapshot_entry() {
        let info = PhantomObject::new(
            key(&["dir", "file.txt"]),
            DateTime::UNIX_EPOCH,
            Arc::new(Bytes::from_static(b"hello")),
        );
        info.set_size(5);
        let entry = info.snapshot().to_entry();
        assert_eq!(entry.name(), "file.txt");
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.mode(), FileMode::file(0o600));
        assert_eq!(info.content(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_concurrent_updates_and_listing() {
        const WRITERS: usize = 4;
        const ROUNDS: u64 = 300;

        let registry = PhantomRegistry::new();
        let dir = key(&["dir"]);
        let keep: Vec<_> = (0..WRITERS)
            .map(|t| {
                let info = phantom(&["dir", &format!("keep{t}")]);
                assert!(registry.add(Arc::clone(&info)));
                info
            })
            .collect();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let writers: Vec<_> = keep
                .iter()
                .enumerate()
                .map(|(t, kept)| {
                    let registry = &registry;
                    scope.spawn(move || {
                        for i in 0..ROUNDS {
                            let name = format!("w{t}-{i}");
                            let info = phantom(&["dir", &name]);
                            info.set_size(i);
                            assert!(registry.add(Arc::clone(&info)));
                            let nested = phantom(&["dir", &name, "nested"]);
                            assert!(registry.add(Arc::clone(&nested)));

                            let renamed = key(&["dir", &format!("{name}.done")]);
                            assert!(registry.rename(&info.key(), &renamed));
                            assert_eq!(info.key(), renamed);
                            kept.set_size(i);

                            assert!(registry.remove_by_ref(&nested));
                            assert!(registry.remove_by_ref(&info));
                            assert!(!registry.remove_by_ref(&info));
                        }
                    })
                })
                .collect();

            for _ in 0..2 {
                scope.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        for info in registry.list(&dir) {
                            let snapshot = info.snapshot();
                            assert!(snapshot.key.is_child_of(&dir), "{snapshot:?}");
                            let base = snapshot.key.base();
                            if let Some(rest) = base.strip_prefix('w') {
                                let round: u64 = rest
                                    .split(['-', '.'])
                                    .nth(1)
                                    .and_then(|i| i.parse().ok())
                                    .unwrap();
                                assert_eq!(snapshot.size, round, "{snapshot:?}");
                            }
                        }
                        if let Some(info) = registry.get(&key(&["dir", "keep0"])) {
                            assert_eq!(info.key(), key(&["dir", "keep0"]));
                        }
                    }
                });
            }

            for writer in writers {
                writer.join().unwrap();
            }
            done.store(true, Ordering::Release);
        });

        let listed = registry.list(&dir);
        assert_eq!(listed.len(), WRITERS);
        assert_eq!(registry.size(), WRITERS);
        for (info, kept) in listed.iter().zip(&keep) {
            assert!(Arc::ptr_eq(info, kept));
            assert_eq!(info.size(), ROUNDS - 1);
        }
    }
}
