//! Core type definitions for BucketIO
//!
//! This module defines the hierarchical key representation shared by the
//! protocol side and the store side, and the directory entry value type
//! returned by stat and listing operations.

use chrono::{DateTime, Utc};
use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between key segments in store keys and protocol paths
pub const KEY_SEPARATOR: char = '/';

/// Store key as an ordered sequence of path segments
///
/// The empty sequence is the root. Ordering is segment-wise, so every key
/// sharing a prefix sorts contiguously right after that prefix.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// The root key (no segments)
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a key from raw segments, taken verbatim
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Split a slash-separated path into a normalized key
    ///
    /// Empty and `.` segments are dropped and `..` pops the previous segment
    /// (never above the root).
    #[must_use]
    pub fn split(path: &str) -> Self {
        let mut segments: Vec<String> = Vec::new();
        for part in path.split(KEY_SEPARATOR) {
            match part {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                _ => segments.push(part.to_string()),
            }
        }
        Self(segments)
    }

    /// Append another key below this one
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + other.0.len());
        segments.extend_from_slice(&self.0);
        segments.extend_from_slice(&other.0);
        Self(segments)
    }

    /// Whether `prefix` is a (non-strict) segment-wise prefix of this key
    #[must_use]
    pub fn is_prefixed_by(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Whether this key sits exactly one level below `parent`
    #[must_use]
    pub fn is_child_of(&self, parent: &Self) -> bool {
        self.0.len() == parent.0.len() + 1 && self.is_prefixed_by(parent)
    }

    /// Last segment of the key, `/` for the root
    #[must_use]
    pub fn base(&self) -> &str {
        self.0.last().map_or("/", String::as_str)
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key prefix used to enumerate the children of this key
    ///
    /// Empty for the root, otherwise the key followed by a separator.
    #[must_use]
    pub fn list_prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{self}{KEY_SEPARATOR}")
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{KEY_SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPath({:?})", self.0)
    }
}

/// Translates protocol paths to store keys under a configured root
#[derive(Clone, Debug, Default)]
pub struct KeyMapper {
    root: KeyPath,
}

impl KeyMapper {
    /// Create a mapper rooted at `key_prefix` (a slash-separated path)
    #[must_use]
    pub fn new(key_prefix: &str) -> Self {
        Self {
            root: KeyPath::split(key_prefix),
        }
    }

    #[must_use]
    pub const fn root(&self) -> &KeyPath {
        &self.root
    }

    /// Store key for a protocol-visible path
    #[must_use]
    pub fn to_key(&self, path: &str) -> KeyPath {
        self.root.join(&KeyPath::split(path))
    }

    /// Protocol path for a store key, or `None` if the key is outside the root
    #[must_use]
    pub fn to_path(&self, key: &str) -> Option<String> {
        let key = KeyPath::split(key);
        if !key.is_prefixed_by(&self.root) {
            return None;
        }
        let relative = KeyPath::from_segments(key.segments()[self.root.len()..].iter().cloned());
        Some(format!("{KEY_SEPARATOR}{relative}"))
    }
}

/// Unix-style file mode: type bits plus an `rwx` permission pattern
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileMode(u32);

impl FileMode {
    /// Directory type bit
    pub const TYPE_DIR: u32 = 0o040_000;
    /// Regular file type bit
    pub const TYPE_REG: u32 = 0o100_000;
    /// Mask selecting the permission bits
    pub const PERM_MASK: u32 = 0o777;

    /// Regular file with the given permission bits
    #[must_use]
    pub const fn file(perm: u32) -> Self {
        Self(Self::TYPE_REG | (perm & Self::PERM_MASK))
    }

    /// Directory with the given permission bits
    #[must_use]
    pub const fn dir(perm: u32) -> Self {
        Self(Self::TYPE_DIR | (perm & Self::PERM_MASK))
    }

    #[must_use]
    pub const fn is_dir(self) -> bool {
        self.0 & Self::TYPE_DIR != 0
    }

    #[must_use]
    pub const fn perm(self) -> u32 {
        self.0 & Self::PERM_MASK
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RWX: [char; 3] = ['r', 'w', 'x'];
        let mut out = String::with_capacity(10);
        out.push(if self.is_dir() { 'd' } else { '-' });
        for i in (0..9).rev() {
            if self.perm() & (1 << i) != 0 {
                out.push(RWX[2 - (i % 3)]);
            } else {
                out.push('-');
            }
        }
        f.write_str(&out)
    }
}

impl fmt::Debug for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileMode({self} {:o})", self.0)
    }
}

/// Directory-entry-like result of a stat or listing
///
/// The same immutable value describes committed objects, in-flight uploads
/// and synthetic `.`/`..` rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    name: String,
    modified: DateTime<Utc>,
    size: u64,
    mode: FileMode,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, modified: DateTime<Utc>, size: u64, mode: FileMode) -> Self {
        Self {
            name: name.into(),
            modified,
            size,
            mode,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn mode(&self) -> FileMode {
        self.mode
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}
