//! Sliding window over a forward-only source
//!
//! Both the download reader (bytes) and the listing reader (entries) keep a
//! contiguous run of already-fetched items starting at some absolute
//! position. Reads may revisit anything still in the window; the window is
//! trimmed from the front so at most `lookback` items are kept behind the
//! furthest position served.

use bucketio_common::{Error, Result};

#[derive(Debug)]
pub(crate) struct Spool<T> {
    items: Vec<T>,
    /// Absolute position of `items[0]`
    offset: u64,
}

impl<T> Default for Spool<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            offset: 0,
        }
    }
}

impl<T> Spool<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Index of absolute `position` relative to the window start
    ///
    /// The index may lie past the end of the window.
    pub(crate) fn relative(&self, position: u64) -> Result<usize> {
        if position < self.offset {
            return Err(Error::OutOfRange { position });
        }
        usize::try_from(position - self.offset).map_err(|_| Error::OutOfRange { position })
    }

    /// Up to `max` items starting at relative index `rel`
    pub(crate) fn slice(&self, rel: usize, max: usize) -> &[T] {
        if rel >= self.items.len() {
            return &[];
        }
        let end = self.items.len().min(rel.saturating_add(max));
        &self.items[rel..end]
    }

    /// Drop items more than `lookback` behind relative index `rel`
    ///
    /// Returns `rel` rebased onto the trimmed window.
    pub(crate) fn advance(&mut self, rel: usize, lookback: usize) -> usize {
        if rel < lookback {
            return rel;
        }
        let cut = (rel - lookback).min(self.items.len());
        if cut > 0 {
            self.items.drain(..cut);
            self.offset += cut as u64;
        }
        rel - cut
    }

    /// Move an empty window forward past `n` items that were never stored
    pub(crate) fn skip(&mut self, n: u64) {
        debug_assert!(self.items.is_empty());
        self.offset += n;
    }

    pub(crate) fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub(crate) const fn items_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: u8) -> Spool<u8> {
        let mut spool = Spool::new();
        for i in 0..n {
            spool.push(i);
        }
        spool
    }

    #[test]
    fn test_slice() {
        let spool = filled(5);
        assert_eq!(spool.slice(1, 2), &[1, 2]);
        assert_eq!(spool.slice(3, 10), &[3, 4]);
        assert!(spool.slice(5, 1).is_empty());
        assert!(spool.slice(9, 1).is_empty());
    }

    #[test]
    fn test_advance_keeps_lookback() {
        let mut spool = filled(10);
        let rel = spool.advance(8, 3);
        assert_eq!(rel, 3);
        assert_eq!(spool.offset(), 5);
        assert_eq!(spool.slice(0, 10), &[5, 6, 7, 8, 9]);

        // within lookback: untouched
        assert_eq!(spool.advance(2, 3), 2);
        assert_eq!(spool.offset(), 5);
    }

    #[test]
    fn test_advance_past_end() {
        let mut spool = filled(4);
        let rel = spool.advance(20, 2);
        assert_eq!(spool.len(), 0);
        assert_eq!(spool.offset(), 4);
        assert_eq!(rel, 16);

        spool.skip(14);
        assert_eq!(spool.offset(), 18);
        assert_eq!(spool.relative(20).unwrap(), 2);
    }

    #[test]
    fn test_relative_out_of_range() {
        let mut spool = filled(10);
        spool.advance(10, 2);
        assert_eq!(spool.offset(), 8);
        assert_eq!(spool.relative(9).unwrap(), 1);
        assert!(matches!(
            spool.relative(7),
            Err(Error::OutOfRange { position: 7 })
        ));
    }
}
