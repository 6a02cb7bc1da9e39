//! Case-insensitive name→value store used for header attributes, query
//! parameters, and a response's outgoing attributes.
//!
//! Hashed with a djb2-derived signature computed over the lower-cased
//! name; collisions chain through a fixed-capacity arena rather than
//! growing a `HashMap`, keeping the store bounded with chained
//! collisions and in line with the crate's zero-allocation-after-startup
//! posture (entries and buckets are pre-sized from the owning limits).

const NONE: u32 = u32::MAX;

#[inline(always)]
fn djb2_ci(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &b in bytes {
        let lower = if b.is_ascii_uppercase() { b + 32 } else { b };
        hash = hash.wrapping_mul(33).wrapping_add(lower as u32);
    }
    hash
}

#[derive(Debug, Clone)]
struct Entry {
    name: &'static [u8],
    value: &'static [u8],
    signature: u32,
    next: u32,
}

/// A bounded, case-insensitive, insertion-ordered multimap.
///
/// Reused for three distinct roles depending on which slot field owns
/// it: incoming header attributes, decoded query parameters, and
/// outgoing response attributes. `get` returns the first match by
/// insertion order (headers keep only the first occurrence of a
/// repeated name); `iter` walks every entry in insertion order, which
/// is also the order outgoing attributes are serialized in.
#[derive(Debug, Clone)]
pub(crate) struct Catalog {
    entries: Vec<Entry>,
    buckets: Vec<u32>,
    capacity: usize,
}

impl Catalog {
    pub(crate) fn new(capacity: usize) -> Self {
        let bucket_count = (capacity.max(1)).next_power_of_two();
        Self {
            entries: Vec::with_capacity(capacity),
            buckets: vec![NONE; bucket_count],
            capacity,
        }
    }

    #[inline(always)]
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.buckets.iter_mut().for_each(|b| *b = NONE);
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    fn bucket_of(&self, signature: u32) -> usize {
        (signature as usize) & (self.buckets.len() - 1)
    }

    /// Inserts `name -> value` preserving insertion order. Returns
    /// `false` without mutating state once `capacity` is reached,
    /// so callers degrade (reject the attribute) instead of growing
    /// unbounded.
    pub(crate) fn insert(&mut self, name: &'static [u8], value: &'static [u8]) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }

        let signature = djb2_ci(name);
        let bucket = self.bucket_of(signature);
        let index = self.entries.len() as u32;

        self.entries.push(Entry {
            name,
            value,
            signature,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = index;

        true
    }

    /// First value stored under `name`, compared case-insensitively.
    pub(crate) fn get(&self, name: &[u8]) -> Option<&[u8]> {
        let signature = djb2_ci(name);
        // The chain links most-recently-inserted first, so the last match
        // found while walking it is the earliest (first-occurrence) entry.
        let mut cursor = self.buckets[self.bucket_of(signature)];
        let mut found = None;
        while cursor != NONE {
            let entry = &self.entries[cursor as usize];
            if entry.signature == signature && entry.name.eq_ignore_ascii_case(name) {
                found = Some(entry);
            }
            cursor = entry.next;
        }
        found.map(|e| e.value)
    }

    /// All entries, in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|e| (e.name, e.value))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(16)
    }
}

/// Lower-cases `name` into a scratch buffer and hashes it; used by the
/// router for URI signatures (case-sensitive compare, case-insensitive
/// only applies to catalogs, so the router hashes the literal bytes).
#[inline(always)]
pub(crate) fn djb2(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &b in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(b as u32);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut cat = Catalog::new(8);
        assert!(cat.insert(b"Content-Type", b"text/html"));
        assert_eq!(cat.get(b"content-type"), Some(&b"text/html"[..]));
        assert_eq!(cat.get(b"CONTENT-TYPE"), Some(&b"text/html"[..]));
    }

    #[test]
    fn first_occurrence_wins() {
        let mut cat = Catalog::new(8);
        assert!(cat.insert(b"X-Tag", b"first"));
        assert!(cat.insert(b"x-tag", b"second"));
        assert_eq!(cat.get(b"X-Tag"), Some(&b"first"[..]));
    }

    #[test]
    fn insertion_order_preserved() {
        let mut cat = Catalog::new(8);
        cat.insert(b"a", b"1");
        cat.insert(b"b", b"2");
        cat.insert(b"c", b"3");
        let collected: Vec<_> = cat.iter().map(|(n, _)| n).collect();
        assert_eq!(collected, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut cat = Catalog::new(2);
        assert!(cat.insert(b"a", b"1"));
        assert!(cat.insert(b"b", b"2"));
        assert!(!cat.insert(b"c", b"3"));
        assert_eq!(cat.len(), 2);
    }
}
