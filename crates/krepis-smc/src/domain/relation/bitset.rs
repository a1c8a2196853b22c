//! Growable bitset and the square bit matrix built from it
//!
//! The matrix backs [`super::Relation`]'s reachability queries: row `i`
//! holds every node reachable from node `i`.

use std::fmt;

const WORD_BITS: usize = 64;

/// Word-packed set of small integers
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Create an empty bitset able to hold `capacity` bits without growing
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD_BITS)],
        }
    }

    /// Insert a bit, growing the set if needed. Returns whether it was new.
    #[inline]
    pub fn insert(&mut self, idx: usize) -> bool {
        let (w, b) = (idx / WORD_BITS, idx % WORD_BITS);
        if w >= self.words.len() {
            self.words.resize(w + 1, 0);
        }
        let mask = 1u64 << b;
        let fresh = self.words[w] & mask == 0;
        self.words[w] |= mask;
        fresh
    }

    /// Check if a bit is set
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.words
            .get(idx / WORD_BITS)
            .is_some_and(|w| w & (1u64 << (idx % WORD_BITS)) != 0)
    }

    /// In-place union. Returns whether any bit was added.
    ///
    /// ```text
    /// A = {0, 2}  -> 0b101
    /// B = {1, 2}  -> 0b110
    /// A ∪ B       -> 0b111  (changed)
    /// ```
    pub fn union_with(&mut self, other: &Self) -> bool {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let merged = *a | *b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// Number of set bits
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// No bit set
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterate set bits in increasing order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(wi * WORD_BITS + tz)
            })
        })
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Square reachability matrix
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BitMatrix {
    rows: Vec<BitSet>,
}

impl BitMatrix {
    /// `n x n` zero matrix
    pub fn new(n: usize) -> Self {
        Self {
            rows: vec![BitSet::with_capacity(n); n],
        }
    }

    /// Add a row/column
    pub fn grow(&mut self) {
        self.rows.push(BitSet::with_capacity(self.rows.len() + 1));
    }

    /// Set `(i, j)`. Returns whether the bit was new.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize) -> bool {
        self.rows[i].insert(j)
    }

    /// Read `(i, j)`
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> bool {
        self.rows.get(i).is_some_and(|r| r.contains(j))
    }

    /// Row `i`
    #[inline]
    pub fn row(&self, i: usize) -> &BitSet {
        &self.rows[i]
    }

    /// Warshall closure over word-packed rows
    pub fn close(&mut self) {
        let n = self.rows.len();
        for k in 0..n {
            let row_k = self.rows[k].clone();
            for i in 0..n {
                if i != k && self.rows[i].contains(k) {
                    self.rows[i].union_with(&row_k);
                }
            }
        }
    }

    /// Total number of set bits
    pub fn count(&self) -> usize {
        self.rows.iter().map(BitSet::len).sum()
    }
}

impl fmt::Debug for BitMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rows.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_insert_contains() {
        let mut s = BitSet::default();
        assert!(s.insert(3));
        assert!(!s.insert(3));
        assert!(s.insert(130));
        assert!(s.contains(3));
        assert!(s.contains(130));
        assert!(!s.contains(4));
        assert_eq!(s.len(), 2);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![3, 130]);
    }

    #[test]
    fn test_bitset_union_reports_change() {
        let mut a = BitSet::default();
        a.insert(0);
        let mut b = BitSet::default();
        b.insert(0);
        assert!(!a.union_with(&b));
        b.insert(70);
        assert!(a.union_with(&b));
        assert!(a.contains(70));
    }

    #[test]
    fn test_matrix_closure_chain() {
        let mut m = BitMatrix::new(4);
        m.set(0, 1);
        m.set(1, 2);
        m.set(2, 3);
        m.close();
        assert!(m.get(0, 3));
        assert!(m.get(1, 3));
        assert!(!m.get(3, 0));
        assert!(!m.get(0, 0));
    }

    #[test]
    fn test_matrix_closure_cycle_is_reflexive() {
        let mut m = BitMatrix::new(2);
        m.set(0, 1);
        m.set(1, 0);
        m.close();
        assert!(m.get(0, 0));
        assert!(m.get(1, 1));
    }
}
