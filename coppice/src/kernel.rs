use crate::bits;
use crate::node::Node;

/// Scratch matrix for one tree pair.
///
/// Row `j` is a bitset over the nodes of tree `a`; the matrix holds
/// `rows * slots` words in one allocation that is reused across all pairs a
/// worker processes. Extraction deliberately clears cells it consumes, so
/// the matrix is only valid for the pair it was last filled for.
#[derive(Debug)]
pub struct PairMatrix {
    words: Vec<u64>,
    slots: usize,
    rows: usize,
}

impl PairMatrix {
    /// Allocate a matrix with room for `max_rows` rows of `slots` words.
    pub fn new(max_rows: usize, slots: usize) -> Self {
        PairMatrix {
            words: vec![0; max_rows * slots],
            slots,
            rows: 0,
        }
    }

    /// Zero the first `rows` rows and make them the active region.
    ///
    /// Panics if `rows` exceeds the allocated capacity.
    pub fn reset(&mut self, rows: usize) {
        assert!(rows * self.slots <= self.words.len(), "Matrix too small.");
        self.rows = rows;
        for word in &mut self.words[..rows * self.slots] {
            *word = 0;
        }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Active row count, set by the last `reset`.
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn row(&self, j: usize) -> &[u64] {
        debug_assert!(j < self.rows);
        &self.words[j * self.slots..(j + 1) * self.slots]
    }

    #[inline]
    pub fn row_mut(&mut self, j: usize) -> &mut [u64] {
        debug_assert!(j < self.rows);
        &mut self.words[j * self.slots..(j + 1) * self.slots]
    }
}

/// Fill `matrix` with the common-production matrix of `a` and `b`: bit `i`
/// of row `j` is set iff `a[i].prod() == b[j].prod()`.
///
/// Both node slices must be sorted by production id (the arena's canonical
/// order). A single merge pass walks both slices; equal productions form
/// contiguous runs on either side, and every pair in the cross product of
/// two runs is set. For treebank trees runs are short, so this stays near
/// linear instead of the quadratic all-pairs scan.
pub fn fast_tree_kernel(a: &[Node], b: &[Node], matrix: &mut PairMatrix) {
    debug_assert!(a.windows(2).all(|w| w[0].prod() <= w[1].prod()));
    debug_assert!(b.windows(2).all(|w| w[0].prod() <= w[1].prod()));
    debug_assert!(b.len() <= matrix.rows());

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].prod() < b[j].prod() {
            i += 1;
        } else if a[i].prod() > b[j].prod() {
            j += 1;
        } else {
            let prod = a[i].prod();
            let a_run = i;
            while i < a.len() && a[i].prod() == prod {
                i += 1;
            }
            let b_run = j;
            while j < b.len() && b[j].prod() == prod {
                j += 1;
            }
            for row in b_run..j {
                let row = matrix.row_mut(row);
                for col in a_run..i {
                    bits::set_bit(row, col);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{fast_tree_kernel, PairMatrix};
    use crate::bits;
    use crate::node::Node;
    use crate::prod::ProductionTable;
    use crate::{read_treebank, Sentence, TreeArena};

    fn corpus(text: &str) -> (ProductionTable, TreeArena, Vec<Sentence>) {
        let mut table = ProductionTable::new();
        let mut arena = TreeArena::new();
        let sents = read_treebank(Cursor::new(text), false, &mut table, &mut arena).unwrap();
        (table, arena, sents)
    }

    /// The quadratic all-pairs matrix the fast kernel must reproduce.
    fn reference_kernel(a: &[Node], b: &[Node], slots: usize) -> Vec<u64> {
        let mut words = vec![0u64; b.len() * slots];
        for (j, bn) in b.iter().enumerate() {
            for (i, an) in a.iter().enumerate() {
                if an.prod() == bn.prod() {
                    bits::set_bit(&mut words[j * slots..(j + 1) * slots], i);
                }
            }
        }
        words
    }

    #[test]
    fn matches_reference() {
        let (_, arena, _) = corpus(
            "(S (NP (DT the) (NN dog)) (VP (VB barks)))\n\
             (S (NP (DT the) (NN cat)) (VP (VB barks)))\n\
             (VP (VB barks))\n",
        );
        let slots = arena.slots();
        let mut matrix = PairMatrix::new(arena.max_nodes(), slots);
        for n in 0..arena.len() {
            for m in 0..arena.len() {
                let a = arena.tree(n);
                let b = arena.tree(m);
                matrix.reset(b.len());
                fast_tree_kernel(a.nodes(), b.nodes(), &mut matrix);
                let expected = reference_kernel(a.nodes(), b.nodes(), slots);
                for j in 0..b.len() {
                    assert_eq!(
                        matrix.row(j),
                        &expected[j * slots..(j + 1) * slots],
                        "row {} of pair ({}, {})",
                        j,
                        n,
                        m
                    );
                }
            }
        }
    }

    #[test]
    fn repeated_productions_cross_set() {
        // "a a" under identical preterminals: both X rows must contain both
        // X columns
        let (table, arena, _) = corpus("(S (X a) (X a))\n(S (X a) (X a))\n");
        let a = arena.tree(0);
        let b = arena.tree(1);
        let mut matrix = PairMatrix::new(arena.max_nodes(), arena.slots());
        matrix.reset(b.len());
        fast_tree_kernel(a.nodes(), b.nodes(), &mut matrix);
        let x = table
            .id(&crate::prod::Production::lexical("X", "a"))
            .unwrap();
        let x_rows = b
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| n.prod() == x)
            .map(|(j, _)| j)
            .collect::<Vec<_>>();
        assert_eq!(x_rows.len(), 2);
        for &j in &x_rows {
            assert_eq!(bits::count_bits(matrix.row(j)), 2);
        }
    }

    #[test]
    fn disjoint_trees_leave_matrix_empty() {
        let (_, arena, _) = corpus("(A (B b))\n(C (D d))\n");
        let a = arena.tree(0);
        let b = arena.tree(1);
        let mut matrix = PairMatrix::new(arena.max_nodes(), arena.slots());
        matrix.reset(b.len());
        fast_tree_kernel(a.nodes(), b.nodes(), &mut matrix);
        for j in 0..b.len() {
            assert_eq!(bits::count_bits(matrix.row(j)), 0);
        }
    }
}
