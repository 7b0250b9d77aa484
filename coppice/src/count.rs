use std::collections::HashMap;

use crate::arena::TreeArena;
use crate::bits::{self, SetBitCursor};
use crate::fragment::Fragment;
use crate::node::Node;

/// Exact occurrence counts for `fragments` over the treebank `target`.
///
/// `source` is the arena the fragments were extracted from. Occurrences are
/// counted at every anchor node, so a fragment occurring twice in one tree
/// counts twice, and fragments extracted from `target` itself count their
/// own source occurrence as well.
///
/// `target` must have its production index built.
pub fn exact_counts(source: &TreeArena, target: &TreeArena, fragments: &[Fragment]) -> Vec<u64> {
    fragments
        .iter()
        .map(|frag| {
            let mut count = 0u64;
            for_each_occurrence(source, target, frag, |_| count += 1);
            count
        })
        .collect()
}

/// Like [`exact_counts`], but recording which trees each fragment occurs in:
/// one `tree id -> multiplicity` map per fragment.
pub fn exact_indices(
    source: &TreeArena,
    target: &TreeArena,
    fragments: &[Fragment],
) -> Vec<HashMap<u32, u32>> {
    fragments
        .iter()
        .map(|frag| {
            let mut index = HashMap::new();
            for_each_occurrence(source, target, frag, |m| *index.entry(m).or_insert(0) += 1);
            index
        })
        .collect()
}

fn for_each_occurrence(
    source: &TreeArena,
    target: &TreeArena,
    frag: &Fragment,
    mut visit: impl FnMut(u32),
) {
    let a = source.tree(frag.source() as usize);
    let anodes = a.nodes();
    let root = frag.root();
    assert!(root < anodes.len(), "Fragment root outside its source tree.");
    let root_prod = anodes[root].prod();

    // candidate trees must contain every production of the fragment; start
    // from the root's tree set and narrow it down
    let mut candidates = match target.trees_with_prod(root_prod) {
        Some(set) => set.clone(),
        None => return,
    };
    let mut cursor = SetBitCursor::default();
    while let Some(i) = bits::iterate_set_bits(frag.bits(), &mut cursor) {
        assert!(i < anodes.len(), "Fragment bit outside its source tree.");
        if i == root {
            continue;
        }
        match target.trees_with_prod(anodes[i].prod()) {
            Some(set) => candidates.intersect_with(set),
            None => return,
        }
    }

    for m in candidates.ones() {
        let b = target.tree(m);
        let bnodes = b.nodes();
        // nodes are sorted by production: expand the binary search hit to
        // the full run of possible anchors
        if let Ok(hit) = bnodes.binary_search_by(|node| node.prod().cmp(&root_prod)) {
            let mut j = hit;
            while j > 0 && bnodes[j - 1].prod() == root_prod {
                j -= 1;
            }
            while j < bnodes.len() && bnodes[j].prod() == root_prod {
                if embeds(anodes, bnodes, frag.bits(), root, j) {
                    visit(m as u32);
                }
                j += 1;
            }
        }
    }
}

/// Structural match of the fragment part rooted at `a[i]` against `b[j]`.
///
/// Only children whose bit is set are followed; frontiers and terminals
/// succeed by themselves (equal lexical productions imply equal words).
fn embeds(a: &[Node], b: &[Node], frag: &[u64], i: usize, j: usize) -> bool {
    if a[i].prod() != b[j].prod() {
        return false;
    }
    if a[i].left() < 0 {
        return true;
    }
    let (al, bl) = (a[i].left() as usize, b[j].left() as usize);
    if bits::test_bit(frag, al) && !embeds(a, b, frag, al, bl) {
        return false;
    }
    if a[i].right() >= 0 {
        let (ar, br) = (a[i].right() as usize, b[j].right() as usize);
        if bits::test_bit(frag, ar) {
            return embeds(a, b, frag, ar, br);
        }
    }
    true
}
