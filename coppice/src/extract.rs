use crate::arena::TreeSlice;
use crate::bits::{self, SetBitCursor};
use crate::fragment::Fragment;
use crate::kernel::PairMatrix;
use crate::node::Node;

/// Extract every maximal common fragment of the pair `(a, b)`.
///
/// `matrix` must hold the common-production matrix of the pair (see
/// [`fast_tree_kernel`](crate::fast_tree_kernel)); `scratch` is a zeroed or
/// reusable bitset one tree wide. Tree `b` is walked in pre-order and every
/// still-set cell of its row seeds a greedy lockstep growth over both trees.
/// Growing a fragment clears the cells it absorbs, which is what guarantees
/// each fragment is emitted at most once per pair, so the matrix is consumed
/// by this call.
///
/// Fragments with fewer than `min_terms` terminals are dropped.
pub fn extract_maximal(
    a: TreeSlice,
    b: TreeSlice,
    matrix: &mut PairMatrix,
    scratch: &mut [u64],
    min_terms: u32,
    out: &mut Vec<Fragment>,
) {
    extract_rooted(
        a.nodes(),
        b.nodes(),
        a.index(),
        b.root(),
        matrix,
        scratch,
        min_terms,
        out,
    );
}

fn extract_rooted(
    a: &[Node],
    b: &[Node],
    source: u32,
    j: usize,
    matrix: &mut PairMatrix,
    scratch: &mut [u64],
    min_terms: u32,
    out: &mut Vec<Fragment>,
) {
    let mut cursor = SetBitCursor::default();
    loop {
        let i = match bits::iterate_set_bits(matrix.row(j), &mut cursor) {
            Some(i) => i,
            None => break,
        };
        bits::clear_words(scratch);
        let terms = extract_at(a, b, i, j, matrix, scratch);
        if terms >= min_terms {
            out.push(Fragment::from_bits(scratch, source, i as u16));
        }
    }
    if b[j].left() >= 0 {
        let left = b[j].left() as usize;
        extract_rooted(a, b, source, left, matrix, scratch, min_terms, out);
        if b[j].right() >= 0 {
            let right = b[j].right() as usize;
            extract_rooted(a, b, source, right, matrix, scratch, min_terms, out);
        }
    }
}

/// Grow the fragment anchored at the common pair `(a[i], b[j])` and return
/// the number of terminals it absorbs.
///
/// Matching productions guarantee matching shape, so the walk follows both
/// trees in lockstep: a child pair is entered only while its matrix cell is
/// still set; anything else becomes a frontier. Entering a pair clears its
/// cell.
fn extract_at(
    a: &[Node],
    b: &[Node],
    i: usize,
    j: usize,
    matrix: &mut PairMatrix,
    frag: &mut [u64],
) -> u32 {
    bits::set_bit(frag, i);
    bits::clear_bit(matrix.row_mut(j), i);
    if a[i].left() < 0 {
        return 1;
    }
    let (al, bl) = (a[i].left() as usize, b[j].left() as usize);
    let mut terms = 0;
    if bits::test_bit(matrix.row(bl), al) {
        terms += extract_at(a, b, al, bl, matrix, frag);
    }
    if a[i].right() >= 0 {
        let (ar, br) = (a[i].right() as usize, b[j].right() as usize);
        if bits::test_bit(matrix.row(br), ar) {
            terms += extract_at(a, b, ar, br, matrix, frag);
        }
    }
    terms
}

/// Emit every maximal connected region of `a` not covered by `covered`.
///
/// `covered` is the union of the fragment bitsets extracted from `a`. Each
/// uncovered node whose parent is covered (or which is the root) opens a
/// region; the region grows through uncovered children and closes where a
/// covered child begins. The search then continues below the covered
/// boundary for deeper regions.
pub fn extract_complement(
    a: TreeSlice,
    covered: &[u64],
    scratch: &mut [u64],
    out: &mut Vec<Fragment>,
) {
    find_regions(a.nodes(), covered, a.index(), a.root(), scratch, out);
}

fn find_regions(
    a: &[Node],
    covered: &[u64],
    source: u32,
    i: usize,
    scratch: &mut [u64],
    out: &mut Vec<Fragment>,
) {
    if !bits::test_bit(covered, i) {
        bits::clear_words(scratch);
        let mut boundary = Vec::new();
        grow_region(a, covered, i, scratch, &mut boundary);
        out.push(Fragment::from_bits(scratch, source, i as u16));
        for child in boundary {
            find_regions(a, covered, source, child, scratch, out);
        }
    } else if a[i].left() >= 0 {
        find_regions(a, covered, source, a[i].left() as usize, scratch, out);
        if a[i].right() >= 0 {
            find_regions(a, covered, source, a[i].right() as usize, scratch, out);
        }
    }
}

fn grow_region(
    a: &[Node],
    covered: &[u64],
    i: usize,
    region: &mut [u64],
    boundary: &mut Vec<usize>,
) {
    bits::set_bit(region, i);
    if a[i].left() < 0 {
        return;
    }
    for &child in &[a[i].left(), a[i].right()] {
        if child < 0 {
            continue;
        }
        let child = child as usize;
        if bits::test_bit(covered, child) {
            boundary.push(child);
        } else {
            grow_region(a, covered, child, region, boundary);
        }
    }
}
