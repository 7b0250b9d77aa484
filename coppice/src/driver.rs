use std::collections::HashMap;
use std::fmt;

use failure::Error;
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use tracing::debug;

use crate::arena::{TreeArena, TreeSlice};
use crate::bits;
use crate::extract::{extract_complement, extract_maximal};
use crate::fragment::Fragment;
use crate::io::Sentence;
use crate::kernel::{fast_tree_kernel, PairMatrix};
use crate::prod::ProductionTable;
use crate::render::{render_fragment, renumber};
use crate::util::{content_word_matcher, LabelMatcher};

/// Options steering fragment extraction.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Treat trees as discontinuous: render terminals as positions and key
    /// fragments by `(string, sentence)`.
    pub discontinuous: bool,
    /// Also emit the maximal regions of every source tree not covered by
    /// any extracted fragment.
    pub complement: bool,
    /// Only pair trees sharing two lexical productions, at least one of
    /// them a content word. Implies a two-terminal minimum per fragment.
    pub two_terms: bool,
    /// Only pair each tree with its successor.
    pub adjacent: bool,
    /// Verify fragment invariants and log per-tree statistics.
    pub debug: bool,
    /// Classifier for content-word part-of-speech labels.
    pub content_words: LabelMatcher,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            discontinuous: false,
            complement: false,
            two_terms: false,
            adjacent: false,
            debug: false,
            content_words: content_word_matcher(),
        }
    }
}

/// Key identifying a fragment independently of where it was found: the
/// rendered bracket string, plus the renumbered token sequence for
/// discontinuous fragments.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FragmentKey {
    pub tree: String,
    pub sent: Option<Sentence>,
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.tree)?;
        if let Some(sent) = &self.sent {
            let tokens = sent
                .iter()
                .map(|t| t.as_ref().map(String::as_str).unwrap_or(""))
                .join(" ");
            write!(f, "\t{}", tokens)?;
        }
        Ok(())
    }
}

/// Extract recurring fragments with approximate counts.
///
/// Processes source trees `[offset, end)` of `trees1` against `trees2` (or
/// against `trees1` itself when `trees2` is `None`, pairing each tree only
/// with its successors). The returned histogram is keyed by rendered
/// fragment; an entry starts at 2 when a fragment is first found in a pair,
/// since it occurs in both members, and every further emission adds one.
/// The result is a lower-bound approximation; use
/// [`extract_fragment_bitsets`] and [`exact_counts`](crate::exact_counts)
/// for exact frequencies.
pub fn extract_fragment_counts(
    trees1: &TreeArena,
    sents1: &[Sentence],
    trees2: Option<&TreeArena>,
    table: &ProductionTable,
    offset: usize,
    end: usize,
    opts: &ExtractOptions,
) -> Result<HashMap<FragmentKey, u64>, Error> {
    let mut counts = HashMap::new();
    run_extraction(trees1, sents1, trees2, table, offset, end, opts, |key, _| {
        *counts.entry(key).or_insert(1) += 1;
    })?;
    Ok(counts)
}

/// Extract recurring fragments, keeping one representative bitset per
/// fragment for a later exact counting pass.
pub fn extract_fragment_bitsets(
    trees1: &TreeArena,
    sents1: &[Sentence],
    trees2: Option<&TreeArena>,
    table: &ProductionTable,
    offset: usize,
    end: usize,
    opts: &ExtractOptions,
) -> Result<HashMap<FragmentKey, Fragment>, Error> {
    let mut fragments = HashMap::new();
    run_extraction(
        trees1,
        sents1,
        trees2,
        table,
        offset,
        end,
        opts,
        |key, frag| {
            fragments.entry(key).or_insert(frag);
        },
    )?;
    Ok(fragments)
}

/// Multiset addition of per-shard histograms.
pub fn merge_counts(into: &mut HashMap<FragmentKey, u64>, from: HashMap<FragmentKey, u64>) {
    for (key, count) in from {
        *into.entry(key).or_insert(0) += count;
    }
}

fn run_extraction(
    trees1: &TreeArena,
    sents1: &[Sentence],
    trees2: Option<&TreeArena>,
    table: &ProductionTable,
    offset: usize,
    end: usize,
    opts: &ExtractOptions,
    mut sink: impl FnMut(FragmentKey, Fragment),
) -> Result<(), Error> {
    assert!(
        sents1.len() >= trees1.len(),
        "Fewer sentences than source trees."
    );
    let same = trees2.is_none();
    let target = trees2.unwrap_or(trees1);
    let end = end.min(trees1.len());
    let slots = trees1.slots();
    let min_terms = if opts.two_terms { 2 } else { 0 };
    let content = if opts.two_terms {
        Some(content_prods(table, &opts.content_words))
    } else {
        None
    };

    // scratch buffers are sized once and reused across all pairs
    let mut matrix = PairMatrix::new(target.max_nodes(), slots);
    let mut scratch = vec![0u64; slots];
    let mut covered = vec![0u64; slots];
    let mut found = Vec::new();

    for n in offset..end {
        let a = trees1.tree(n);
        bits::clear_words(&mut covered);
        let mut emitted = 0usize;
        for m in pair_candidates(n, a, same, target, content.as_deref(), opts) {
            let b = target.tree(m);
            matrix.reset(b.len());
            fast_tree_kernel(a.nodes(), b.nodes(), &mut matrix);
            found.clear();
            extract_maximal(a, b, &mut matrix, &mut scratch, min_terms, &mut found);
            emitted += found.len();
            for frag in found.drain(..) {
                if opts.complement {
                    bits::union_into(&mut covered, frag.bits());
                }
                if opts.debug {
                    assert!(
                        frag.is_connected(a),
                        "Disconnected fragment from pair ({}, {}).",
                        n,
                        m
                    );
                }
                let key = fragment_key(a, table, &sents1[n], &frag, opts.discontinuous)?;
                sink(key, frag);
            }
        }
        if opts.complement {
            found.clear();
            extract_complement(a, &covered, &mut scratch, &mut found);
            for frag in found.drain(..) {
                let key = fragment_key(a, table, &sents1[n], &frag, opts.discontinuous)?;
                sink(key, frag);
            }
        }
        if opts.debug {
            debug!(tree = n, fragments = emitted, "extracted fragments");
        }
    }
    Ok(())
}

fn fragment_key(
    a: TreeSlice,
    table: &ProductionTable,
    sent: &Sentence,
    frag: &Fragment,
    discontinuous: bool,
) -> Result<FragmentKey, Error> {
    let rendered = render_fragment(a, table, sent, frag, discontinuous);
    if discontinuous {
        let (dense, frag_sent) = renumber(&rendered, sent)?;
        Ok(FragmentKey {
            tree: dense,
            sent: Some(frag_sent),
        })
    } else {
        Ok(FragmentKey {
            tree: rendered,
            sent: None,
        })
    }
}

fn content_prods(table: &ProductionTable, matcher: &LabelMatcher) -> Vec<bool> {
    (0..table.len() as i32)
        .map(|p| {
            let prod = table.production(p);
            prod.is_lexical() && matcher.matches(prod.lhs())
        })
        .collect()
}

fn pair_candidates(
    n: usize,
    a: TreeSlice,
    same: bool,
    target: &TreeArena,
    content: Option<&[bool]>,
    opts: &ExtractOptions,
) -> Vec<usize> {
    if opts.adjacent {
        let m = n + 1;
        if m < target.len() {
            vec![m]
        } else {
            Vec::new()
        }
    } else if opts.two_terms {
        let content = content.expect("Missing production classification.");
        let mut candidates = FixedBitSet::with_capacity(target.len());
        let nodes = a.nodes();
        for (i, ni) in nodes.iter().enumerate() {
            if !ni.is_preterminal() || !content[ni.prod() as usize] {
                continue;
            }
            for (j, nj) in nodes.iter().enumerate() {
                if j == i || !nj.is_preterminal() {
                    continue;
                }
                if let (Some(with_i), Some(with_j)) = (
                    target.trees_with_prod(ni.prod()),
                    target.trees_with_prod(nj.prod()),
                ) {
                    let mut shared = with_i.clone();
                    shared.intersect_with(with_j);
                    candidates.union_with(&shared);
                }
            }
        }
        candidates.ones().filter(|&m| !same || m > n).collect()
    } else if same {
        (n + 1..target.len()).collect()
    } else {
        (0..target.len()).collect()
    }
}

/// One fragment per tree containing all of its nodes. Rendering these
/// reproduces the ingested trees.
pub fn complete_bitsets(
    arena: &TreeArena,
    sents: &[Sentence],
    table: &ProductionTable,
    discontinuous: bool,
) -> Result<Vec<(FragmentKey, Fragment)>, Error> {
    let slots = arena.slots();
    let mut out = Vec::with_capacity(arena.len());
    for n in 0..arena.len() {
        let tree = arena.tree(n);
        let mut words = vec![0u64; slots];
        for i in 0..tree.len() {
            bits::set_bit(&mut words, i);
        }
        let frag = Fragment::from_bits(&words, n as u32, tree.root() as u16);
        let key = fragment_key(tree, table, &sents[n], &frag, discontinuous)?;
        out.push((key, frag));
    }
    Ok(out)
}

/// Exactly one single-node fragment per distinct production, anchored at
/// its first occurrence in the treebank.
pub fn cover_bitsets(
    arena: &TreeArena,
    sents: &[Sentence],
    table: &ProductionTable,
    discontinuous: bool,
) -> Result<Vec<(FragmentKey, Fragment)>, Error> {
    let mut seen = vec![false; table.len()];
    let mut out = Vec::new();
    for n in 0..arena.len() {
        let tree = arena.tree(n);
        for (i, node) in tree.nodes().iter().enumerate() {
            let prod = node.prod() as usize;
            if seen[prod] {
                continue;
            }
            seen[prod] = true;
            let mut words = vec![0u64; arena.slots()];
            bits::set_bit(&mut words, i);
            let frag = Fragment::from_bits(&words, n as u32, i as u16);
            let key = fragment_key(tree, table, &sents[n], &frag, discontinuous)?;
            out.push((key, frag));
        }
    }
    Ok(out)
}
