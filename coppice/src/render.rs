use std::collections::{BTreeMap, HashMap, HashSet};

use failure::Error;
use itertools::Itertools;
use regex::{Captures, Regex};

use crate::arena::TreeSlice;
use crate::bits;
use crate::fragment::Fragment;
use crate::io::Sentence;
use crate::node::Node;
use crate::prod::ProductionTable;

lazy_static! {
    // frontier yield span " k:k'"
    static ref FRONTIER_SPAN: Regex = Regex::new(r" ([0-9]+):([0-9]+)\b").unwrap();
    // terminal leaf "(label k)"
    static ref TERMINAL_INDEX: Regex = Regex::new(r"\([^ ()]+ ([0-9]+)\)").unwrap();
    // any leaf index, with or without a span tail
    static ref LEAF_INDEX: Regex = Regex::new(r" ([0-9]+)(?::[0-9]+)?\b").unwrap();
}

/// Render a fragment as a bracketed string.
///
/// In continuous mode terminals render as their tokens and a frontier
/// non-terminal as a bare labelled leaf `(label )`. In discontinuous mode
/// terminals render as sentence positions and a frontier as the inclusive
/// runs of its yield (`(label 2:4 7:7)`); [`renumber`] turns such a string
/// into its canonical dense form.
pub fn render_fragment(
    tree: TreeSlice,
    table: &ProductionTable,
    sent: &[Option<String>],
    frag: &Fragment,
    discontinuous: bool,
) -> String {
    let mut out = String::new();
    render_node(
        &mut out,
        tree.nodes(),
        table,
        sent,
        frag.bits(),
        frag.root(),
        discontinuous,
    );
    out
}

fn render_node(
    out: &mut String,
    nodes: &[Node],
    table: &ProductionTable,
    sent: &[Option<String>],
    frag: &[u64],
    i: usize,
    disc: bool,
) {
    let node = &nodes[i];
    out.push('(');
    out.push_str(table.label(node.prod()));
    out.push(' ');
    if let Some(term) = node.terminal() {
        if disc {
            out.push_str(&term.to_string());
        } else if let Some(token) = &sent[term] {
            out.push_str(token);
        }
    } else {
        render_child(out, nodes, table, sent, frag, node.left() as usize, disc);
        if node.right() >= 0 {
            out.push(' ');
            render_child(out, nodes, table, sent, frag, node.right() as usize, disc);
        }
    }
    out.push(')');
}

fn render_child(
    out: &mut String,
    nodes: &[Node],
    table: &ProductionTable,
    sent: &[Option<String>],
    frag: &[u64],
    i: usize,
    disc: bool,
) {
    if bits::test_bit(frag, i) {
        render_node(out, nodes, table, sent, frag, i, disc);
    } else {
        render_frontier(out, nodes, table, i, disc);
    }
}

fn render_frontier(out: &mut String, nodes: &[Node], table: &ProductionTable, i: usize, disc: bool) {
    out.push('(');
    out.push_str(table.label(nodes[i].prod()));
    out.push(' ');
    if disc {
        let mut positions = Vec::new();
        collect_yield(nodes, i, &mut positions);
        positions.sort();
        out.push_str(&yield_runs(&positions));
    }
    out.push(')');
}

fn collect_yield(nodes: &[Node], i: usize, positions: &mut Vec<usize>) {
    let node = &nodes[i];
    if let Some(term) = node.terminal() {
        positions.push(term);
        return;
    }
    collect_yield(nodes, node.left() as usize, positions);
    if node.right() >= 0 {
        collect_yield(nodes, node.right() as usize, positions);
    }
}

/// Format sorted positions as inclusive runs, e.g. `[0, 1, 2, 4]` as
/// `"0:2 4:4"`.
fn yield_runs(positions: &[usize]) -> String {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &p in positions {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == p => *end = p,
            _ => runs.push((p, p)),
        }
    }
    runs.iter()
        .map(|(start, end)| format!("{}:{}", start, end))
        .join(" ")
}

/// Renumber the terminal indices of a discontinuous fragment to a dense
/// `0..m` sequence and select the matching tokens.
///
/// All indices appearing in the fragment (terminal leaves and the starts of
/// frontier spans) are sorted and renumbered; a single placeholder position
/// is inserted for every gap. The returned sentence has the token at every
/// terminal position and `None` at frontier and gap positions.
pub fn renumber(fragment: &str, sent: &[Option<String>]) -> Result<(String, Sentence), Error> {
    let mut spans: BTreeMap<usize, usize> = BTreeMap::new();
    for caps in FRONTIER_SPAN.captures_iter(fragment) {
        let start: usize = caps[1].parse()?;
        let end: usize = caps[2].parse()?;
        if end < start {
            return Err(format_err!("Invalid frontier span {}:{}.", start, end));
        }
        spans.insert(start, end + 1);
    }
    let mut leaves = HashSet::new();
    for caps in TERMINAL_INDEX.captures_iter(fragment) {
        let k: usize = caps[1].parse()?;
        leaves.insert(k);
        spans.insert(k, k + 1);
    }
    if spans.is_empty() {
        return Ok((fragment.to_owned(), Vec::new()));
    }

    let last = *spans.keys().next_back().unwrap();
    let mut leafmap = HashMap::new();
    let mut newsent = Vec::new();
    let mut next = 0usize;
    for (&start, &end) in &spans {
        if leaves.contains(&start) {
            let token = sent
                .get(start)
                .cloned()
                .ok_or_else(|| format_err!("Terminal index {} outside the sentence.", start))?;
            newsent.push(token);
        } else {
            newsent.push(None);
        }
        leafmap.insert(start, next);
        next += 1;
        // a gap of any width shrinks to a single placeholder
        if start != last && !spans.contains_key(&end) {
            newsent.push(None);
            next += 1;
        }
    }

    let renumbered = LEAF_INDEX.replace_all(fragment, |caps: &Captures| {
        let k: usize = caps[1].parse::<usize>().unwrap();
        format!(" {}", leafmap[&k])
    });
    Ok((renumbered.into_owned(), newsent))
}
