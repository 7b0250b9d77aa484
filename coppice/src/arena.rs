use failure::Error;
use fixedbitset::FixedBitSet;

use crate::bits;
use crate::node::Node;

/// View of one tree inside the arena pool.
#[derive(Clone, Copy, Debug)]
struct TreeRef {
    offset: usize,
    len: u16,
    root: u16,
}

/// Borrowed slice of one tree: its nodes, its root, and its index in the
/// arena. Child slots in the nodes are local to this slice.
#[derive(Clone, Copy, Debug)]
pub struct TreeSlice<'a> {
    nodes: &'a [Node],
    root: u16,
    index: u32,
}

impl<'a> TreeSlice<'a> {
    pub fn nodes(&self) -> &'a [Node] {
        self.nodes
    }

    /// Index of the root node within the slice.
    pub fn root(&self) -> usize {
        self.root as usize
    }

    /// Index of this tree in its arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Append-only storage for many small trees.
///
/// Nodes of all trees live in one contiguous pool; each tree is a
/// `(offset, len, root)` view into it. Insertion is staged: a tree is
/// validated and canonically ordered before anything is committed, so a
/// malformed tree never corrupts the pool.
///
/// Canonical order sorts the nodes of a tree by production id, ascending and
/// stable, and rewrites child indices accordingly. The fast tree kernel
/// depends on this precondition.
#[derive(Debug, Default)]
pub struct TreeArena {
    nodes: Vec<Node>,
    trees: Vec<TreeRef>,
    max_nodes: usize,
    prod_index: Vec<FixedBitSet>,
}

impl TreeArena {
    pub fn new() -> Self {
        TreeArena::default()
    }

    /// Reserve room for `trees` trees totalling `nodes` nodes.
    pub fn with_capacity(trees: usize, nodes: usize) -> Self {
        TreeArena {
            nodes: Vec::with_capacity(nodes),
            trees: Vec::with_capacity(trees),
            max_nodes: 0,
            prod_index: Vec::new(),
        }
    }

    /// Number of trees.
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Size of the largest tree pushed so far.
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Width in words of a bitset over the nodes of any tree in this arena.
    pub fn slots(&self) -> usize {
        bits::slot_count(self.max_nodes + 1)
    }

    /// Get tree `n`.
    ///
    /// Panics if `n` is out of range; callers enumerate pair candidates and
    /// are expected to stay within bounds.
    pub fn tree(&self, n: usize) -> TreeSlice {
        assert!(n < self.trees.len(), "Tree index out of range.");
        let tref = self.trees[n];
        TreeSlice {
            nodes: &self.nodes[tref.offset..tref.offset + tref.len as usize],
            root: tref.root,
            index: n as u32,
        }
    }

    /// Validate, canonically order, and append a tree.
    ///
    /// `nodes` uses local child indices in any order; `root` is the index of
    /// the root within `nodes`. Returns the new tree's arena index. On error
    /// nothing is committed.
    pub fn push(&mut self, nodes: &[Node], root: u16) -> Result<u32, Error> {
        self.validate(nodes, root)?;

        // stable sort by production; ties keep the caller's order
        let mut order = (0..nodes.len() as u16).collect::<Vec<_>>();
        order.sort_by_key(|&i| nodes[i as usize].prod());
        let mut remap = vec![0u16; nodes.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old as usize] = new as u16;
        }

        let offset = self.nodes.len();
        for &old in &order {
            let mut node = nodes[old as usize];
            node.remap_children(&remap);
            self.nodes.push(node);
        }
        self.trees.push(TreeRef {
            offset,
            len: nodes.len() as u16,
            root: remap[root as usize],
        });
        if nodes.len() > self.max_nodes {
            self.max_nodes = nodes.len();
        }
        Ok(self.trees.len() as u32 - 1)
    }

    fn validate(&self, nodes: &[Node], root: u16) -> Result<(), Error> {
        if nodes.is_empty() {
            return Err(format_err!("Can't insert a tree without nodes."));
        }
        if nodes.len() > i16::max_value() as usize {
            return Err(format_err!(
                "Tree has {} nodes, more than fit a child index.",
                nodes.len()
            ));
        }
        let len = nodes.len() as i16;
        if root as usize >= nodes.len() {
            return Err(format_err!("Root index {} out of range.", root));
        }
        for (i, node) in nodes.iter().enumerate() {
            if node.prod() < 0 {
                return Err(format_err!("Node {} has a negative production id.", i));
            }
            if node.left() >= len || node.right() >= len {
                return Err(format_err!("Node {} has a child index out of range.", i));
            }
            if node.left() < 0 && node.right() >= 0 {
                return Err(format_err!("Preterminal {} has a right child.", i));
            }
        }
        // every node must be reachable from the root exactly once
        let mut seen = vec![false; nodes.len()];
        let mut stack = vec![root as usize];
        let mut reached = 0usize;
        while let Some(i) = stack.pop() {
            if seen[i] {
                return Err(format_err!("Node {} is dominated twice.", i));
            }
            seen[i] = true;
            reached += 1;
            let node = &nodes[i];
            if node.left() >= 0 {
                stack.push(node.left() as usize);
                if node.right() >= 0 {
                    stack.push(node.right() as usize);
                }
            }
        }
        if reached != nodes.len() {
            return Err(format_err!(
                "Only {} of {} nodes are reachable from the root.",
                reached,
                nodes.len()
            ));
        }
        Ok(())
    }

    /// Build the per-production reverse index `trees_with_prod`.
    ///
    /// `num_prods` is the size of the production table shared by the run.
    /// Must be called after ingest and before exact counting or the
    /// two-terminals pair filter.
    pub fn build_prod_index(&mut self, num_prods: usize) {
        let mut index = vec![FixedBitSet::with_capacity(self.trees.len()); num_prods];
        for (n, tref) in self.trees.iter().enumerate() {
            for node in &self.nodes[tref.offset..tref.offset + tref.len as usize] {
                index[node.prod() as usize].insert(n);
            }
        }
        self.prod_index = index;
    }

    /// Set of tree indices containing production `prod`, or `None` when the
    /// production does not occur here (including ids interned after the
    /// index was built).
    pub fn trees_with_prod(&self, prod: i32) -> Option<&FixedBitSet> {
        assert!(
            !self.prod_index.is_empty(),
            "Production index has not been built."
        );
        self.prod_index
            .get(prod as usize)
            .filter(|set| set.count_ones(..) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::TreeArena;
    use crate::node::Node;
    use crate::prod::{Production, ProductionTable};

    fn small_table() -> (ProductionTable, i32, i32, i32) {
        let mut table = ProductionTable::new();
        let s = table.intern(Production::internal(
            "S",
            vec!["NP".to_string(), "VP".to_string()],
        ));
        let np = table.intern(Production::lexical("NP", "x"));
        let vp = table.intern(Production::lexical("VP", "y"));
        (table, s, np, vp)
    }

    #[test]
    fn push_sorts_by_production() {
        let (_, s, np, vp) = small_table();
        let mut arena = TreeArena::new();
        // post-order: the root arrives last but owns the lowest production id
        let nodes = vec![
            Node::preterminal(np, 0),
            Node::preterminal(vp, 1),
            Node::binary(s, 0, 1),
        ];
        let n = arena.push(&nodes, 2).unwrap();
        assert_eq!(n, 0);
        let tree = arena.tree(0);
        let prods = tree.nodes().iter().map(Node::prod).collect::<Vec<_>>();
        assert_eq!(prods, vec![s, np, vp]);
        // the root moved to slot 0 (lowest production id) and keeps its children
        let root = tree.nodes()[tree.root()];
        assert_eq!(root.prod(), s);
        assert_eq!(tree.nodes()[root.left() as usize].prod(), np);
        assert_eq!(tree.nodes()[root.right() as usize].prod(), vp);
        assert_eq!(tree.nodes()[root.left() as usize].terminal(), Some(0));
    }

    #[test]
    fn push_is_staged() {
        let (_, s, np, _) = small_table();
        let mut arena = TreeArena::new();
        // node 2 is not reachable from the root
        let nodes = vec![
            Node::unary(s, 1),
            Node::preterminal(np, 0),
            Node::preterminal(np, 1),
        ];
        assert!(arena.push(&nodes, 0).is_err());
        assert!(arena.is_empty());
        assert_eq!(arena.max_nodes(), 0);
    }

    #[test]
    fn rejects_shared_children() {
        let (_, s, np, _) = small_table();
        let nodes = vec![Node::binary(s, 1, 1), Node::preterminal(np, 0)];
        assert!(TreeArena::new().push(&nodes, 0).is_err());
    }

    #[test]
    fn rejects_child_out_of_range() {
        let (_, s, np, _) = small_table();
        let nodes = vec![Node::binary(s, 1, 5), Node::preterminal(np, 0)];
        assert!(TreeArena::new().push(&nodes, 0).is_err());
    }

    #[test]
    fn slots_scale_with_tree_size() {
        let mut table = ProductionTable::new();
        let mut arena = TreeArena::new();
        // unary chain of 70 nodes over a single terminal
        let leaf = table.intern(Production::lexical("P0", "w"));
        let mut nodes = vec![Node::preterminal(leaf, 0)];
        for i in 1..70u16 {
            let prod = table.intern(Production::internal(
                format!("P{}", i),
                vec![format!("P{}", i - 1)],
            ));
            nodes.push(Node::unary(prod, i - 1));
        }
        arena.push(&nodes, 69).unwrap();
        assert_eq!(arena.max_nodes(), 70);
        assert_eq!(arena.slots(), 2);
    }

    #[test]
    fn prod_index() {
        let (mut table, s, np, vp) = small_table();
        let other = table.intern(Production::lexical("VP", "z"));
        let mut arena = TreeArena::new();
        let t0 = vec![
            Node::binary(s, 1, 2),
            Node::preterminal(np, 0),
            Node::preterminal(vp, 1),
        ];
        let t1 = vec![
            Node::binary(s, 1, 2),
            Node::preterminal(np, 0),
            Node::preterminal(other, 1),
        ];
        arena.push(&t0, 0).unwrap();
        arena.push(&t1, 0).unwrap();
        arena.build_prod_index(table.len());
        let with_s = arena.trees_with_prod(s).unwrap();
        assert_eq!(with_s.ones().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(
            arena.trees_with_prod(vp).unwrap().ones().collect::<Vec<_>>(),
            vec![0]
        );
        assert_eq!(
            arena
                .trees_with_prod(other)
                .unwrap()
                .ones()
                .collect::<Vec<_>>(),
            vec![1]
        );
    }

    #[test]
    #[should_panic]
    fn tree_out_of_range() {
        TreeArena::new().tree(0);
    }
}
