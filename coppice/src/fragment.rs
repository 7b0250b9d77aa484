use crate::arena::TreeSlice;
use crate::bits;

/// A connected subtree of one source tree, as a bitset over that tree's
/// nodes.
///
/// A set bit means the node belongs to the fragment; an unset child of a set
/// node is a frontier non-terminal, a placeholder standing in for its whole
/// yield. Frontiers are not stored, they are inferred from the tree when the
/// fragment is rendered or matched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fragment {
    bits: Box<[u64]>,
    source: u32,
    root: u16,
}

impl Fragment {
    /// Copy `words` into a new fragment rooted at node `root` of tree
    /// `source`.
    pub fn from_bits(words: &[u64], source: u32, root: u16) -> Self {
        Fragment {
            bits: words.to_vec().into_boxed_slice(),
            source,
            root,
        }
    }

    /// Bitset over the source tree's nodes.
    pub fn bits(&self) -> &[u64] {
        &self.bits
    }

    /// Arena index of the source tree.
    pub fn source(&self) -> u32 {
        self.source
    }

    /// Root node index within the source tree.
    pub fn root(&self) -> usize {
        self.root as usize
    }

    /// Returns whether node `i` of the source tree is part of the fragment.
    pub fn contains_node(&self, i: usize) -> bool {
        bits::test_bit(&self.bits, i)
    }

    /// Number of nodes in the fragment.
    pub fn node_count(&self) -> u32 {
        bits::count_bits(&self.bits)
    }

    /// Check that the set bits form a connected subgraph of `tree` rooted at
    /// `self.root()`. Used by the driver's debug mode and by tests.
    pub fn is_connected(&self, tree: TreeSlice) -> bool {
        if !self.contains_node(self.root()) {
            return false;
        }
        let nodes = tree.nodes();
        let mut stack = vec![self.root()];
        let mut reached = 0u32;
        while let Some(i) = stack.pop() {
            reached += 1;
            let node = &nodes[i];
            if node.left() >= 0 {
                let left = node.left() as usize;
                if self.contains_node(left) {
                    stack.push(left);
                }
                if node.right() >= 0 {
                    let right = node.right() as usize;
                    if self.contains_node(right) {
                        stack.push(right);
                    }
                }
            }
        }
        reached == self.node_count()
    }
}
