#[macro_use]
extern crate failure;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate pest_derive;

pub mod io;
pub use io::{read_treebank, BracketReader, ParsedTree, Sentence};

pub mod bits;

mod prod;
pub use prod::{Production, ProductionTable};

mod node;
pub use node::Node;

mod arena;
pub use arena::{TreeArena, TreeSlice};

mod fragment;
pub use fragment::Fragment;

mod kernel;
pub use kernel::{fast_tree_kernel, PairMatrix};

mod extract;
pub use extract::{extract_complement, extract_maximal};

mod count;
pub use count::{exact_counts, exact_indices};

mod render;
pub use render::{render_fragment, renumber};

mod driver;
pub use driver::{
    complete_bitsets, cover_bitsets, extract_fragment_bitsets, extract_fragment_counts,
    merge_counts, ExtractOptions, FragmentKey,
};

pub mod util;
