mod bracket;
pub use self::bracket::{read_treebank, BracketReader, ParsedTree, Sentence};
