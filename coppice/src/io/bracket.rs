use std::io::{BufRead, Lines};

use failure::Error;
use pest::iterators::Pair;
use pest::Parser;
use tracing::warn;

use crate::arena::TreeArena;
use crate::node::Node;
use crate::prod::{Production, ProductionTable};

/// Tokens of one sentence; `None` marks a gap introduced by upstream
/// preprocessing.
pub type Sentence = Vec<Option<String>>;

// dummy struct required by pest
#[derive(Parser)]
#[grammar = "io/bracket.pest"]
struct BracketParser;

/// One parsed tree plus its token sequence, ready for arena insertion.
#[derive(Debug)]
pub struct ParsedTree {
    pub nodes: Vec<Node>,
    pub root: u16,
    pub sent: Sentence,
}

/// Iterator over single-line bracket trees.
///
/// The continuous format has tokens at the leaves:
/// `(S (NP (DT the) (NN dog)) (VP (VB barks)))`. The discontinuous format
/// has sentence positions at the leaves and the token sequence after a tab:
/// `(VP (VB 0) (PRT 3))<TAB>Wake your friend up`.
///
/// Lines starting with `%` and blank lines are skipped. Each item is one
/// tree; a malformed tree yields an `Err` without ending the iterator.
/// Productions are interned into the table shared by the whole run.
pub struct BracketReader<'a, R> {
    inner: Lines<R>,
    table: &'a mut ProductionTable,
    discontinuous: bool,
}

impl<'a, R> BracketReader<'a, R>
where
    R: BufRead,
{
    pub fn new(read: R, discontinuous: bool, table: &'a mut ProductionTable) -> Self {
        BracketReader {
            inner: read.lines(),
            table,
            discontinuous,
        }
    }
}

impl<'a, R> Iterator for BracketReader<'a, R>
where
    R: BufRead,
{
    type Item = Result<ParsedTree, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(line) = self.inner.next() {
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') {
                continue;
            }
            return Some(parse_line(line, self.discontinuous, self.table));
        }
        None
    }
}

/// Read a whole treebank into `arena`, skipping malformed trees.
///
/// A tree that fails to parse or validate is logged and dropped; the arena
/// is never left with a partial tree. I/O errors abort the read. Returns
/// the sentences parallel to the trees that were kept.
pub fn read_treebank<R>(
    read: R,
    discontinuous: bool,
    table: &mut ProductionTable,
    arena: &mut TreeArena,
) -> Result<Vec<Sentence>, Error>
where
    R: BufRead,
{
    let mut sents = Vec::new();
    for parsed in BracketReader::new(read, discontinuous, table) {
        match parsed {
            Ok(tree) => match arena.push(&tree.nodes, tree.root) {
                Ok(_) => sents.push(tree.sent),
                Err(err) => warn!("Skipping tree: {}", err),
            },
            Err(err) => {
                if err.downcast_ref::<std::io::Error>().is_some() {
                    return Err(err);
                }
                warn!("Skipping malformed tree: {}", err);
            }
        }
    }
    Ok(sents)
}

fn parse_line(
    line: &str,
    discontinuous: bool,
    table: &mut ProductionTable,
) -> Result<ParsedTree, Error> {
    let (tree_part, sent) = if discontinuous {
        let mut parts = line.splitn(2, '\t');
        let tree_part = parts.next().unwrap().trim_end();
        let tokens = parts
            .next()
            .ok_or_else(|| format_err!("Missing tokens after discontinuous tree: {}", line))?;
        let sent = tokens
            .split_whitespace()
            .map(|token| Some(token.to_owned()))
            .collect::<Sentence>();
        (tree_part, sent)
    } else {
        (line, Sentence::new())
    };

    let mut parsed = BracketParser::parse(Rule::tree, tree_part)?;
    let constituent = parsed.next().unwrap().into_inner().next().unwrap();
    let mut builder = Builder {
        table,
        nodes: Vec::new(),
        used: vec![false; sent.len()],
        sent,
        discontinuous,
    };
    let root = builder.build(constituent)?;
    Ok(ParsedTree {
        nodes: builder.nodes,
        root,
        sent: builder.sent,
    })
}

/// Builds the staged node list for one tree while interning productions.
struct Builder<'a> {
    table: &'a mut ProductionTable,
    nodes: Vec<Node>,
    sent: Sentence,
    used: Vec<bool>,
    discontinuous: bool,
}

impl<'a> Builder<'a> {
    fn build(&mut self, pair: Pair<Rule>) -> Result<u16, Error> {
        let mut inner = pair.into_inner();
        let label = inner.next().unwrap().as_str();
        let children = inner.collect::<Vec<_>>();

        if children.len() == 1 && children[0].as_rule() == Rule::terminal {
            let (position, word) = self.terminal(children[0].as_str())?;
            let prod = self.table.intern(Production::lexical(label, word));
            return self.push_node(Node::preterminal(prod, position));
        }
        if children.len() > 2 {
            return Err(format_err!(
                "Node {} has {} children; trees must be binarized.",
                label,
                children.len()
            ));
        }
        let mut indices = Vec::with_capacity(2);
        let mut labels = Vec::with_capacity(2);
        for child in children {
            let index = self.build(child)?;
            labels.push(self.table.label(self.nodes[index as usize].prod()).to_owned());
            indices.push(index);
        }
        let prod = self.table.intern(Production::internal(label, labels));
        let node = match indices.as_slice() {
            [child] => Node::unary(prod, *child),
            [left, right] => Node::binary(prod, *left, *right),
            _ => unreachable!(),
        };
        self.push_node(node)
    }

    fn terminal(&mut self, token: &str) -> Result<(usize, String), Error> {
        if self.discontinuous {
            let position = token
                .parse::<usize>()
                .map_err(|_| format_err!("Expected a terminal index, got '{}'.", token))?;
            if position >= i16::max_value() as usize {
                return Err(format_err!("Terminal index {} too large.", position));
            }
            if position >= self.sent.len() {
                return Err(format_err!(
                    "Terminal index {} outside the {}-token sentence.",
                    position,
                    self.sent.len()
                ));
            }
            if self.used[position] {
                return Err(format_err!("Terminal index {} used twice.", position));
            }
            self.used[position] = true;
            let word = self.sent[position]
                .clone()
                .ok_or_else(|| format_err!("Terminal index {} points at a gap.", position))?;
            Ok((position, word))
        } else {
            let position = self.sent.len();
            if position >= i16::max_value() as usize {
                return Err(format_err!("Sentence too long."));
            }
            self.sent.push(Some(token.to_owned()));
            Ok((position, token.to_owned()))
        }
    }

    fn push_node(&mut self, node: Node) -> Result<u16, Error> {
        if self.nodes.len() >= i16::max_value() as usize {
            return Err(format_err!("Tree too large."));
        }
        self.nodes.push(node);
        Ok(self.nodes.len() as u16 - 1)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{read_treebank, BracketReader};
    use crate::prod::{Production, ProductionTable};
    use crate::TreeArena;

    #[test]
    fn continuous_tree() {
        let mut table = ProductionTable::new();
        let mut reader = BracketReader::new(
            Cursor::new("(S (NP (DT the) (NN dog)) (VP (VB barks)))"),
            false,
            &mut table,
        );
        let tree = reader.next().unwrap().unwrap();
        assert!(reader.next().is_none());
        assert_eq!(tree.nodes.len(), 6);
        assert_eq!(
            tree.sent,
            vec![
                Some("the".to_string()),
                Some("dog".to_string()),
                Some("barks".to_string())
            ]
        );
        assert_eq!(table.len(), 6);
        assert!(table.id(&Production::lexical("DT", "the")).is_some());
        assert!(table
            .id(&Production::internal(
                "NP",
                vec!["DT".to_string(), "NN".to_string()],
            ))
            .is_some());
    }

    #[test]
    fn single_preterminal() {
        let mut table = ProductionTable::new();
        let mut reader = BracketReader::new(Cursor::new("(T t)"), false, &mut table);
        let tree = reader.next().unwrap().unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].terminal(), Some(0));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let mut table = ProductionTable::new();
        let text = "% a comment\n\n(X x)\n\n% another\n(Y y)\n";
        let trees = BracketReader::new(Cursor::new(text), false, &mut table)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(trees.len(), 2);
    }

    #[test]
    fn non_binarized_tree_is_an_error() {
        let mut table = ProductionTable::new();
        let mut reader = BracketReader::new(
            Cursor::new("(X (A a) (B b) (C c))"),
            false,
            &mut table,
        );
        assert!(reader.next().unwrap().is_err());
    }

    #[test]
    fn unbalanced_tree_is_an_error() {
        let mut table = ProductionTable::new();
        let mut reader = BracketReader::new(Cursor::new("(S (NP x)"), false, &mut table);
        assert!(reader.next().unwrap().is_err());
        let mut reader = BracketReader::new(Cursor::new("(S (NP x)))"), false, &mut table);
        assert!(reader.next().unwrap().is_err());
    }

    #[test]
    fn malformed_trees_are_skipped_by_the_treebank_reader() {
        let mut table = ProductionTable::new();
        let mut arena = TreeArena::new();
        let text = "(S (NP x) (VP y))\n(X (A a) (B b) (C c))\n(T t)\n";
        let sents = read_treebank(Cursor::new(text), false, &mut table, &mut arena).unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(sents.len(), 2);
        assert_eq!(sents[1], vec![Some("t".to_string())]);
    }

    #[test]
    fn discontinuous_tree() {
        let mut table = ProductionTable::new();
        let text = "(VP (VB 0) (PRT 3))\tWake your friend up";
        let mut reader = BracketReader::new(Cursor::new(text), true, &mut table);
        let tree = reader.next().unwrap().unwrap();
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.sent.len(), 4);
        let mut terminals = tree
            .nodes
            .iter()
            .filter_map(|n| n.terminal())
            .collect::<Vec<_>>();
        terminals.sort();
        assert_eq!(terminals, vec![0, 3]);
        assert!(table.id(&Production::lexical("VB", "Wake")).is_some());
        assert!(table.id(&Production::lexical("PRT", "up")).is_some());
    }

    #[test]
    fn discontinuous_errors() {
        let mut table = ProductionTable::new();
        // missing token part
        let mut reader = BracketReader::new(Cursor::new("(VP (VB 0))"), true, &mut table);
        assert!(reader.next().unwrap().is_err());
        // index out of range
        let mut reader = BracketReader::new(Cursor::new("(VP (VB 7))\ta b"), true, &mut table);
        assert!(reader.next().unwrap().is_err());
        // index used twice
        let mut reader = BracketReader::new(
            Cursor::new("(VP (VB 0) (PRT 0))\ta b"),
            true,
            &mut table,
        );
        assert!(reader.next().unwrap().is_err());
        // not an index
        let mut reader = BracketReader::new(Cursor::new("(VP (VB x))\ta b"), true, &mut table);
        assert!(reader.next().unwrap().is_err());
    }
}
