use std::collections::HashMap;
use std::fmt;

/// Right-hand side of a production.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Rhs {
    /// Lexical production: a part-of-speech tag rewriting to a word.
    Word(String),
    /// Internal production: one or two child labels.
    Nodes(Vec<String>),
}

/// A rewrite rule identified by its left-hand side label and right-hand side.
///
/// Productions are interned into a [`ProductionTable`]; the integer ids the
/// table hands out are what the packed tree nodes store.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Production {
    lhs: String,
    rhs: Rhs,
}

impl Production {
    /// Lexical production `pos -> word`.
    pub fn lexical(pos: impl Into<String>, word: impl Into<String>) -> Self {
        Production {
            lhs: pos.into(),
            rhs: Rhs::Word(word.into()),
        }
    }

    /// Internal production `lhs -> children`.
    ///
    /// Panics if `children` is empty or has more than two entries, since the
    /// packed representation only holds binarized trees.
    pub fn internal(lhs: impl Into<String>, children: Vec<String>) -> Self {
        assert!(
            !children.is_empty() && children.len() <= 2,
            "Internal productions have one or two children."
        );
        Production {
            lhs: lhs.into(),
            rhs: Rhs::Nodes(children),
        }
    }

    /// Left-hand side label.
    pub fn lhs(&self) -> &str {
        self.lhs.as_str()
    }

    /// Returns whether this is a `pos -> word` production.
    pub fn is_lexical(&self) -> bool {
        match self.rhs {
            Rhs::Word(_) => true,
            Rhs::Nodes(_) => false,
        }
    }
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.rhs {
            Rhs::Word(word) => write!(f, "{} -> {}", self.lhs, word),
            Rhs::Nodes(children) => write!(f, "{} -> {}", self.lhs, children.join(" ")),
        }
    }
}

/// Interning table assigning dense ids to productions.
///
/// One table is shared by all treebanks of a run, so ids are comparable
/// across arenas. `label(p)` returns the left-hand side label of production
/// `p`; tree nodes store no label of their own.
#[derive(Debug, Default)]
pub struct ProductionTable {
    ids: HashMap<Production, i32>,
    prods: Vec<Production>,
}

impl ProductionTable {
    pub fn new() -> Self {
        ProductionTable::default()
    }

    /// Get the id of `prod`, interning it if it is new.
    pub fn intern(&mut self, prod: Production) -> i32 {
        if let Some(&id) = self.ids.get(&prod) {
            return id;
        }
        assert!(
            self.prods.len() < i32::max_value() as usize,
            "Production table overflow."
        );
        let id = self.prods.len() as i32;
        self.prods.push(prod.clone());
        self.ids.insert(prod, id);
        id
    }

    /// Look up the id of `prod` without interning.
    pub fn id(&self, prod: &Production) -> Option<i32> {
        self.ids.get(prod).copied()
    }

    /// Left-hand side label of production `prod`.
    ///
    /// Panics if `prod` is not a valid id.
    pub fn label(&self, prod: i32) -> &str {
        self.prods[prod as usize].lhs()
    }

    /// Full production for `prod`.
    pub fn production(&self, prod: i32) -> &Production {
        &self.prods[prod as usize]
    }

    /// Number of interned productions.
    pub fn len(&self) -> usize {
        self.prods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prods.is_empty()
    }
}
