use std::borrow::Borrow;
use std::collections::HashSet;

use regex::Regex;

lazy_static! {
    static ref CONTENT_WORD: Regex =
        Regex::new(r"^(?:NN(?:S|P|PS)?|JJ[RS]?|RB[RS]?|VB[DGNPZ]?|FW|CD)$").unwrap();
}

/// Label matcher.
#[derive(Clone, Debug)]
pub enum LabelMatcher {
    /// Matches labels against a regular expression.
    Pattern(Regex),
    /// Variant used for positive matching.
    Positive(HashSet<String>),
    /// Variant used for negative matching.
    Negative(HashSet<String>),
}

impl LabelMatcher {
    /// Returns whether the query matched.
    ///
    /// `LabelMatcher::Pattern` matches through its regex;
    /// `LabelMatcher::Positive` returns `true` if the query was found,
    /// `LabelMatcher::Negative` if it was not.
    pub fn matches(&self, q: impl Borrow<str>) -> bool {
        match self {
            LabelMatcher::Pattern(re) => re.is_match(q.borrow()),
            LabelMatcher::Positive(set) => set.contains(q.borrow()),
            LabelMatcher::Negative(set) => !set.contains(q.borrow()),
        }
    }
}

/// Default matcher for content-word part-of-speech tags: nouns, adjectives,
/// adverbs, verbs, foreign words and numbers.
pub fn content_word_matcher() -> LabelMatcher {
    LabelMatcher::Pattern(CONTENT_WORD.clone())
}
