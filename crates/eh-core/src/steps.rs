//! Executable tree operators.
//!
//! A compiled rule is an ordered list of `Step`s. Each step maps an ordered
//! candidate node set to another node set; structural combinators widen or
//! shift the set, extended predicates filter or re-root it. Steps are pure
//! over the tree except for the two that read host ambient state (computed
//! style, location path), which is read-only through the `EvalContext`.
//!
//! The predicate vocabulary is closed: the compiler's registry maps names to
//! these variants, so there is no open dispatch at run time.

use std::collections::HashSet;
use std::fmt;

use crate::dom::NodeId;
use crate::matcher::query_all;
use crate::page::EvalContext;
use crate::pattern::{CssValuePattern, TextPattern};
use crate::runner::run_query;
use crate::selector::SelectorList;

/// An ordered, immutable-after-construction list of steps.
pub type Query = Vec<Step>;

/// Where `:upward()` jumps to.
#[derive(Debug, Clone)]
pub enum UpwardTarget {
    /// Nth ancestor element, 1-based.
    Levels(usize),
    /// Nearest ancestor element matching the selector.
    Selector {
        source: String,
        selectors: SelectorList,
    },
}

#[derive(Debug, Clone)]
pub enum Step {
    /// Accumulated native fragment, run relative to each candidate.
    NativeQuery {
        source: String,
        selectors: SelectorList,
    },
    /// Explicit `>` bridge.
    Child,
    /// Explicit descendant bridge.
    Descendant,
    /// Explicit `+` bridge.
    NextSibling,
    /// Explicit `~` bridge: all later siblings, de-duplicated.
    SubsequentSibling,
    /// Keep nodes whose serialized content matches.
    Contains { pattern: TextPattern },
    /// Keep nodes whose computed style value matches.
    MatchesCss {
        pseudo: Option<String>,
        property: String,
        value: CssValuePattern,
    },
    /// Pass the input through unchanged iff the location path matches.
    MatchesPath { pattern: TextPattern },
    /// Keep nodes carrying a matching attribute (and value, if given).
    MatchesAttr {
        name: TextPattern,
        value: Option<TextPattern>,
    },
    /// Keep nodes whose text content is at least this long.
    MinTextLength { min: usize },
    /// Jump to an ancestor.
    Upward { target: UpwardTarget },
    /// Keep candidates for which any alternative sub-query matches.
    Has {
        source: String,
        alternatives: Vec<Query>,
    },
    /// Replace each candidate with its descendants NOT matched by any
    /// alternative sub-query.
    Not {
        source: String,
        alternatives: Vec<Query>,
    },
}

impl Step {
    /// Map a candidate set to the next one. Total: ambient-state lookup
    /// failures count as non-matches.
    pub fn run(&self, input: &[NodeId], ctx: &EvalContext<'_>) -> Vec<NodeId> {
        let dom = ctx.dom;
        match self {
            Step::NativeQuery { selectors, .. } => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for &candidate in input {
                    for node in query_all(dom, candidate, selectors) {
                        if seen.insert(node) {
                            out.push(node);
                        }
                    }
                }
                out
            }
            Step::Child => input
                .iter()
                .flat_map(|&n| dom.children_elements(n))
                .collect(),
            Step::Descendant => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for &candidate in input {
                    for node in dom.descendant_elements(candidate) {
                        if seen.insert(node) {
                            out.push(node);
                        }
                    }
                }
                out
            }
            Step::NextSibling => input
                .iter()
                .filter_map(|&n| dom.next_sibling_element(n))
                .collect(),
            Step::SubsequentSibling => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for &candidate in input {
                    for node in dom.following_sibling_elements(candidate) {
                        if seen.insert(node) {
                            out.push(node);
                        }
                    }
                }
                out
            }
            Step::Contains { pattern } => input
                .iter()
                .copied()
                .filter(|&n| pattern.is_match(&dom.inner_html(n)))
                .collect(),
            Step::MatchesCss {
                pseudo,
                property,
                value,
            } => input
                .iter()
                .copied()
                .filter(|&n| {
                    ctx.styles
                        .get(n, pseudo.as_deref(), property)
                        .is_some_and(|v| value.is_match(v))
                })
                .collect(),
            Step::MatchesPath { pattern } => {
                if pattern.is_match(ctx.location_path) {
                    input.to_vec()
                } else {
                    Vec::new()
                }
            }
            Step::MatchesAttr { name, value } => input
                .iter()
                .copied()
                .filter(|&n| {
                    dom.attrs(n).any(|(attr_name, attr_value)| {
                        name.matches_exact(attr_name)
                            && value
                                .as_ref()
                                .map_or(true, |v| v.matches_exact(attr_value))
                    })
                })
                .collect(),
            Step::MinTextLength { min } => input
                .iter()
                .copied()
                .filter(|&n| dom.text_content(n).chars().count() >= *min)
                .collect(),
            Step::Upward { target } => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for &candidate in input {
                    let ancestor = match target {
                        UpwardTarget::Levels(n) => n
                            .checked_sub(1)
                            .and_then(|i| dom.ancestor_elements(candidate).nth(i)),
                        UpwardTarget::Selector { selectors, .. } => dom
                            .ancestor_elements(candidate)
                            .find(|&a| crate::matcher::matches(dom, a, dom.root(), selectors)),
                    };
                    if let Some(a) = ancestor {
                        if seen.insert(a) {
                            out.push(a);
                        }
                    }
                }
                out
            }
            Step::Has { alternatives, .. } => input
                .iter()
                .copied()
                .filter(|&n| {
                    alternatives
                        .iter()
                        .any(|q| !run_query(q, &[n], ctx).is_empty())
                })
                .collect(),
            Step::Not { alternatives, .. } => {
                let mut out = Vec::new();
                for &candidate in input {
                    let mut matched = HashSet::new();
                    for q in alternatives {
                        matched.extend(run_query(q, &[candidate], ctx));
                    }
                    out.extend(
                        dom.descendant_elements(candidate)
                            .filter(|n| !matched.contains(n)),
                    );
                }
                out
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::NativeQuery { source, .. } => write!(f, "Raw({source})"),
            Step::Child => f.write_str("ChildComb"),
            Step::Descendant => f.write_str("DescComb"),
            Step::NextSibling => f.write_str("NextSiblComb"),
            Step::SubsequentSibling => f.write_str("SubsSiblComb"),
            Step::Contains { pattern } => write!(f, ":Contains({pattern})"),
            Step::MatchesCss {
                pseudo,
                property,
                value,
            } => match pseudo {
                Some(p) => write!(f, ":MatchesCSS({p}, {property}: {value})"),
                None => write!(f, ":MatchesCSS({property}: {value})"),
            },
            Step::MatchesPath { pattern } => write!(f, ":MatchesPath({pattern})"),
            Step::MatchesAttr { name, value } => match value {
                Some(v) => write!(f, ":MatchesAttr({name}={v})"),
                None => write!(f, ":MatchesAttr({name})"),
            },
            Step::MinTextLength { min } => write!(f, ":MinTextLength({min})"),
            Step::Upward { target } => match target {
                UpwardTarget::Levels(n) => write!(f, ":Upward({n})"),
                UpwardTarget::Selector { source, .. } => write!(f, ":Upward({source})"),
            },
            Step::Has { source, .. } => write!(f, ":Has({source})"),
            Step::Not { source, .. } => write!(f, ":Not({source})"),
        }
    }
}
