//! Structural matching of native selectors against the tree.
//!
//! This is the hot path of every native-query step: `query_all` walks the
//! scope's subtree once in document order and tests each element with a
//! right-to-left complex-selector walk, backtracking through ancestors and
//! preceding siblings where the grammar allows more than one anchor.

use crate::dom::{Dom, NodeId};
use crate::selector::{
    AttrOp, Combinator, CompoundSelector, SelectorList, SimpleSelector,
};

/// All element descendants of `scope` matching `list`, in document order.
pub fn query_all(dom: &Dom, scope: NodeId, list: &SelectorList) -> Vec<NodeId> {
    dom.descendant_elements(scope)
        .filter(|&node| matches(dom, node, scope, list))
        .collect()
}

/// Does `node` match any alternative of `list`, with `:scope` bound to `scope`?
pub fn matches(dom: &Dom, node: NodeId, scope: NodeId, list: &SelectorList) -> bool {
    list.0
        .iter()
        .any(|complex| matches_complex(dom, node, scope, &complex.sequence))
}

fn matches_complex(
    dom: &Dom,
    node: NodeId,
    scope: NodeId,
    sequence: &[(CompoundSelector, Option<Combinator>)],
) -> bool {
    let Some(((last, _), rest)) = sequence.split_last() else {
        return false;
    };
    matches_compound(dom, node, scope, last) && matches_left(dom, node, scope, rest)
}

/// Walk leftwards from `node`, which already matched the compound to the
/// right of `rest`'s last entry.
fn matches_left(
    dom: &Dom,
    node: NodeId,
    scope: NodeId,
    rest: &[(CompoundSelector, Option<Combinator>)],
) -> bool {
    let Some(((compound, comb), head)) = rest.split_last() else {
        return true;
    };
    let Some(comb) = comb else {
        // The parser only leaves the final combinator empty.
        return false;
    };
    match comb {
        Combinator::Child => match dom.parent(node) {
            Some(parent) => {
                matches_compound(dom, parent, scope, compound)
                    && matches_left(dom, parent, scope, head)
            }
            None => false,
        },
        Combinator::Descendant => dom.ancestors(node).any(|ancestor| {
            matches_compound(dom, ancestor, scope, compound)
                && matches_left(dom, ancestor, scope, head)
        }),
        Combinator::NextSibling => match dom.preceding_sibling_elements(node).next() {
            Some(prev) => {
                matches_compound(dom, prev, scope, compound)
                    && matches_left(dom, prev, scope, head)
            }
            None => false,
        },
        Combinator::SubsequentSibling => dom.preceding_sibling_elements(node).any(|prev| {
            matches_compound(dom, prev, scope, compound) && matches_left(dom, prev, scope, head)
        }),
    }
}

fn matches_compound(dom: &Dom, node: NodeId, scope: NodeId, compound: &CompoundSelector) -> bool {
    compound
        .simples
        .iter()
        .all(|simple| matches_simple(dom, node, scope, simple))
}

fn matches_simple(dom: &Dom, node: NodeId, scope: NodeId, simple: &SimpleSelector) -> bool {
    match simple {
        SimpleSelector::Universal => dom.is_element(node),
        SimpleSelector::Type(tag) => dom
            .tag(node)
            .is_some_and(|t| t.eq_ignore_ascii_case(tag)),
        SimpleSelector::Id(id) => dom.id_attr(node) == Some(id.as_str()),
        SimpleSelector::Class(class) => dom.has_class(node, class),
        SimpleSelector::Attribute {
            name,
            op,
            value,
            case_insensitive,
        } => matches_attribute(dom, node, name, *op, value.as_deref(), *case_insensitive),
        SimpleSelector::Scope => node == scope,
        SimpleSelector::Not(list) => dom.is_element(node) && !matches(dom, node, scope, list),
        SimpleSelector::Is(list) | SimpleSelector::Where(list) => {
            matches(dom, node, scope, list)
        }
        SimpleSelector::FirstChild => {
            dom.is_element(node)
                && dom.parent(node).is_some()
                && dom.preceding_sibling_elements(node).next().is_none()
        }
        SimpleSelector::LastChild => {
            dom.is_element(node)
                && dom.parent(node).is_some()
                && dom.following_sibling_elements(node).next().is_none()
        }
        SimpleSelector::Empty => dom.is_element(node) && dom.child_ids(node).next().is_none(),
    }
}

fn matches_attribute(
    dom: &Dom,
    node: NodeId,
    name: &str,
    op: AttrOp,
    expected: Option<&str>,
    case_insensitive: bool,
) -> bool {
    let Some(actual) = dom.attr(node, name) else {
        return false;
    };
    let Some(expected) = expected else {
        return matches!(op, AttrOp::Exists);
    };
    let (actual, expected) = if case_insensitive {
        (actual.to_lowercase(), expected.to_lowercase())
    } else {
        (actual.to_string(), expected.to_string())
    };
    match op {
        AttrOp::Exists => true,
        AttrOp::Equals => actual == expected,
        AttrOp::Includes => {
            !expected.is_empty() && actual.split_ascii_whitespace().any(|w| w == expected)
        }
        AttrOp::DashMatch => {
            actual == expected
                || (actual.starts_with(&expected)
                    && actual[expected.len()..].starts_with('-'))
        }
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::parse_selector_list;

    /// <root>
    ///   <div id="outer" class="container">
    ///     <p class="intro">text</p>
    ///     <span class="ad" data-ad="true"></span>
    ///     <span class="content"></span>
    ///   </div>
    ///   <div id="plain"></div>
    /// </root>
    fn fixture() -> (Dom, NodeId, NodeId, NodeId, NodeId, NodeId) {
        let mut dom = Dom::new();
        let root = dom.root();
        let outer = dom.append_element(root, "div");
        dom.set_attribute(outer, "id", "outer");
        dom.set_attribute(outer, "class", "container");
        let p = dom.append_element(outer, "p");
        dom.set_attribute(p, "class", "intro");
        dom.append_text(p, "text");
        let ad = dom.append_element(outer, "span");
        dom.set_attribute(ad, "class", "ad");
        dom.set_attribute(ad, "data-ad", "true");
        let content = dom.append_element(outer, "span");
        dom.set_attribute(content, "class", "content");
        let plain = dom.append_element(root, "div");
        dom.set_attribute(plain, "id", "plain");
        (dom, outer, p, ad, content, plain)
    }

    fn query(dom: &Dom, scope: NodeId, selector: &str) -> Vec<NodeId> {
        query_all(dom, scope, &parse_selector_list(selector).unwrap())
    }

    #[test]
    fn queries_by_type_class_id_attribute() {
        let (dom, outer, p, ad, content, plain) = fixture();
        let root = dom.root();
        assert_eq!(query(&dom, root, "div"), vec![outer, plain]);
        assert_eq!(query(&dom, root, ".ad"), vec![ad]);
        assert_eq!(query(&dom, root, "#outer"), vec![outer]);
        assert_eq!(query(&dom, root, "[data-ad]"), vec![ad]);
        assert_eq!(query(&dom, root, "[data-ad=true]"), vec![ad]);
        assert_eq!(query(&dom, root, "span, p"), vec![p, ad, content]);
    }

    #[test]
    fn combinators_relate_compounds() {
        let (dom, _, p, ad, content, _) = fixture();
        let root = dom.root();
        assert_eq!(query(&dom, root, "div > span"), vec![ad, content]);
        assert_eq!(query(&dom, root, ".container span"), vec![ad, content]);
        assert_eq!(query(&dom, root, "p + span"), vec![ad]);
        assert_eq!(query(&dom, root, "p ~ span"), vec![ad, content]);
        assert_eq!(query(&dom, root, ".intro:first-child"), vec![p]);
        assert_eq!(query(&dom, root, "span:last-child"), vec![content]);
    }

    #[test]
    fn scope_anchors_relative_queries() {
        let (dom, outer, _, ad, content, _) = fixture();
        // Children of the scope root only.
        assert_eq!(query(&dom, outer, ":scope > span"), vec![ad, content]);
        // A scope prefix keeps the query inside the candidate's subtree.
        assert_eq!(query(&dom, outer, ":scope .ad"), vec![ad]);
        assert!(query(&dom, ad, ":scope .ad").is_empty());
    }

    #[test]
    fn native_not_keeps_complement_semantics() {
        let (dom, _, p, _, content, _) = fixture();
        let root = dom.root();
        assert_eq!(query(&dom, root, "span:not(.ad)"), vec![content]);
        assert_eq!(
            query(&dom, root, ".container :not(.ad, .content)"),
            vec![p]
        );
    }

    #[test]
    fn is_and_where_match_any_alternative() {
        let (dom, _, p, ad, _, _) = fixture();
        let root = dom.root();
        assert_eq!(query(&dom, root, ":is(.intro, .ad)"), vec![p, ad]);
        assert_eq!(query(&dom, root, ":where(.intro, .ad)"), vec![p, ad]);
    }

    #[test]
    fn matching_is_idempotent_on_a_stable_tree() {
        let (dom, _, _, _, _, _) = fixture();
        let root = dom.root();
        let list = parse_selector_list("div span").unwrap();
        assert_eq!(query_all(&dom, root, &list), query_all(&dom, root, &list));
    }
}
