//! Query execution.
//!
//! A query is folded left-to-right over a candidate set. The fold
//! short-circuits the moment a step yields nothing; later steps are never
//! invoked. `run_query` is re-entrant: `Has`/`Not` steps call it over their
//! own pre-compiled sub-queries while an outer run is in progress, and no
//! state is shared between invocations beyond the read-only context.

use crate::dom::NodeId;
use crate::page::EvalContext;
use crate::steps::Step;

/// Fold `query` over `input`, short-circuiting on an empty set.
pub fn run_query(query: &[Step], input: &[NodeId], ctx: &EvalContext<'_>) -> Vec<NodeId> {
    let mut nodes = input.to_vec();
    for step in query {
        nodes = step.run(&nodes, ctx);
        if nodes.is_empty() {
            return Vec::new();
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Dom;
    use crate::page::Page;
    use crate::pattern::TextPattern;
    use crate::selector::parse_selector_list;

    fn native(selector: &str) -> Step {
        Step::NativeQuery {
            source: selector.to_string(),
            selectors: parse_selector_list(selector).unwrap(),
        }
    }

    #[test]
    fn folds_steps_left_to_right() {
        let mut dom = Dom::new();
        let root = dom.root();
        let div = dom.append_element(root, "div");
        let span = dom.append_element(div, "span");
        dom.append_text(span, "ad here");
        let other = dom.append_element(div, "span");
        dom.append_text(other, "clean");
        let page = Page::new(dom);

        let query = vec![
            native("span"),
            Step::Contains {
                pattern: TextPattern::parse("ad").unwrap(),
            },
        ];
        assert_eq!(run_query(&query, &[root], &page.ctx()), vec![span]);
    }

    #[test]
    fn short_circuits_on_empty() {
        let mut dom = Dom::new();
        let root = dom.root();
        dom.append_element(root, "div");
        let page = Page::new(dom);

        let query = vec![native(".missing"), native("div")];
        assert!(run_query(&query, &[root], &page.ctx()).is_empty());
    }

    #[test]
    fn rerunning_on_a_stable_tree_is_idempotent() {
        let mut dom = Dom::new();
        let root = dom.root();
        let div = dom.append_element(root, "div");
        dom.append_element(div, "span");
        let page = Page::new(dom);

        let query = vec![native("div"), Step::Child];
        let first = run_query(&query, &[root], &page.ctx());
        let second = run_query(&query, &[root], &page.ctx());
        assert_eq!(first, second);
    }
}
