//! Subtree serialization.
//!
//! Content-matching predicates run against the serialized markup of a node's
//! subtree, so the serialization only needs to be stable, not pretty.

use std::fmt::Write;

use super::{Dom, NodeId, NodeKind};

impl Dom {
    /// Serialized markup of `node`'s children.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.child_ids(node) {
            self.write_node(&mut out, child);
        }
        out
    }

    fn write_node(&self, out: &mut String, node: NodeId) {
        match &self.node(node).kind {
            NodeKind::Document => {
                for child in self.child_ids(node) {
                    self.write_node(out, child);
                }
            }
            NodeKind::Text { text } => out.push_str(text),
            NodeKind::Element { tag } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in self.attrs(node) {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
                out.push('>');
                for child in self.child_ids(node) {
                    self.write_node(out, child);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_elements_attributes_and_text() {
        let mut dom = Dom::new();
        let root = dom.root();
        let div = dom.append_element(root, "div");
        dom.set_attribute(div, "class", "ad");
        let span = dom.append_element(div, "span");
        dom.append_text(span, "sponsored");
        dom.append_text(div, " tail");

        assert_eq!(
            dom.inner_html(root),
            "<div class=\"ad\"><span>sponsored</span> tail</div>"
        );
        assert_eq!(dom.inner_html(div), "<span>sponsored</span> tail");
    }
}
