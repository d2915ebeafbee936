//! Arena-backed tree standing in for the host document.
//!
//! The engine core never talks to a real browser; it consumes a handle to a
//! root node plus a small set of host capabilities. This module provides the
//! tree half of that contract: structure, attributes, text, and subtree
//! mutation observation with the same child-list/subtree/attribute-filter
//! granularity a `MutationObserver` offers.

use indextree::Arena;
use smallvec::SmallVec;

pub use indextree::NodeId;

mod printing;

/// What a tree node is.
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Document,
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
}

/// One node's payload: kind plus attribute pairs.
#[derive(Debug, Clone, Default)]
pub struct DomNode {
    pub kind: NodeKind,
    pub attrs: SmallVec<[(String, String); 4]>,
}

bitflags::bitflags! {
    /// What an observer wants to be told about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObserveFlags: u8 {
        /// Child insertions/removals on the target itself
        const CHILD_LIST = 1 << 0;
        /// Extend child-list/attribute observation to the whole subtree
        const SUBTREE = 1 << 1;
        /// Attribute changes, restricted by the observer's attribute filter
        const ATTRIBUTES = 1 << 2;
    }
}

/// Kind of a delivered mutation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
}

/// One observed mutation.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// The parent for child-list changes, the changed node for attributes.
    pub target: NodeId,
    /// Attribute name for `MutationKind::Attributes` records.
    pub attr_name: Option<String>,
}

/// Handle to a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(usize);

#[derive(Debug)]
struct Observer {
    target: NodeId,
    flags: ObserveFlags,
    attr_filter: Vec<String>,
    queue: Vec<MutationRecord>,
}

/// The tree. All mutation goes through `Dom` methods so observers see it.
#[derive(Debug)]
pub struct Dom {
    arena: Arena<DomNode>,
    root: NodeId,
    observers: Vec<Option<Observer>>,
    loaded: bool,
}

impl Dom {
    /// Create a tree holding a single document root, still "loading".
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DomNode::default());
        Self {
            arena,
            root,
            observers: Vec::new(),
            loaded: false,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Host signal: the document finished loading.
    pub fn set_loaded(&mut self) {
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Append a new element under `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let node = self.arena.new_node(DomNode {
            kind: NodeKind::Element {
                tag: tag.to_string(),
            },
            attrs: SmallVec::new(),
        });
        parent.append(node, &mut self.arena);
        self.record(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
            attr_name: None,
        });
        node
    }

    /// Append a new text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let node = self.arena.new_node(DomNode {
            kind: NodeKind::Text {
                text: text.to_string(),
            },
            attrs: SmallVec::new(),
        });
        parent.append(node, &mut self.arena);
        self.record(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
            attr_name: None,
        });
        node
    }

    /// Set (or replace) an attribute.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let attrs = &mut self.arena[node].get_mut().attrs;
        if let Some(pair) = attrs.iter_mut().find(|(n, _)| n == name) {
            pair.1 = value.to_string();
        } else {
            attrs.push((name.to_string(), value.to_string()));
        }
        self.record(MutationRecord {
            kind: MutationKind::Attributes,
            target: node,
            attr_name: Some(name.to_string()),
        });
    }

    /// Detach `node` (and its subtree) from its parent.
    pub fn detach(&mut self, node: NodeId) {
        let parent = self.arena[node].parent();
        node.detach(&mut self.arena);
        if let Some(parent) = parent {
            self.record(MutationRecord {
                kind: MutationKind::ChildList,
                target: parent,
                attr_name: None,
            });
        }
    }

    /// Hide `node` with a persistent style override. Idempotent.
    pub fn hide(&mut self, node: NodeId) {
        self.set_attribute(node, "style", "display: none !important;");
    }

    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.attr(node, "style")
            .is_some_and(|v| v.contains("display: none"))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.arena[node].get().kind, NodeKind::Element { .. })
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.arena[node].get().kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.arena[node]
            .get()
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self, node: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.arena[node]
            .get()
            .attrs
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn id_attr(&self, node: NodeId) -> Option<&str> {
        self.attr(node, "id")
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class))
    }

    /// Is `node` still attached under the document root?
    pub fn is_connected(&self, node: NodeId) -> bool {
        node.ancestors(&self.arena).any(|a| a == self.root)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena[node].parent()
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| self.is_element(p))
    }

    pub fn children_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.children(&self.arena).filter(|&c| self.is_element(c))
    }

    pub fn next_sibling_element(&self, node: NodeId) -> Option<NodeId> {
        self.following_sibling_elements(node).next()
    }

    pub fn following_sibling_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.following_siblings(&self.arena)
            .skip(1)
            .filter(|&s| self.is_element(s))
    }

    pub fn preceding_sibling_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.preceding_siblings(&self.arena)
            .skip(1)
            .filter(|&s| self.is_element(s))
    }

    /// Ancestors of `node`, nearest first, excluding `node` itself.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.ancestors(&self.arena).skip(1)
    }

    pub fn ancestor_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.ancestors(node).filter(|&a| self.is_element(a))
    }

    /// Element descendants of `node` in document (preorder) order,
    /// excluding `node` itself.
    pub fn descendant_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.descendants(&self.arena)
            .skip(1)
            .filter(|&d| self.is_element(d))
    }

    /// Concatenated text of `node` and its subtree.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        for d in node.descendants(&self.arena) {
            if let NodeKind::Text { text } = &self.arena[d].get().kind {
                out.push_str(text);
            }
        }
        out
    }

    pub(crate) fn node(&self, node: NodeId) -> &DomNode {
        self.arena[node].get()
    }

    pub(crate) fn child_ids(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.children(&self.arena)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Register an observer over `target`'s subtree. Slots freed by
    /// `disconnect` are reused, so repeated observe/disconnect cycles do not
    /// grow the observer table.
    pub fn observe(
        &mut self,
        target: NodeId,
        flags: ObserveFlags,
        attr_filter: &[&str],
    ) -> ObserverId {
        let observer = Observer {
            target,
            flags,
            attr_filter: attr_filter.iter().map(|s| s.to_string()).collect(),
            queue: Vec::new(),
        };
        match self.observers.iter().position(Option::is_none) {
            Some(free) => {
                self.observers[free] = Some(observer);
                ObserverId(free)
            }
            None => {
                self.observers.push(Some(observer));
                ObserverId(self.observers.len() - 1)
            }
        }
    }

    /// Drop an observer along with any undelivered records.
    pub fn disconnect(&mut self, id: ObserverId) {
        if let Some(slot) = self.observers.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Drain the observer's queued records.
    pub fn take_records(&mut self, id: ObserverId) -> Vec<MutationRecord> {
        match self.observers.get_mut(id.0) {
            Some(Some(obs)) => std::mem::take(&mut obs.queue),
            _ => Vec::new(),
        }
    }

    fn record(&mut self, rec: MutationRecord) {
        let arena = &self.arena;
        for obs in self.observers.iter_mut().flatten() {
            let in_scope = rec.target == obs.target
                || (obs.flags.contains(ObserveFlags::SUBTREE)
                    && rec.target.ancestors(arena).any(|a| a == obs.target));
            if !in_scope {
                continue;
            }
            let wanted = match rec.kind {
                MutationKind::ChildList => obs.flags.contains(ObserveFlags::CHILD_LIST),
                MutationKind::Attributes => {
                    obs.flags.contains(ObserveFlags::ATTRIBUTES)
                        && rec
                            .attr_name
                            .as_deref()
                            .is_some_and(|n| obs.attr_filter.iter().any(|f| f == n))
                }
            };
            if wanted {
                obs.queue.push(rec.clone());
            }
        }
    }
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}
