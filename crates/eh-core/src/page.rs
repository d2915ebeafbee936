//! Explicit ambient state.
//!
//! The predicates that read anything beyond tree structure (computed style,
//! current location) take it from an `EvalContext` built off a `Page`. There
//! is no global document or window anywhere in the core.

use std::collections::HashMap;

use crate::dom::{Dom, NodeId};

/// Host-fed computed-style table, keyed by node, optional pseudo-element,
/// and property name. A missing entry is a non-match, never an error.
#[derive(Debug, Default)]
pub struct ComputedStyles {
    map: HashMap<(NodeId, Option<String>, String), String>,
}

impl ComputedStyles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, node: NodeId, pseudo: Option<&str>, property: &str, value: &str) {
        self.map.insert(
            (node, pseudo.map(str::to_string), property.to_string()),
            value.to_string(),
        );
    }

    pub fn get(&self, node: NodeId, pseudo: Option<&str>, property: &str) -> Option<&str> {
        self.map
            .get(&(node, pseudo.map(str::to_string), property.to_string()))
            .map(String::as_str)
    }
}

/// The full host surface a query evaluates against.
#[derive(Debug)]
pub struct Page {
    pub dom: Dom,
    pub styles: ComputedStyles,
    pub location_path: String,
}

impl Page {
    pub fn new(dom: Dom) -> Self {
        Self {
            dom,
            styles: ComputedStyles::new(),
            location_path: "/".to_string(),
        }
    }

    pub fn with_location(dom: Dom, location_path: &str) -> Self {
        Self {
            dom,
            styles: ComputedStyles::new(),
            location_path: location_path.to_string(),
        }
    }

    pub fn ctx(&self) -> EvalContext<'_> {
        EvalContext {
            dom: &self.dom,
            styles: &self.styles,
            location_path: &self.location_path,
        }
    }
}

/// Read-only view handed to every step during one run.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub dom: &'a Dom,
    pub styles: &'a ComputedStyles,
    pub location_path: &'a str,
}
