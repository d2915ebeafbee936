//! Elemhide Core Library
//!
//! This crate provides the vocabulary of the elemhide element-hiding engine:
//! the host tree stand-in, the native structural-selector grammar and matcher,
//! the regex-or-literal argument patterns, the executable step library, and
//! the query runner that folds steps over candidate node sets.
//!
//! # Modules
//!
//! - `dom`: arena-backed tree with mutation observation
//! - `selector`: native selector data model and parser
//! - `matcher`: structural matching of selectors against the tree
//! - `pattern`: regex-or-literal predicate arguments
//! - `steps`: executable tree operators (combinators + extended predicates)
//! - `runner`: left-to-right query execution with empty short-circuit
//! - `page`: explicit ambient state (computed styles, location path)

pub mod dom;
pub mod matcher;
pub mod page;
pub mod pattern;
pub mod runner;
pub mod selector;
pub mod steps;

// Re-export commonly used types
pub use dom::{Dom, MutationKind, MutationRecord, NodeId, NodeKind, ObserveFlags, ObserverId};
pub use matcher::{matches, query_all};
pub use page::{ComputedStyles, EvalContext, Page};
pub use pattern::{CssValuePattern, PatternError, TextPattern};
pub use runner::run_query;
pub use selector::{parse_selector_list, SelectorError, SelectorList};
pub use steps::{Query, Step};
