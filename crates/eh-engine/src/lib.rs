//! Elemhide Engine
//!
//! Owns a set of compiled rules and keeps them applied to a live page. The
//! initial pass runs at `start`; after that, passes are driven by mutation
//! records drained through `poll`. Re-application uses a disconnect/apply/
//! reconnect protocol so the engine's own suppression never feeds back into
//! its observer, and bursty mutations are coalesced into a single pass per
//! bounded time window.
//!
//! The engine is single-threaded and clock-agnostic: the host calls `poll`
//! with its own notion of "now" (an event loop tick, a timer callback), and
//! the engine decides whether the coalescing deadline has passed.

use std::time::{Duration, Instant};

use eh_compiler::ParseError;
use eh_core::dom::{MutationKind, NodeId, ObserveFlags, ObserverId};
use eh_core::page::Page;
use eh_core::runner::run_query;
use eh_core::steps::Query;

/// Trailing-edge coalescing window. The first relevant mutation batch arms a
/// deadline this far in the future; later batches inside the window do not
/// push it back.
pub const COALESCE_WINDOW: Duration = Duration::from_millis(25);

/// Attribute changes that can invalidate prior matches. Everything else is
/// churn and is not even observed.
const OBSERVED_ATTRS: [&str; 2] = ["id", "class"];

/// How matched nodes are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressMode {
    /// Detach the node from the tree.
    #[default]
    Remove,
    /// Keep the node but give it a persistent display override.
    Hide,
}

/// One source line and its compilation outcome. Failed lines are kept so
/// callers can report them; the engine skips them during passes.
#[derive(Debug)]
pub struct Rule {
    pub source: String,
    pub compiled: Result<Query, ParseError>,
}

#[derive(Debug)]
pub struct Engine {
    rules: Vec<Rule>,
    mode: SuppressMode,
    observer: Option<ObserverId>,
    apply_after_load: bool,
    next_pass_at: Option<Instant>,
}

impl Engine {
    /// Compile each non-blank line of `rules_text` independently. A line
    /// that fails to compile is logged and skipped during passes; it never
    /// fails construction as a whole.
    pub fn new(rules_text: &str) -> Self {
        let mut rules = Vec::new();
        for line in rules_text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let compiled = eh_compiler::compile(line);
            if let Err(e) = &compiled {
                log::warn!("dropping rule {line:?}: {e}");
            }
            rules.push(Rule {
                source: line.to_string(),
                compiled,
            });
        }
        Self {
            rules,
            mode: SuppressMode::default(),
            observer: None,
            apply_after_load: false,
            next_pass_at: None,
        }
    }

    pub fn with_mode(mut self, mode: SuppressMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run the initial pass and subscribe to mutations. If the page has not
    /// finished loading, one more pass is owed when `document_loaded` fires.
    pub fn start(&mut self, page: &mut Page) {
        self.apply_pass(page);
        self.apply_after_load = !page.dom.is_loaded();
        let root = page.dom.root();
        self.observer = Some(page.dom.observe(
            root,
            ObserveFlags::CHILD_LIST | ObserveFlags::SUBTREE | ObserveFlags::ATTRIBUTES,
            &OBSERVED_ATTRS,
        ));
    }

    /// Host signal: loading completed. Runs the one owed pass, if any.
    pub fn document_loaded(&mut self, page: &mut Page) {
        if std::mem::take(&mut self.apply_after_load) {
            self.apply_pass(page);
        }
    }

    /// Drain mutation records and run a pass once the coalescing deadline
    /// has been reached. Batches holding no relevant record arm nothing.
    pub fn poll(&mut self, page: &mut Page, now: Instant) {
        if let Some(id) = self.observer {
            let records = page.dom.take_records(id);
            let relevant = records.iter().any(|r| match r.kind {
                MutationKind::ChildList => true,
                MutationKind::Attributes => r
                    .attr_name
                    .as_deref()
                    .is_some_and(|n| OBSERVED_ATTRS.contains(&n)),
            });
            if relevant && self.next_pass_at.is_none() {
                self.next_pass_at = Some(now + COALESCE_WINDOW);
            }
        }
        if self.next_pass_at.is_some_and(|deadline| now >= deadline) {
            self.next_pass_at = None;
            self.apply_pass(page);
        }
    }

    /// Unsubscribe and cancel any armed pass.
    pub fn stop(&mut self, page: &mut Page) {
        if let Some(id) = self.observer.take() {
            page.dom.disconnect(id);
        }
        self.next_pass_at = None;
        self.apply_after_load = false;
    }

    /// One pass under the disconnect/apply/reconnect protocol: suppression
    /// performed here must not reach our own observer.
    fn apply_pass(&mut self, page: &mut Page) {
        let reconnect = match self.observer.take() {
            Some(id) => {
                page.dom.disconnect(id);
                true
            }
            None => false,
        };
        self.run_rules(page);
        if reconnect {
            let root = page.dom.root();
            self.observer = Some(page.dom.observe(
                root,
                ObserveFlags::CHILD_LIST | ObserveFlags::SUBTREE | ObserveFlags::ATTRIBUTES,
                &OBSERVED_ATTRS,
            ));
        }
    }

    /// Evaluate every compiled rule from the root, in declaration order,
    /// then suppress the union of matches. Each rule starts fresh from the
    /// root; one rule's result never feeds another's input.
    fn run_rules(&self, page: &mut Page) {
        let root = page.dom.root();
        let mut matched: Vec<Vec<NodeId>> = Vec::new();
        {
            let ctx = page.ctx();
            for rule in &self.rules {
                if let Ok(query) = &rule.compiled {
                    let nodes = run_query(query, &[root], &ctx);
                    if !nodes.is_empty() {
                        log::debug!("rule {:?}: {} match(es)", rule.source, nodes.len());
                        matched.push(nodes);
                    }
                }
            }
        }
        for nodes in matched {
            for node in nodes {
                match self.mode {
                    SuppressMode::Remove => {
                        // An earlier rule (or ancestor match) may already
                        // have taken this node out.
                        if page.dom.is_connected(node) {
                            page.dom.detach(node);
                        }
                    }
                    SuppressMode::Hide => page.dom.hide(node),
                }
            }
        }
    }
}
