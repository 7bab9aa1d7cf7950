//! Cost tree aggregation
//!
//! Folds call records into a tree keyed by scope path. Self totals are
//! accumulated per record; inclusive totals are filled by one post-order pass
//! afterwards, so for every node
//!
//! ```text
//! inclusive(node) = self(node) + Σ inclusive(children)
//! ```
//!
//! Children live in a `BTreeMap`, which makes the structure independent of
//! record order. Ranking for display is a separate, explicit step
//! ([`CostNode::ranked_children`]).

use crate::models::{CallRecord, ScopePath};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Per-model totals at one node
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelCost {
    pub cost_usd: f64,
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_seconds: f64,
    pub unpriced_calls: u64,
}

impl ModelCost {
    fn add(&mut self, record: &CallRecord) {
        self.cost_usd += record.cost_usd;
        self.calls += 1;
        self.input_tokens = self.input_tokens.saturating_add(record.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(record.output_tokens);
        self.duration_seconds += record.duration_seconds;
        if record.flags.unpriced {
            self.unpriced_calls += 1;
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn mean_input_tokens(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.input_tokens as f64 / self.calls as f64
        }
    }

    pub fn mean_output_tokens(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.output_tokens as f64 / self.calls as f64
        }
    }
}

/// One scope-path prefix in the cost tree
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostNode {
    /// Last path segment; empty for the root
    pub name: String,
    pub path: ScopePath,
    pub self_cost_usd: f64,
    pub inclusive_cost_usd: f64,
    pub self_calls: u64,
    pub inclusive_calls: u64,
    pub self_tokens: u64,
    pub inclusive_tokens: u64,
    /// Breakdown of the self totals by model
    pub models: BTreeMap<String, ModelCost>,
    pub children: BTreeMap<String, CostNode>,
}

impl CostNode {
    fn new(name: String, path: ScopePath) -> Self {
        Self {
            name,
            path,
            ..Default::default()
        }
    }

    fn add_self(&mut self, record: &CallRecord) {
        self.self_cost_usd += record.cost_usd;
        self.self_calls += 1;
        self.self_tokens = self.self_tokens.saturating_add(record.total_tokens());
        self.models
            .entry(record.model.clone())
            .or_default()
            .add(record);
    }

    /// Post-order: children first, then this node
    fn roll_up(&mut self) {
        let mut cost = self.self_cost_usd;
        let mut calls = self.self_calls;
        let mut tokens = self.self_tokens;
        for child in self.children.values_mut() {
            child.roll_up();
            cost += child.inclusive_cost_usd;
            calls += child.inclusive_calls;
            tokens = tokens.saturating_add(child.inclusive_tokens);
        }
        self.inclusive_cost_usd = cost;
        self.inclusive_calls = calls;
        self.inclusive_tokens = tokens;
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Children by descending inclusive cost, ties by ascending name
    pub fn ranked_children(&self) -> Vec<&CostNode> {
        let mut children: Vec<&CostNode> = self.children.values().collect();
        children.sort_by(|a, b| {
            b.inclusive_cost_usd
                .partial_cmp(&a.inclusive_cost_usd)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        children
    }

    /// Models at this node by descending cost, ties by name
    pub fn ranked_models(&self) -> Vec<(&str, &ModelCost)> {
        let mut models: Vec<(&str, &ModelCost)> =
            self.models.iter().map(|(k, v)| (k.as_str(), v)).collect();
        models.sort_by(|a, b| {
            b.1.cost_usd
                .partial_cmp(&a.1.cost_usd)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        models
    }

    /// Descendant at a path relative to this node
    pub fn find(&self, segments: &[String]) -> Option<&CostNode> {
        let mut node = self;
        for segment in segments {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    /// Visit this node and all descendants, pre-order, in ranked order
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a CostNode)) {
        f(self);
        for child in self.ranked_children() {
            child.visit(f);
        }
    }
}

/// Aggregated view of a record log. Rebuilt on every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostTree {
    pub root: CostNode,
    pub unpriced_calls: u64,
    pub malformed_calls: u64,
}

impl CostTree {
    pub fn total_cost(&self) -> f64 {
        self.root.inclusive_cost_usd
    }

    pub fn total_calls(&self) -> u64 {
        self.root.inclusive_calls
    }

    pub fn total_tokens(&self) -> u64 {
        self.root.inclusive_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.root.inclusive_calls == 0
    }

    pub fn find(&self, path: &ScopePath) -> Option<&CostNode> {
        self.root.find(path.segments())
    }

    /// All nodes, pre-order in ranked order
    pub fn nodes(&self) -> Vec<&CostNode> {
        let mut nodes = Vec::new();
        self.root.visit(&mut |node| nodes.push(node));
        nodes
    }
}

/// Fold call records into a cost tree
pub fn aggregate<'a, I>(records: I) -> CostTree
where
    I: IntoIterator<Item = &'a CallRecord>,
{
    let mut tree = CostTree::default();

    for record in records {
        let mut node = &mut tree.root;
        for (depth, segment) in record.scope_path.iter().enumerate() {
            node = node.children.entry(segment.clone()).or_insert_with(|| {
                CostNode::new(
                    segment.clone(),
                    ScopePath::new(record.scope_path[..=depth].iter().cloned()),
                )
            });
        }
        node.add_self(record);

        if record.flags.unpriced {
            tree.unpriced_calls += 1;
        }
        if record.flags.malformed {
            tree.malformed_calls += 1;
        }
    }

    tree.root.roll_up();
    tree
}
