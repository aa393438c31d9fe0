//! Canonical snapshots of recognized structures
//!
//! A snapshot is a deep, owned copy of a Rhai value in a comparable form.
//! Nothing in a snapshot aliases the live script value, so the script can
//! keep mutating its data while earlier events stay intact.
//!
//! - sequences become a list of JSON values
//! - trees become [`TreeSnapshot`] records
//! - graphs become [`GraphSnapshot`] adjacency maps of string ids

use rhai::{Array, Blob, Dynamic, FnPtr, ImmutableString, Map, FLOAT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::tracer::shape::{is_scalar, PAYLOAD_FIELDS};
use crate::types::StructureFamily;

/// Reasons a value cannot be turned into a snapshot
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("value nesting exceeds depth {0}")]
    DepthExceeded(usize),

    #[error("non-finite float {0} cannot be represented")]
    NonFinite(FLOAT),

    #[error("values of type {0} cannot be represented")]
    Unrepresentable(String),

    #[error("expected a {expected} value, found {found}")]
    ShapeMismatch {
        expected: StructureFamily,
        found: String,
    },
}

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

/// Canonical form of a tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    #[serde(default)]
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Box<TreeSnapshot>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Box<TreeSnapshot>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeSnapshot>>,
}

impl TreeSnapshot {
    /// A node without branches or children
    pub fn leaf(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            left: None,
            right: None,
            children: Some(Vec::new()),
        }
    }

    /// Structural equality: payloads equal and every child link equal, recursively
    pub fn is_identical(&self, other: &TreeSnapshot) -> bool {
        self == other
    }

    /// True if any node in the tree has a `left` or `right` branch
    pub fn has_branches(&self) -> bool {
        self.left.is_some()
            || self.right.is_some()
            || self.child_nodes().any(TreeSnapshot::has_branches)
    }

    /// True if any node in the tree carries a non-empty `children` list
    pub fn has_children_lists(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
            || self.child_nodes().any(TreeSnapshot::has_children_lists)
    }

    pub fn node_count(&self) -> usize {
        1 + self.child_nodes().map(TreeSnapshot::node_count).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.child_nodes().map(TreeSnapshot::depth).max().unwrap_or(0)
    }

    fn child_nodes(&self) -> impl Iterator<Item = &TreeSnapshot> {
        self.left
            .as_deref()
            .into_iter()
            .chain(self.right.as_deref())
            .chain(self.children.iter().flatten())
    }
}

/// Canonical adjacency form of a graph
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphSnapshot {
    pub adjacency: BTreeMap<String, Vec<String>>,
}

impl GraphSnapshot {
    pub fn new(adjacency: BTreeMap<String, Vec<String>>) -> Self {
        Self { adjacency }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    pub fn max_out_degree(&self) -> usize {
        self.adjacency.values().map(Vec::len).max().unwrap_or(0)
    }

    /// True if some node lists itself as a neighbor
    pub fn has_self_loop(&self) -> bool {
        self.adjacency
            .iter()
            .any(|(node, neighbors)| neighbors.iter().any(|n| n == node))
    }

    /// Add every neighbor that is not yet a key as a node without edges
    fn add_implicit_nodes(&mut self) {
        let implicit: Vec<String> = self
            .adjacency
            .values()
            .flatten()
            .filter(|n| !self.adjacency.contains_key(n.as_str()))
            .cloned()
            .collect();
        for node in implicit {
            self.adjacency.entry(node).or_default();
        }
    }
}

/// Family-specific canonical form of a structure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StructureSnapshot {
    Sequence(Vec<Value>),
    Tree(TreeSnapshot),
    Graph(GraphSnapshot),
}

impl StructureSnapshot {
    pub fn family(&self) -> StructureFamily {
        match self {
            StructureSnapshot::Sequence(_) => StructureFamily::Sequence,
            StructureSnapshot::Tree(_) => StructureFamily::Tree,
            StructureSnapshot::Graph(_) => StructureFamily::Graph,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            StructureSnapshot::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&TreeSnapshot> {
        match self {
            StructureSnapshot::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_graph(&self) -> Option<&GraphSnapshot> {
        match self {
            StructureSnapshot::Graph(graph) => Some(graph),
            _ => None,
        }
    }

    /// Comparable serialization; map keys are ordered so equal snapshots
    /// always serialize identically
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Rebuild a snapshot of a known family from its JSON form
    pub fn from_json(family: StructureFamily, content: Value) -> serde_json::Result<Self> {
        Ok(match family {
            StructureFamily::Sequence => StructureSnapshot::Sequence(serde_json::from_value(content)?),
            StructureFamily::Tree => StructureSnapshot::Tree(serde_json::from_value(content)?),
            StructureFamily::Graph => StructureSnapshot::Graph(serde_json::from_value(content)?),
        })
    }
}

/// Converts recognized Rhai values into snapshots
#[derive(Debug, Clone, Copy)]
pub struct Canonicalizer {
    max_depth: usize,
}

impl Canonicalizer {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn canonicalize(
        &self,
        family: StructureFamily,
        value: &Dynamic,
    ) -> SnapshotResult<StructureSnapshot> {
        match family {
            StructureFamily::Sequence => {
                let items = value
                    .read_lock::<Array>()
                    .ok_or_else(|| mismatch(family, value))?;
                let items = items
                    .iter()
                    .map(|item| self.to_json(item, 1))
                    .collect::<SnapshotResult<Vec<_>>>()?;
                Ok(StructureSnapshot::Sequence(items))
            }
            StructureFamily::Tree => {
                let node = self
                    .tree_node(value, 0)?
                    .ok_or_else(|| mismatch(family, value))?;
                Ok(StructureSnapshot::Tree(node))
            }
            StructureFamily::Graph => self.graph(value).map(StructureSnapshot::Graph),
        }
    }

    /// Deep-copy any value into JSON
    pub fn to_json(&self, value: &Dynamic, depth: usize) -> SnapshotResult<Value> {
        if depth > self.max_depth {
            return Err(SnapshotError::DepthExceeded(self.max_depth));
        }

        if value.is_unit() {
            return Ok(Value::Null);
        }
        if let Ok(b) = value.as_bool() {
            return Ok(Value::Bool(b));
        }
        if let Ok(i) = value.as_int() {
            return Ok(Value::from(i));
        }
        if let Ok(f) = value.as_float() {
            return serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or(SnapshotError::NonFinite(f));
        }
        if let Ok(c) = value.as_char() {
            return Ok(Value::String(c.to_string()));
        }
        if let Some(s) = value.read_lock::<ImmutableString>() {
            return Ok(Value::String(s.to_string()));
        }
        if let Some(items) = value.read_lock::<Array>() {
            return items
                .iter()
                .map(|item| self.to_json(item, depth + 1))
                .collect::<SnapshotResult<Vec<_>>>()
                .map(Value::Array);
        }
        if let Some(map) = value.read_lock::<Map>() {
            let mut object = serde_json::Map::new();
            for (key, item) in map.iter() {
                object.insert(key.to_string(), self.to_json(item, depth + 1)?);
            }
            return Ok(Value::Object(object));
        }
        if let Some(blob) = value.read_lock::<Blob>() {
            return Ok(Value::Array(blob.iter().map(|&b| Value::from(b)).collect()));
        }
        if let Some(fn_ptr) = value.read_lock::<FnPtr>() {
            return Ok(Value::String(format!("Fn({})", fn_ptr.fn_name())));
        }

        Err(SnapshotError::Unrepresentable(value.type_name().to_string()))
    }

    /// Render a scalar as a node id or label
    fn label(&self, value: &Dynamic) -> SnapshotResult<String> {
        if let Some(s) = value.read_lock::<ImmutableString>() {
            return Ok(s.to_string());
        }
        match self.to_json(value, 0)? {
            Value::Null => Ok("()".to_string()),
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    fn tree_node(&self, value: &Dynamic, depth: usize) -> SnapshotResult<Option<TreeSnapshot>> {
        if depth > self.max_depth {
            return Err(SnapshotError::DepthExceeded(self.max_depth));
        }
        if value.is_unit() {
            return Ok(None);
        }

        let Some(map) = value.read_lock::<Map>() else {
            // Non-record children still show up as leaves carrying their value
            return Ok(Some(TreeSnapshot::leaf(self.to_json(value, depth + 1)?)));
        };

        let payload = PAYLOAD_FIELDS
            .iter()
            .find_map(|field| map.get(*field))
            .map(|v| self.to_json(v, depth + 1))
            .transpose()?
            .unwrap_or(Value::Null);

        let left = match map.get("left") {
            Some(child) => self.tree_node(child, depth + 1)?.map(Box::new),
            None => None,
        };
        let right = match map.get("right") {
            Some(child) => self.tree_node(child, depth + 1)?.map(Box::new),
            None => None,
        };

        let mut children = Vec::new();
        if let Some(list) = map.get("children").and_then(|c| c.read_lock::<Array>()) {
            for child in list.iter() {
                if let Some(node) = self.tree_node(child, depth + 1)? {
                    children.push(node);
                }
            }
        }

        let children = if !children.is_empty() || (left.is_none() && right.is_none()) {
            Some(children)
        } else {
            None
        };

        Ok(Some(TreeSnapshot {
            value: payload,
            left,
            right,
            children,
        }))
    }

    fn graph(&self, value: &Dynamic) -> SnapshotResult<GraphSnapshot> {
        let map = value
            .read_lock::<Map>()
            .ok_or_else(|| mismatch(StructureFamily::Graph, value))?;

        let mut graph = GraphSnapshot::default();
        for (node, neighbors) in map.iter() {
            let list = if let Some(items) = neighbors.read_lock::<Array>() {
                items
                    .iter()
                    .map(|item| self.label(item))
                    .collect::<SnapshotResult<Vec<_>>>()?
            } else if neighbors.is_unit() {
                Vec::new()
            } else if is_scalar(neighbors) {
                vec![self.label(neighbors)?]
            } else {
                return Err(mismatch(StructureFamily::Graph, neighbors));
            };
            graph.adjacency.insert(node.to_string(), list);
        }
        graph.add_implicit_nodes();
        Ok(graph)
    }
}

fn mismatch(expected: StructureFamily, value: &Dynamic) -> SnapshotError {
    SnapshotError::ShapeMismatch {
        expected,
        found: value.type_name().to_string(),
    }
}
