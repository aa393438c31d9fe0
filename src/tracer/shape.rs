//! Structural recognition of runtime values
//!
//! [`ShapeProbe`] answers "what shape is this value?" with a tagged
//! [`Shape`] instead of scattered field checks. The [`Recognizer`] layers
//! the variable-name exclusions on top of the probe.

use rhai::{Array, Dynamic, ImmutableString, Map, FLOAT, INT};

use crate::config::{NamePolicy, TracerSettings};
use crate::types::StructureFamily;

/// Conventional payload field names of a tree node, in probe order
pub const PAYLOAD_FIELDS: [&str; 3] = ["value", "val", "data"];

/// Result of probing a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Sequence,
    TreeNode,
    GraphAdjacency,
    Unrecognized,
}

impl Shape {
    pub fn family(&self) -> Option<StructureFamily> {
        match self {
            Shape::Sequence => Some(StructureFamily::Sequence),
            Shape::TreeNode => Some(StructureFamily::Tree),
            Shape::GraphAdjacency => Some(StructureFamily::Graph),
            Shape::Unrecognized => None,
        }
    }
}

/// Capability query over a runtime value
pub trait ShapeProbe {
    fn probe_shape(&self) -> Shape;
}

impl ShapeProbe for Dynamic {
    fn probe_shape(&self) -> Shape {
        if self.is::<Array>() {
            return Shape::Sequence;
        }
        let Some(map) = self.read_lock::<Map>() else {
            return Shape::Unrecognized;
        };
        if is_tree_node(&map) {
            Shape::TreeNode
        } else if is_graph(&map) {
            Shape::GraphAdjacency
        } else {
            Shape::Unrecognized
        }
    }
}

/// True for values usable as a node id or payload
pub fn is_scalar(value: &Dynamic) -> bool {
    value.is_unit()
        || value.is::<bool>()
        || value.is::<INT>()
        || value.is::<FLOAT>()
        || value.is::<char>()
        || value.is::<ImmutableString>()
}

fn is_tree_node(map: &Map) -> bool {
    let has_payload = PAYLOAD_FIELDS
        .iter()
        .find_map(|field| map.get(*field))
        .is_some_and(is_scalar);
    if !has_payload {
        return false;
    }

    let has_children = map.get("children").is_some_and(|c| c.is::<Array>());
    has_children || map.contains_key("left") || map.contains_key("right")
}

fn is_graph(map: &Map) -> bool {
    if map.is_empty() {
        return false;
    }

    let mut has_list = false;
    for value in map.values() {
        if let Some(items) = value.read_lock::<Array>() {
            if !items.iter().all(is_scalar) {
                return false;
            }
            has_list = true;
        } else if !is_scalar(value) {
            return false;
        }
    }
    has_list
}

/// Decides which bindings are traced and as which family
#[derive(Debug, Clone, Default)]
pub struct Recognizer {
    ignored: NamePolicy,
}

impl Recognizer {
    pub fn new(settings: &TracerSettings) -> Self {
        Self {
            ignored: settings.ignored_variables.clone(),
        }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.matches(name)
    }

    /// Family of the value bound to `name`, or `None` if it is not traced
    pub fn recognize(&self, name: &str, value: &Dynamic) -> Option<StructureFamily> {
        if self.is_ignored(name) {
            return None;
        }
        value.probe_shape().family()
    }
}
