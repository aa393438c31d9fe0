//! Core data types for vistrace
//!
//! This module contains the small vocabulary shared by every stage of the
//! pipeline: which family a structure belongs to, which operation a source
//! line performed on it, and where in the script that happened.
//!
//! # Main Types
//!
//! - [`StructureFamily`] - sequence, tree or graph
//! - [`OperationTag`] - the semantic operation inferred for a trace event
//! - [`SourceLocation`] - a 1-based script line, serialized as `"line N"`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The three structure families the tracer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureFamily {
    /// Ordered, index-addressable collection (Rhai `Array`)
    Sequence,
    /// Record with a payload plus branch or children links
    Tree,
    /// Mapping of node ids to neighbor id lists
    Graph,
}

impl StructureFamily {
    /// All families in output order
    pub const ALL: [StructureFamily; 3] = [
        StructureFamily::Sequence,
        StructureFamily::Tree,
        StructureFamily::Graph,
    ];

    /// Key used for this family in the output document
    pub fn plural(&self) -> &'static str {
        match self {
            StructureFamily::Sequence => "sequences",
            StructureFamily::Tree => "trees",
            StructureFamily::Graph => "graphs",
        }
    }
}

impl fmt::Display for StructureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StructureFamily::Sequence => "sequence",
            StructureFamily::Tree => "tree",
            StructureFamily::Graph => "graph",
        };
        f.write_str(name)
    }
}

/// Semantic operation attached to a trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationTag {
    Create,
    ListComprehension,
    Append,
    Extend,
    Insert,
    Remove,
    Pop,
    Sort,
    Reverse,
    IndexedAssignment,
    CreateGraph,
    AddEdge,
    UpdateNodeEdges,
    AssignNode,
    SetLeftChild,
    SetRightChild,
    AddChildToList,
    UpdateChildInList,
    UpdateNodeValue,
    /// Fallback when no pattern matched
    Update,
    /// Recorded by the end-of-run pass over global bindings
    FinalState,
    Call,
    Return,
}

impl OperationTag {
    /// Tags that force the recorder to keep an event even when the
    /// snapshot did not change
    pub fn is_significant(&self) -> bool {
        !matches!(self, OperationTag::Update | OperationTag::IndexedAssignment)
    }

    /// Tags that add something to a structure (`add_*`)
    pub fn is_additive(&self) -> bool {
        matches!(self, OperationTag::AddEdge | OperationTag::AddChildToList)
    }

    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationTag::Create => "create",
            OperationTag::ListComprehension => "list_comprehension",
            OperationTag::Append => "append",
            OperationTag::Extend => "extend",
            OperationTag::Insert => "insert",
            OperationTag::Remove => "remove",
            OperationTag::Pop => "pop",
            OperationTag::Sort => "sort",
            OperationTag::Reverse => "reverse",
            OperationTag::IndexedAssignment => "indexed_assignment",
            OperationTag::CreateGraph => "create_graph",
            OperationTag::AddEdge => "add_edge",
            OperationTag::UpdateNodeEdges => "update_node_edges",
            OperationTag::AssignNode => "assign_node",
            OperationTag::SetLeftChild => "set_left_child",
            OperationTag::SetRightChild => "set_right_child",
            OperationTag::AddChildToList => "add_child_to_list",
            OperationTag::UpdateChildInList => "update_child_in_list",
            OperationTag::UpdateNodeValue => "update_node_value",
            OperationTag::Update => "update",
            OperationTag::FinalState => "final_state",
            OperationTag::Call => "call",
            OperationTag::Return => "return",
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 1-based line in the traced script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceLocation {
    pub line: usize,
}

impl SourceLocation {
    pub fn new(line: usize) -> Self {
        Self { line }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.line)
    }
}

impl Serialize for SourceLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.trim()
            .strip_prefix("line")
            .map(str::trim)
            .and_then(|n| n.parse().ok())
            .map(SourceLocation::new)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid location {text:?}")))
    }
}
