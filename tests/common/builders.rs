//! Test data builders for trace events and snapshots

use serde_json::{json, Value};
use std::collections::BTreeMap;
use vistrace::tracer::snapshot::{GraphSnapshot, StructureSnapshot, TreeSnapshot};
use vistrace::{OperationTag, TraceEvent};

/// Builder for [`TraceEvent`]s with sensible defaults
pub struct EventBuilder {
    name: String,
    operation: OperationTag,
    snapshot: StructureSnapshot,
    timestamp: f64,
    line: usize,
    code: String,
}

impl EventBuilder {
    pub fn sequence(name: &str, items: &[i64]) -> Self {
        let items = items.iter().map(|i| json!(i)).collect();
        Self::with_snapshot(name, StructureSnapshot::Sequence(items))
    }

    pub fn tree(name: &str, tree: TreeSnapshot) -> Self {
        Self::with_snapshot(name, StructureSnapshot::Tree(tree))
    }

    pub fn graph(name: &str, edges: &[(&str, &[&str])]) -> Self {
        let adjacency: BTreeMap<String, Vec<String>> = edges
            .iter()
            .map(|(node, targets)| {
                (
                    node.to_string(),
                    targets.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect();
        Self::with_snapshot(name, StructureSnapshot::Graph(GraphSnapshot::new(adjacency)))
    }

    fn with_snapshot(name: &str, snapshot: StructureSnapshot) -> Self {
        Self {
            name: name.to_string(),
            operation: OperationTag::Create,
            snapshot,
            timestamp: 1.0,
            line: 1,
            code: String::new(),
        }
    }

    pub fn operation(mut self, operation: OperationTag) -> Self {
        self.operation = operation;
        self
    }

    pub fn at(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn line(mut self, line: usize, code: &str) -> Self {
        self.line = line;
        self.code = code.to_string();
        self
    }

    pub fn build(self) -> TraceEvent {
        TraceEvent::new(
            self.name,
            self.operation,
            self.snapshot,
            self.timestamp,
            self.line,
            self.code,
        )
    }
}

/// Binary node with optional children
pub fn binary(value: i64, left: Option<TreeSnapshot>, right: Option<TreeSnapshot>) -> TreeSnapshot {
    TreeSnapshot {
        value: json!(value),
        left: left.map(Box::new),
        right: right.map(Box::new),
        children: None,
    }
}

/// N-ary node with a children list
pub fn nary(value: &str, children: Vec<TreeSnapshot>) -> TreeSnapshot {
    TreeSnapshot {
        value: Value::String(value.to_string()),
        left: None,
        right: None,
        children: Some(children),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vistrace::StructureFamily;

    #[test]
    fn test_event_builder() {
        let event = EventBuilder::sequence("arr", &[1, 2])
            .operation(OperationTag::Append)
            .at(2.5)
            .line(3, "arr.push(2);")
            .build();

        assert_eq!(event.variable_name, "arr");
        assert_eq!(event.family, StructureFamily::Sequence);
        assert_eq!(event.source_location.line, 3);
        assert_eq!(event.source_line_text(), "arr.push(2);");
    }
}
