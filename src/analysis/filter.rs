//! Change filter
//!
//! Reduces a family's raw event list to the events worth rendering.
//!
//! 1. Importance: a name survives if any of its events carries one of the
//!    family's always-keep operations, or if it is not denylisted. Trees
//!    also keep the root and traversal names, graphs the container name.
//! 2. Redundancy, per family:
//!    - trees compare against the last kept tree snapshot of the whole family
//!    - sequences compare against the last kept state of the same variable
//!    - graphs drop repeated fingerprints
//!
//! Survivors are stable-sorted by timestamp. Filtering filtered output
//! returns it unchanged.

use fxhash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::Hasher;

use crate::config::FilterSettings;
use crate::session::types::{FamilyEvents, TraceEvent};
use crate::tracer::snapshot::TreeSnapshot;
use crate::types::{OperationTag, StructureFamily};

/// Operations whose events are never dropped for redundancy
pub fn always_keeps(family: StructureFamily, operation: OperationTag) -> bool {
    use OperationTag::*;
    match family {
        StructureFamily::Sequence => matches!(
            operation,
            Create | ListComprehension | FinalState | Append | Insert | Pop | Remove | Extend | Sort | Reverse
        ),
        StructureFamily::Tree => {
            matches!(operation, Create | FinalState | AssignNode | SetLeftChild | SetRightChild)
                || operation.is_additive()
        }
        StructureFamily::Graph => {
            matches!(operation, CreateGraph | FinalState | AddEdge | UpdateNodeEdges)
                || operation.is_additive()
        }
    }
}

/// 64-bit fingerprint of a snapshot's canonical serialization
pub fn fingerprint(event: &TraceEvent) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(event.snapshot.canonical_json().as_bytes());
    hasher.finish()
}

#[derive(Debug, Clone)]
struct SequenceState {
    length: usize,
    operation: OperationTag,
    content: String,
}

/// Redundancy state for one filtering pass; never shared between runs
#[derive(Debug, Default)]
pub struct FilterState {
    last_tree: Option<TreeSnapshot>,
    sequences: FxHashMap<String, SequenceState>,
    fingerprints: FxHashSet<u64>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    fn keep_tree(&mut self, event: &TraceEvent) -> bool {
        let Some(tree) = event.snapshot.as_tree() else {
            return false;
        };
        let changed = self
            .last_tree
            .as_ref()
            .map_or(true, |last| !last.is_identical(tree));
        let keep = changed || always_keeps(StructureFamily::Tree, event.operation);
        if keep {
            self.last_tree = Some(tree.clone());
        }
        keep
    }

    fn keep_sequence(&mut self, event: &TraceEvent) -> bool {
        let Some(items) = event.snapshot.as_sequence() else {
            return false;
        };
        let current = SequenceState {
            length: items.len(),
            operation: event.operation,
            content: event.snapshot.canonical_json(),
        };

        let keep = always_keeps(StructureFamily::Sequence, event.operation)
            || match self.sequences.get(&event.variable_name) {
                None => true,
                Some(last) => {
                    last.length != current.length
                        || last.operation != current.operation
                        || last.content != current.content
                }
            };
        if keep {
            self.sequences.insert(event.variable_name.clone(), current);
        }
        keep
    }

    fn keep_graph(&mut self, event: &TraceEvent) -> bool {
        if event.snapshot.as_graph().is_none() {
            return false;
        }
        let first_sighting = self.fingerprints.insert(fingerprint(event));
        first_sighting || always_keeps(StructureFamily::Graph, event.operation)
    }
}

/// Two-pass change filter over recorded events
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    settings: FilterSettings,
}

impl ChangeFilter {
    pub fn new(settings: FilterSettings) -> Self {
        Self { settings }
    }

    /// Filter every family with fresh state
    pub fn filter(&self, events: &FamilyEvents) -> FamilyEvents {
        let mut filtered = FamilyEvents::default();
        for family in StructureFamily::ALL {
            *filtered.get_mut(family) = self.filter_family(family, events.get(family));
        }
        filtered
    }

    /// Filter one family's events
    pub fn filter_family(&self, family: StructureFamily, events: &[TraceEvent]) -> Vec<TraceEvent> {
        let important: FxHashSet<&str> = events
            .iter()
            .filter(|e| always_keeps(family, e.operation))
            .map(|e| e.variable_name.as_str())
            .collect();

        let mut state = FilterState::new();
        let mut kept: Vec<TraceEvent> = events
            .iter()
            .filter(|e| e.family == family)
            .filter(|e| important.contains(e.variable_name.as_str()) || self.is_allowed(family, &e.variable_name))
            .filter(|e| match family {
                StructureFamily::Tree => state.keep_tree(e),
                StructureFamily::Sequence => state.keep_sequence(e),
                StructureFamily::Graph => state.keep_graph(e),
            })
            .cloned()
            .collect();

        kept.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        tracing::debug!(
            "Filtered {} {} events down to {}",
            events.len(),
            family,
            kept.len()
        );
        kept
    }

    /// Name-level importance independent of the operations seen
    fn is_allowed(&self, family: StructureFamily, name: &str) -> bool {
        match family {
            StructureFamily::Tree
                if name == self.settings.tree_root_name
                    || self.settings.tree_local_names.iter().any(|n| n == name) =>
            {
                true
            }
            StructureFamily::Graph if name == self.settings.graph_container_name => true,
            _ => !self.settings.denylist.matches(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::snapshot::{GraphSnapshot, StructureSnapshot};
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn seq_event(name: &str, op: OperationTag, items: &[i64], t: f64) -> TraceEvent {
        let items = items.iter().map(|i| json!(i)).collect();
        TraceEvent::new(name, op, StructureSnapshot::Sequence(items), t, 1, "")
    }

    fn tree_event(name: &str, op: OperationTag, tree: TreeSnapshot, t: f64) -> TraceEvent {
        TraceEvent::new(name, op, StructureSnapshot::Tree(tree), t, 1, "")
    }

    fn graph_event(name: &str, op: OperationTag, edges: &[(&str, &[&str])], t: f64) -> TraceEvent {
        let adjacency: BTreeMap<String, Vec<String>> = edges
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        TraceEvent::new(
            name,
            op,
            StructureSnapshot::Graph(GraphSnapshot::new(adjacency)),
            t,
            1,
            "",
        )
    }

    fn names_and_ops(events: &[TraceEvent]) -> Vec<(String, OperationTag)> {
        events
            .iter()
            .map(|e| (e.variable_name.clone(), e.operation))
            .collect()
    }

    #[test]
    fn test_sequence_create_and_append_survive() {
        let events = vec![
            seq_event("arr", OperationTag::Create, &[5, 10, 15], 1.0),
            seq_event("arr", OperationTag::Append, &[5, 10, 15, 20], 2.0),
            seq_event("arr", OperationTag::FinalState, &[5, 10, 15, 20], 3.0),
        ];
        let kept = ChangeFilter::default().filter_family(StructureFamily::Sequence, &events);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_sequence_repeated_update_dropped() {
        let events = vec![
            seq_event("arr", OperationTag::Update, &[1], 1.0),
            seq_event("arr", OperationTag::Update, &[1], 2.0),
            seq_event("arr", OperationTag::Update, &[2], 3.0),
        ];
        let kept = ChangeFilter::default().filter_family(StructureFamily::Sequence, &events);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].timestamp, 3.0);
    }

    #[test]
    fn test_denylisted_name_dropped_unless_mutated() {
        let events = vec![
            seq_event("result", OperationTag::Update, &[1], 1.0),
            seq_event("obj_cache", OperationTag::Update, &[1], 2.0),
            seq_event("node", OperationTag::Append, &[1, 2], 3.0),
            seq_event("values", OperationTag::Update, &[1], 4.0),
        ];
        let kept = ChangeFilter::default().filter_family(StructureFamily::Sequence, &events);
        assert_eq!(
            names_and_ops(&kept),
            vec![
                ("node".to_string(), OperationTag::Append),
                ("values".to_string(), OperationTag::Update),
            ]
        );
    }

    #[test]
    fn test_tree_identical_snapshots_collapse_family_wide() {
        let mut root = TreeSnapshot::leaf(10);
        let leaf = root.clone();
        root.left = Some(Box::new(TreeSnapshot::leaf(5)));
        root.children = None;

        let events = vec![
            tree_event("root", OperationTag::AssignNode, leaf.clone(), 1.0),
            tree_event("root", OperationTag::Update, leaf.clone(), 2.0),
            tree_event("node", OperationTag::Update, leaf, 3.0),
            tree_event("root", OperationTag::SetLeftChild, root.clone(), 4.0),
            tree_event("root", OperationTag::UpdateNodeValue, root, 5.0),
        ];
        let kept = ChangeFilter::default().filter_family(StructureFamily::Tree, &events);
        assert_eq!(
            kept.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![1.0, 4.0]
        );
    }

    #[test]
    fn test_tree_root_kept_even_if_denylisted() {
        let settings = FilterSettings {
            denylist: crate::config::NamePolicy {
                exact: vec!["root".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let events = vec![tree_event("root", OperationTag::Update, TreeSnapshot::leaf(1), 1.0)];
        let kept = ChangeFilter::new(settings).filter_family(StructureFamily::Tree, &events);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_graph_duplicate_fingerprint_dropped() {
        let events = vec![
            graph_event("graph", OperationTag::CreateGraph, &[("A", &["B"]), ("B", &[])], 1.0),
            graph_event("graph", OperationTag::Update, &[("A", &["B"]), ("B", &[])], 2.0),
            graph_event("graph", OperationTag::AddEdge, &[("A", &["B"]), ("B", &[])], 3.0),
            graph_event("graph", OperationTag::Update, &[("A", &["B", "C"]), ("B", &[]), ("C", &[])], 4.0),
        ];
        let kept = ChangeFilter::default().filter_family(StructureFamily::Graph, &events);
        assert_eq!(
            kept.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![1.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_output_sorted_by_timestamp() {
        let events = vec![
            seq_event("b", OperationTag::Create, &[1], 2.0),
            seq_event("a", OperationTag::Create, &[1], 1.0),
        ];
        let kept = ChangeFilter::default().filter_family(StructureFamily::Sequence, &events);
        assert_eq!(kept[0].variable_name, "a");
    }

    #[test]
    fn test_filter_all_families() {
        let mut events = FamilyEvents::default();
        events.push(seq_event("arr", OperationTag::Create, &[1], 1.0));
        events.push(tree_event("root", OperationTag::AssignNode, TreeSnapshot::leaf(1), 2.0));
        let filtered = ChangeFilter::default().filter(&events);
        assert_eq!(filtered.counts().sequences, 1);
        assert_eq!(filtered.counts().trees, 1);
        assert_eq!(filtered.counts().graphs, 0);
    }

    fn arb_op() -> impl Strategy<Value = OperationTag> {
        prop::sample::select(vec![
            OperationTag::Create,
            OperationTag::Append,
            OperationTag::Update,
            OperationTag::IndexedAssignment,
            OperationTag::FinalState,
            OperationTag::AddEdge,
            OperationTag::AssignNode,
        ])
    }

    fn arb_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["arr", "node", "result", "root", "graph", "items"])
            .prop_map(str::to_string)
    }

    fn arb_events() -> impl Strategy<Value = Vec<TraceEvent>> {
        prop::collection::vec((arb_name(), arb_op(), prop::collection::vec(0i64..3, 0..3)), 0..24)
            .prop_map(|raw| {
                raw.into_iter()
                    .enumerate()
                    .flat_map(|(i, (name, op, items))| {
                        let t = i as f64;
                        let tree = TreeSnapshot::leaf(items.len() as i64);
                        let ids: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                        let mut adjacency = BTreeMap::new();
                        adjacency.insert("A".to_string(), ids);
                        vec![
                            seq_event(&name, op, &items, t),
                            tree_event(&name, op, tree, t),
                            TraceEvent::new(
                                name.clone(),
                                op,
                                StructureSnapshot::Graph(GraphSnapshot::new(adjacency)),
                                t,
                                1,
                                "",
                            ),
                        ]
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn prop_filter_is_idempotent(events in arb_events()) {
            let filter = ChangeFilter::default();
            for family in StructureFamily::ALL {
                let raw: Vec<TraceEvent> = events.iter().filter(|e| e.family == family).cloned().collect();
                let once = filter.filter_family(family, &raw);
                let twice = filter.filter_family(family, &once);
                prop_assert_eq!(&once, &twice);
            }
        }

        #[test]
        fn prop_filter_never_adds_events(events in arb_events()) {
            let filter = ChangeFilter::default();
            for family in StructureFamily::ALL {
                let raw: Vec<TraceEvent> = events.iter().filter(|e| e.family == family).cloned().collect();
                prop_assert!(filter.filter_family(family, &raw).len() <= raw.len());
            }
        }
    }
}
