//! Deterministic visualization decisions
//!
//! One decision per family, computed from the filtered events only. The
//! advisory step may annotate a decision but never changes it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::config::ClassifierSettings;
use crate::session::types::{FamilyEvents, TraceEvent};
use crate::tracer::snapshot::GraphSnapshot;
use crate::types::StructureFamily;

use super::advisory::AdvisoryStatus;

/// Rendering chosen for a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisualizationType {
    TimelineArray,
    ElementFocused,
    ArrayComparison,
    HierarchicalTree,
    RadialTree,
    ForceDirected,
    AdjacencyMatrix,
}

impl VisualizationType {
    pub fn family(&self) -> StructureFamily {
        match self {
            VisualizationType::TimelineArray
            | VisualizationType::ElementFocused
            | VisualizationType::ArrayComparison => StructureFamily::Sequence,
            VisualizationType::HierarchicalTree | VisualizationType::RadialTree => {
                StructureFamily::Tree
            }
            VisualizationType::ForceDirected | VisualizationType::AdjacencyMatrix => {
                StructureFamily::Graph
            }
        }
    }

    /// Selection id within the family
    pub fn selection_id(&self) -> &'static str {
        match self {
            VisualizationType::TimelineArray => "1",
            VisualizationType::ElementFocused => "2",
            VisualizationType::ArrayComparison => "3",
            VisualizationType::HierarchicalTree => "1",
            VisualizationType::RadialTree => "2",
            VisualizationType::ForceDirected => "1",
            VisualizationType::AdjacencyMatrix => "2",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisualizationType::TimelineArray => "TIMELINE_ARRAY",
            VisualizationType::ElementFocused => "ELEMENT_FOCUSED",
            VisualizationType::ArrayComparison => "ARRAY_COMPARISON",
            VisualizationType::HierarchicalTree => "HIERARCHICAL_TREE",
            VisualizationType::RadialTree => "RADIAL_TREE",
            VisualizationType::ForceDirected => "FORCE_DIRECTED",
            VisualizationType::AdjacencyMatrix => "ADJACENCY_MATRIX",
        }
    }

    /// All types available to a family, in selection order
    pub fn options(family: StructureFamily) -> &'static [VisualizationType] {
        match family {
            StructureFamily::Sequence => &[
                VisualizationType::TimelineArray,
                VisualizationType::ElementFocused,
                VisualizationType::ArrayComparison,
            ],
            StructureFamily::Tree => &[
                VisualizationType::HierarchicalTree,
                VisualizationType::RadialTree,
            ],
            StructureFamily::Graph => &[
                VisualizationType::ForceDirected,
                VisualizationType::AdjacencyMatrix,
            ],
        }
    }

    /// Look a type up by its wire name
    pub fn parse(name: &str) -> Option<VisualizationType> {
        StructureFamily::ALL
            .iter()
            .flat_map(|f| Self::options(*f))
            .find(|t| t.as_str() == name)
            .copied()
    }
}

impl fmt::Display for VisualizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics of the latest graph snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub nodes: usize,
    pub edges: usize,
    pub max_out_degree: usize,
    pub density: f64,
}

impl GraphMetrics {
    pub fn of(graph: &GraphSnapshot) -> Self {
        let mut ids: BTreeSet<&str> = graph.adjacency.keys().map(String::as_str).collect();
        ids.extend(graph.adjacency.values().flatten().map(String::as_str));

        let nodes = ids.len();
        let edges = graph.edge_count();
        Self {
            nodes,
            edges,
            max_out_degree: graph.max_out_degree(),
            density: density(nodes, edges, graph.has_self_loop()),
        }
    }
}

/// `E / (N(N-1))` for more than one node; a lone node is dense only with a self loop
pub fn density(nodes: usize, edges: usize, self_loop: bool) -> f64 {
    match nodes {
        0 => 0.0,
        1 if self_loop => 1.0,
        1 => 0.0,
        n => edges as f64 / (n * (n - 1)) as f64,
    }
}

/// Observations a decision was made from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum ClassificationFacts {
    Sequence {
        distinct_sequences: usize,
        length_varies: bool,
        lengths: Vec<usize>,
    },
    Tree {
        has_branches: bool,
        has_children_lists: bool,
        node_count: usize,
        depth: usize,
    },
    Graph(GraphMetrics),
}

/// Final decision for one family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDecision {
    #[serde(rename = "selection")]
    pub selection_id: String,
    pub visualization_type: VisualizationType,
    pub rationale: String,
    #[serde(default)]
    pub advisory: AdvisoryStatus,
}

impl ClassificationDecision {
    pub fn new(visualization_type: VisualizationType, rationale: impl Into<String>) -> Self {
        Self {
            selection_id: visualization_type.selection_id().to_string(),
            visualization_type,
            rationale: rationale.into(),
            advisory: AdvisoryStatus::NotConsulted,
        }
    }
}

/// A deterministic decision together with its facts
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub family: StructureFamily,
    pub facts: ClassificationFacts,
    pub decision: ClassificationDecision,
    /// Canonical JSON of the snapshot the decision looked at
    pub latest_snapshot: String,
}

/// Decisions for all three families
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Visualizations {
    #[serde(default)]
    pub sequences: Option<ClassificationDecision>,
    #[serde(default)]
    pub trees: Option<ClassificationDecision>,
    #[serde(default)]
    pub graphs: Option<ClassificationDecision>,
}

impl Visualizations {
    pub fn get(&self, family: StructureFamily) -> Option<&ClassificationDecision> {
        match family {
            StructureFamily::Sequence => self.sequences.as_ref(),
            StructureFamily::Tree => self.trees.as_ref(),
            StructureFamily::Graph => self.graphs.as_ref(),
        }
    }

    pub fn set(&mut self, family: StructureFamily, decision: ClassificationDecision) {
        let slot = match family {
            StructureFamily::Sequence => &mut self.sequences,
            StructureFamily::Tree => &mut self.trees,
            StructureFamily::Graph => &mut self.graphs,
        };
        *slot = Some(decision);
    }
}

/// Rule-based classifier over filtered events
#[derive(Debug, Clone, Default)]
pub struct VisualizationClassifier {
    settings: ClassifierSettings,
}

impl VisualizationClassifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self { settings }
    }

    /// Classify every family that has events
    pub fn classify_all(&self, events: &FamilyEvents) -> Vec<Classification> {
        StructureFamily::ALL
            .iter()
            .filter_map(|family| self.classify(*family, events.get(*family)))
            .collect()
    }

    /// Classify one family; `None` when it has no events
    pub fn classify(&self, family: StructureFamily, events: &[TraceEvent]) -> Option<Classification> {
        let latest = events.iter().rev().find(|e| e.family == family)?;
        let classification = match family {
            StructureFamily::Sequence => self.classify_sequences(events, latest),
            StructureFamily::Tree => Self::classify_tree(latest)?,
            StructureFamily::Graph => self.classify_graph(latest)?,
        };
        tracing::debug!(
            "{} decision: {} ({})",
            family,
            classification.decision.visualization_type,
            classification.decision.rationale
        );
        Some(classification)
    }

    fn classify_sequences(&self, events: &[TraceEvent], latest: &TraceEvent) -> Classification {
        let sequences: Vec<&TraceEvent> = events
            .iter()
            .filter(|e| e.snapshot.as_sequence().is_some())
            .filter(|e| !self.settings.reserved_sequence_names.matches(&e.variable_name))
            .collect();
        let names: BTreeSet<&str> = sequences.iter().map(|e| e.variable_name.as_str()).collect();

        let lengths: Vec<usize> = sequences
            .iter()
            .filter_map(|e| e.snapshot.as_sequence().map(<[_]>::len))
            .collect();
        let length_varies = lengths.windows(2).any(|w| w[0] != w[1]);

        let (visualization_type, rationale) = if names.len() > 1 {
            (
                VisualizationType::ArrayComparison,
                format!(
                    "{} distinct sequences ({}) are compared side by side",
                    names.len(),
                    names.iter().copied().collect::<Vec<_>>().join(", ")
                ),
            )
        } else if length_varies {
            (
                VisualizationType::TimelineArray,
                format!(
                    "A single sequence whose length changes over time ({} to {} elements)",
                    lengths.iter().min().copied().unwrap_or(0),
                    lengths.iter().max().copied().unwrap_or(0)
                ),
            )
        } else {
            (
                VisualizationType::ElementFocused,
                format!(
                    "A single sequence with a constant length of {} elements; element changes are the focus",
                    lengths.first().copied().unwrap_or(0)
                ),
            )
        };

        Classification {
            family: StructureFamily::Sequence,
            facts: ClassificationFacts::Sequence {
                distinct_sequences: names.len(),
                length_varies,
                lengths,
            },
            decision: ClassificationDecision::new(visualization_type, rationale),
            latest_snapshot: latest.snapshot.canonical_json(),
        }
    }

    fn classify_tree(latest: &TraceEvent) -> Option<Classification> {
        let tree = latest.snapshot.as_tree()?;
        let has_branches = tree.has_branches();
        let has_children_lists = tree.has_children_lists();

        let (visualization_type, rationale) = if has_branches {
            (
                VisualizationType::HierarchicalTree,
                "Binary branch fields (left/right) found; shown as a hierarchical binary tree",
            )
        } else if has_children_lists {
            (
                VisualizationType::RadialTree,
                "Nodes carry children lists; shown as a radial n-ary tree",
            )
        } else {
            (
                VisualizationType::HierarchicalTree,
                "A single node with no branches and an empty children list, which a binary leaf \
                 also has; shown as a hierarchical tree",
            )
        };

        Some(Classification {
            family: StructureFamily::Tree,
            facts: ClassificationFacts::Tree {
                has_branches,
                has_children_lists,
                node_count: tree.node_count(),
                depth: tree.depth(),
            },
            decision: ClassificationDecision::new(
                visualization_type,
                format!(
                    "{} ({} nodes, depth {})",
                    rationale,
                    tree.node_count(),
                    tree.depth()
                ),
            ),
            latest_snapshot: latest.snapshot.canonical_json(),
        })
    }

    fn classify_graph(&self, latest: &TraceEvent) -> Option<Classification> {
        let metrics = GraphMetrics::of(latest.snapshot.as_graph()?);
        let dense = metrics.density > self.settings.density_threshold
            || metrics.max_out_degree > self.settings.max_out_degree;

        let visualization_type = if dense {
            VisualizationType::AdjacencyMatrix
        } else {
            VisualizationType::ForceDirected
        };
        let rationale = format!(
            "{} nodes, {} edges, density {:.3}, max out-degree {}; {}",
            metrics.nodes,
            metrics.edges,
            metrics.density,
            metrics.max_out_degree,
            if dense {
                "dense enough for an adjacency matrix"
            } else {
                "sparse enough for a force-directed layout"
            }
        );

        Some(Classification {
            family: StructureFamily::Graph,
            facts: ClassificationFacts::Graph(metrics),
            decision: ClassificationDecision::new(visualization_type, rationale),
            latest_snapshot: latest.snapshot.canonical_json(),
        })
    }
}
