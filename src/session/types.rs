//! Trace log data types

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, VisTraceError};
use crate::tracer::snapshot::StructureSnapshot;
use crate::types::{OperationTag, SourceLocation, StructureFamily};

/// Source text attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationDetails {
    pub code: String,
}

/// One observed state of one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTraceEvent")]
pub struct TraceEvent {
    #[serde(rename = "name")]
    pub variable_name: String,
    pub family: StructureFamily,
    pub operation: OperationTag,
    #[serde(rename = "content")]
    pub snapshot: StructureSnapshot,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(rename = "location")]
    pub source_location: SourceLocation,
    #[serde(rename = "operation_details")]
    pub details: OperationDetails,
}

impl TraceEvent {
    pub fn new(
        variable_name: impl Into<String>,
        operation: OperationTag,
        snapshot: StructureSnapshot,
        timestamp: f64,
        line: usize,
        line_text: impl Into<String>,
    ) -> Self {
        Self {
            variable_name: variable_name.into(),
            family: snapshot.family(),
            operation,
            snapshot,
            timestamp,
            source_location: SourceLocation::new(line),
            details: OperationDetails {
                code: line_text.into(),
            },
        }
    }

    pub fn source_line_text(&self) -> &str {
        &self.details.code
    }
}

/// Wire form read back from JSON; the content is decoded by family
#[derive(Deserialize)]
struct RawTraceEvent {
    name: String,
    family: StructureFamily,
    operation: OperationTag,
    content: serde_json::Value,
    timestamp: f64,
    location: SourceLocation,
    #[serde(default)]
    operation_details: OperationDetails,
}

impl TryFrom<RawTraceEvent> for TraceEvent {
    type Error = serde_json::Error;

    fn try_from(raw: RawTraceEvent) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            snapshot: StructureSnapshot::from_json(raw.family, raw.content)?,
            variable_name: raw.name,
            family: raw.family,
            operation: raw.operation,
            timestamp: raw.timestamp,
            source_location: raw.location,
            details: raw.operation_details,
        })
    }
}

/// Events grouped by structure family
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FamilyEvents {
    #[serde(default)]
    pub sequences: Vec<TraceEvent>,
    #[serde(default)]
    pub trees: Vec<TraceEvent>,
    #[serde(default)]
    pub graphs: Vec<TraceEvent>,
}

impl FamilyEvents {
    pub fn get(&self, family: StructureFamily) -> &[TraceEvent] {
        match family {
            StructureFamily::Sequence => &self.sequences,
            StructureFamily::Tree => &self.trees,
            StructureFamily::Graph => &self.graphs,
        }
    }

    pub fn get_mut(&mut self, family: StructureFamily) -> &mut Vec<TraceEvent> {
        match family {
            StructureFamily::Sequence => &mut self.sequences,
            StructureFamily::Tree => &mut self.trees,
            StructureFamily::Graph => &mut self.graphs,
        }
    }

    pub fn push(&mut self, event: TraceEvent) {
        self.get_mut(event.family).push(event);
    }

    pub fn counts(&self) -> FamilyCounts {
        FamilyCounts {
            sequences: self.sequences.len(),
            trees: self.trees.len(),
            graphs: self.graphs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }
}

/// Number of events per family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FamilyCounts {
    pub sequences: usize,
    pub trees: usize,
    pub graphs: usize,
}

impl FamilyCounts {
    pub fn total(&self) -> usize {
        self.sequences + self.trees + self.graphs
    }
}

/// The traced script
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeListing {
    pub source: String,
    pub lines: Vec<String>,
}

impl CodeListing {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let lines = source.lines().map(str::to_string).collect();
        Self { source, lines }
    }

    /// Trimmed text of a 1-based line, empty when out of range
    pub fn line_text(&self, line: usize) -> &str {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(|l| l.trim())
            .unwrap_or("")
    }
}

/// Output document handed to storage and rendering
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceLog {
    pub code: CodeListing,
    pub data_structures: FamilyEvents,
}

impl TraceLog {
    pub fn new(code: CodeListing, data_structures: FamilyEvents) -> Self {
        Self {
            code,
            data_structures,
        }
    }

    /// Save the log to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a log from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| VisTraceError::Serialization(format!("{:?}: {}", path, e)))
    }
}
