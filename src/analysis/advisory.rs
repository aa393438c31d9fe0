//! Advisory confirmation of visualization decisions
//!
//! Every deterministic decision can be shown to an external natural-language
//! classifier together with the facts it was computed from. The reply is
//! only ever compared against the decision: a confirmation is recorded, and
//! anything else annotates the rationale. The selection itself never moves.
//!
//! Replies are parsed in three stages:
//!
//! 1. the whole reply as JSON
//! 2. the outermost `{...}` with invalid escapes and line comments removed
//! 3. field-by-field pattern extraction

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::{Result, VisTraceError};
use crate::types::StructureFamily;

use super::classify::{Classification, ClassificationDecision, ClassificationFacts, VisualizationType};

static OUTER_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").ok());
static INVALID_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\\([^"\\/bfnrtu])"#).ok());
static LINE_COMMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?m)(["\d,\]}el])\s*//[^\n]*$"#).ok());

static SELECTION_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""selection"\s*:\s*["']?(\d+)"#).ok());
static TYPE_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""visualization_type"\s*:\s*["']([A-Z_]+)["']"#).ok());
static RATIONALE_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""rationale"\s*:\s*["']([^"']+)["']"#).ok());

pub const SYSTEM_PROMPT: &str =
    "You are an expert in data structure visualization. Return only valid JSON with no escape sequences.";

/// Outcome of consulting the advisory classifier for one decision
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvisoryStatus {
    #[default]
    NotConsulted,
    Confirmed,
    Disagreed {
        selection: String,
        visualization_type: String,
    },
    Unparseable,
    Unavailable {
        reason: String,
    },
}

/// A prompt for one family's decision
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryRequest {
    pub family: StructureFamily,
    pub system: String,
    pub prompt: String,
    /// Decision the reply is expected to repeat
    pub expected: VisualizationType,
}

impl AdvisoryRequest {
    pub fn new(classification: &Classification, max_excerpt_chars: usize) -> Self {
        let excerpt = excerpt(&classification.latest_snapshot, max_excerpt_chars);
        Self {
            family: classification.family,
            system: SYSTEM_PROMPT.to_string(),
            prompt: family_prompt(classification, &excerpt),
            expected: classification.decision.visualization_type,
        }
    }
}

/// Natural-language classifier consulted after the deterministic decision
#[cfg_attr(test, mockall::automock)]
pub trait AdvisoryClassifier: Send + Sync {
    fn name(&self) -> String;

    /// Send the request and return the raw reply text
    fn consult(&self, request: &AdvisoryRequest) -> Result<String>;
}

/// Fields extracted from an advisory reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryReply {
    pub selection: String,
    pub visualization_type: String,
    pub rationale: String,
}

impl AdvisoryReply {
    fn from_value(value: &Value) -> Option<Self> {
        let selection = match value.get("selection")? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let visualization_type = value.get("visualization_type")?.as_str()?.trim().to_string();
        let rationale = value
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            selection,
            visualization_type,
            rationale,
        })
    }
}

/// Parse a reply with the three-stage fallback
pub fn parse_reply(raw: &str) -> Result<AdvisoryReply> {
    let raw = raw.trim();

    if let Some(reply) = serde_json::from_str::<Value>(raw)
        .ok()
        .as_ref()
        .and_then(AdvisoryReply::from_value)
    {
        return Ok(reply);
    }

    if let Some(repaired) = repair_json(raw) {
        if let Some(reply) = serde_json::from_str::<Value>(&repaired)
            .ok()
            .as_ref()
            .and_then(AdvisoryReply::from_value)
        {
            tracing::debug!("Advisory reply parsed after repair");
            return Ok(reply);
        }
    }

    extract_fields(raw).ok_or_else(|| {
        VisTraceError::AdvisoryParse(format!(
            "no selection/visualization_type in reply: {}",
            excerpt(raw, 200)
        ))
    })
}

fn repair_json(raw: &str) -> Option<String> {
    let object = OUTER_OBJECT.as_ref()?.find(raw)?.as_str();
    let unescaped = object.replace("\\_", "_");
    let unescaped = INVALID_ESCAPE.as_ref()?.replace_all(&unescaped, "$1");
    Some(LINE_COMMENT.as_ref()?.replace_all(&unescaped, "$1").into_owned())
}

fn extract_fields(raw: &str) -> Option<AdvisoryReply> {
    Some(AdvisoryReply {
        selection: SELECTION_FIELD.as_ref()?.captures(raw)?[1].to_string(),
        visualization_type: TYPE_FIELD.as_ref()?.captures(raw)?[1].to_string(),
        rationale: RATIONALE_FIELD
            .as_ref()?
            .captures(raw)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default(),
    })
}

/// Fold an advisory outcome into a decision without changing its selection
pub fn reconcile(
    mut decision: ClassificationDecision,
    reply: Result<String>,
) -> ClassificationDecision {
    let status = match reply {
        Err(e) => {
            tracing::warn!("Advisory classifier unavailable: {}", e);
            AdvisoryStatus::Unavailable {
                reason: e.to_string(),
            }
        }
        Ok(raw) => match parse_reply(&raw) {
            Err(e) => {
                tracing::warn!("Advisory reply ignored: {}", e);
                AdvisoryStatus::Unparseable
            }
            Ok(reply)
                if reply.selection == decision.selection_id
                    && reply.visualization_type == decision.visualization_type.as_str() =>
            {
                AdvisoryStatus::Confirmed
            }
            Ok(reply) => {
                tracing::info!(
                    "Advisory suggested {} ({}), keeping {}",
                    reply.visualization_type,
                    reply.selection,
                    decision.visualization_type
                );
                AdvisoryStatus::Disagreed {
                    selection: reply.selection,
                    visualization_type: reply.visualization_type,
                }
            }
        },
    };

    match &status {
        AdvisoryStatus::NotConsulted | AdvisoryStatus::Confirmed => {}
        AdvisoryStatus::Disagreed {
            selection,
            visualization_type,
        } => {
            decision.rationale = format!(
                "{} [advisory suggested {} (selection {}); computed decision kept]",
                decision.rationale, visualization_type, selection
            );
        }
        AdvisoryStatus::Unparseable => {
            decision.rationale = format!(
                "{} [advisory reply could not be parsed; computed decision kept]",
                decision.rationale
            );
        }
        AdvisoryStatus::Unavailable { reason } => {
            decision.rationale = format!("{} [advisory unavailable: {}]", decision.rationale, reason);
        }
    }
    decision.advisory = status;
    decision
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn decision_template(decision: &ClassificationDecision) -> String {
    format!(
        "{{\n  \"selection\": \"{}\",\n  \"visualization_type\": \"{}\",\n  \"rationale\": \"{}\"\n}}\n",
        decision.selection_id,
        decision.visualization_type,
        decision.rationale.replace('"', "'")
    )
}

fn family_prompt(classification: &Classification, excerpt: &str) -> String {
    let decision = &classification.decision;
    let rules = match &classification.facts {
        ClassificationFacts::Sequence {
            distinct_sequences,
            length_varies,
            ..
        } => format!(
            "EXACT NUMBER OF ARRAYS: {n}\n\
             LENGTHS CHANGE: {changes}\n\n\
             MANDATORY DECISION LOGIC:\n\
             IF NUMBER OF ARRAYS > 1: RETURN ARRAY_COMPARISON (selection \"3\")\n\
             IF NUMBER OF ARRAYS = 1 AND LENGTHS CHANGE = Yes: RETURN TIMELINE_ARRAY (selection \"1\")\n\
             IF NUMBER OF ARRAYS = 1 AND LENGTHS CHANGE = No: RETURN ELEMENT_FOCUSED (selection \"2\")\n\n\
             Latest array content:\n{excerpt}\n\n",
            n = distinct_sequences,
            changes = yes_no(*length_varies),
            excerpt = excerpt,
        ),
        ClassificationFacts::Tree {
            has_branches,
            has_children_lists,
            ..
        } => format!(
            "Tree Data:\n{excerpt}\n\n\
             LEFT/RIGHT PROPERTIES FOUND: {branches}\n\
             CHILDREN ARRAYS FOUND: {children}\n\n\
             MANDATORY SELECTION RULES:\n\
             1. IF ANY node has 'left' or 'right' properties: HIERARCHICAL_TREE (selection \"1\")\n\
             2. IF ANY node has a 'children' array: RADIAL_TREE (selection \"2\")\n\
             3. Left/right properties take priority over children arrays\n\
             DO NOT consider the number of nodes, tree depth, or node values.\n\n",
            excerpt = excerpt,
            branches = yes_no(*has_branches),
            children = yes_no(*has_children_lists),
        ),
        ClassificationFacts::Graph(metrics) => format!(
            "Graph Data:\n{excerpt}\n\n\
             NODES: {nodes}\n\
             TOTAL DIRECTED CONNECTIONS: {edges}\n\
             CONNECTION DENSITY: {density:.3}\n\
             MAXIMUM OUTGOING CONNECTIONS: {degree}\n\n\
             MANDATORY SELECTION RULES:\n\
             1. IF CONNECTION DENSITY > 0.25: ADJACENCY_MATRIX (selection \"2\")\n\
             2. IF ANY NODE HAS MORE THAN 3 OUTGOING CONNECTIONS: ADJACENCY_MATRIX (selection \"2\")\n\
             3. OTHERWISE: FORCE_DIRECTED (selection \"1\")\n\n",
            excerpt = excerpt,
            nodes = metrics.nodes,
            edges = metrics.edges,
            density = metrics.density,
            degree = metrics.max_out_degree,
        ),
    };

    format!(
        "Select the most appropriate visualization for the {family} data below.\n\n\
         {rules}\
         FOR THIS DATA YOU MUST RETURN:\n{template}",
        family = classification.family,
        rules = rules,
        template = decision_template(decision),
    )
}
