//! Operation classification from source text
//!
//! [`OperationClassifier`] is the seam between the recorder and whatever
//! decides what a line did to a variable. [`PatternClassifier`] is the
//! regex implementation: an ordered rule list per variable name where the
//! first matching rule wins. It reads text only, so unusual formatting can
//! fool it.

use regex::Regex;
use std::collections::HashMap;

use crate::types::{OperationTag, StructureFamily};

/// Infers the operation a source line performed on a variable
pub trait OperationClassifier: Send {
    fn classify(&mut self, line: &str, name: &str, family: StructureFamily) -> OperationTag;
}

struct Rule {
    pattern: Regex,
    tag: OperationTag,
    /// Only applies to this family when set
    family: Option<StructureFamily>,
}

/// Rule templates; `{n}` is replaced by the escaped variable name
const RULES: &[(&str, OperationTag, Option<StructureFamily>)] = &[
    (r"{n}\s*=\s*\[", OperationTag::Create, None),
    (r"{n}\s*=\s*list\(", OperationTag::Create, None),
    (
        r"{n}\s*=\s*[A-Za-z_][\w.\[\]]*\s*\.\s*(?:map|filter|zip|split|extract|chop|drain|retain)\s*\(",
        OperationTag::ListComprehension,
        Some(StructureFamily::Sequence),
    ),
    (
        r"{n}(?:\[[^\]]+\]|\.[A-Za-z_]\w*)\s*\.\s*(?:push|append|insert)\s*\(",
        OperationTag::AddEdge,
        Some(StructureFamily::Graph),
    ),
    (
        r"{n}(?:\[[^\]]+\]|\.[A-Za-z_]\w*)\s*(?:\+=|=(?:[^=]|$))",
        OperationTag::UpdateNodeEdges,
        Some(StructureFamily::Graph),
    ),
    (r"{n}\[[^\]]+\]\s*=(?:[^=]|$)", OperationTag::IndexedAssignment, None),
    (r"{n}\s*\.\s*push\s*\(", OperationTag::Append, None),
    (r"{n}\s*\.\s*(?:append|extend)\s*\(", OperationTag::Extend, None),
    (r"{n}\s*\+=", OperationTag::Extend, None),
    (r"{n}\s*\.\s*insert\s*\(", OperationTag::Insert, None),
    (
        r"{n}\s*\.\s*(?:remove|drain|retain|clear|truncate|splice)\s*\(",
        OperationTag::Remove,
        None,
    ),
    (r"{n}\s*\.\s*(?:pop|shift)\s*\(", OperationTag::Pop, None),
    (r"{n}\s*\.\s*sort\s*\(", OperationTag::Sort, None),
    (r"{n}\s*\.\s*reverse\s*\(", OperationTag::Reverse, None),
    (r"{n}\s*=\s*#\{", OperationTag::CreateGraph, None),
    (r"{n}\s*=(?:[^=]|$)", OperationTag::AssignNode, Some(StructureFamily::Tree)),
    (
        r"{n}\.(?:value|val|data)\s*=(?:[^=]|$)",
        OperationTag::UpdateNodeValue,
        None,
    ),
    (r"{n}\.left\s*=(?:[^=]|$)", OperationTag::SetLeftChild, None),
    (r"{n}\.right\s*=(?:[^=]|$)", OperationTag::SetRightChild, None),
    (
        r"{n}\.children\s*\.\s*(?:push|append|insert)\s*\(",
        OperationTag::AddChildToList,
        None,
    ),
    (
        r"{n}\.children\[[^\]]+\]\s*=(?:[^=]|$)",
        OperationTag::UpdateChildInList,
        None,
    ),
];

/// Regex-backed classifier with patterns compiled once per variable name
#[derive(Default)]
pub struct PatternClassifier {
    cache: HashMap<String, Vec<Rule>>,
}

impl PatternClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(name: &str) -> Vec<Rule> {
        // The name must not continue an identifier or be a property access
        let anchored = format!(r"(?:^|[^\w.]){}", regex::escape(name));
        RULES
            .iter()
            .filter_map(|(template, tag, family)| {
                let source = template.replace("{n}", &anchored);
                match Regex::new(&source) {
                    Ok(pattern) => Some(Rule {
                        pattern,
                        tag: *tag,
                        family: *family,
                    }),
                    Err(e) => {
                        tracing::warn!("Skipping operation rule {}: {}", tag, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Number of variable names with compiled rules
    pub fn cached_names(&self) -> usize {
        self.cache.len()
    }
}

impl OperationClassifier for PatternClassifier {
    fn classify(&mut self, line: &str, name: &str, family: StructureFamily) -> OperationTag {
        let line = line.trim();
        let rules = self
            .cache
            .entry(name.to_string())
            .or_insert_with(|| Self::compile(name));

        rules
            .iter()
            .filter(|rule| rule.family.map_or(true, |f| f == family))
            .find(|rule| rule.pattern.is_match(line))
            .map(|rule| rule.tag)
            .unwrap_or(OperationTag::Update)
    }
}

impl std::fmt::Debug for PatternClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternClassifier")
            .field("cached_names", &self.cache.len())
            .finish()
    }
}
