//! Evidence gathered during a turn and the references that point at it.

use crate::rag::RetrievedChunk;
use crate::tools::{ToolName, ToolOutput};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Points at one tool invocation of the current turn, and optionally at one
/// item (a retrieved chunk) inside its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub invocation: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
}

impl EvidenceRef {
    pub fn invocation(invocation: usize) -> Self {
        Self {
            invocation,
            item: None,
        }
    }

    pub fn chunk(invocation: usize, item: usize) -> Self {
        Self {
            invocation,
            item: Some(item),
        }
    }
}

impl fmt::Display for EvidenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item {
            Some(item) => write!(f, "#{}.{}", self.invocation + 1, item + 1),
            None => write!(f, "#{}", self.invocation + 1),
        }
    }
}

/// What a reference resolves to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidenceItem {
    /// One course chunk from a course search.
    Chunk { chunk: RetrievedChunk },
    /// A whole tool output, including absences.
    Tool { tool: ToolName, output: ToolOutput },
}

/// A resolved piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub reference: EvidenceRef,
    #[serde(flatten)]
    pub item: EvidenceItem,
}

impl Evidence {
    pub fn tool(&self) -> ToolName {
        match &self.item {
            EvidenceItem::Chunk { .. } => ToolName::CourseSearch,
            EvidenceItem::Tool { tool, .. } => *tool,
        }
    }

    /// True when this evidence only records that nothing was found.
    pub fn is_absence(&self) -> bool {
        matches!(&self.item, EvidenceItem::Tool { output, .. } if output.is_absence())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_display_is_one_based() {
        assert_eq!(EvidenceRef::invocation(0).to_string(), "#1");
        assert_eq!(EvidenceRef::chunk(2, 0).to_string(), "#3.1");
    }

    #[test]
    fn test_absence() {
        let evidence = Evidence {
            reference: EvidenceRef::invocation(0),
            item: EvidenceItem::Tool {
                tool: ToolName::Holiday,
                output: ToolOutput::not_found("No IL holidays between 2150-01-01 and 2150-12-31"),
            },
        };
        assert!(evidence.is_absence());
        assert_eq!(evidence.tool(), ToolName::Holiday);
    }
}
