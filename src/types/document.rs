//! Canonical Document Model
//!
//! The single ordered rich-content representation shown to the user,
//! composed of one block per section/subsection in report order. Each block
//! is a pure function of its section's heading and current text; the
//! synchronizer in `report::sync` is the only writer.

use serde::{Deserialize, Serialize};

/// One content block, corresponding to exactly one plan section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentBlock {
    pub section_id: String,
    pub heading: String,
    /// Heading depth: 1 for sections, 2 for subsections
    pub level: u8,
    /// Drafted or edited prose; empty until the section is drafted
    pub body: String,
}

/// Ordered rich-content tree derived from the section set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<DocumentBlock>,
}

impl Document {
    /// Find the block for a section, if present
    pub fn block_for(&self, section_id: &str) -> Option<&DocumentBlock> {
        self.blocks.iter().find(|b| b.section_id == section_id)
    }

    /// Render the document as markdown. Deterministic: identical block
    /// state always yields byte-identical output.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            let marker = "#".repeat(usize::from(block.level.clamp(1, 6)));
            out.push_str(&marker);
            out.push(' ');
            out.push_str(&block.heading);
            out.push_str("\n\n");
            if !block.body.is_empty() {
                out.push_str(&block.body);
                out.push_str("\n\n");
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
