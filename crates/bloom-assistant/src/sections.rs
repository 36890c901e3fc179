//! Splitting analysis replies into headed blocks

use std::sync::{LazyLock, OnceLock};

use regex::Regex;

/// A line opening a `## ` section or `### ` subsection.
static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{2,3} ").expect("valid header pattern"));

/// Kind of a parsed block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Introduced by `## `
    Section,
    /// Introduced by `### `
    Subsection,
    /// Anything else
    Paragraph,
}

/// One block of a reply, in original order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Text after the marker, trimmed; for headers this includes the body
    pub content: String,
}

impl Block {
    fn from_segment(segment: &str) -> Option<Self> {
        // The marker's trailing space must survive until it is matched
        let leading = segment.trim_start();
        if leading.is_empty() {
            return None;
        }

        let (kind, content) = if let Some(rest) = leading.strip_prefix("### ") {
            (BlockKind::Subsection, rest.trim())
        } else if let Some(rest) = leading.strip_prefix("## ") {
            (BlockKind::Section, rest.trim())
        } else {
            (BlockKind::Paragraph, leading.trim_end())
        };

        Some(Self {
            kind,
            content: content.to_string(),
        })
    }

    /// Header line, for sections and subsections
    pub fn heading(&self) -> Option<&str> {
        match self.kind {
            BlockKind::Paragraph => None,
            _ => Some(self.content.lines().next().unwrap_or("")),
        }
    }

    /// Text below the header line (the whole text for paragraphs)
    pub fn body(&self) -> &str {
        match self.kind {
            BlockKind::Paragraph => &self.content,
            _ => self
                .content
                .split_once('\n')
                .map(|(_, rest)| rest.trim())
                .unwrap_or(""),
        }
    }

    /// The marker that introduced this block
    pub fn marker(&self) -> &'static str {
        match self.kind {
            BlockKind::Section => "## ",
            BlockKind::Subsection => "### ",
            BlockKind::Paragraph => "",
        }
    }
}

/// Split text into blocks at every header line.
///
/// Text without headers yields exactly one paragraph holding the trimmed
/// input.
pub fn parse_sections(text: &str) -> Vec<Block> {
    let starts: Vec<usize> = HEADER_LINE.find_iter(text).map(|m| m.start()).collect();
    if starts.is_empty() {
        return vec![Block {
            kind: BlockKind::Paragraph,
            content: text.trim().to_string(),
        }];
    }

    let mut bounds = Vec::with_capacity(starts.len() + 2);
    bounds.push(0);
    bounds.extend(starts);
    bounds.push(text.len());

    bounds
        .windows(2)
        .filter_map(|w| Block::from_segment(&text[w[0]..w[1]]))
        .collect()
}

/// A completed analysis reply, parsed on first access
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    text: String,
    blocks: OnceLock<Vec<Block>>,
}

impl AnalysisResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: OnceLock::new(),
        }
    }

    /// The reply exactly as received
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks.get_or_init(|| parse_sections(&self.text))
    }
}
