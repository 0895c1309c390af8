use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use tree_sitter::{Language, Node, Parser, Tree};

/// 1-based line/column of a finding. `(0, 0)` means the location is unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const UNKNOWN: Position = Position { line: 0, column: 0 };

    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Position of a byte offset inside `text`.
    pub fn at_offset(text: &str, offset: usize) -> Self {
        let offset = floor_char_boundary(text, offset);
        let before = &text[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        Self {
            line,
            column: offset - line_start + 1,
        }
    }
}

/// Source range of a node: 1-based lines, 0-based byte columns (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub fn of(node: &Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_line: start.row + 1,
            start_column: start.column,
            end_line: end.row + 1,
            end_column: end.column,
        }
    }
}

/// Result of a successful structural parse.
pub struct ParsedSource {
    pub tree: Tree,
    pub lines: Vec<String>,
}

/// TSX grammar parser: accepts TypeScript, JSX and plain JavaScript.
pub struct ASTParser {
    parser: Parser,
}

impl ASTParser {
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_typescript::LANGUAGE_TSX.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| CoreError::Parse(format!("Failed to load TSX grammar: {}", e)))?;
        Ok(Self { parser })
    }

    /// Parse `text` into a tree. Any syntax error makes the whole parse fail so
    /// callers fall back to text-only scanning.
    pub fn parse(&mut self, text: &str) -> Result<ParsedSource> {
        let tree = self
            .parser
            .parse(text, None)
            .ok_or_else(|| CoreError::Parse("parser returned no tree".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            let at = first_error(root)
                .map(|node| node.start_position().row + 1)
                .unwrap_or(0);
            return Err(CoreError::Parse(format!("syntax error near line {}", at)));
        }

        Ok(ParsedSource {
            tree,
            lines: split_lines(text),
        })
    }
}

/// One-shot parse with a fresh parser.
pub fn parse_source(text: &str) -> Result<ParsedSource> {
    ASTParser::new()?.parse(text)
}

pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

/// 1-based line/column of a node's start.
pub fn get_position(node: &Node) -> Position {
    let start = node.start_position();
    Position {
        line: start.row + 1,
        column: start.column + 1,
    }
}

/// Verbatim source text covered by `span`.
pub fn extract_slice(span: &Span, lines: &[String]) -> String {
    if span.start_line == 0 || span.end_line < span.start_line {
        return String::new();
    }

    if span.start_line == span.end_line {
        return lines
            .get(span.start_line - 1)
            .and_then(|line| {
                let end = span.end_column.min(line.len());
                line.get(span.start_column.min(end)..end)
            })
            .unwrap_or("")
            .to_string();
    }

    let mut parts = Vec::with_capacity(span.end_line - span.start_line + 1);
    for index in (span.start_line - 1)..span.end_line {
        let Some(line) = lines.get(index) else {
            break;
        };
        let part = if index == span.start_line - 1 {
            line.get(span.start_column.min(line.len())..).unwrap_or("")
        } else if index == span.end_line - 1 {
            line.get(..span.end_column.min(line.len())).unwrap_or("")
        } else {
            line.as_str()
        };
        parts.push(part);
    }
    parts.join("\n")
}

pub(crate) fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

fn first_error(root: Node) -> Option<Node> {
    let mut found = None;
    super::query::walk_nodes(root, |node| {
        if found.is_none() && (node.is_error() || node.is_missing()) {
            found = Some(node);
        }
    });
    found
}
