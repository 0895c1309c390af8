pub mod parser;
pub mod query;

pub use parser::{extract_slice, get_position, ASTParser, ParsedSource, Position, Span};
