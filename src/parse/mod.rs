pub(crate) mod lexer;
pub mod tree_parser;
pub mod tree_serializer;

pub use tree_parser::{Flatten, MAX_DEPTH, ParseError, TreeError, flatten, parse, parse_entries};
pub use tree_serializer::serialize;
