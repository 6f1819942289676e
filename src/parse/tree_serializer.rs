use crate::model::forest::Forest;
use crate::model::node::{KeyStyle, NodeIdx, TaskKey};
use crate::parse::lexer::is_delimiter;

/// Serialize a forest to its canonical text.
///
/// Each node with children becomes `[id, child, ...]`; a leaf is written as
/// its bare id. Entries are separated by `", "`, so the sample tree comes out
/// as `[-1, [1, 2, [3, 4]], 5, 6]`.
pub fn serialize(forest: &Forest) -> String {
    let mut out = String::new();
    write_array(forest, forest.root(), &mut out);
    out
}

fn write_array(forest: &Forest, idx: NodeIdx, out: &mut String) {
    out.push('[');
    write_key(forest.key(idx), out);
    for &child in forest.children(idx) {
        out.push_str(", ");
        if forest.children(child).is_empty() {
            write_key(forest.key(child), out);
        } else {
            write_array(forest, child, out);
        }
    }
    out.push(']');
}

/// Write one id. A bare key that would not lex back as a single token is
/// quoted instead.
fn write_key(key: &TaskKey, out: &mut String) {
    let needs_quotes = key.text.is_empty() || key.text.contains(is_delimiter);
    if key.style == KeyStyle::Bare && !needs_quotes {
        out.push_str(&key.text);
        return;
    }
    out.push('"');
    for c in key.text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}
