use std::iter::FusedIterator;

use crate::model::forest::{DuplicateIdError, Forest};
use crate::model::node::Entry;
use crate::parse::lexer::{Lexer, Token};

/// Maximum array nesting accepted by the parser
pub const MAX_DEPTH: usize = 1000;

/// Malformed tree text. Offsets are byte offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty input")]
    EmptyInput,
    #[error("unbalanced brackets at offset {offset}")]
    Unbalanced { offset: usize },
    #[error("empty id at offset {offset}")]
    EmptyId { offset: usize },
    #[error("trailing input at offset {offset}")]
    TrailingInput { offset: usize },
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("invalid escape at offset {offset}")]
    InvalidEscape { offset: usize },
    #[error("unexpected token at offset {offset}: expected {expected}")]
    Unexpected {
        offset: usize,
        expected: &'static str,
    },
    #[error("tree root must be -1, found {id}")]
    UnexpectedRoot { id: String },
    #[error("nesting too deep at offset {offset}")]
    TooDeep { offset: usize },
}

/// Anything that can go wrong turning text into a forest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    DuplicateId(#[from] DuplicateIdError),
}

/// Parse tree text and lower it into a forest.
pub fn parse(text: &str) -> Result<Forest, TreeError> {
    let entry = parse_entries(text)?;
    Ok(Forest::build_from_parsed(&entry)?)
}

/// Parse tree text into its entry AST without building a forest.
///
/// The outer array must be headed by the sentinel `-1`. Ids are not checked
/// for uniqueness here; that happens when the AST is lowered.
pub fn parse_entries(text: &str) -> Result<Entry, ParseError> {
    let mut lexer = Lexer::new(text);
    let (offset, first) = lexer.next_token()?.ok_or(ParseError::EmptyInput)?;
    if first != Token::Open {
        return Err(ParseError::Unexpected {
            offset,
            expected: "'['",
        });
    }
    let root = parse_array(&mut lexer, 1)?;
    if !root.key().is_sentinel() {
        return Err(ParseError::UnexpectedRoot {
            id: root.key().text.clone(),
        });
    }
    match lexer.next_token()? {
        None => Ok(root),
        Some((offset, Token::Close)) => Err(ParseError::Unbalanced { offset }),
        Some((offset, _)) => Err(ParseError::TrailingInput { offset }),
    }
}

/// Parse the rest of an array whose `[` has been consumed
fn parse_array(lexer: &mut Lexer<'_>, depth: usize) -> Result<Entry, ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::TooDeep {
            offset: lexer.offset(),
        });
    }
    let key = match expect_token(lexer)? {
        (_, Token::Id(key)) => key,
        (offset, Token::Open) => {
            return Err(ParseError::Unexpected {
                offset,
                expected: "id",
            });
        }
        (offset, _) => return Err(ParseError::EmptyId { offset }),
    };

    let mut children = Vec::new();
    loop {
        match expect_token(lexer)? {
            (_, Token::Close) => return Ok(Entry::Subtree(key, children)),
            (_, Token::Comma) => {}
            (offset, _) => {
                return Err(ParseError::Unexpected {
                    offset,
                    expected: "',' or ']'",
                });
            }
        }
        match expect_token(lexer)? {
            (_, Token::Id(child)) => children.push(Entry::Leaf(child)),
            (_, Token::Open) => children.push(parse_array(lexer, depth + 1)?),
            (offset, _) => return Err(ParseError::EmptyId { offset }),
        }
    }
}

/// A token that must exist: running out of input inside an array means a
/// missing `]`.
fn expect_token(lexer: &mut Lexer<'_>) -> Result<(usize, Token), ParseError> {
    lexer.next_token()?.ok_or(ParseError::Unbalanced {
        offset: lexer.offset(),
    })
}

// ---------------------------------------------------------------------------
// Flatten
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Start,
    Head,
    CommaOrClose,
    Entry,
    End,
    Done,
}

/// Lazy preorder walk over the ids of a tree text, root first.
///
/// Checks the grammar as it goes but never builds a forest, and does not
/// look for duplicate ids. After the first error the iterator is exhausted.
/// Clones scan independently; [`Flatten::restart`] rewinds to the start.
#[derive(Debug, Clone)]
pub struct Flatten<'a> {
    lexer: Lexer<'a>,
    depth: usize,
    expect: Expect,
}

/// Walk the ids of `text` in document order.
pub fn flatten(text: &str) -> Flatten<'_> {
    Flatten {
        lexer: Lexer::new(text),
        depth: 0,
        expect: Expect::Start,
    }
}

impl<'a> Flatten<'a> {
    pub fn restart(&mut self) {
        *self = flatten(self.lexer.source());
    }

    fn fail(&mut self, err: ParseError) -> Option<Result<String, ParseError>> {
        self.expect = Expect::Done;
        Some(Err(err))
    }
}

impl Iterator for Flatten<'_> {
    type Item = Result<String, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.expect == Expect::Done {
                return None;
            }
            let next = match self.lexer.next_token() {
                Ok(next) => next,
                Err(e) => return self.fail(e),
            };
            let Some((offset, token)) = next else {
                return match self.expect {
                    Expect::End => {
                        self.expect = Expect::Done;
                        None
                    }
                    Expect::Start => self.fail(ParseError::EmptyInput),
                    _ => {
                        let offset = self.lexer.offset();
                        self.fail(ParseError::Unbalanced { offset })
                    }
                };
            };

            match (self.expect, token) {
                (Expect::Start, Token::Open) => {
                    self.depth = 1;
                    self.expect = Expect::Head;
                }
                (Expect::Start, _) => {
                    return self.fail(ParseError::Unexpected {
                        offset,
                        expected: "'['",
                    });
                }
                (Expect::Head | Expect::Entry, Token::Id(key)) => {
                    self.expect = Expect::CommaOrClose;
                    return Some(Ok(key.text));
                }
                (Expect::Head, Token::Open) => {
                    return self.fail(ParseError::Unexpected {
                        offset,
                        expected: "id",
                    });
                }
                (Expect::Entry, Token::Open) => {
                    self.depth += 1;
                    if self.depth > MAX_DEPTH {
                        return self.fail(ParseError::TooDeep { offset });
                    }
                    self.expect = Expect::Head;
                }
                (Expect::Head | Expect::Entry, _) => {
                    return self.fail(ParseError::EmptyId { offset });
                }
                (Expect::CommaOrClose, Token::Comma) => self.expect = Expect::Entry,
                (Expect::CommaOrClose, Token::Close) => {
                    self.depth -= 1;
                    self.expect = if self.depth == 0 {
                        Expect::End
                    } else {
                        Expect::CommaOrClose
                    };
                }
                (Expect::CommaOrClose, _) => {
                    return self.fail(ParseError::Unexpected {
                        offset,
                        expected: "',' or ']'",
                    });
                }
                (Expect::End, Token::Close) => {
                    return self.fail(ParseError::Unbalanced { offset });
                }
                (Expect::End, _) => return self.fail(ParseError::TrailingInput { offset }),
                (Expect::Done, _) => return None,
            }
        }
    }
}

impl FusedIterator for Flatten<'_> {}
