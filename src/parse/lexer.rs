use crate::model::node::TaskKey;
use crate::parse::ParseError;

/// One lexical token of the nested-array format
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Open,
    Close,
    Comma,
    Id(TaskKey),
}

/// Splits tree text into tokens, skipping whitespace. Cloning a lexer
/// forks the scan position.
#[derive(Debug, Clone)]
pub(crate) struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    pub(crate) fn source(&self) -> &'a str {
        self.src
    }

    /// Byte offset of the next unread character
    pub(crate) fn offset(&self) -> usize {
        self.pos
    }

    /// Next token together with the byte offset it starts at, or `None` at end
    /// of input.
    pub(crate) fn next_token(&mut self) -> Result<Option<(usize, Token)>, ParseError> {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
        let start = self.pos;

        let Some(c) = trimmed.chars().next() else {
            return Ok(None);
        };
        let token = match c {
            '[' => {
                self.pos += 1;
                Token::Open
            }
            ']' => {
                self.pos += 1;
                Token::Close
            }
            ',' => {
                self.pos += 1;
                Token::Comma
            }
            '"' => Token::Id(self.quoted(start)?),
            _ => {
                let len = trimmed
                    .find(is_delimiter)
                    .unwrap_or(trimmed.len());
                self.pos += len;
                Token::Id(TaskKey::bare(&trimmed[..len]))
            }
        };
        Ok(Some((start, token)))
    }

    /// Scan a double-quoted id starting at `start` (the opening quote)
    fn quoted(&mut self, start: usize) -> Result<TaskKey, ParseError> {
        let body_start = start + 1;
        let mut text = String::new();
        let mut chars = self.src[body_start..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos = body_start + i + 1;
                    if text.is_empty() {
                        return Err(ParseError::EmptyId { offset: start });
                    }
                    return Ok(TaskKey::quoted(text));
                }
                '\\' => match chars.next() {
                    Some((_, e @ ('"' | '\\' | '/'))) => text.push(e),
                    Some((j, _)) => {
                        return Err(ParseError::InvalidEscape {
                            offset: body_start + j,
                        });
                    }
                    None => break,
                },
                _ => text.push(c),
            }
        }
        Err(ParseError::UnterminatedString { offset: start })
    }
}

/// Characters that end a bare id
pub(crate) fn is_delimiter(c: char) -> bool {
    matches!(c, '[' | ']' | ',' | '"') || c.is_whitespace()
}
