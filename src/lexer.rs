//! First lexing pass: raw template text into positioned pieces.
//!
//! The tokenizer only finds delimiters. Block pairing and argument
//! tokenizing happen in [`crate::parser`].

use crate::ast::DirectiveKind;
use crate::error::{LexError, LexErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PieceKind {
    /// Literal text between tags.
    Text(String),
    /// Content of `{{ … }}`.
    Emit(String),
    /// `{% name args %}`.
    Tag { name: String, args: String },
    /// Content of `{# … #}`.
    Comment(String),
}

/// A piece and its byte span in the source (`start..end`, delimiters included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    trim_blocks: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            trim_blocks: false,
        }
    }

    /// Drop a single newline that directly follows `%}`.
    pub fn trim_blocks(mut self, trim: bool) -> Self {
        self.trim_blocks = trim;
        self
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    pub fn tokenize(mut self) -> Result<Vec<Piece>, LexError> {
        let mut pieces = Vec::new();
        while let Some(piece) = self.next_piece()? {
            pieces.push(piece);
        }
        Ok(pieces)
    }

    pub fn next_piece(&mut self) -> Result<Option<Piece>, LexError> {
        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }
        let start = self.cursor;

        let next_tag = ["{{", "{%", "{#"]
            .iter()
            .filter_map(|open| rest.find(open))
            .min();

        match next_tag {
            Some(0) => {}
            Some(idx) => {
                self.advance(idx);
                return Ok(Some(Piece {
                    kind: PieceKind::Text(rest[..idx].to_string()),
                    start,
                    end: self.cursor,
                }));
            }
            None => {
                self.advance(rest.len());
                return Ok(Some(Piece {
                    kind: PieceKind::Text(rest.to_string()),
                    start,
                    end: self.cursor,
                }));
            }
        }

        let opener = &rest[..2];
        let inner = &rest[2..];
        let kind = match opener {
            "{#" => {
                let close = inner
                    .find("#}")
                    .ok_or_else(|| LexError::new(start, LexErrorKind::UnclosedTag))?;
                self.advance(2 + close + 2);
                PieceKind::Comment(inner[..close].trim().to_string())
            }
            "{{" => {
                let close = find_close(inner, "}}", start)?;
                self.advance(2 + close + 2);
                let content = inner[..close].trim();
                if content.is_empty() {
                    return Err(LexError::new(start, LexErrorKind::EmptyTag));
                }
                PieceKind::Emit(tighten(content))
            }
            _ => {
                let leading = inner.len() - inner.trim_start().len();
                let name: String = inner
                    .trim_start()
                    .chars()
                    .take_while(|c| !c.is_whitespace() && *c != '%')
                    .collect();
                // Raw-text tags may hold stray quotes, so skip quote tracking.
                let close = if DirectiveKind::from_name(&name).is_verbatim() {
                    inner
                        .find("%}")
                        .ok_or_else(|| LexError::new(start, LexErrorKind::UnclosedTag))?
                } else {
                    find_close(inner, "%}", start)?
                };
                self.advance(2 + close + 2);
                if self.trim_blocks {
                    let after = self.remaining();
                    if after.starts_with('\n') {
                        self.advance(1);
                    } else if after.starts_with("\r\n") {
                        self.advance(2);
                    }
                }
                if name.is_empty() {
                    return Err(LexError::new(start, LexErrorKind::EmptyTag));
                }
                let args = inner[leading + name.len()..close].trim().to_string();
                PieceKind::Tag { name, args }
            }
        };

        Ok(Some(Piece {
            kind,
            start,
            end: self.cursor,
        }))
    }
}

/// Byte index of `close` in `text`, ignoring occurrences inside quotes.
fn find_close(text: &str, close: &str, tag_start: usize) -> Result<usize, LexError> {
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices();
    while let Some((idx, c)) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
            }
            None => {
                if text[idx..].starts_with(close) {
                    return Ok(idx);
                }
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
            }
        }
    }
    let kind = if quote.is_some() {
        LexErrorKind::UnclosedString
    } else {
        LexErrorKind::UnclosedTag
    };
    Err(LexError::new(tag_start, kind))
}

/// Splits tag arguments on whitespace outside quotes.
pub fn split_arguments(args: &str) -> Vec<String> {
    split_words(args, false)
}

/// Like [`split_arguments`], but a parenthesis outside quotes is always a
/// word of its own, so `(age > 17)` groups.
pub fn split_condition(args: &str) -> Vec<String> {
    split_words(args, true)
}

fn split_words(args: &str, parens: bool) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in args.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if parens && (c == '(' || c == ')') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            words.push(c.to_string());
        } else {
            if c == '"' || c == '\'' {
                quote = Some(c);
            }
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Removes whitespace outside quotes so `{{ a | f : "x y" }}` reads as one token.
fn tighten(content: &str) -> String {
    split_arguments(content).concat()
}
