//! Tag-argument tokens.
//!
//! A token is one whitespace-separated argument of a tag, or the whole
//! content of a `{{ … }}` emit:
//!
//! ```text
//! PRIMARY [":" SUBARG] ("|" FILTERNAME (":" FILTERARG)*)*
//! ```
//!
//! where `PRIMARY`, `SUBARG` and `FILTERARG` are each a quoted literal or a
//! bare name. Nothing is resolved here; the processor decides at render time
//! whether a name is a dataset path or a bare number.

use crate::filters::Filter;

/// Words and symbols that are syntax, not data, inside `if`/`elif` conditions.
pub const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "//", "%", "**", "&", "^", "~", "|", "in", "is", "not", "<<", ">>", "<",
    "<=", "==", "!=", ">=", ">", "True", "False", "and", "or", "None", "(", ")",
];

pub fn is_operator(word: &str) -> bool {
    OPERATORS.contains(&word)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Quoted text.
    Literal,
    /// Bare word: a dotted dataset path, a number, or an operator.
    Name,
    /// Raw tag text taken as-is.
    Verbatim,
}

/// A sub-argument or filter argument, stored unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub value: String,
    pub kind: TokenKind,
}

impl Argument {
    pub fn is_name(&self) -> bool {
        self.kind == TokenKind::Name
    }
}

/// One `|name:arg:arg` link of a filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCall {
    pub name: String,
    pub is_boolean: bool,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The text this token was parsed from; re-parsing it yields the same token.
    pub source: String,
    pub kind: TokenKind,
    pub value: String,
    pub is_expression: bool,
    pub is_operator: bool,
    pub sub_argument: Option<Argument>,
    pub filters: Vec<FilterCall>,
}

impl Token {
    pub fn parse(source: &str, verbatim: bool, expression: bool) -> Token {
        let mut token = Token {
            source: source.to_string(),
            kind: TokenKind::Verbatim,
            value: source.to_string(),
            is_expression: expression,
            is_operator: false,
            sub_argument: None,
            filters: Vec::new(),
        };
        if verbatim {
            return token;
        }

        // A lone `|` (bitwise or) would otherwise read as an empty filter chain.
        if expression && is_operator(source) {
            token.kind = TokenKind::Name;
            token.is_operator = true;
            return token;
        }

        let mut cursor = Cursor::new(source);
        let primary = cursor.segment();
        token.kind = primary.kind;
        token.value = primary.value;
        token.is_operator = expression && token.kind == TokenKind::Name && is_operator(&token.value);

        while cursor.eat(':') {
            let arg = cursor.segment();
            // Only the first sub-argument is meaningful; extras are dropped.
            if token.sub_argument.is_none() {
                token.sub_argument = Some(arg);
            }
        }

        while cursor.eat('|') {
            let name = cursor.bare();
            let mut arguments = Vec::new();
            while cursor.eat(':') {
                arguments.push(cursor.segment());
            }
            let is_boolean = Filter::from_name(&name).is_some_and(Filter::is_boolean);
            token.filters.push(FilterCall {
                name,
                is_boolean,
                arguments,
            });
        }

        token
    }

    pub fn is_literal(&self) -> bool {
        self.kind == TokenKind::Literal
    }

    pub fn is_name(&self) -> bool {
        self.kind == TokenKind::Name
    }

    pub fn is_verbatim(&self) -> bool {
        self.kind == TokenKind::Verbatim
    }

    pub fn is_filtered(&self) -> bool {
        !self.filters.is_empty()
    }

    /// True when the last filter in the chain produces a boolean.
    pub fn ends_in_boolean_filter(&self) -> bool {
        self.filters.last().is_some_and(|f| f.is_boolean)
    }
}

struct Cursor<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn eat(&mut self, c: char) -> bool {
        if self.remaining().starts_with(c) {
            self.advance(c.len_utf8());
            true
        } else {
            false
        }
    }

    /// Bare text up to the next `:` or `|`.
    fn bare(&mut self) -> String {
        let rest = self.remaining();
        let end = rest.find([':', '|']).unwrap_or(rest.len());
        self.advance(end);
        rest[..end].to_string()
    }

    fn segment(&mut self) -> Argument {
        let rest = self.remaining();
        match rest.chars().next() {
            Some(quote @ ('\'' | '"')) => match unquote(rest, quote) {
                Some((value, consumed)) => {
                    self.advance(consumed);
                    // Trailing junk glued to a literal (`"a"b`) is discarded.
                    self.bare();
                    Argument {
                        value,
                        kind: TokenKind::Literal,
                    }
                }
                None => Argument {
                    value: self.bare(),
                    kind: TokenKind::Name,
                },
            },
            _ => Argument {
                value: self.bare(),
                kind: TokenKind::Name,
            },
        }
    }
}

/// Decodes a quoted literal at the start of `text`, returning the value and
/// the number of bytes consumed including both quotes.
pub(crate) fn unquote(text: &str, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = text.char_indices().skip(1);
    while let Some((idx, c)) = chars.next() {
        if c == quote {
            return Some((value, idx + c.len_utf8()));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, esc @ ('\\' | '\'' | '"'))) => value.push(esc),
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => return None,
            }
        } else {
            value.push(c);
        }
    }
    None
}
