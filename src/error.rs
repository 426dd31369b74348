//! Error types.
//!
//! Only compilation and the outward collaborator helpers fail loudly. Once a
//! template has lexed, rendering degrades to empty/null values and logs
//! instead of returning errors.

use std::fmt;

use thiserror::Error;

/// What went wrong while lexing a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// `{{`, `{%` or `{#` without its closing delimiter.
    UnclosedTag,
    /// A quote inside a tag was never closed.
    UnclosedString,
    /// `{% %}` with nothing inside.
    EmptyTag,
    /// A block directive reached end of input without its close tag.
    UnclosedBlock { name: String },
    /// A close or continuation tag with no open block.
    UnexpectedClose { name: String },
    /// A close tag that belongs to a different block.
    Mismatched { expected: String, found: String },
    /// `elif` or `else` after an `else`.
    ElseNotLast,
    /// A directive that needs arguments was given none.
    MissingArguments { name: String },
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexErrorKind::UnclosedTag => write!(f, "unclosed tag"),
            LexErrorKind::UnclosedString => write!(f, "unterminated string literal in tag"),
            LexErrorKind::EmptyTag => write!(f, "empty tag"),
            LexErrorKind::UnclosedBlock { name } => write!(f, "`{}` block is never closed", name),
            LexErrorKind::UnexpectedClose { name } => {
                write!(f, "`{}` has no matching open block", name)
            }
            LexErrorKind::Mismatched { expected, found } => {
                write!(f, "expected `{}`, found `{}`", expected, found)
            }
            LexErrorKind::ElseNotLast => write!(f, "`else` must be the last branch of an `if`"),
            LexErrorKind::MissingArguments { name } => write!(f, "`{}` needs an argument", name),
        }
    }
}

/// A compile failure, located by byte offset into the template source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("template error at byte {offset}: {kind}")]
pub struct LexError {
    pub offset: usize,
    pub kind: LexErrorKind,
}

impl LexError {
    pub fn new(offset: usize, kind: LexErrorKind) -> Self {
        Self { offset, kind }
    }
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A dataset source decoded to something other than a JSON object.
    #[error("dataset `{0}` is not a JSON object")]
    NotAnObject(String),
}
