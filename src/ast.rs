use crate::token::Token;

/// The fixed set of directive names. Anything else lexes to `Unknown` and is
/// ignored at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    Comment,
    Copy,
    Filter,
    Firstof,
    For,
    If,
    Ignore,
    Length,
    Replace,
    UseDataset,
    UseTemplate,
    Unknown(String),
}

impl DirectiveKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "comment" => DirectiveKind::Comment,
            "copy" => DirectiveKind::Copy,
            "filter" => DirectiveKind::Filter,
            "firstof" => DirectiveKind::Firstof,
            "for" => DirectiveKind::For,
            "if" => DirectiveKind::If,
            "ignore" => DirectiveKind::Ignore,
            "length" => DirectiveKind::Length,
            "replace" => DirectiveKind::Replace,
            "usedataset" => DirectiveKind::UseDataset,
            "usetemplate" => DirectiveKind::UseTemplate,
            other => DirectiveKind::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DirectiveKind::Comment => "comment",
            DirectiveKind::Copy => "copy",
            DirectiveKind::Filter => "filter",
            DirectiveKind::Firstof => "firstof",
            DirectiveKind::For => "for",
            DirectiveKind::If => "if",
            DirectiveKind::Ignore => "ignore",
            DirectiveKind::Length => "length",
            DirectiveKind::Replace => "replace",
            DirectiveKind::UseDataset => "usedataset",
            DirectiveKind::UseTemplate => "usetemplate",
            DirectiveKind::Unknown(name) => name,
        }
    }

    /// Block directives own a body closed by `end<name>`.
    pub fn is_block(&self) -> bool {
        matches!(self, DirectiveKind::For | DirectiveKind::If | DirectiveKind::Filter)
    }

    /// Directives whose argument text is kept raw instead of tokenized.
    pub fn is_verbatim(&self) -> bool {
        matches!(self, DirectiveKind::Comment | DirectiveKind::Copy | DirectiveKind::Ignore)
    }
}

/// Template text captured between a block's open and close tags, together
/// with its already-lexed actions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub text: String,
    pub actions: Vec<Action>,
}

/// An `elif`/`else` alternative hanging off an `if`.
#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    Elif {
        condition: Vec<Token>,
        body: Body,
        next: Option<Box<Branch>>,
    },
    Else {
        body: Body,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub arguments: Vec<Token>,
    /// For block directives the enclosed template; for `comment`, `copy` and
    /// `ignore` the raw argument text; otherwise empty.
    pub body: Body,
    /// The `elif`/`else` chain. Always `None` except on `if`.
    pub next: Option<Box<Branch>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Literal(String),
    Directive(Directive),
}

pub type Template = Vec<Action>;
