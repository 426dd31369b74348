use crate::ast::*;
use crate::error::{LexError, LexErrorKind};
use crate::lexer::{split_arguments, split_condition, Piece, PieceKind, Tokenizer};
use crate::token::Token;

/// Tag names that end or continue a block and therefore stop a sequence.
const TERMINATORS: &[&str] = &["elif", "else", "endif", "endfor", "endfilter"];

pub struct Parser<'a> {
    source: &'a str,
    pieces: Vec<Piece>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, trim_blocks: bool) -> Result<Self, LexError> {
        let pieces = Tokenizer::new(source).trim_blocks(trim_blocks).tokenize()?;
        Ok(Self {
            source,
            pieces,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Piece> {
        self.pieces.get(self.pos)
    }

    fn consume(&mut self) -> Option<Piece> {
        let piece = self.pieces.get(self.pos).cloned();
        if piece.is_some() {
            self.pos += 1;
        }
        piece
    }

    /// Name of the next piece if it is a block terminator tag.
    fn peek_terminator(&self) -> Option<&str> {
        match self.peek() {
            Some(Piece {
                kind: PieceKind::Tag { name, .. },
                ..
            }) if TERMINATORS.contains(&name.as_str()) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn parse(&mut self) -> Result<Template, LexError> {
        let actions = self.parse_sequence()?;
        if let Some(piece) = self.peek() {
            // parse_sequence only stops early on a terminator with no open block.
            let name = match &piece.kind {
                PieceKind::Tag { name, .. } => name.clone(),
                _ => String::new(),
            };
            return Err(LexError::new(piece.start, LexErrorKind::UnexpectedClose { name }));
        }
        Ok(actions)
    }

    fn parse_sequence(&mut self) -> Result<Vec<Action>, LexError> {
        let mut actions = Vec::new();
        while self.peek().is_some() && self.peek_terminator().is_none() {
            let Some(piece) = self.consume() else { break };
            let action = match piece.kind {
                PieceKind::Text(text) => Action::Literal(text),
                PieceKind::Emit(content) => Action::Directive(Directive {
                    kind: DirectiveKind::Replace,
                    arguments: vec![Token::parse(&content, false, false)],
                    body: Body::default(),
                    next: None,
                }),
                PieceKind::Comment(text) => Action::Directive(verbatim(DirectiveKind::Comment, text)),
                PieceKind::Tag { name, args } => {
                    let kind = DirectiveKind::from_name(&name);
                    if kind.is_verbatim() {
                        Action::Directive(verbatim(kind, args))
                    } else if kind.is_block() {
                        Action::Directive(self.parse_block(kind, &args, piece.start, piece.end)?)
                    } else {
                        Action::Directive(Directive {
                            kind,
                            arguments: tokens(&args, false),
                            body: Body::default(),
                            next: None,
                        })
                    }
                }
            };
            actions.push(action);
        }
        Ok(actions)
    }

    /// Parses a body up to the next terminator and returns it with that
    /// terminator (consumed).
    fn parse_body(&mut self, open_name: &str, open_start: usize, body_start: usize) -> Result<(Body, Piece), LexError> {
        let actions = self.parse_sequence()?;
        let close = self.consume().ok_or_else(|| {
            LexError::new(open_start, LexErrorKind::UnclosedBlock { name: open_name.to_string() })
        })?;
        let body = Body {
            text: self.source[body_start..close.start].to_string(),
            actions,
        };
        Ok((body, close))
    }

    fn parse_block(&mut self, kind: DirectiveKind, args: &str, start: usize, end: usize) -> Result<Directive, LexError> {
        match kind {
            DirectiveKind::If => self.parse_if(args, start, end),
            _ => {
                let name = kind.name().to_string();
                let expected = format!("end{}", name);
                let (body, close) = self.parse_body(&name, start, end)?;
                let found = tag_name(&close);
                if found != expected {
                    return Err(LexError::new(close.start, LexErrorKind::Mismatched { expected, found }));
                }
                Ok(Directive {
                    kind,
                    arguments: tokens(args, false),
                    body,
                    next: None,
                })
            }
        }
    }

    fn parse_if(&mut self, args: &str, start: usize, end: usize) -> Result<Directive, LexError> {
        let first = condition(args, "if", start)?;
        let (body, mut close) = self.parse_body("if", start, end)?;

        // (condition, body) for each elif; None condition for else.
        let mut alternatives: Vec<(Option<Vec<Token>>, Body)> = Vec::new();
        let mut seen_else = false;
        loop {
            let found = tag_name(&close);
            match found.as_str() {
                "endif" => break,
                "elif" | "else" if seen_else => {
                    return Err(LexError::new(close.start, LexErrorKind::ElseNotLast));
                }
                "elif" => {
                    let elif_args = match &close.kind {
                        PieceKind::Tag { args, .. } => args.clone(),
                        _ => String::new(),
                    };
                    let cond = condition(&elif_args, "elif", close.start)?;
                    let (branch_body, next_close) = self.parse_body("if", start, close.end)?;
                    alternatives.push((Some(cond), branch_body));
                    close = next_close;
                }
                "else" => {
                    seen_else = true;
                    let (branch_body, next_close) = self.parse_body("if", start, close.end)?;
                    alternatives.push((None, branch_body));
                    close = next_close;
                }
                _ => {
                    return Err(LexError::new(
                        close.start,
                        LexErrorKind::Mismatched {
                            expected: "endif".to_string(),
                            found,
                        },
                    ));
                }
            }
        }

        let next = alternatives
            .into_iter()
            .rev()
            .fold(None, |next, (cond, body)| {
                Some(Box::new(match cond {
                    Some(condition) => Branch::Elif { condition, body, next },
                    None => Branch::Else { body },
                }))
            });

        Ok(Directive {
            kind: DirectiveKind::If,
            arguments: first,
            body,
            next,
        })
    }
}

fn tag_name(piece: &Piece) -> String {
    match &piece.kind {
        PieceKind::Tag { name, .. } => name.clone(),
        _ => String::new(),
    }
}

fn tokens(args: &str, expression: bool) -> Vec<Token> {
    let words = if expression {
        split_condition(args)
    } else {
        split_arguments(args)
    };
    words
        .iter()
        .map(|word| Token::parse(word, false, expression))
        .collect()
}

fn condition(args: &str, name: &str, offset: usize) -> Result<Vec<Token>, LexError> {
    let tokens = tokens(args, true);
    if tokens.is_empty() {
        return Err(LexError::new(offset, LexErrorKind::MissingArguments { name: name.to_string() }));
    }
    Ok(tokens)
}

fn verbatim(kind: DirectiveKind, text: String) -> Directive {
    let arguments = if text.is_empty() {
        Vec::new()
    } else {
        vec![Token::parse(&text, true, false)]
    };
    Directive {
        kind,
        arguments,
        body: Body {
            text,
            actions: Vec::new(),
        },
        next: None,
    }
}
