//! Reader: turns source text into top-level syntax units.
//!
//! The reader is an iterator. Each `next()` parses one unit from the token
//! stream, so a driver can evaluate a unit before the following one is read.
//! When input stops inside an open construct the reader reports
//! [`ReadError::Incomplete`] instead of a syntax error, which lets an
//! interactive loop ask for a continuation line.
//!
//! # Shapes
//!
//! ```text
//! echo a b              (echo a b)
//! define x: integer 0   (define x (integer 0))
//! a | b | c             (| (a) (b) (c))
//! a && b || c           (|| (&& (a) (b)) (c))
//! echo hi > f           (> f (echo hi))
//! a; b &                (& (; (a) (b)))
//! { a; b }              (block (a) (b))
//! ```
//!
//! The datum reader ([`read_data`], [`read_datum`]) parses the printable value
//! syntax: atoms, strings and parenthesized lists, with no operators.

use std::collections::VecDeque;

use thiserror::Error;

use crate::ast::{Node, Op};
use crate::lexer::{self, Spanned, Token};

/// Errors reported by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Input ended while a construct was still open.
    #[error("incomplete input")]
    Incomplete,
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },
}

impl ReadError {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ReadError::Incomplete)
    }
}

type ReadResult<T> = Result<T, ReadError>;

/// Lazy reader over one source text.
pub struct Reader {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
    end: usize,
    pending: VecDeque<Node>,
    failed: Option<ReadError>,
}

impl Reader {
    pub fn new(source: &str) -> Self {
        let (tokens, failed) = match lexer::tokenize(source) {
            Ok(tokens) => (tokens, None),
            Err(err) => (
                Vec::new(),
                Some(ReadError::Syntax {
                    message: err.token.to_string(),
                    offset: err.span.start,
                }),
            ),
        };
        Self {
            tokens,
            pos: 0,
            end: source.len(),
            pending: VecDeque::new(),
            failed,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|t| t.token.clone());
        self.pos += 1;
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or(self.end)
    }

    fn error<T>(&self, message: impl Into<String>) -> ReadResult<T> {
        Err(ReadError::Syntax {
            message: message.into(),
            offset: self.offset(),
        })
    }

    fn unexpected<T>(&self) -> ReadResult<T> {
        match self.peek() {
            None => Err(ReadError::Incomplete),
            Some(Token::UnterminatedString | Token::TrailingBackslash) => {
                Err(ReadError::Incomplete)
            }
            Some(token) => {
                let message = format!("unexpected {}", token);
                self.error(message)
            }
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Newline | Token::Semi)) {
            self.pos += 1;
        }
    }

    /// True at a token that ends a job list.
    fn at_list_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::Newline | Token::RBrace | Token::RParen)
        )
    }

    /// Parse one line's worth of statements.
    ///
    /// Statements before a `&` are grouped and backgrounded together; the
    /// rest are returned as separate units.
    fn job_list(&mut self) -> ReadResult<Vec<Node>> {
        let mut units = Vec::new();
        let mut group: Vec<Node> = Vec::new();
        loop {
            while matches!(self.peek(), Some(Token::Semi)) {
                self.pos += 1;
            }
            if self.at_list_end() {
                break;
            }
            group.push(self.and_or()?);
            match self.peek() {
                Some(Token::Semi) => {
                    self.pos += 1;
                }
                Some(Token::Amp) => {
                    self.pos += 1;
                    let body = if group.len() == 1 {
                        group.remove(0)
                    } else {
                        Node::op(Op::Seq, group.drain(..))
                    };
                    units.push(Node::op(Op::Background, [body]));
                }
                _ if self.at_list_end() => {}
                _ => return self.unexpected(),
            }
        }
        units.extend(group);
        Ok(units)
    }

    fn and_or(&mut self) -> ReadResult<Node> {
        let mut left = self.pipeline()?;
        loop {
            let op = match self.peek() {
                Some(Token::AndAnd) => Op::And,
                Some(Token::OrOr) => Op::Or,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.skip_newlines();
            let right = self.pipeline()?;
            left = Node::op(op, [left, right]);
        }
    }

    fn pipeline(&mut self) -> ReadResult<Node> {
        let mut stages = vec![self.command()?];
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.pos += 1;
            self.skip_newlines();
            stages.push(self.command()?);
        }
        if stages.len() == 1 {
            Ok(stages.remove(0))
        } else {
            Ok(Node::op(Op::Pipe, stages))
        }
    }

    fn command(&mut self) -> ReadResult<Node> {
        let mut words = Vec::new();
        let mut redirects: Vec<(Op, Node)> = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Gt) => Op::RedirectOut,
                Some(Token::GtGt) => Op::RedirectAppend,
                Some(Token::Lt) => Op::RedirectIn,
                Some(Token::Colon) => {
                    self.pos += 1;
                    if words.is_empty() {
                        return self.error("':' must follow a command word");
                    }
                    words.push(self.command()?);
                    break;
                }
                _ => match self.word()? {
                    Some(word) => {
                        words.push(word);
                        continue;
                    }
                    None => break,
                },
            };
            self.pos += 1;
            match self.word()? {
                Some(target) => redirects.push((op, target)),
                None => return self.unexpected(),
            }
        }
        if words.is_empty() {
            if !redirects.is_empty() {
                return self.error("redirection without a command");
            }
            return self.unexpected();
        }
        let mut node = Node::list(words);
        for (op, target) in redirects {
            node = Node::op(op, [target, node]);
        }
        Ok(node)
    }

    /// One word of a command, or `None` at a token that cannot start one.
    fn word(&mut self) -> ReadResult<Option<Node>> {
        let node = match self.peek() {
            Some(Token::Word(w)) => Node::Atom(w.clone()),
            Some(Token::String(s) | Token::SingleString(s)) => Node::Str(s.clone()),
            Some(Token::UnterminatedString | Token::TrailingBackslash) => {
                return Err(ReadError::Incomplete);
            }
            Some(Token::LParen) => {
                self.pos += 1;
                return self.parenthesized().map(Some);
            }
            Some(Token::LBrace) => {
                self.pos += 1;
                return self.block().map(Some);
            }
            _ => return Ok(None),
        };
        self.pos += 1;
        Ok(Some(node))
    }

    fn parenthesized(&mut self) -> ReadResult<Node> {
        let mut units = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None => return Err(ReadError::Incomplete),
                Some(Token::RParen) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::RBrace) => return self.unexpected(),
                _ => units.extend(self.job_list()?),
            }
        }
        Ok(match units.len() {
            0 => Node::list(Vec::new()),
            1 => units.remove(0),
            _ => block(units),
        })
    }

    fn block(&mut self) -> ReadResult<Node> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None => return Err(ReadError::Incomplete),
                Some(Token::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::RParen) => return self.unexpected(),
                _ => statements.extend(self.job_list()?),
            }
        }
        Ok(block(statements))
    }
}

fn block(statements: Vec<Node>) -> Node {
    let mut items = Vec::with_capacity(statements.len() + 1);
    items.push(Node::atom("block"));
    items.extend(statements);
    Node::list(items)
}

impl Iterator for Reader {
    type Item = ReadResult<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(node) = self.pending.pop_front() {
            return Some(Ok(node));
        }
        if let Some(err) = self.failed.take() {
            self.pos = self.tokens.len();
            return Some(Err(err));
        }
        self.skip_separators();
        self.peek()?;
        if matches!(self.peek(), Some(Token::RBrace | Token::RParen)) {
            let err = self.unexpected::<()>().err();
            self.pos = self.tokens.len();
            return err.map(Err);
        }
        match self.job_list() {
            Ok(units) => {
                if matches!(self.peek(), Some(Token::RBrace | Token::RParen)) {
                    // Hand out what parsed cleanly, then report the closer.
                    self.failed = self.unexpected::<()>().err();
                }
                self.pending.extend(units);
                self.next()
            }
            Err(err) => {
                self.pos = self.tokens.len();
                Some(Err(err))
            }
        }
    }
}

/// Read every unit in `source`.
pub fn read_all(source: &str) -> ReadResult<Vec<Node>> {
    Reader::new(source).collect()
}

/// Read the printable value syntax: a sequence of data.
pub fn read_data(text: &str) -> ReadResult<Vec<Node>> {
    let tokens = lexer::tokenize_data(text).map_err(|err| ReadError::Syntax {
        message: err.token.to_string(),
        offset: err.span.start,
    })?;
    let mut data = DatumReader {
        source: text,
        tokens,
        pos: 0,
    };
    let mut out = Vec::new();
    while let Some(datum) = data.datum()? {
        out.push(datum);
    }
    Ok(out)
}

/// Read exactly one datum.
pub fn read_datum(text: &str) -> ReadResult<Node> {
    let mut data = read_data(text)?;
    match data.len() {
        1 => Ok(data.remove(0)),
        n => Err(ReadError::Syntax {
            message: format!("expected one datum, found {}", n),
            offset: 0,
        }),
    }
}

struct DatumReader<'a> {
    source: &'a str,
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

impl DatumReader<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.pos += 1;
        }
    }

    fn datum(&mut self) -> ReadResult<Option<Node>> {
        self.skip_newlines();
        let Some(spanned) = self.tokens.get(self.pos) else {
            return Ok(None);
        };
        let (token, span) = (spanned.token.clone(), spanned.span.clone());
        self.pos += 1;
        let node = match token {
            Token::LParen => {
                let mut items = Vec::new();
                loop {
                    self.skip_newlines();
                    match self.peek() {
                        None => return Err(ReadError::Incomplete),
                        Some(Token::RParen) => {
                            self.pos += 1;
                            break;
                        }
                        _ => items.extend(self.datum()?),
                    }
                }
                Node::list(items)
            }
            Token::RParen => {
                return Err(ReadError::Syntax {
                    message: "unbalanced ')'".into(),
                    offset: span.start,
                });
            }
            Token::Word(w) => Node::Atom(w),
            Token::String(s) | Token::SingleString(s) => Node::Str(s),
            Token::UnterminatedString | Token::TrailingBackslash => {
                return Err(ReadError::Incomplete);
            }
            other => match other.punctuation() {
                Some(text) => Node::atom(text),
                None => Node::Atom(self.source[span].to_string()),
            },
        };
        Ok(Some(node))
    }
}
