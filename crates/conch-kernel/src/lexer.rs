//! Lexer for conch source code.
//!
//! Converts source text into a stream of tokens using the logos lexer generator.
//! The same token set serves two readers: the command reader in [`crate::parser`]
//! and the datum reader used when values cross a pipe as text.
//!
//! # Token Categories
//!
//! - **Words**: bare text such as `echo`, `$x`, `point::clone`, `-la`; a backslash
//!   escapes the next character, and `\n`, `\r`, `\t`, `\0`, `\_` are word escapes
//! - **Strings**: `"..."` with escapes, `'...'` taken literally
//! - **Operators**: `|`, `||`, `&`, `&&`, `;`, `<`, `>`, `>>`, `:`
//! - **Grouping**: `(`, `)`, `{`, `}`
//! - **Structure**: newlines are significant; `#` comments run to end of line

use logos::{Logos, Span};
use std::fmt;

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexerError {
    #[default]
    UnexpectedCharacter,
    InvalidEscape(char),
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter => write!(f, "unexpected character"),
            LexerError::InvalidEscape(c) => write!(f, "invalid escape sequence: \\{}", c),
        }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexerError)]
#[logos(skip r"[ \t]+")]
pub enum Token {
    // ═══════════════════════════════════════════════════════════════════
    // Operators
    // ═══════════════════════════════════════════════════════════════════
    #[token("||")]
    OrOr,

    #[token("|")]
    Pipe,

    #[token("&&")]
    AndAnd,

    #[token("&")]
    Amp,

    #[token(";")]
    Semi,

    #[token(">>")]
    GtGt,

    #[token(">")]
    Gt,

    #[token("<")]
    Lt,

    /// Introduces a nested command: `define x: integer 0`
    #[token(":")]
    Colon,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    // ═══════════════════════════════════════════════════════════════════
    // Literals
    // ═══════════════════════════════════════════════════════════════════

    /// Double-quoted string: value is the content with escapes processed
    #[regex(r#""([^"\\]|\\(.|\n))*""#, lex_string)]
    String(String),

    /// Single-quoted string: literal content, no escape processing
    #[regex(r"'[^']*'", lex_single_string)]
    SingleString(String),

    /// A quote that is still open at end of input
    #[regex(r#""([^"\\]|\\(.|\n))*"#)]
    #[regex(r"'[^']*")]
    UnterminatedString,

    /// Bare word. `::` is part of a word, a lone `:` is not.
    #[regex(r"([^\s|&;<>(){}:'\x22#\\]|::|\\[^\n\r])+", lex_word)]
    Word(String),

    // ═══════════════════════════════════════════════════════════════════
    // Structural tokens
    // ═══════════════════════════════════════════════════════════════════

    /// Comment: `# ...` to end of line
    #[regex(r"#[^\n\r]*", allow_greedy = true)]
    Comment,

    /// Newline (significant: ends a command unit)
    #[regex(r"\n|\r\n")]
    Newline,

    /// Backslash-newline joins two physical lines
    #[regex(r"\\[ \t]*(\n|\r\n)")]
    LineContinuation,

    /// A backslash with nothing after it, only possible at end of input
    #[token("\\")]
    TrailingBackslash,
}

impl Token {
    /// The source text of punctuation and operator tokens.
    ///
    /// The datum reader uses this to keep stray operators from program
    /// output as plain atoms.
    pub fn punctuation(&self) -> Option<&'static str> {
        Some(match self {
            Token::OrOr => "||",
            Token::Pipe => "|",
            Token::AndAnd => "&&",
            Token::Amp => "&",
            Token::Semi => ";",
            Token::GtGt => ">>",
            Token::Gt => ">",
            Token::Lt => "<",
            Token::Colon => ":",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            _ => return None,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.punctuation() {
            return write!(f, "'{}'", text);
        }
        match self {
            Token::String(s) | Token::SingleString(s) => write!(f, "string {:?}", s),
            Token::Word(w) => write!(f, "'{}'", w),
            Token::UnterminatedString => write!(f, "unterminated string"),
            Token::Comment => write!(f, "comment"),
            Token::Newline => write!(f, "newline"),
            Token::LineContinuation => write!(f, "line continuation"),
            Token::TrailingBackslash => write!(f, "'\\'"),
            _ => write!(f, "{:?}", self),
        }
    }
}

fn lex_string(lex: &mut logos::Lexer<Token>) -> Result<String, LexerError> {
    let slice = lex.slice();
    unescape(&slice[1..slice.len() - 1])
}

fn lex_single_string(lex: &mut logos::Lexer<Token>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_string()
}

/// `\n`, `\r`, `\t` and `\0` spell control characters, `\_` spells nothing
/// (the empty word is `\_`), and any other escaped character is itself.
fn lex_word(lex: &mut logos::Lexer<Token>) -> String {
    let mut out = String::with_capacity(lex.slice().len());
    let mut chars = lex.slice().chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('_') | None => {}
            Some(other) => out.push(other),
        }
    }
    out
}

/// Process the escapes allowed inside double-quoted strings.
pub fn unescape(body: &str) -> Result<String, LexerError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('e') => out.push('\x1b'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('$') => out.push('$'),
            // An escaped newline inside a string is a continuation
            Some('\n') => {}
            Some(other) => return Err(LexerError::InvalidEscape(other)),
            None => return Err(LexerError::InvalidEscape('\\')),
        }
    }
    Ok(out)
}

/// Tokenize source text for the command reader.
///
/// Comments and line continuations are dropped.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, Spanned<LexerError>> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(Token::Comment | Token::LineContinuation) => {}
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(err) => return Err(Spanned::new(err, span)),
        }
    }
    Ok(tokens)
}

/// Tokenize text for the datum reader.
///
/// Comments are kept: in data a `#` is just another character, and the
/// caller turns the comment's text back into an atom.
pub fn tokenize_data(text: &str) -> Result<Vec<Spanned<Token>>, Spanned<LexerError>> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(text).spanned() {
        match result {
            Ok(Token::LineContinuation) => {}
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(err) => return Err(Spanned::new(err, span)),
        }
    }
    Ok(tokens)
}
