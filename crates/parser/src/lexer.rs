//! Logos-based lexer for EDN histories.
//!
//! A Jepsen history file is a sequence of EDN maps, one per operation
//! record, optionally wrapped in a single top-level vector or list:
//!
//! ```text
//! {:type :invoke, :f :txn, :value [[:append x 1] [:r y nil]], :process 0, :index 0}
//! {:type :ok, :f :txn, :value [[:append x 1] [:r y [2]]], :process 0, :index 1}
//! ```
//!
//! The lexer does not build values; it finds the byte span of every record
//! so that each can be parsed (and reported on) independently.

use core::ops::Range;

use crate::parser::{offset_to_line_col, ParseError};

/// All token kinds produced by the EDN lexer.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::logos::Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A line comment starting with `;`.
    #[regex(r";[^\n]*", allow_greedy = true)]
    Comment,

    #[token("{")]
    BraceOpen,

    #[token("}")]
    BraceClose,

    #[token("[")]
    BracketOpen,

    #[token("]")]
    BracketClose,

    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    /// A keyword such as `:type` or `:append`.
    #[regex(r":[^\s,\[\]{}()]+")]
    Keyword,

    /// A possibly negative integer literal.
    #[regex(r"-?[0-9]+")]
    Integer,

    /// A double-quoted string with backslash escapes.
    #[regex(r#""([^"\\]|\\.)*""#)]
    String,

    /// A bare symbol, including `nil`, `true` and `false`.
    #[regex(r"[a-zA-Z_*+!?<>=/.][^\s,\[\]{}()]*")]
    Symbol,

    /// Whitespace; commas count as whitespace in EDN.
    #[regex(r"[ \t\r\n,]+")]
    Whitespace,
}

impl TokenKind {
    const fn is_trivia(self) -> bool {
        matches!(self, Self::Comment | Self::Whitespace)
    }
}

/// A single token with its kind and the byte-offset span in the source.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range `start..end` into the original input string.
    pub span: Range<usize>,
}

impl Token {
    #[must_use]
    pub const fn new(kind: TokenKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    /// Return the source text for this token given the original input.
    #[must_use]
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.span.clone()]
    }
}

/// Tokenize `input`.
///
/// # Errors
///
/// Returns a [`ParseError`] at the first character that starts no token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    use logos::Logos as _;
    TokenKind::lexer(input)
        .spanned()
        .map(|(result, span)| match result {
            Ok(kind) => Ok(Token::new(kind, span)),
            Err(()) => Err(error_at(input, span.start, "unexpected character")),
        })
        .collect()
}

/// Byte spans of the top-level records of a history.
///
/// Records are maps at the top level, or directly inside one outermost
/// vector or list.
///
/// # Errors
///
/// Returns a [`ParseError`] for unrecognized characters, unbalanced
/// delimiters, and top-level values that are not records.
pub fn records(input: &str) -> Result<Vec<Range<usize>>, ParseError> {
    let mut records = Vec::new();
    let mut open: Vec<(TokenKind, usize)> = Vec::new();
    let mut wrapped = false;
    let mut start = None;

    for token in tokenize(input)? {
        if token.kind.is_trivia() {
            continue;
        }
        let at_top = open.len() == usize::from(wrapped);
        match token.kind {
            TokenKind::BraceOpen => {
                if at_top {
                    start = Some(token.span.start);
                }
                open.push((token.kind, token.span.start));
            }
            TokenKind::BracketOpen | TokenKind::ParenOpen => {
                if open.is_empty() && !wrapped && records.is_empty() {
                    wrapped = true;
                } else if at_top {
                    return Err(error_at(input, token.span.start, "expected a record"));
                }
                open.push((token.kind, token.span.start));
            }
            TokenKind::BraceClose | TokenKind::BracketClose | TokenKind::ParenClose => {
                let expected = match token.kind {
                    TokenKind::BraceClose => TokenKind::BraceOpen,
                    TokenKind::BracketClose => TokenKind::BracketOpen,
                    _ => TokenKind::ParenOpen,
                };
                match open.pop() {
                    Some((kind, _)) if kind == expected => {}
                    _ => return Err(error_at(input, token.span.start, "unbalanced delimiter")),
                }
                if open.len() == usize::from(wrapped) {
                    if let Some(start) = start.take() {
                        records.push(start..token.span.end);
                    }
                }
                if open.is_empty() {
                    wrapped = false;
                }
            }
            _ if at_top => {
                return Err(error_at(input, token.span.start, "expected a record"));
            }
            _ => {}
        }
    }

    if let Some(&(_, position)) = open.last() {
        return Err(error_at(input, position, "unclosed delimiter"));
    }
    tracing::trace!(records = records.len(), wrapped, "framed records");
    Ok(records)
}

fn error_at(input: &str, offset: usize, message: &str) -> ParseError {
    let (line, column) = offset_to_line_col(input, offset);
    ParseError {
        message: message.to_string(),
        line,
        column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let input = "{:type :ok, :value [[:r x nil]]} ; done";
        let kinds: Vec<TokenKind> = tokenize(input)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .filter(|kind| !kind.is_trivia())
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::BraceOpen,
                TokenKind::Keyword,
                TokenKind::Keyword,
                TokenKind::Keyword,
                TokenKind::BracketOpen,
                TokenKind::BracketOpen,
                TokenKind::Keyword,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::BracketClose,
                TokenKind::BracketClose,
                TokenKind::BraceClose,
            ]
        );
    }

    #[test]
    fn test_token_text() {
        let input = "{:index -12}";
        let tokens = tokenize(input).unwrap();
        let integer = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Integer)
            .unwrap();
        assert_eq!(integer.text(input), "-12");
    }

    #[test]
    fn test_records_one_per_line() {
        let input = "{:type :ok}\n; comment\n{:type :fail, :value [[:append x 1]]}\n";
        let spans = records(input).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(&input[spans[0].clone()], "{:type :ok}");
        assert_eq!(
            &input[spans[1].clone()],
            "{:type :fail, :value [[:append x 1]]}"
        );
    }

    #[test]
    fn test_records_in_a_vector() {
        let input = "[{:index 0}\n {:index 1}]";
        let spans = records(input).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(&input[spans[1].clone()], "{:index 1}");
        assert!(records("").unwrap().is_empty());
    }

    #[test]
    fn test_records_errors() {
        let err = records("{:type :ok}\n{:type :ok").unwrap_err();
        assert_eq!((err.line, err.column), (2, 1));
        assert_eq!(err.message, "unclosed delimiter");

        let err = records("{:type :ok}]").unwrap_err();
        assert_eq!(err.message, "unbalanced delimiter");

        let err = records("{:type :ok} :stray").unwrap_err();
        assert_eq!((err.line, err.column), (1, 13));

        let err = records("{:value \"open}").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
