pub mod lexer;
pub mod parser;

pub use lexer::{records, tokenize, Token, TokenKind};
pub use parser::{format_records, parse_edn, parse_history, parse_op, Edn, ParseError};
