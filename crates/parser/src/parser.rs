//! Winnow-based parser for Jepsen EDN histories.
//!
//! Grammar (the subset of EDN that histories use):
//! ```text
//! value   = ws (map | vector | list | string | atom)
//! map     = "{" (value value)* ws "}"
//! vector  = "[" value* ws "]"
//! list    = "(" value* ws ")"
//! string  = '"' (CHAR | "\" CHAR)* '"'
//! atom    = nil | true | false | INTEGER | ":" NAME | SYMBOL
//! ws      = (WHITESPACE | "," | ";" REST_OF_LINE)*
//! ```
//!
//! A record is a map with `:type`, `:value`, and optionally `:process` and
//! `:index`; other keys such as `:f` and `:time` are ignored. Each
//! micro-operation is a vector `[f key value]` with `f` one of `:r`,
//! `:append` and `:w`.

use core::ops::Range;

use cyclops_core::history::types::{Key, Mop, Op, OpId, OpType, Value};
use winnow::ascii::till_line_ending;
use winnow::combinator::{alt, delimited, preceded, repeat, terminated};
use winnow::prelude::*;
use winnow::token::{any, none_of, take_while};
use winnow::ModalResult;

use crate::lexer;

// ---------------------------------------------------------------------------
// Public error type
// ---------------------------------------------------------------------------

/// A parse error with human-readable location information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Parse an EDN history into operation records.
///
/// Records without a numeric `:process` (for instance those of a
/// `:nemesis`) are not client transactions and are skipped. Records
/// without an `:index` are numbered by their position in the file.
///
/// # Errors
///
/// Returns a [`ParseError`] with line/column information when the input is
/// not valid EDN or a record does not describe an operation.
pub fn parse_history(input: &str) -> Result<Vec<Op>, ParseError> {
    let spans = lexer::records(input)?;
    let mut ops = Vec::with_capacity(spans.len());
    for (position, span) in spans.into_iter().enumerate() {
        let start = span.start;
        let record = parse_record(input, span)?;
        let op = record_to_op(&record, position as u64)
            .map_err(|message| error_at(input, start, message))?;
        ops.extend(op);
    }
    tracing::debug!(ops = ops.len(), "parsed history");
    Ok(ops)
}

/// Rewrite an EDN history as one record per line in canonical spacing.
///
/// Every record is kept with all of its fields, including records of
/// non-client processes and fields such as `:f` and `:time` that operations
/// do not carry. Comments are not kept.
///
/// # Errors
///
/// Returns a [`ParseError`] under the same conditions as [`parse_history`].
pub fn format_records(input: &str) -> Result<String, ParseError> {
    let spans = lexer::records(input)?;
    let mut output = String::with_capacity(input.len());
    for (position, span) in spans.into_iter().enumerate() {
        let start = span.start;
        let record = parse_record(input, span)?;
        record_to_op(&record, position as u64)
            .map_err(|message| error_at(input, start, message))?;
        output.push_str(&record.to_string());
        output.push('\n');
    }
    Ok(output)
}

/// Parse a single operation record such as
/// `{:type :ok, :value [[:append x 1]], :process 0, :index 3}`.
///
/// # Errors
///
/// Returns a [`ParseError`] when the input is not a single operation record
/// of a client process.
pub fn parse_op(input: &str) -> Result<Op, ParseError> {
    let record = parse_record(input, 0..input.len())?;
    match record_to_op(&record, 0) {
        Ok(Some(op)) => Ok(op),
        Ok(None) => Err(error_at(input, 0, "record has no client process".into())),
        Err(message) => Err(error_at(input, 0, message)),
    }
}

/// Parse a single EDN value.
///
/// # Errors
///
/// Returns a [`ParseError`] when `input` is not exactly one EDN value.
pub fn parse_edn(input: &str) -> Result<Edn, ParseError> {
    parse_record(input, 0..input.len())
}

fn parse_record(input: &str, span: Range<usize>) -> Result<Edn, ParseError> {
    let source = &input[span.clone()];
    let mut stream: &str = source;
    let result = terminated(value, ws).parse_next(&mut stream);
    let consumed = span.start + source.len().saturating_sub(stream.len());
    match result {
        Ok(edn) if stream.is_empty() => Ok(edn),
        Ok(_) => Err(error_at(input, consumed, "unexpected trailing input".into())),
        Err(_) => Err(error_at(input, consumed, "invalid EDN value".into())),
    }
}

// ---------------------------------------------------------------------------
// Line/column helper
// ---------------------------------------------------------------------------

/// Convert a byte offset into the original input to 1-based (line, column).
pub(crate) fn offset_to_line_col(input: &str, offset: usize) -> (usize, usize) {
    let safe_offset = offset.min(input.len());
    let prefix = &input[..safe_offset];
    let line = prefix.bytes().filter(|&b| b == b'\n').count() + 1;
    let column = prefix
        .rfind('\n')
        .map_or_else(|| prefix.len() + 1, |pos| prefix.len() - pos);
    (line, column)
}

fn error_at(input: &str, offset: usize, message: String) -> ParseError {
    let (line, column) = offset_to_line_col(input, offset);
    ParseError {
        message,
        line,
        column,
    }
}

// ---------------------------------------------------------------------------
// EDN values
// ---------------------------------------------------------------------------

/// An EDN value. Keywords and symbols are stored without the leading `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edn {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Keyword(String),
    Symbol(String),
    Vector(Vec<Edn>),
    List(Vec<Edn>),
    Map(Vec<(Edn, Edn)>),
}

impl Edn {
    /// The value stored under keyword `name`, if this is a map.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Self> {
        let Self::Map(entries) = self else {
            return None;
        };
        entries
            .iter()
            .find(|(key, _)| matches!(key, Self::Keyword(k) if k == name))
            .map(|(_, value)| value)
    }

    /// The elements of a vector or list.
    #[must_use]
    pub fn items(&self) -> Option<&[Self]> {
        match self {
            Self::Vector(items) | Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl core::fmt::Display for Edn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fn seq(f: &mut core::fmt::Formatter<'_>, items: &[Edn]) -> core::fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(text) => {
                f.write_str("\"")?;
                for c in text.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::Keyword(name) => write!(f, ":{name}"),
            Self::Symbol(name) => f.write_str(name),
            Self::Vector(items) => {
                f.write_str("[")?;
                seq(f, items)?;
                f.write_str("]")
            }
            Self::List(items) => {
                f.write_str("(")?;
                seq(f, items)?;
                f.write_str(")")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key} {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

/// Whitespace, commas and `;` comments.
fn ws(input: &mut &str) -> ModalResult<()> {
    repeat::<_, _, (), _, _>(
        0..,
        alt((
            take_while(1.., |c: char| c.is_whitespace() || c == ',').void(),
            (';', till_line_ending).void(),
        )),
    )
    .parse_next(input)
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, ',' | ';' | '"' | '[' | ']' | '{' | '}' | '(' | ')')
}

// ---------------------------------------------------------------------------
// Value parsers
// ---------------------------------------------------------------------------

fn value(input: &mut &str) -> ModalResult<Edn> {
    ws.parse_next(input)?;
    alt((map, vector, list, string.map(Edn::Str), atom)).parse_next(input)
}

/// `nil`, booleans, integers, keywords and symbols.
fn atom(input: &mut &str) -> ModalResult<Edn> {
    take_while(1.., is_atom_char)
        .map(|text: &str| match text {
            "nil" => Edn::Nil,
            "true" => Edn::Bool(true),
            "false" => Edn::Bool(false),
            _ => match text.strip_prefix(':') {
                Some(name) => Edn::Keyword(name.to_string()),
                None => text
                    .parse()
                    .map_or_else(|_| Edn::Symbol(text.to_string()), Edn::Int),
            },
        })
        .parse_next(input)
}

fn string(input: &mut &str) -> ModalResult<String> {
    delimited(
        '"',
        repeat(0.., string_char).fold(String::new, |mut text, c| {
            text.push(c);
            text
        }),
        '"',
    )
    .parse_next(input)
}

fn string_char(input: &mut &str) -> ModalResult<char> {
    alt((
        none_of(['"', '\\']),
        preceded(
            '\\',
            alt(('n'.value('\n'), 't'.value('\t'), 'r'.value('\r'), any)),
        ),
    ))
    .parse_next(input)
}

fn vector(input: &mut &str) -> ModalResult<Edn> {
    delimited('[', repeat(0.., value), (ws, ']'))
        .map(Edn::Vector)
        .parse_next(input)
}

fn list(input: &mut &str) -> ModalResult<Edn> {
    delimited('(', repeat(0.., value), (ws, ')'))
        .map(Edn::List)
        .parse_next(input)
}

fn map(input: &mut &str) -> ModalResult<Edn> {
    delimited('{', repeat(0.., (value, value)), (ws, '}'))
        .map(Edn::Map)
        .parse_next(input)
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Convert a record to an op, or `None` for records of non-client processes.
fn record_to_op(record: &Edn, position: u64) -> Result<Option<Op>, String> {
    if !matches!(record, Edn::Map(_)) {
        return Err("a record must be a map".into());
    }
    let kind = match record.get("type") {
        Some(Edn::Keyword(kind)) => match kind.as_str() {
            "invoke" => OpType::Invoke,
            "ok" => OpType::Ok,
            "fail" => OpType::Fail,
            "info" => OpType::Info,
            _ => return Err(format!("unknown :type :{kind}")),
        },
        _ => return Err("missing :type".into()),
    };
    let process = match record.get("process") {
        None | Some(Edn::Nil) => None,
        Some(Edn::Int(process)) => Some(
            u64::try_from(*process).map_err(|_| format!("negative :process {process}"))?,
        ),
        Some(Edn::Keyword(_) | Edn::Symbol(_)) => return Ok(None),
        Some(other) => return Err(format!(":process must be an integer, got {other:?}")),
    };
    let index = match record.get("index") {
        None => position,
        Some(Edn::Int(index)) => {
            u64::try_from(*index).map_err(|_| format!("negative :index {index}"))?
        }
        Some(other) => return Err(format!(":index must be an integer, got {other:?}")),
    };
    let value = match record.get("value") {
        None | Some(Edn::Nil) => Vec::new(),
        Some(mops) => mops
            .items()
            .ok_or_else(|| ":value must be a vector of micro-operations".to_string())?
            .iter()
            .map(mop)
            .collect::<Result<_, _>>()?,
    };
    Ok(Some(Op {
        index: OpId(index),
        kind,
        process,
        value,
    }))
}

fn key(edn: &Edn) -> Result<Key, String> {
    match edn {
        Edn::Int(key) => Ok(key.to_string()),
        Edn::Keyword(key) | Edn::Symbol(key) | Edn::Str(key) => Ok(key.clone()),
        other => Err(format!("invalid key {other:?}")),
    }
}

fn int(edn: &Edn) -> Result<i64, String> {
    match edn {
        Edn::Int(value) => Ok(*value),
        other => Err(format!("expected an integer, got {other:?}")),
    }
}

fn mop(edn: &Edn) -> Result<Mop, String> {
    let [Edn::Keyword(f), k, v] = edn.items().unwrap_or_default() else {
        return Err(format!("a micro-operation must be [f key value], got {edn:?}"));
    };
    let key = key(k)?;
    match f.as_str() {
        "r" | "read" => {
            let value = match v {
                Edn::Nil => None,
                Edn::Int(value) => Some(Value::Int(*value)),
                list => {
                    let elements = list
                        .items()
                        .ok_or_else(|| format!("invalid read value {list:?}"))?
                        .iter()
                        .map(int)
                        .collect::<Result<_, _>>()?;
                    Some(Value::List(elements))
                }
            };
            Ok(Mop::read(key, value))
        }
        "append" => Ok(Mop::append(key, int(v)?)),
        "w" | "write" => Ok(Mop::write(key, int(v)?)),
        _ => Err(format!("unknown micro-operation :{f}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use cyclops_core::history::display::format_history;

    use super::*;

    #[test]
    fn test_parse_edn_values() {
        let edn = parse_edn(r#"{:a [1 -2 nil], "s\"q" (x true), :b {}} ; trailing"#)
            .expect("should parse");
        assert_eq!(
            edn,
            Edn::Map(vec![
                (
                    Edn::Keyword("a".into()),
                    Edn::Vector(vec![Edn::Int(1), Edn::Int(-2), Edn::Nil]),
                ),
                (
                    Edn::Str("s\"q".into()),
                    Edn::List(vec![Edn::Symbol("x".into()), Edn::Bool(true)]),
                ),
                (Edn::Keyword("b".into()), Edn::Map(vec![])),
            ])
        );
        assert_eq!(
            edn.get("a").and_then(Edn::items).map(<[Edn]>::len),
            Some(3)
        );
    }

    #[test]
    fn test_parse_op() {
        let op = parse_op(
            "{:type :ok, :f :txn, \
             :value [[:append x 1] [:r y [1 2]] [:r 3 nil] [:w :z 4] [:r z 4]], \
             :process 2, :index 7, :time 123}",
        )
        .expect("should parse");
        assert_eq!(
            op,
            Op::ok(vec![
                Mop::append("x", 1),
                Mop::read_list("y", vec![1, 2]),
                Mop::read_nil("3"),
                Mop::write("z", 4),
                Mop::read_int("z", 4),
            ])
            .with_index(7)
            .with_process(2)
        );
    }

    #[test]
    fn test_parse_history() {
        let input = "\
; a small history
{:type :invoke, :value [[:append x 1]], :process 0}
{:type :info, :f :start-partition, :process :nemesis}
{:type :ok, :value [[:append x 1]], :process 0}
";
        let ops = parse_history(input).expect("should parse");
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind, OpType::Invoke);
        assert_eq!(ops[0].index, OpId(0));
        assert_eq!(ops[1].index, OpId(2));
    }

    #[test]
    fn test_format_round_trip() {
        let ops = vec![
            Op::new(OpType::Invoke, vec![Mop::append("x", 1), Mop::read_nil("y")])
                .with_index(0)
                .with_process(0),
            Op::ok(vec![Mop::append("x", 1), Mop::read_list("y", vec![2])])
                .with_index(1)
                .with_process(0),
            Op::ok(vec![Mop::write("r", 5), Mop::read_int("r", 5)]).with_index(2),
            Op::ok(vec![
                Mop::append("a b", 1),
                Mop::read_nil("nil"),
                Mop::read_list("say \"hi\"", vec![7]),
                Mop::append("007", 2),
            ])
            .with_index(3),
        ];
        let parsed = parse_history(&format_history(&ops)).expect("should parse");
        assert_eq!(parsed, ops);
    }

    #[test]
    fn test_format_records_keeps_every_record() {
        let input = "\
[{:type :invoke,  :f :txn, :value [[:append x 1]], :process 0, :time 10}
 ; partition starts
 {:type :info, :f :start-partition, :value (\"n1\" \"n2\"), :process :nemesis}
 {:type :ok, :f :txn, :value [[:append x 1]], :process 0, :time 12, :error nil}]
";
        let formatted = format_records(input).expect("should format");
        assert_eq!(
            formatted,
            "{:type :invoke, :f :txn, :value [[:append x 1]], :process 0, :time 10}\n\
             {:type :info, :f :start-partition, :value (\"n1\" \"n2\"), :process :nemesis}\n\
             {:type :ok, :f :txn, :value [[:append x 1]], :process 0, :time 12, :error nil}\n"
        );
        assert_eq!(format_records(&formatted), Ok(formatted.clone()));
        assert_eq!(
            parse_history(&formatted).expect("should parse"),
            parse_history(input).expect("should parse")
        );
    }

    #[test]
    fn test_format_records_rejects_bad_records() {
        let err = format_records("{:type :ok, :value [[:cas x 1 2]]}").expect_err("should fail");
        assert!(err.message.contains("[f key value]"), "{err}");
    }

    // -----------------------------------------------------------------------
    // Error tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_record_error_points_at_record() {
        let input = "{:type :ok, :value []}\n{:type :done, :value []}\n";
        let err = parse_history(input).expect_err("should fail");
        assert_eq!((err.line, err.column), (2, 1));
        assert!(err.message.contains(":done"), "{err}");
    }

    #[test]
    fn test_bad_mop() {
        let err = parse_op("{:type :ok, :value [[:cas x 1 2]]}").expect_err("should fail");
        assert!(err.message.contains("[f key value]"), "{err}");
        let err = parse_op("{:type :ok, :value [[:append x nil]]}").expect_err("should fail");
        assert!(err.message.contains("integer"), "{err}");
    }

    #[test]
    fn test_parse_error_display() {
        let err = parse_edn("[1 2").expect_err("should fail");
        let msg = err.to_string();
        assert!(
            msg.contains("parse error"),
            "display should contain 'parse error': {msg}"
        );
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_offset_to_line_col() {
        assert_eq!(offset_to_line_col("hello\nworld\n", 0), (1, 1));
        assert_eq!(offset_to_line_col("hello\nworld\n", 6), (2, 1));
        assert_eq!(offset_to_line_col("hello\nworld\n", 8), (2, 3));
    }
}
