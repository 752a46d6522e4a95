use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result};

/// Keys are kept as their textual form; EDN symbols, keywords and integers
/// all normalize to a `String`.
pub type Key = String;

/// Identity of an operation inside a history: the record index assigned by
/// whatever produced the history.
///
/// Graphs refer to operations through their `OpId`; the ops themselves live
/// once, in the [`History`](crate::history::History) arena.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub u64);

impl Display for OpId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of an operation record.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpType {
    /// The client issued the transaction; the outcome is not known yet.
    Invoke,
    /// The transaction committed.
    Ok,
    /// The transaction definitely did not take effect.
    Fail,
    /// The outcome is indeterminate: it may or may not have taken effect.
    Info,
}

impl Display for OpType {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let name = match self {
            Self::Invoke => ":invoke",
            Self::Ok => ":ok",
            Self::Fail => ":fail",
            Self::Info => ":info",
        };
        f.write_str(name)
    }
}

/// A value observed by a read: a list of appended elements, or a register
/// value.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Int(i64),
    List(Vec<i64>),
}

impl Value {
    #[must_use]
    pub fn as_list(&self) -> Option<&[i64]> {
        match self {
            Self::List(elements) => Some(elements),
            Self::Int(_) => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::List(_) => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::List(elements) => write!(f, "{}", Elements(elements)),
        }
    }
}

/// Renders a slice of list elements as an EDN vector: `[1 2 3]`.
#[derive(Debug, Clone, Copy)]
pub struct Elements<'a>(pub &'a [i64]);

impl Display for Elements<'_> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str("[")?;
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{element}")?;
        }
        f.write_str("]")
    }
}

/// Renders a key as an EDN symbol or integer when it reads back as one, and
/// as a quoted string otherwise: `x`, `12`, `"a b"`.
#[derive(Debug, Clone, Copy)]
pub struct KeyName<'a>(pub &'a str);

impl KeyName<'_> {
    fn is_bare(self) -> bool {
        let key = self.0;
        if let Ok(int) = key.parse::<i64>() {
            return int.to_string() == key;
        }
        let mut chars = key.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        (first.is_ascii_alphabetic() || "_*+!?<>=/.".contains(first))
            && chars.all(|c| {
                !c.is_whitespace()
                    && !matches!(c, ',' | ';' | '"' | '[' | ']' | '{' | '}' | '(' | ')')
            })
            && !matches!(key, "nil" | "true" | "false")
    }
}

impl Display for KeyName<'_> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        if self.is_bare() {
            return f.write_str(self.0);
        }
        f.write_str("\"")?;
        for c in self.0.chars() {
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
}

/// A micro-operation: one read, append or register write of one key.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "serde_repr::RawMop", into = "serde_repr::RawMop")
)]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mop {
    Read {
        key: Key,
        // None: the read happened but observed no value at all
        value: Option<Value>,
    },
    Append {
        key: Key,
        value: i64,
    },
    Write {
        key: Key,
        value: i64,
    },
}

impl Mop {
    pub fn read(key: impl Into<Key>, value: Option<Value>) -> Self {
        Self::Read {
            key: key.into(),
            value,
        }
    }

    pub fn read_nil(key: impl Into<Key>) -> Self {
        Self::read(key, None)
    }

    pub fn read_list(key: impl Into<Key>, elements: Vec<i64>) -> Self {
        Self::read(key, Some(Value::List(elements)))
    }

    pub fn read_int(key: impl Into<Key>, value: i64) -> Self {
        Self::read(key, Some(Value::Int(value)))
    }

    pub fn append(key: impl Into<Key>, value: i64) -> Self {
        Self::Append {
            key: key.into(),
            value,
        }
    }

    pub fn write(key: impl Into<Key>, value: i64) -> Self {
        Self::Write {
            key: key.into(),
            value,
        }
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        match self {
            Self::Read { key, .. } | Self::Append { key, .. } | Self::Write { key, .. } => key,
        }
    }

    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }

    /// Elements observed by a list read. A read of nothing yields an empty
    /// slice; writes and register reads yield `None`.
    #[must_use]
    pub fn read_elements(&self) -> Option<&[i64]> {
        match self {
            Self::Read { value: None, .. } => Some(&[]),
            Self::Read {
                value: Some(value), ..
            } => value.as_list(),
            Self::Append { .. } | Self::Write { .. } => None,
        }
    }
}

impl Display for Mop {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Read { key, value: None } => write!(f, "[:r {} nil]", KeyName(key)),
            Self::Read {
                key,
                value: Some(value),
            } => write!(f, "[:r {} {value}]", KeyName(key)),
            Self::Append { key, value } => write!(f, "[:append {} {value}]", KeyName(key)),
            Self::Write { key, value } => write!(f, "[:w {} {value}]", KeyName(key)),
        }
    }
}

/// One transaction attempt: its index, the process that ran it, its outcome
/// and its micro-operations in program order.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Op {
    pub index: OpId,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: OpType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub process: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub value: Vec<Mop>,
}

impl Op {
    #[must_use]
    pub const fn new(kind: OpType, value: Vec<Mop>) -> Self {
        Self {
            index: OpId(0),
            kind,
            process: None,
            value,
        }
    }

    #[must_use]
    pub const fn ok(value: Vec<Mop>) -> Self {
        Self::new(OpType::Ok, value)
    }

    #[must_use]
    pub const fn with_index(mut self, index: u64) -> Self {
        self.index = OpId(index);
        self
    }

    #[must_use]
    pub const fn with_process(mut self, process: u64) -> Self {
        self.process = Some(process);
        self
    }

    #[must_use]
    pub const fn id(&self) -> OpId {
        self.index
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.kind == OpType::Ok
    }

    #[must_use]
    pub fn is_info(&self) -> bool {
        self.kind == OpType::Info
    }

    /// Whether the writes of this op may be visible to others: it committed,
    /// or its outcome is unknown.
    #[must_use]
    pub fn may_have_committed(&self) -> bool {
        matches!(self.kind, OpType::Ok | OpType::Info)
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{{:type {}, :value [", self.kind)?;
        for (i, mop) in self.value.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{mop}")?;
        }
        f.write_str("]")?;
        if let Some(process) = self.process {
            write!(f, ", :process {process}")?;
        }
        write!(f, ", :index {}}}", self.index)
    }
}

#[cfg(feature = "serde")]
mod serde_repr {
    //! Jepsen's JSON shape for micro-operations: `["append", "x", 1]`,
    //! `["r", "x", [1, 2]]`, `["r", "x", null]`, `["w", "x", 3]`.

    use alloc::string::{String, ToString};
    use core::fmt::{Display, Formatter, Result};

    use super::{Mop, Value};

    #[derive(::serde::Serialize, ::serde::Deserialize)]
    #[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
    pub enum MopFn {
        #[serde(rename = "r")]
        Read,
        #[serde(rename = "append")]
        Append,
        #[serde(rename = "w")]
        Write,
    }

    #[derive(::serde::Serialize, ::serde::Deserialize)]
    #[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
    #[serde(untagged)]
    pub enum RawKey {
        Int(i64),
        Str(String),
    }

    #[derive(::serde::Serialize, ::serde::Deserialize)]
    #[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
    pub struct RawMop(pub MopFn, pub RawKey, pub Option<Value>);

    #[derive(Debug)]
    pub struct MopShapeError(&'static str);

    impl Display for MopShapeError {
        fn fmt(&self, f: &mut Formatter) -> Result {
            f.write_str(self.0)
        }
    }

    impl TryFrom<RawMop> for Mop {
        type Error = MopShapeError;

        fn try_from(
            RawMop(function, key, value): RawMop,
        ) -> core::result::Result<Self, Self::Error> {
            let key = match key {
                RawKey::Int(key) => key.to_string(),
                RawKey::Str(key) => key,
            };
            match (function, value) {
                (MopFn::Read, value) => Ok(Self::Read { key, value }),
                (MopFn::Append, Some(Value::Int(value))) => Ok(Self::Append { key, value }),
                (MopFn::Write, Some(Value::Int(value))) => Ok(Self::Write { key, value }),
                (MopFn::Append | MopFn::Write, _) => {
                    Err(MopShapeError("appends and writes take a single integer"))
                }
            }
        }
    }

    impl From<Mop> for RawMop {
        fn from(mop: Mop) -> Self {
            match mop {
                Mop::Read { key, value } => Self(MopFn::Read, RawKey::Str(key), value),
                Mop::Append { key, value } => {
                    Self(MopFn::Append, RawKey::Str(key), Some(Value::Int(value)))
                }
                Mop::Write { key, value } => {
                    Self(MopFn::Write, RawKey::Str(key), Some(Value::Int(value)))
                }
            }
        }
    }

    #[cfg(feature = "schemars")]
    impl ::schemars::JsonSchema for Mop {
        fn schema_name() -> alloc::borrow::Cow<'static, str> {
            "Mop".into()
        }

        fn json_schema(generator: &mut ::schemars::SchemaGenerator) -> ::schemars::Schema {
            RawMop::json_schema(generator)
        }
    }
}
