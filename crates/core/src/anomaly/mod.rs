//! Anomaly taxonomy and the records that witness each anomaly.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result};
use core::str::FromStr;

use crate::consistency::error::Error;
use crate::history::types::{Elements, Key, Mop, Op};

pub mod explain;

pub use explain::{CycleExplainerResult, Explainer, Explanation};

/// Every anomaly the checker can report.
///
/// The declaration order is the order anomalies are reported in.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String", try_from = "String"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnomalyType {
    /// A cycle of write-write dependencies.
    G0,
    G0Process,
    G0Realtime,
    /// A committed read of a value written by a failed transaction.
    G1a,
    /// A committed read of a value another transaction later overwrote
    /// within itself.
    G1b,
    /// A cycle of write-write and write-read dependencies.
    G1c,
    G1cProcess,
    G1cRealtime,
    /// A cycle with exactly one read-write anti-dependency.
    GSingle,
    GSingleProcess,
    GSingleRealtime,
    /// A cycle with two or more read-write anti-dependencies.
    G2Item,
    G2ItemProcess,
    G2ItemRealtime,
    /// A transaction's read disagrees with its own earlier reads and writes.
    Internal,
    /// Two reads of a list are not prefixes of one another.
    IncompatibleOrder,
    /// A read observed the same list element twice.
    DuplicateElements,
    /// The version order inferred for a register is cyclic.
    CyclicVersions,
}

impl AnomalyType {
    pub const ALL: [Self; 18] = [
        Self::G0,
        Self::G0Process,
        Self::G0Realtime,
        Self::G1a,
        Self::G1b,
        Self::G1c,
        Self::G1cProcess,
        Self::G1cRealtime,
        Self::GSingle,
        Self::GSingleProcess,
        Self::GSingleRealtime,
        Self::G2Item,
        Self::G2ItemProcess,
        Self::G2ItemRealtime,
        Self::Internal,
        Self::IncompatibleOrder,
        Self::DuplicateElements,
        Self::CyclicVersions,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::G0 => "G0",
            Self::G0Process => "G0-process",
            Self::G0Realtime => "G0-realtime",
            Self::G1a => "G1a",
            Self::G1b => "G1b",
            Self::G1c => "G1c",
            Self::G1cProcess => "G1c-process",
            Self::G1cRealtime => "G1c-realtime",
            Self::GSingle => "G-single",
            Self::GSingleProcess => "G-single-process",
            Self::GSingleRealtime => "G-single-realtime",
            Self::G2Item => "G2-item",
            Self::G2ItemProcess => "G2-item-process",
            Self::G2ItemRealtime => "G2-item-realtime",
            Self::Internal => "internal",
            Self::IncompatibleOrder => "incompatible-order",
            Self::DuplicateElements => "duplicate-elements",
            Self::CyclicVersions => "cyclic-versions",
        }
    }

    /// Anomalies that are strictly weaker than this one and therefore also
    /// worth reporting when this one is requested: realtime variants imply
    /// process variants imply the plain cycle, and G2-item implies
    /// G-single implies G1c implies G0.
    #[must_use]
    pub const fn implies(self) -> &'static [Self] {
        match self {
            Self::G0Process => &[Self::G0],
            Self::G0Realtime => &[Self::G0Process],
            Self::G1c => &[Self::G0],
            Self::G1cProcess => &[Self::G1c, Self::G0Process],
            Self::G1cRealtime => &[Self::G1cProcess, Self::G0Realtime],
            Self::GSingle => &[Self::G1c],
            Self::GSingleProcess => &[Self::GSingle, Self::G1cProcess],
            Self::GSingleRealtime => &[Self::GSingleProcess, Self::G1cRealtime],
            Self::G2Item => &[Self::GSingle],
            Self::G2ItemProcess => &[Self::G2Item, Self::GSingleProcess],
            Self::G2ItemRealtime => &[Self::G2ItemProcess, Self::GSingleRealtime],
            Self::G0
            | Self::G1a
            | Self::G1b
            | Self::Internal
            | Self::IncompatibleOrder
            | Self::DuplicateElements
            | Self::CyclicVersions => &[],
        }
    }

    /// Whether finding this anomaly needs the process order in the graph.
    #[must_use]
    pub const fn needs_process_order(self) -> bool {
        matches!(
            self,
            Self::G0Process
                | Self::G1cProcess
                | Self::GSingleProcess
                | Self::G2ItemProcess
                | Self::G0Realtime
                | Self::G1cRealtime
                | Self::GSingleRealtime
                | Self::G2ItemRealtime
        )
    }

    /// Whether finding this anomaly needs the realtime order in the graph.
    #[must_use]
    pub const fn needs_realtime_order(self) -> bool {
        matches!(
            self,
            Self::G0Realtime | Self::G1cRealtime | Self::GSingleRealtime | Self::G2ItemRealtime
        )
    }

    /// Expands a configured anomaly name into anomaly types.
    ///
    /// Besides the names of the variants, accepts the aliases `G1` (G1a,
    /// G1b and G1c) and `G2` (G2-item and G-single).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAnomaly`] for any other name.
    pub fn expand(name: &str) -> core::result::Result<Vec<Self>, Error> {
        match name {
            "G1" => Ok(alloc::vec![Self::G1a, Self::G1b, Self::G1c]),
            "G2" => Ok(alloc::vec![Self::G2Item, Self::GSingle]),
            _ => name.parse().map(|anomaly| alloc::vec![anomaly]),
        }
    }

    /// Closes a set of anomaly types under [`implies`](Self::implies).
    #[must_use]
    pub fn closure(anomalies: impl IntoIterator<Item = Self>) -> Vec<Self> {
        let mut closed: Vec<Self> = Vec::new();
        let mut stack: Vec<Self> = anomalies.into_iter().collect();
        while let Some(anomaly) = stack.pop() {
            if closed.contains(&anomaly) {
                continue;
            }
            closed.push(anomaly);
            stack.extend_from_slice(anomaly.implies());
        }
        closed.sort();
        closed
    }
}

impl Display for AnomalyType {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnomalyType {
    type Err = Error;

    fn from_str(name: &str) -> core::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|anomaly| anomaly.name() == name)
            .ok_or_else(|| Error::UnknownAnomaly(name.to_string()))
    }
}

impl From<AnomalyType> for String {
    fn from(anomaly: AnomalyType) -> Self {
        anomaly.name().to_string()
    }
}

impl TryFrom<String> for AnomalyType {
    type Error = Error;

    fn try_from(name: String) -> core::result::Result<Self, Self::Error> {
        name.parse()
    }
}

#[cfg(feature = "schemars")]
impl ::schemars::JsonSchema for AnomalyType {
    fn schema_name() -> alloc::borrow::Cow<'static, str> {
        "AnomalyType".into()
    }

    fn json_schema(_: &mut ::schemars::SchemaGenerator) -> ::schemars::Schema {
        let names: Vec<&str> = Self::ALL.iter().map(|anomaly| anomaly.name()).collect();
        ::schemars::json_schema!({ "type": "string", "enum": names })
    }
}

/// What a transaction should have observed, given its own earlier
/// micro-operations.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// Exactly these list elements.
    Elements(Vec<i64>),
    /// Some unknown prefix followed by these elements: the transaction
    /// appended before it first read the key.
    EndingWith(Vec<i64>),
    /// The value of this register read.
    Mop(Mop),
}

impl Display for Expected {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Elements(elements) => write!(f, "{}", Elements(elements)),
            Self::EndingWith(suffix) => {
                f.write_str("[...")?;
                for element in suffix {
                    write!(f, " {element}")?;
                }
                f.write_str("]")
            }
            Self::Mop(mop) => write!(f, "{mop}"),
        }
    }
}

/// A read that contradicts the transaction's own prior state.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalConflict {
    pub op: Op,
    pub mop: Mop,
    pub expected: Expected,
}

/// A committed read of an aborted (G1a) or intermediate (G1b) write.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct G1Conflict {
    pub op: Op,
    pub mop: Mop,
    pub writer: Op,
    pub element: i64,
}

/// Reads of one key whose values cannot be ordered as prefixes.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompatibleOrder {
    pub key: Key,
    /// Distinct values read, shortest first.
    pub values: Vec<Vec<i64>>,
}

/// A read whose list contains some elements more than once.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateElements {
    pub op: Op,
    pub mop: Mop,
    /// Each repeated element and how many times it was observed.
    pub duplicates: BTreeMap<i64, usize>,
}

/// Register versions whose inferred order forms a cycle.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicVersions {
    pub key: Key,
    /// Versions on the cycle; `None` is the initial, unwritten state.
    pub versions: Vec<Option<i64>>,
}

/// One witnessed violation.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    Internal(InternalConflict),
    G1(G1Conflict),
    Cycle(CycleExplainerResult),
    IncompatibleOrder(IncompatibleOrder),
    DuplicateElements(DuplicateElements),
    CyclicVersions(CyclicVersions),
}

/// Anomalies grouped by type.
pub type Anomalies = BTreeMap<AnomalyType, Vec<Anomaly>>;

impl Display for Anomaly {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Internal(conflict) => write!(
                f,
                "{} read {}, but expected {}",
                conflict.op, conflict.mop, conflict.expected
            ),
            Self::G1(conflict) => write!(
                f,
                "{} read {}, whose element {} was written by {}",
                conflict.op, conflict.mop, conflict.element, conflict.writer
            ),
            Self::Cycle(cycle) => write!(f, "{cycle}"),
            Self::IncompatibleOrder(order) => {
                write!(f, "reads of key {} disagree on its order:", order.key)?;
                for value in &order.values {
                    write!(f, " {}", Elements(value))?;
                }
                Ok(())
            }
            Self::DuplicateElements(duplicate) => {
                write!(f, "{} read {}, which repeats", duplicate.op, duplicate.mop)?;
                for (element, count) in &duplicate.duplicates {
                    write!(f, " {element} ({count} times)")?;
                }
                Ok(())
            }
            Self::CyclicVersions(cyclic) => {
                write!(f, "versions of key {} form a cycle:", cyclic.key)?;
                for version in &cyclic.versions {
                    match version {
                        Some(value) => write!(f, " {value}")?,
                        None => f.write_str(" nil")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Adds `anomalies` of type `kind` to the grouped map, skipping empty lists.
pub fn merge(into: &mut Anomalies, kind: AnomalyType, anomalies: Vec<Anomaly>) {
    if !anomalies.is_empty() {
        into.entry(kind).or_default().extend(anomalies);
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::vec;

    use super::*;

    #[test]
    fn test_names_round_trip() {
        for anomaly in AnomalyType::ALL {
            assert_eq!(anomaly.name().parse::<AnomalyType>(), Ok(anomaly));
        }
        assert_eq!(
            "G3".parse::<AnomalyType>(),
            Err(Error::UnknownAnomaly("G3".into()))
        );
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            AnomalyType::expand("G1").unwrap(),
            vec![AnomalyType::G1a, AnomalyType::G1b, AnomalyType::G1c]
        );
        assert_eq!(
            AnomalyType::expand("G-single").unwrap(),
            vec![AnomalyType::GSingle]
        );
        assert!(AnomalyType::expand("G9").is_err());
    }

    #[test]
    fn test_closure() {
        assert_eq!(
            AnomalyType::closure([AnomalyType::G2Item]),
            vec![
                AnomalyType::G0,
                AnomalyType::G1c,
                AnomalyType::GSingle,
                AnomalyType::G2Item,
            ]
        );
        let realtime = AnomalyType::closure([AnomalyType::G0Realtime]);
        assert_eq!(
            realtime,
            vec![
                AnomalyType::G0,
                AnomalyType::G0Process,
                AnomalyType::G0Realtime,
            ]
        );
        assert_eq!(
            AnomalyType::closure([AnomalyType::G1a]),
            vec![AnomalyType::G1a]
        );
    }

    #[test]
    fn test_expected_display() {
        assert_eq!(format!("{}", Expected::Elements(vec![1, 2, 3])), "[1 2 3]");
        assert_eq!(format!("{}", Expected::EndingWith(vec![3])), "[... 3]");
        assert_eq!(format!("{}", Expected::EndingWith(vec![])), "[...]");
    }
}
