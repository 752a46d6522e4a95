//! Consistency models as sets of prohibited anomalies.
//!
//! Models form a lattice: each lists the models directly weaker than it and
//! prohibits everything they prohibit, plus anomalies of its own.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result};
use core::str::FromStr;

use super::error::Error;
use crate::anomaly::{Anomalies, AnomalyType};

/// Anomalies that no model allows: they mean the history itself cannot be
/// explained by any execution.
pub const ALWAYS_PROHIBITED: [AnomalyType; 4] = [
    AnomalyType::Internal,
    AnomalyType::IncompatibleOrder,
    AnomalyType::DuplicateElements,
    AnomalyType::CyclicVersions,
];

/// A named consistency model, weakest first.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String", try_from = "String"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Model {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    SnapshotIsolation,
    Serializable,
    /// Serializable, and each process observes its own prior transactions.
    StrongSessionSerializable,
    /// Serializable in an order consistent with realtime.
    StrictSerializable,
}

impl Model {
    pub const ALL: [Self; 7] = [
        Self::ReadUncommitted,
        Self::ReadCommitted,
        Self::RepeatableRead,
        Self::SnapshotIsolation,
        Self::Serializable,
        Self::StrongSessionSerializable,
        Self::StrictSerializable,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "read-uncommitted",
            Self::ReadCommitted => "read-committed",
            Self::RepeatableRead => "repeatable-read",
            Self::SnapshotIsolation => "snapshot-isolation",
            Self::Serializable => "serializable",
            Self::StrongSessionSerializable => "strong-session-serializable",
            Self::StrictSerializable => "strict-serializable",
        }
    }

    /// The models directly below this one.
    #[must_use]
    pub const fn weaker(self) -> &'static [Self] {
        match self {
            Self::ReadUncommitted => &[],
            Self::ReadCommitted => &[Self::ReadUncommitted],
            Self::RepeatableRead | Self::SnapshotIsolation => &[Self::ReadCommitted],
            Self::Serializable => &[Self::RepeatableRead, Self::SnapshotIsolation],
            Self::StrongSessionSerializable => &[Self::Serializable],
            Self::StrictSerializable => &[Self::StrongSessionSerializable],
        }
    }

    /// Anomalies this model prohibits beyond those of its weaker models.
    const fn own_prohibited(self) -> &'static [AnomalyType] {
        match self {
            Self::ReadUncommitted => &[AnomalyType::G0],
            Self::ReadCommitted => &[AnomalyType::G1a, AnomalyType::G1b, AnomalyType::G1c],
            Self::RepeatableRead => &[AnomalyType::GSingle, AnomalyType::G2Item],
            Self::SnapshotIsolation => &[AnomalyType::GSingle],
            Self::Serializable => &[AnomalyType::G2Item],
            Self::StrongSessionSerializable => &[
                AnomalyType::G0Process,
                AnomalyType::G1cProcess,
                AnomalyType::GSingleProcess,
                AnomalyType::G2ItemProcess,
            ],
            Self::StrictSerializable => &[
                AnomalyType::G0Realtime,
                AnomalyType::G1cRealtime,
                AnomalyType::GSingleRealtime,
                AnomalyType::G2ItemRealtime,
            ],
        }
    }

    /// Every anomaly this model prohibits, sorted.
    #[must_use]
    pub fn prohibited(self) -> Vec<AnomalyType> {
        let mut prohibited: Vec<AnomalyType> = ALWAYS_PROHIBITED.to_vec();
        let mut stack = alloc::vec![self];
        while let Some(model) = stack.pop() {
            prohibited.extend_from_slice(model.own_prohibited());
            stack.extend_from_slice(model.weaker());
        }
        prohibited.sort();
        prohibited.dedup();
        prohibited
    }

    /// Whether any anomaly found in `anomalies` rules this model out.
    #[must_use]
    pub fn violated_by(self, anomalies: &Anomalies) -> bool {
        self.prohibited()
            .iter()
            .any(|anomaly| anomalies.contains_key(anomaly))
    }
}

/// Which models a set of anomalies rules out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations {
    /// Violated models none of whose weaker models is violated.
    pub not: Vec<Model>,
    /// The remaining violated models.
    pub also_not: Vec<Model>,
}

impl Violations {
    #[must_use]
    pub fn of(anomalies: &Anomalies) -> Self {
        let violated: Vec<Model> = Model::ALL
            .into_iter()
            .filter(|model| model.violated_by(anomalies))
            .collect();
        let (not, also_not) = violated.iter().copied().partition(|model| {
            !model
                .weaker()
                .iter()
                .any(|weaker| violated.contains(weaker))
        });
        Self { not, also_not }
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(self.name())
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(name: &str) -> core::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|model| model.name() == name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }
}

impl From<Model> for String {
    fn from(model: Model) -> Self {
        model.name().to_string()
    }
}

impl TryFrom<String> for Model {
    type Error = Error;

    fn try_from(name: String) -> core::result::Result<Self, Self::Error> {
        name.parse()
    }
}

#[cfg(feature = "schemars")]
impl ::schemars::JsonSchema for Model {
    fn schema_name() -> alloc::borrow::Cow<'static, str> {
        "Model".into()
    }

    fn json_schema(_: &mut ::schemars::SchemaGenerator) -> ::schemars::Schema {
        let names: Vec<&str> = Self::ALL.iter().map(|model| model.name()).collect();
        ::schemars::json_schema!({ "type": "string", "enum": names })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::anomaly::Anomaly;

    fn found(types: &[AnomalyType]) -> Anomalies {
        types
            .iter()
            .map(|&anomaly| (anomaly, Vec::<Anomaly>::new()))
            .collect()
    }

    #[test]
    fn test_names_round_trip() {
        for model in Model::ALL {
            assert_eq!(model.name().parse::<Model>(), Ok(model));
        }
        assert_eq!(
            "linearizable".parse::<Model>(),
            Err(Error::UnknownModel("linearizable".into()))
        );
    }

    #[test]
    fn test_prohibited_is_cumulative() {
        let serializable = Model::Serializable.prohibited();
        for anomaly in [
            AnomalyType::G0,
            AnomalyType::G1a,
            AnomalyType::G1c,
            AnomalyType::GSingle,
            AnomalyType::G2Item,
            AnomalyType::Internal,
        ] {
            assert!(serializable.contains(&anomaly), "{anomaly}");
        }
        assert!(!serializable.contains(&AnomalyType::G0Process));
        assert!(!Model::SnapshotIsolation
            .prohibited()
            .contains(&AnomalyType::G2Item));
        assert!(Model::StrictSerializable
            .prohibited()
            .contains(&AnomalyType::G2ItemProcess));
    }

    #[test]
    fn test_violations() {
        let violations = Violations::of(&found(&[AnomalyType::G0]));
        assert_eq!(violations.not, vec![Model::ReadUncommitted]);
        assert_eq!(violations.also_not.len(), Model::ALL.len() - 1);

        // Write skew is fine under snapshot isolation.
        let violations = Violations::of(&found(&[AnomalyType::G2Item]));
        assert_eq!(violations.not, vec![Model::RepeatableRead]);
        assert_eq!(
            violations.also_not,
            vec![
                Model::Serializable,
                Model::StrongSessionSerializable,
                Model::StrictSerializable,
            ]
        );

        let violations = Violations::of(&found(&[AnomalyType::G1cRealtime]));
        assert_eq!(violations.not, vec![Model::StrictSerializable]);
        assert!(violations.also_not.is_empty());

        assert_eq!(Violations::of(&Anomalies::new()), Violations::default());
    }
}
