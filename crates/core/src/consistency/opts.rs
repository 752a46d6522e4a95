use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result};
use core::str::FromStr;

use typed_builder::TypedBuilder;

use super::error::Error;
use super::model::Model;
use crate::anomaly::AnomalyType;

/// Which analyzer interprets the micro-operations of a history.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Workload {
    /// Keys hold lists; transactions append and read whole lists.
    #[default]
    ListAppend,
    /// Keys hold single values; transactions write and read them.
    RwRegister,
}

impl Workload {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListAppend => "list-append",
            Self::RwRegister => "rw-register",
        }
    }
}

impl Display for Workload {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(self.name())
    }
}

impl FromStr for Workload {
    type Err = Error;

    fn from_str(name: &str) -> core::result::Result<Self, Self::Err> {
        match name {
            "list-append" => Ok(Self::ListAppend),
            "rw-register" => Ok(Self::RwRegister),
            _ => Err(Error::UnknownWorkload(name.to_string())),
        }
    }
}

/// Extra assumptions used to order register versions.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, TypedBuilder)]
pub struct GraphOption {
    /// Versions follow realtime order.
    #[builder(default)]
    pub linearizable_keys: bool,
    /// Versions follow process order.
    #[builder(default)]
    pub sequential_keys: bool,
    /// A transaction's write of a key follows its own read of that key.
    #[builder(default)]
    pub wfr_keys: bool,
}

/// What to check a history for.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
pub struct Opts {
    #[builder(default)]
    pub consistency_models: Vec<Model>,
    /// Anomalies to check for regardless of models.
    #[builder(default)]
    pub anomalies: Vec<AnomalyType>,
    #[builder(default)]
    pub graph_option: GraphOption,
}

impl Opts {
    /// Builds options from textual model and anomaly names, expanding
    /// anomaly aliases such as `G1` and `G2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`] or [`Error::UnknownAnomaly`] for names
    /// that are not recognized.
    pub fn from_names<M, A>(models: &[M], anomalies: &[A]) -> core::result::Result<Self, Error>
    where
        M: AsRef<str>,
        A: AsRef<str>,
    {
        let consistency_models = models
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<core::result::Result<Vec<Model>, Error>>()?;
        let mut expanded = Vec::new();
        for name in anomalies {
            expanded.extend(AnomalyType::expand(name.as_ref())?);
        }
        Ok(Self::builder()
            .consistency_models(consistency_models)
            .anomalies(expanded)
            .build())
    }

    /// The requested models; `serializable` when nothing at all is requested.
    #[must_use]
    pub fn models(&self) -> Vec<Model> {
        if self.consistency_models.is_empty() && self.anomalies.is_empty() {
            alloc::vec![Model::Serializable]
        } else {
            self.consistency_models.clone()
        }
    }

    /// Every anomaly type whose presence makes the history invalid: the
    /// requested ones, those prohibited by the requested models, and
    /// everything they imply.
    #[must_use]
    pub fn checked_anomalies(&self) -> Vec<AnomalyType> {
        let mut requested = self.anomalies.clone();
        for model in self.models() {
            requested.extend(model.prohibited());
        }
        AnomalyType::closure(requested)
    }
}
