use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result};

use super::model::Model;
use crate::anomaly::{Anomalies, Anomaly, AnomalyType};

/// The verdict of one checker run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    /// False if any requested anomaly, any anomaly prohibited by a requested
    /// model, or any anomaly no model allows was found.
    pub valid: bool,
    /// The keys of `anomalies`, in order.
    pub anomaly_types: Vec<AnomalyType>,
    pub anomalies: Anomalies,
    /// Requested models ruled out by the anomalies found.
    pub impossible_models: Vec<Model>,
    /// The weakest models ruled out by the anomalies found.
    pub not: Vec<Model>,
    /// Every other model ruled out by the anomalies found.
    pub also_not: Vec<Model>,
}

impl CheckResult {
    /// All anomalies found, in type order.
    pub fn all_anomalies(&self) -> impl Iterator<Item = (AnomalyType, &Anomaly)> {
        self.anomalies
            .iter()
            .flat_map(|(&kind, anomalies)| anomalies.iter().map(move |anomaly| (kind, anomaly)))
    }
}

fn write_models(f: &mut Formatter, label: &str, models: &[Model]) -> Result {
    if models.is_empty() {
        return Ok(());
    }
    write!(f, "\n{label}:")?;
    for model in models {
        write!(f, " {model}")?;
    }
    Ok(())
}

impl Display for CheckResult {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(if self.valid { "valid" } else { "invalid" })?;
        if !self.anomaly_types.is_empty() {
            f.write_str("\nanomalies:")?;
            for anomaly in &self.anomaly_types {
                write!(f, " {anomaly}")?;
            }
        }
        write_models(f, "impossible", &self.impossible_models)?;
        write_models(f, "not", &self.not)?;
        write_models(f, "also not", &self.also_not)?;
        for (kind, anomaly) in self.all_anomalies() {
            match anomaly {
                Anomaly::Cycle(_) => write!(f, "\n\n{anomaly}")?,
                _ => write!(f, "\n\n[{kind}] {anomaly}")?,
            }
        }
        Ok(())
    }
}
