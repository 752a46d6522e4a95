use alloc::string::String;
use core::fmt::{Display, Formatter, Result};

use derive_more::From;

use crate::history::error::Error as HistoryError;

/// Error returned when a history cannot be checked at all.
///
/// Anomalies are findings, not errors; they are reported in
/// [`CheckResult`](super::result::CheckResult).
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum Error {
    /// The history is malformed or ambiguous.
    History(HistoryError),
    /// A configured consistency model name is not recognized.
    #[from(ignore)]
    UnknownModel(String),
    /// A configured anomaly name is not recognized.
    #[from(ignore)]
    UnknownAnomaly(String),
    /// A workload name is not recognized.
    #[from(ignore)]
    UnknownWorkload(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::History(error) => write!(f, "invalid history: {error}"),
            Self::UnknownModel(name) => write!(f, "unknown consistency model {name:?}"),
            Self::UnknownAnomaly(name) => write!(f, "unknown anomaly type {name:?}"),
            Self::UnknownWorkload(name) => write!(f, "unknown workload {name:?}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::History(error) => Some(error),
            Self::UnknownModel(_) | Self::UnknownAnomaly(_) | Self::UnknownWorkload(_) => None,
        }
    }
}
