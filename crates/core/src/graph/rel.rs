use core::fmt::{Display, Formatter, Result};

/// The relation an edge of the dependency graph stands for.
///
/// The derived order (data dependencies first, then process, then realtime)
/// is the order in which the cycle explainer prefers justifications.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rel {
    /// Write-write: the source installed a version the target overwrote.
    WW,
    /// Write-read: the target observed the source's write.
    WR,
    /// Read-write: the source observed a version the target overwrote.
    RW,
    /// Both ops ran on the same process, the source first.
    Process,
    /// The source completed before the target was invoked.
    Realtime,
}

impl Display for Rel {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let name = match self {
            Self::WW => "ww",
            Self::WR => "wr",
            Self::RW => "rw",
            Self::Process => "process",
            Self::Realtime => "realtime",
        };
        f.write_str(name)
    }
}
