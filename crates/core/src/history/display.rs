use alloc::string::String;
use core::fmt::Write;

use crate::history::types::Op;

/// Format ops as EDN, one record per line.
///
/// The output always ends with a trailing newline and reads back through
/// `cyclops_parser::parse_history` unchanged.
#[must_use]
pub fn format_history(ops: &[Op]) -> String {
    let mut output = String::new();
    for op in ops {
        let _ = writeln!(output, "{op}");
    }
    output
}
