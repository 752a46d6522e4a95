//! Transactional anomaly checking for database histories.
//!
//! `cyclops_core` takes a recorded history of client transactions against a
//! database under test and decides whether it could have been produced under
//! a given consistency model. Two workloads are supported:
//!
//! - **list-append**: keys hold lists, transactions append unique integers
//!   and read whole lists. Reads reveal the version order of every key.
//! - **rw-register**: keys hold single integers that transactions overwrite.
//!   Version orders are inferred from the initial state and optional
//!   ordering assumptions.
//!
//! From the history the analyzers build a dependency graph with write-write,
//! write-read and read-write edges (optionally process and realtime edges),
//! then search its strongly connected components for cycles of the shapes
//! that define G0, G1c, G-single and G2-item. Non-cycle anomalies (aborted
//! reads, intermediate reads, internal inconsistencies) are found directly.
//! Every cycle comes with a step-by-step explanation.
//!
//! # Entry point
//!
//! ```rust,ignore
//! use cyclops_core::{check, Opts, Workload};
//!
//! let opts = Opts::from_names(&["snapshot-isolation"], &["G1"])?;
//! let result = check(Workload::ListAppend, &opts, ops)?;
//! if !result.valid {
//!     println!("{result}");
//! }
//! ```
//!
//! # Crate features
//!
//! - **`serde`** -- `Serialize`/`Deserialize` on operations, anomalies and
//!   check results. Micro-operations use the `["append", "x", 1]` shape.
//! - **`schemars`** -- JSON schema for operation records.
//!
//! This crate is `no_std` compatible (requires `alloc`). The EDN reader lives
//! in the separate `cyclops_parser` crate.

#![cfg_attr(not(any(test, feature = "schemars")), no_std)]
extern crate alloc;

pub mod anomaly;
pub mod consistency;
pub mod graph;
pub mod history;
pub mod list_append;
pub mod rw_register;

pub use consistency::opts::{GraphOption, Opts, Workload};
pub use consistency::result::CheckResult;
pub use consistency::{check, model::Model};
