//! cyclops CLI -- check transactional histories for anomalies.

use std::path::{Path, PathBuf};
use std::{fmt, fs, io};

use clap::{Parser, Subcommand, ValueEnum};
use cyclops_core::history::types::Op;
use cyclops_core::{GraphOption, Opts, Workload};

#[derive(Debug, Parser)]
#[command(
    name = "cyclops",
    about = "Dependency-graph anomaly checking for transactional histories"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check histories for anomalies
    Check(CheckArgs),
    /// Format EDN history files, one record per line, keeping every field
    Fmt(FmtArgs),
    /// Print the JSON Schema for the history input format to stdout
    Schema,
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// History files (.edn or .json) or directories containing them
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// Kind of transactions in the history
    #[arg(long, default_value = "list-append")]
    pub workload: WorkloadKind,
    /// Consistency models to check, e.g. `serializable,strict-serializable`
    #[arg(long, value_delimiter = ',')]
    pub consistency_models: Vec<String>,
    /// Additional anomalies to check, e.g. `G1,G-single`
    #[arg(long, value_delimiter = ',')]
    pub anomalies: Vec<String>,
    /// Assume each key is linearizable (rw-register only)
    #[arg(long)]
    pub linearizable_keys: bool,
    /// Assume each key is sequentially consistent (rw-register only)
    #[arg(long)]
    pub sequential_keys: bool,
    /// Assume writes follow reads within a transaction (rw-register only)
    #[arg(long)]
    pub wfr_keys: bool,
    /// Print every anomaly with its explanation
    #[arg(long)]
    pub verbose: bool,
    /// Output results as JSON (one object per file)
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    /// Checker options from the command-line flags.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown model or anomaly.
    pub fn opts(&self) -> Result<Opts, cyclops_core::consistency::error::Error> {
        let mut opts = Opts::from_names(&self.consistency_models, &self.anomalies)?;
        opts.graph_option = GraphOption::builder()
            .linearizable_keys(self.linearizable_keys)
            .sequential_keys(self.sequential_keys)
            .wfr_keys(self.wfr_keys)
            .build();
        Ok(opts)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WorkloadKind {
    ListAppend,
    RwRegister,
}

impl From<WorkloadKind> for Workload {
    fn from(kind: WorkloadKind) -> Self {
        match kind {
            WorkloadKind::ListAppend => Self::ListAppend,
            WorkloadKind::RwRegister => Self::RwRegister,
        }
    }
}

#[derive(Debug, Parser)]
pub struct FmtArgs {
    /// EDN files or directories to format
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// Check formatting without modifying files (exit 1 if unformatted)
    #[arg(long)]
    pub check: bool,
}

/// Why a history file could not be loaded.
#[derive(Debug)]
pub enum LoadError {
    Io(io::Error),
    Edn(cyclops_parser::ParseError),
    Json(serde_json::Error),
    UnknownFormat,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Edn(e) => write!(f, "{e}"),
            Self::Json(e) => write!(f, "invalid JSON history: {e}"),
            Self::UnknownFormat => f.write_str("expected a .edn or .json file"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Edn(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::UnknownFormat => None,
        }
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Read a history from an EDN or JSON file, chosen by extension.
///
/// # Errors
///
/// Returns a [`LoadError`] if the file cannot be read or parsed.
pub fn load_history(path: &Path) -> Result<Vec<Op>, LoadError> {
    match extension(path) {
        Some("edn") => {
            let text = fs::read_to_string(path).map_err(LoadError::Io)?;
            cyclops_parser::parse_history(&text).map_err(LoadError::Edn)
        }
        Some("json") => {
            let text = fs::read_to_string(path).map_err(LoadError::Io)?;
            serde_json::from_str(&text).map_err(LoadError::Json)
        }
        _ => Err(LoadError::UnknownFormat),
    }
}

/// Expand directories into the files inside them with one of `extensions`,
/// sorted by path. Files named directly are kept whatever their extension.
///
/// # Errors
///
/// Returns the first I/O error from reading a directory.
pub fn collect_files(paths: &[PathBuf], extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<_> = fs::read_dir(path)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|p| extension(p).is_some_and(|ext| extensions.contains(&ext)))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use cyclops_core::Model;

    use super::*;

    #[test]
    fn test_check_args() {
        let app = App::try_parse_from([
            "cyclops",
            "check",
            "--workload",
            "rw-register",
            "--consistency-models",
            "snapshot-isolation,strict-serializable",
            "--anomalies",
            "G1",
            "--wfr-keys",
            "history.edn",
        ])
        .expect("should parse");
        let Command::Check(args) = app.command else {
            panic!("expected the check command");
        };
        assert!(matches!(
            Workload::from(args.workload),
            Workload::RwRegister
        ));
        let opts = args.opts().expect("known names");
        assert_eq!(
            opts.consistency_models,
            vec![Model::SnapshotIsolation, Model::StrictSerializable]
        );
        assert_eq!(opts.anomalies.len(), 3);
        assert!(opts.graph_option.wfr_keys);
        assert!(!opts.graph_option.linearizable_keys);
    }

    #[test]
    fn test_unknown_model() {
        let app = App::try_parse_from([
            "cyclops",
            "check",
            "--consistency-models",
            "causal+",
            "h.edn",
        ])
        .expect("should parse");
        let Command::Check(args) = app.command else {
            panic!("expected the check command");
        };
        assert!(args.opts().is_err());
    }

    #[test]
    fn test_check_requires_paths() {
        assert!(App::try_parse_from(["cyclops", "check"]).is_err());
    }

    #[test]
    fn test_unknown_format() {
        let err = load_history(Path::new("history.txt")).expect_err("should fail");
        assert!(matches!(err, LoadError::UnknownFormat));
    }
}
