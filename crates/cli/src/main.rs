use std::path::PathBuf;
use std::{fs, process};

use clap::Parser;
use cyclops_cli::{collect_files, load_history, App, CheckArgs, Command, FmtArgs};
use cyclops_core::history::types::Op;
use cyclops_core::{check, CheckResult, Workload};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::parse();
    match &app.command {
        Command::Check(args) => run_check(args),
        Command::Fmt(args) => run_fmt(args),
        Command::Schema => schema(),
    }
}

fn files_or_exit(paths: &[PathBuf], extensions: &[&str]) -> Vec<PathBuf> {
    let files = collect_files(paths, extensions).unwrap_or_else(|e| {
        eprintln!("Failed to read input: {e}");
        process::exit(1);
    });
    if files.is_empty() {
        eprintln!("No history files found");
        process::exit(1);
    }
    files
}

fn run_check(args: &CheckArgs) {
    let opts = args.opts().unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(2);
    });
    let workload = Workload::from(args.workload);
    let files = files_or_exit(&args.paths, &["edn", "json"]);

    let outcomes: Vec<(PathBuf, Result<CheckResult, String>)> = files
        .into_par_iter()
        .map(|path| {
            let outcome = load_history(&path)
                .map_err(|e| e.to_string())
                .and_then(|ops| check(workload, &opts, ops).map_err(|e| e.to_string()));
            (path, outcome)
        })
        .collect();

    let mut any_failed = false;
    for (path, outcome) in outcomes {
        let filename = path.display();
        match outcome {
            Ok(result) => {
                any_failed |= !result.valid;
                let verdict = if result.valid { "PASS" } else { "FAIL" };
                if args.json {
                    let result = serde_json::json!({
                        "file": filename.to_string(),
                        "ok": result.valid,
                        "result": result,
                    });
                    println!("{result}");
                } else if args.verbose {
                    println!("{filename}: {verdict}");
                    println!("{result}");
                } else if result.valid {
                    println!("{filename}: PASS");
                } else {
                    let types: Vec<String> =
                        result.anomaly_types.iter().map(ToString::to_string).collect();
                    println!("{filename}: FAIL ({})", types.join(", "));
                }
            }
            Err(e) => {
                any_failed = true;
                if args.json {
                    let result = serde_json::json!({
                        "file": filename.to_string(),
                        "ok": false,
                        "error": e,
                    });
                    println!("{result}");
                } else {
                    println!("{filename}: ERROR ({e})");
                }
            }
        }
    }

    if any_failed {
        process::exit(1);
    }
}

fn run_fmt(args: &FmtArgs) {
    let files = files_or_exit(&args.paths, &["edn"]);
    let mut unformatted = false;

    for path in files {
        let text = fs::read_to_string(&path).unwrap_or_else(|e| {
            eprintln!("Failed to read {}: {e}", path.display());
            process::exit(1);
        });
        let formatted = cyclops_parser::format_records(&text).unwrap_or_else(|e| {
            eprintln!("{}: {e}", path.display());
            process::exit(1);
        });
        if formatted == text {
            continue;
        }
        if args.check {
            println!("{}", path.display());
            unformatted = true;
        } else {
            fs::write(&path, formatted).unwrap_or_else(|e| {
                eprintln!("Failed to write {}: {e}", path.display());
                process::exit(1);
            });
        }
    }

    if unformatted {
        process::exit(1);
    }
}

fn schema() {
    let schema = schemars::schema_for!(Vec<Op>);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to render schema: {e}");
            process::exit(1);
        }
    }
}
