use anyhow::{Result, bail};
use diag_odx::{MergeOptions, ParseOptions};
use std::path::PathBuf;

use crate::load::{LoadReport, load_database};

/// Problems found while loading and validating, one line each.
#[derive(Debug, Default)]
struct Issues {
    errors: Vec<String>,
    warnings: Vec<String>,
}

fn collect_issues(report: &LoadReport) -> Issues {
    let mut errors: Vec<String> = report
        .failed_inputs
        .iter()
        .map(|(input, e)| format!("{}: {e}", input.display()))
        .collect();
    errors.extend(
        report
            .entry_failures
            .iter()
            .map(|(input, failure)| format!("{}: {failure}", input.display())),
    );
    let mut warnings = Vec::new();
    if let Err(found) = diag_db::validate_database(&report.database) {
        for e in found {
            if e.is_warning() {
                warnings.push(e.to_string());
            } else {
                errors.push(e.to_string());
            }
        }
    }
    Issues { errors, warnings }
}

pub fn run_validate(
    inputs: &[PathBuf],
    parse: &ParseOptions,
    merge: &MergeOptions,
    quiet: bool,
    summary: bool,
) -> Result<()> {
    let report = load_database(inputs, parse, merge)?;
    let Issues { errors, warnings } = collect_issues(&report);

    if !quiet && !summary {
        for warning in &warnings {
            eprintln!("warning: {warning}");
        }
        for error in &errors {
            eprintln!("{error}");
        }
    }

    if errors.is_empty() {
        if !quiet {
            if warnings.is_empty() {
                println!("{} input(s): valid", report.inputs);
            } else {
                println!("{} input(s): valid, {} warning(s)", report.inputs, warnings.len());
            }
        }
        return Ok(());
    }

    let plural = if errors.len() == 1 { "" } else { "s" };
    if summary || !quiet {
        println!("{} validation error{plural}", errors.len());
    }

    bail!("{} validation error{plural}", errors.len());
}
