use anyhow::{Context, Result, bail};
use diag_db::Database;
use diag_odx::{EntryFailure, LoadedInput, MergeOptions, ParseOptions, load_file, merge_containers};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// The merged database plus what went wrong on the way there.
#[derive(Debug)]
pub struct LoadReport {
    pub database: Database,
    pub inputs: usize,
    /// Inputs that could not be loaded at all, with the reason.
    pub failed_inputs: Vec<(PathBuf, String)>,
    /// Archive entries skipped inside otherwise readable inputs.
    pub entry_failures: Vec<(PathBuf, EntryFailure)>,
}

fn load_one(path: &Path, options: &ParseOptions) -> Result<LoadedInput> {
    load_file(path, options).with_context(|| format!("loading {}", path.display()))
}

/// Parse every input in parallel, then merge the ones that loaded.
///
/// A failing input is reported and skipped; the call only fails when no
/// input could be loaded.
pub fn load_database(
    inputs: &[PathBuf],
    parse: &ParseOptions,
    merge: &MergeOptions,
) -> Result<LoadReport> {
    let start = Instant::now();
    let results: Vec<(PathBuf, Result<LoadedInput>)> = inputs
        .par_iter()
        .map(|input| (input.clone(), load_one(input, parse)))
        .collect();

    let mut containers = Vec::new();
    let mut failed_inputs = Vec::new();
    let mut entry_failures = Vec::new();
    for (input, result) in results {
        match result {
            Ok(loaded) => {
                for failure in loaded.failures {
                    log::warn!("{}: {failure}", input.display());
                    entry_failures.push((input.clone(), failure));
                }
                containers.extend(loaded.containers);
            }
            Err(e) => {
                eprintln!("FAILED {}: {e:#}", input.display());
                failed_inputs.push((input, format!("{e:#}")));
            }
        }
    }

    if !inputs.is_empty() && failed_inputs.len() == inputs.len() {
        bail!("all {} input(s) failed to load", inputs.len());
    }
    log::info!(
        "Parse time: {:.1}ms",
        start.elapsed().as_secs_f64() * 1000.0
    );

    let merge_start = Instant::now();
    let database = merge_containers(containers, merge);
    log::info!(
        "Merge time: {:.1}ms",
        merge_start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(LoadReport {
        database,
        inputs: inputs.len(),
        failed_inputs,
        entry_failures,
    })
}
