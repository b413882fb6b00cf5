use anyhow::{Context, Result};
use diag_db::Database;
use diag_odx::{MergeOptions, ParseOptions};
use std::path::{Path, PathBuf};

use crate::load::load_database;

fn to_json(db: &Database, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(db)
    } else {
        serde_json::to_string(db)
    };
    json.context("serializing database")
}

pub fn run_export(
    inputs: &[PathBuf],
    output: &Path,
    parse: &ParseOptions,
    merge: &MergeOptions,
    pretty: bool,
) -> Result<()> {
    let report = load_database(inputs, parse, merge)?;
    let json = to_json(&report.database, pretty)?;
    std::fs::write(output, &json).with_context(|| format!("writing {}", output.display()))?;

    log::info!("Written: {}", output.display());
    println!(
        "Exported {} layer(s), {} parameter(s) -> {}",
        report.database.layer_count(),
        report.database.all_params.len(),
        output.display()
    );
    Ok(())
}
