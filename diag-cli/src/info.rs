use anyhow::Result;
use diag_db::{Database, Layer, LayerKind};
use diag_odx::{MergeOptions, ParseOptions};
use std::path::PathBuf;

use crate::load::load_database;

fn layer_line(layer: &Layer) -> String {
    format!(
        "  {:<16} {:<24} services {:>4}  links {:>2}",
        layer.kind.tag(),
        layer.short_name,
        layer.services.len(),
        layer.linked_layer_ids.len()
    )
}

fn kind_counts(db: &Database) -> String {
    LayerKind::ALL
        .into_iter()
        .map(|kind| format!("{} {}", kind.tag(), db.layers_of(kind).len()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn run_info(inputs: &[PathBuf], parse: &ParseOptions, merge: &MergeOptions) -> Result<()> {
    let report = load_database(inputs, parse, merge)?;
    let db = &report.database;

    println!(
        "Inputs:       {} ({} failed, {} skipped entries)",
        report.inputs,
        report.failed_inputs.len(),
        report.entry_failures.len()
    );
    println!("Layers:       {} ({})", db.layer_count(), kind_counts(db));
    for layer in db.layers() {
        println!("{}", layer_line(layer));
    }
    println!("Services:     {}", db.service_count());
    println!("Parameters:   {}", db.all_params.len());
    println!("Units:        {}", db.all_units.len());
    println!("CompuMethods: {}", db.all_compu_methods.len());
    println!("DOPs:         {}", db.all_data_objects.len());
    println!("DTCs:         {}", db.all_dtcs.len());

    Ok(())
}
