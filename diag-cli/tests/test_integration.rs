use std::io::{Cursor, Write};

use diag_db::{Database, validate_database};
use diag_odx::{MergeOptions, ParseOptions, load_input, merge_containers};

fn fixture(name: &str) -> Vec<u8> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../test-fixtures/odx")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

fn create_pdx_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn resolve(inputs: &[(&str, Vec<u8>)]) -> Database {
    let containers = inputs
        .iter()
        .flat_map(|(name, bytes)| {
            load_input(name, bytes, &ParseOptions::default())
                .unwrap()
                .containers
        })
        .collect();
    merge_containers(containers, &MergeOptions::default())
}

// ODX files + PDX bundle -> merged database -> JSON
#[test]
fn test_odx_and_pdx_inputs_merge_into_one_database() {
    let pdx = create_pdx_bytes(&[
        ("family.odx-d", fixture("inheritance.odx")),
        ("body.odx-d", fixture("structures.odx")),
    ]);
    let db = resolve(&[
        ("ecu.odx", fixture("minimal.odx")),
        ("bundle.pdx", pdx),
        ("cycle.odx", fixture("cycle.odx")),
    ]);

    assert_eq!(db.protocols.len(), 1);
    assert_eq!(db.functional_groups.len(), 3);
    assert_eq!(db.base_variants.len(), 2);
    assert_eq!(db.ecu_variants.len(), 2);
    assert_eq!(validate_database(&db), Ok(()));

    let json = serde_json::to_string(&db).unwrap();
    let back: Database = serde_json::from_str(&json).unwrap();
    assert_eq!(back, db);
}

#[test]
fn test_repeated_inputs_do_not_duplicate_layers() {
    let once = resolve(&[("family.odx", fixture("inheritance.odx"))]);
    let twice = resolve(&[
        ("family.odx", fixture("inheritance.odx")),
        ("family-copy.odx", fixture("inheritance.odx")),
    ]);
    assert_eq!(once, twice);
}

#[test]
fn test_end_to_end_did_parameter() {
    let db = resolve(&[("ecu.odx", fixture("minimal.odx"))]);
    let did = db
        .all_params
        .iter()
        .find(|p| p.short_name == "DID")
        .expect("DID in flat view");
    assert_eq!(did.parent_name, "ReadVin.RQ_ReadVin.DID");
    assert_eq!(did.coded_const_value, "F190");
    assert_eq!(did.layer_name, "Engine");
}
