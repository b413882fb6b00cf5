use std::io::{Cursor, Write};

use diag_odx::{LoadError, ParseOptions, load_file, load_input, read_pdx_from_reader};

const MINIMAL: &str = include_str!("../../test-fixtures/odx/minimal.odx");
const STRUCTURES: &str = include_str!("../../test-fixtures/odx/structures.odx");

const COMPARAM_SPEC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ODX MODEL-VERSION="2.2.0">
  <COMPARAM-SPEC ID="CPS_ISO15765"><SHORT-NAME>ISO_15765_2</SHORT-NAME></COMPARAM-SPEC>
</ODX>"#;

/// Create a PDX (ZIP) in memory containing the given entries.
fn create_pdx_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let buf = Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(buf);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn test_pdx_single_odx() {
    let pdx = create_pdx_bytes(&[("ecu.odx-d", MINIMAL.as_bytes())]);
    let contents = read_pdx_from_reader(Cursor::new(pdx), &ParseOptions::default()).unwrap();
    assert_eq!(contents.parsed_entries, 1);
    assert_eq!(contents.containers.len(), 1);
    assert_eq!(contents.containers[0].ecu_variants[0].short_name, "Engine");
    assert!(contents.failures.is_empty());
}

#[test]
fn test_pdx_skips_non_odx_entries() {
    let pdx = create_pdx_bytes(&[
        ("index.xml", b"<CATALOG/>"),
        ("docs/readme.txt", b"not xml"),
        ("ecu.odx", MINIMAL.as_bytes()),
    ]);
    let contents = read_pdx_from_reader(Cursor::new(pdx), &ParseOptions::default()).unwrap();
    // index.xml is parsed but holds no layers
    assert_eq!(contents.parsed_entries, 2);
    assert_eq!(contents.containers.len(), 1);
    assert!(contents.failures.is_empty());
}

#[test]
fn test_pdx_extension_match_is_case_insensitive() {
    let pdx = create_pdx_bytes(&[("ECU.ODX-D", MINIMAL.as_bytes())]);
    let contents = read_pdx_from_reader(Cursor::new(pdx), &ParseOptions::default()).unwrap();
    assert_eq!(contents.containers.len(), 1);
}

#[test]
fn test_pdx_corrupt_entry_is_isolated() {
    let pdx = create_pdx_bytes(&[
        ("broken.odx-d", b"<ODX><DIAG-LAYER-CONTAINER>"),
        ("body.odx-d", STRUCTURES.as_bytes()),
        ("ecu.odx-d", MINIMAL.as_bytes()),
    ]);
    let contents = read_pdx_from_reader(Cursor::new(pdx), &ParseOptions::default()).unwrap();
    assert_eq!(contents.containers.len(), 2);
    assert_eq!(contents.failures.len(), 1);
    assert_eq!(contents.failures[0].name, "broken.odx-d");
    assert!(matches!(contents.failures[0].error, LoadError::Malformed(_)));
}

#[test]
fn test_pdx_entry_without_layers_yields_no_container() {
    let pdx = create_pdx_bytes(&[
        ("comparams.odx-c", COMPARAM_SPEC.as_bytes()),
        ("ecu.odx-d", MINIMAL.as_bytes()),
    ]);
    let contents = read_pdx_from_reader(Cursor::new(pdx), &ParseOptions::default()).unwrap();
    assert_eq!(contents.parsed_entries, 2);
    assert_eq!(contents.containers.len(), 1);
}

#[test]
fn test_pdx_custom_extension_allow_list() {
    let options = ParseOptions {
        archive_extensions: vec!["xml".to_string()],
        ..Default::default()
    };
    let pdx = create_pdx_bytes(&[
        ("ecu.odx-d", MINIMAL.as_bytes()),
        ("body.xml", STRUCTURES.as_bytes()),
    ]);
    let contents = read_pdx_from_reader(Cursor::new(pdx), &options).unwrap();
    assert_eq!(contents.containers.len(), 1);
    assert_eq!(contents.containers[0].base_variants[0].short_name, "Body");
}

#[test]
fn test_pdx_invalid_archive() {
    let result = read_pdx_from_reader(
        Cursor::new(b"PK\x03\x04 truncated".to_vec()),
        &ParseOptions::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_load_input_detects_archive() {
    let pdx = create_pdx_bytes(&[
        ("ecu.odx-d", MINIMAL.as_bytes()),
        ("body.odx-d", STRUCTURES.as_bytes()),
    ]);
    let loaded = load_input("bundle.pdx", &pdx, &ParseOptions::default()).unwrap();
    assert_eq!(loaded.name, "bundle.pdx");
    assert_eq!(loaded.containers.len(), 2);

    let loaded = load_input("ecu.odx", MINIMAL.as_bytes(), &ParseOptions::default()).unwrap();
    assert_eq!(loaded.containers.len(), 1);
    assert!(loaded.failures.is_empty());
}

#[test]
fn test_load_input_recovers_legacy_encoding() {
    let mut doc = Vec::new();
    doc.extend_from_slice(b"<ODX><DIAG-LAYER-CONTAINER><ECU-VARIANTS><ECU-VARIANT ID=\"EV\">");
    doc.extend_from_slice(b"<SHORT-NAME>Motor</SHORT-NAME><LONG-NAME>Steuerger\xE4t</LONG-NAME>");
    doc.extend_from_slice(b"</ECU-VARIANT></ECU-VARIANTS></DIAG-LAYER-CONTAINER></ODX>");
    let loaded = load_input("legacy.odx", &doc, &ParseOptions::default()).unwrap();
    assert_eq!(loaded.containers[0].ecu_variants[0].long_name, "Steuergerät");
}

#[test]
fn test_load_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let odx_path = dir.path().join("ecu.odx");
    std::fs::write(&odx_path, MINIMAL).unwrap();
    let pdx_path = dir.path().join("bundle.pdx");
    std::fs::write(&pdx_path, create_pdx_bytes(&[("ecu.odx-d", MINIMAL.as_bytes())])).unwrap();

    for path in [&odx_path, &pdx_path] {
        let loaded = load_file(path, &ParseOptions::default()).unwrap();
        assert_eq!(loaded.containers.len(), 1);
        assert_eq!(loaded.containers[0].ecu_variants[0].short_name, "Engine");
    }

    let missing = load_file(&dir.path().join("missing.odx"), &ParseOptions::default());
    assert!(matches!(missing, Err(LoadError::Io(_))));
}
