use diag_db::*;
use diag_odx::{ParseOptions, parse_odx};

fn parse_fixture(bytes: &[u8]) -> Container {
    parse_odx(bytes, &ParseOptions::default()).expect("Failed to parse ODX fixture")
}

fn parse_minimal() -> Container {
    parse_fixture(include_bytes!("../../test-fixtures/odx/minimal.odx"))
}

fn parse_structures() -> Container {
    parse_fixture(include_bytes!("../../test-fixtures/odx/structures.odx"))
}

fn child_names(p: &Param) -> Vec<&str> {
    p.children.iter().map(|c| c.short_name.as_str()).collect()
}

#[test]
fn test_parse_odx_ecu_variant() {
    let c = parse_minimal();
    assert_eq!(c.layer_count(), 1);
    let ev = &c.ecu_variants[0];
    assert_eq!(ev.kind, LayerKind::EcuVariant);
    assert_eq!(ev.id.as_str(), "EV_Engine");
    assert_eq!(ev.short_name, "Engine");
    assert_eq!(ev.long_name, "Engine control unit");
}

#[test]
fn test_parse_odx_service_metadata() {
    let c = parse_minimal();
    let svc = c.ecu_variants[0].service("ReadVin").expect("ReadVin service");
    assert_eq!(svc.id, "DS_ReadVin");
    assert_eq!(svc.long_name, "Read VIN");
    assert_eq!(svc.semantic, "IDENTIFICATION");
    assert_eq!(svc.addressing, "PHYSICAL");
    assert!(svc.pos_responses.is_empty());
}

#[test]
fn test_parse_odx_request_param() {
    let c = parse_minimal();
    let svc = c.ecu_variants[0].service("ReadVin").unwrap();
    let request = svc.request.as_ref().expect("inline request");
    assert_eq!(request.short_name, "RQ_ReadVin");

    let did = request.find_param("DID").expect("DID param");
    assert_eq!(did.parent_name, "ReadVin.RQ_ReadVin.DID");
    assert_eq!(did.coded_const_value, "F190");
    assert_eq!(did.byte_position, "1");
    assert_eq!(did.bit_length, "16");
    assert_eq!(did.base_data_type, "A_UINT32");
    assert_eq!(did.parent_type, ParamParentKind::Request);
    assert_eq!(did.layer_name, "Engine");
    assert_eq!(did.service_short_name, "ReadVin");
    assert!(did.id.starts_with("Engine::ReadVin::REQUEST::DID::"));
    assert_eq!(did.id.rsplit("::").next().map(str::len), Some(16));
}

#[test]
fn test_parse_odx_ids_are_stable() {
    let a = parse_minimal();
    let b = parse_minimal();
    let ids = |c: &Container| -> Vec<String> {
        c.layers()
            .flat_map(Layer::all_params)
            .map(|p| p.id.clone())
            .collect()
    };
    assert_eq!(ids(&a), ids(&b));
}

#[test]
fn test_parse_odx_namespaced_document() {
    let c = parse_structures();
    assert_eq!(c.base_variants.len(), 1);
    assert_eq!(c.base_variants[0].short_name, "Body");
    let dops: Vec<&str> = c.base_variants[0]
        .data_object_props
        .iter()
        .map(|d| d.short_name.as_str())
        .collect();
    assert_eq!(dops, ["U8", "Window"]);
}

#[test]
fn test_parse_odx_structure_expansion() {
    let c = parse_structures();
    let svc = c.base_variants[0].service("ReadWindow").unwrap();
    let response = &svc.pos_responses[0];
    assert_eq!(response.short_name, "PR_ReadWindow");

    // by DOP-REF and by DOP-SNREF
    for name in ["Front", "Rear"] {
        let p = response.find_param(name).unwrap();
        assert_eq!(child_names(p), ["Position", "Moving"]);
        let position = &p.children[0];
        assert_eq!(
            position.parent_name,
            format!("ReadWindow.PR_ReadWindow.{name}.Position")
        );
        assert_eq!(position.parent_type, ParamParentKind::Structure);
        assert_eq!(position.bit_length, "8");
        assert_eq!(position.physical_base_type, "A_UINT32");
    }
}

#[test]
fn test_parse_odx_table_key_selects_row() {
    let c = parse_structures();
    let request = c.base_variants[0]
        .service("ReadWindow")
        .unwrap()
        .request
        .as_ref()
        .unwrap();
    let mode = request.find_param("Mode").unwrap();
    assert_eq!(child_names(mode), ["Left", "Right"]);
    assert_eq!(
        mode.children[1].parent_name,
        "ReadWindow.RQ_ReadWindow.Mode.Right"
    );
}

#[test]
fn test_parse_odx_table_key_mismatch_drops_only_that_param() {
    let c = parse_structures();
    let request = c.base_variants[0]
        .service("ReadWindow")
        .unwrap()
        .request
        .as_ref()
        .unwrap();
    let names: Vec<&str> = request.params.iter().map(|p| p.short_name.as_str()).collect();
    assert_eq!(names, ["Mode", "Selector"]);
}

#[test]
fn test_parse_odx_table_ref_lists_rows() {
    let c = parse_structures();
    let request = c.base_variants[0]
        .service("ReadWindow")
        .unwrap()
        .request
        .as_ref()
        .unwrap();
    let selector = request.find_param("Selector").unwrap();
    assert_eq!(child_names(selector), ["Mode1", "Mode2", "Mode3"]);
    let row = &selector.children[2];
    assert_eq!(row.parent_type, ParamParentKind::TableRow);
    assert_eq!(row.coded_const_value, "3");
    assert_eq!(child_names(row), ["Left", "Right"]);
}

#[test]
fn test_parse_odx_param_ids_unique_per_layer() {
    let c = parse_structures();
    let params = c.base_variants[0].all_params();
    let mut ids: Vec<&str> = params.iter().map(|p| p.id.as_str()).collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[test]
fn test_parse_odx_depth_limit_cuts_nesting() {
    let options = ParseOptions {
        max_structure_depth: 0,
        ..Default::default()
    };
    let c = parse_odx(
        include_bytes!("../../test-fixtures/odx/structures.odx"),
        &options,
    )
    .unwrap();
    let svc = c.base_variants[0].service("ReadWindow").unwrap();
    let response = &svc.pos_responses[0];
    let front = response.find_param("Front").unwrap();
    assert!(front.children.is_empty());
}

#[test]
fn test_parse_odx_malformed_input() {
    let err = parse_odx(b"<ODX><DIAG-LAYER-CONTAINER>", &ParseOptions::default());
    assert!(err.is_err());
    let err = parse_odx(b"no markup at all", &ParseOptions::default()).unwrap_err();
    assert!(matches!(err, diag_odx::LoadError::NoRoot));
}
