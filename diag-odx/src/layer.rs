//! Layer resolution: one PROTOCOL / FUNCTIONAL-GROUP / BASE-VARIANT /
//! ECU-VARIANT / ECU-SHARED-DATA element -> `Layer`.

use diag_db::{CompuMethod, CompuScale, Dtc, Layer, LayerId, LayerKind, NotInherited, TableRow, Unit};

use crate::options::ParseOptions;
use crate::service::{resolve_service, LayerContext, LayerMessages};
use crate::tables::LayerTables;
use crate::xml::{self, Element};

pub fn resolve_layer(el: &Element, kind: LayerKind, options: &ParseOptions) -> Layer {
    let short_name = el.child_text("SHORT-NAME");
    let tables = LayerTables::harvest(el);
    let ctx = LayerContext {
        layer_name: &short_name,
        tables: &tables,
        options,
    };
    let messages = LayerMessages::harvest(&ctx, el);

    let services = el
        .descendants("DIAG-SERVICE")
        .into_iter()
        .enumerate()
        .map(|(index, svc)| resolve_service(&ctx, svc, index, &messages))
        .collect::<Vec<_>>();

    let mut layer = Layer::new(kind, el.attr("ID").unwrap_or_default(), short_name.clone());
    layer.long_name = el.child_text("LONG-NAME");
    layer.description = el.child_text("DESC");
    layer.parent_ref_id = el
        .descendants("PARENT-REF")
        .first()
        .and_then(|r| r.attr("ID-REF"))
        .unwrap_or_default()
        .to_string();
    layer.rx_id = el.child_text("RECEIVE-ID");
    layer.tx_id = el.child_text("TRANSMIT-ID");
    layer.services = services;
    layer.units = el.descendants("UNIT").into_iter().map(parse_unit).collect();
    layer.compu_methods = el
        .descendants("COMPU-METHOD")
        .into_iter()
        .map(parse_compu_method)
        .collect();
    layer.data_object_props = tables.dops.dops().cloned().collect();
    layer.dtcs = el.descendants("DTC").into_iter().map(parse_dtc).collect();
    layer.linked_layer_ids = collect_links(el);
    layer.not_inherited = collect_not_inherited(el);
    layer.extensions = el
        .attributes()
        .filter(|(k, _)| *k != "ID")
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    log::debug!(
        "resolved {} '{}': {} service(s), {} link(s), {} standalone message(s)",
        kind,
        layer.short_name,
        layer.services.len(),
        layer.linked_layer_ids.len(),
        messages.len()
    );
    layer
}

/// Inheritance targets: DIAG-LAYER-LINKS `*-REF` children, then PARENT-REFs.
/// First occurrence wins.
pub fn collect_links(el: &Element) -> Vec<LayerId> {
    let link_refs = el
        .children_named("DIAG-LAYER-LINKS")
        .flat_map(|links| links.children_named("DIAG-LAYER-LINK"))
        .flat_map(Element::children)
        .filter(|c| c.local_name().ends_with("-REF"));
    let parent_refs = el.descendants("PARENT-REF");

    let mut out: Vec<LayerId> = Vec::new();
    for r in link_refs.chain(parent_refs) {
        let Some(id) = r.attr("ID-REF").filter(|id| !id.is_empty()) else {
            continue;
        };
        if !out.iter().any(|seen| seen.as_str() == id) {
            out.push(LayerId::from(id));
        }
    }
    out
}

/// Services excluded from inheritance, by short name (DIAG-COMM-SNREF) and
/// by id (DIAG-COMM-REF).
pub fn collect_not_inherited(el: &Element) -> NotInherited {
    let mut ni = NotInherited::default();
    for block in el.descendants("NOT-INHERITED-DIAG-COMMS") {
        for sn in block.descendants("DIAG-COMM-SNREF") {
            let name = match sn.attr("SHORT-NAME") {
                Some(name) => name.to_string(),
                None => sn.text(),
            };
            if !name.is_empty() {
                ni.service_short_names.insert(name);
            }
        }
        for r in block.descendants("DIAG-COMM-REF") {
            if let Some(id) = r.attr("ID-REF").filter(|id| !id.is_empty()) {
                ni.service_ids.insert(id.to_string());
            }
        }
    }
    ni
}

pub fn parse_unit(el: &Element) -> Unit {
    Unit {
        id: el.attr("ID").unwrap_or_default().to_string(),
        short_name: el.child_text("SHORT-NAME"),
        long_name: el.child_text("LONG-NAME"),
        display_name: el.child_text("DISPLAY-NAME"),
        factor_si_to_unit: el.child_text("FACTOR-SI-TO-UNIT"),
        offset_si_to_unit: el.child_text("OFFSET-SI-TO-UNIT"),
        physical_dimension_ref: xml::ref_id(Some(el), "PHYSICAL-DIMENSION-REF").to_string(),
    }
}

/// Coefficients of one side of a rational function. Both the standard
/// COMPU-NUMERATOR/V form and bare NUM/DEN elements occur.
fn coefficients(coeffs: Option<&Element>, wrapper: &str, bare: &str) -> Vec<String> {
    match xml::child(coeffs, wrapper) {
        Some(w) => w.children_named("V").map(Element::text).collect(),
        None => xml::descendants(coeffs, bare)
            .into_iter()
            .map(Element::text)
            .collect(),
    }
}

pub fn parse_compu_method(el: &Element) -> CompuMethod {
    let scales = xml::descendants(el.child("COMPU-INTERNAL-TO-PHYS"), "COMPU-SCALE")
        .into_iter()
        .map(|s| {
            let cconst = s.child("COMPU-CONST");
            let coeffs = s.child("COMPU-RATIONAL-COEFFS");
            CompuScale {
                lower_limit: s.child_text("LOWER-LIMIT"),
                upper_limit: s.child_text("UPPER-LIMIT"),
                compu_const_v: xml::child_text(cconst, "V"),
                compu_const_vt: xml::child_text(cconst, "VT"),
                numerators: coefficients(coeffs, "COMPU-NUMERATOR", "NUM"),
                denominators: coefficients(coeffs, "COMPU-DENOMINATOR", "DEN"),
            }
        })
        .collect();

    let table_rows = el
        .descendants("TABLE-ROW")
        .into_iter()
        .map(|tr| TableRow {
            id: tr.attr("ID").unwrap_or_default().to_string(),
            short_name: tr.child_text("SHORT-NAME"),
            long_name: tr.child_text("LONG-NAME"),
            description: tr.child_text("DESC"),
            key: tr.child_text("KEY"),
            structure_ref_id: xml::ref_id(Some(tr), "STRUCTURE-REF").to_string(),
        })
        .collect();

    CompuMethod {
        id: el.attr("ID").unwrap_or_default().to_string(),
        short_name: el.child_text("SHORT-NAME"),
        long_name: el.child_text("LONG-NAME"),
        category: el.child_text("CATEGORY"),
        scales,
        table_rows,
    }
}

pub fn parse_dtc(el: &Element) -> Dtc {
    Dtc {
        id: el.attr("ID").unwrap_or_default().to_string(),
        short_name: el.child_text("SHORT-NAME"),
        long_name: el.child_text("LONG-NAME"),
        description: el.child_text("DESC"),
        trouble_code: el.child_text("TROUBLE-CODE"),
        display_trouble_code: el.child_text("DISPLAY-TROUBLE-CODE"),
        level: el.child_text("LEVEL"),
        text: el.child_text("TEXT"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{parse_str, EntityMode};

    const LAYER: &str = r#"
        <ECU-VARIANT ID="EV_1" VENDOR-FLAG="x">
          <SHORT-NAME>EV1</SHORT-NAME>
          <LONG-NAME>Engine variant</LONG-NAME>
          <DIAG-LAYER-LINKS>
            <DIAG-LAYER-LINK><BASE-VARIANT-REF ID-REF="BV_1"/></DIAG-LAYER-LINK>
            <DIAG-LAYER-LINK><PROTOCOL-REF ID-REF="PR_1"/><OTHER ID-REF="IGNORED"/></DIAG-LAYER-LINK>
          </DIAG-LAYER-LINKS>
          <PARENT-REFS>
            <PARENT-REF ID-REF="BV_1">
              <NOT-INHERITED-DIAG-COMMS>
                <NOT-INHERITED-DIAG-COMM><DIAG-COMM-SNREF SHORT-NAME="Reset"/></NOT-INHERITED-DIAG-COMM>
                <NOT-INHERITED-DIAG-COMM><DIAG-COMM-REF ID-REF="DS_OLD"/></NOT-INHERITED-DIAG-COMM>
              </NOT-INHERITED-DIAG-COMMS>
            </PARENT-REF>
            <PARENT-REF ID-REF="FG_1"/>
          </PARENT-REFS>
          <UNIT-SPEC><UNITS>
            <UNIT ID="U_KMH"><SHORT-NAME>kmh</SHORT-NAME><DISPLAY-NAME>km/h</DISPLAY-NAME>
              <PHYSICAL-DIMENSION-REF ID-REF="PD_SPEED"/></UNIT>
          </UNITS></UNIT-SPEC>
          <DATA-OBJECT-PROPS>
            <DATA-OBJECT-PROP ID="DOP_SPEED">
              <SHORT-NAME>Speed</SHORT-NAME>
              <COMPU-METHOD>
                <CATEGORY>LINEAR</CATEGORY>
                <COMPU-INTERNAL-TO-PHYS><COMPU-SCALES><COMPU-SCALE>
                  <COMPU-RATIONAL-COEFFS>
                    <COMPU-NUMERATOR><V>0</V><V>0.5</V></COMPU-NUMERATOR>
                    <COMPU-DENOMINATOR><V>1</V></COMPU-DENOMINATOR>
                  </COMPU-RATIONAL-COEFFS>
                </COMPU-SCALE></COMPU-SCALES></COMPU-INTERNAL-TO-PHYS>
              </COMPU-METHOD>
            </DATA-OBJECT-PROP>
          </DATA-OBJECT-PROPS>
          <DTCS>
            <DTC ID="DTC_1"><SHORT-NAME>P0100</SHORT-NAME><TROUBLE-CODE>256</TROUBLE-CODE>
              <DISPLAY-TROUBLE-CODE>P0100</DISPLAY-TROUBLE-CODE><TEXT>MAF circuit</TEXT></DTC>
          </DTCS>
        </ECU-VARIANT>"#;

    #[test]
    fn layer_metadata_and_records() {
        let el = parse_str(LAYER, EntityMode::Strict).unwrap();
        let layer = resolve_layer(&el, LayerKind::EcuVariant, &ParseOptions::default());

        assert_eq!(layer.id.as_str(), "EV_1");
        assert_eq!(layer.short_name, "EV1");
        assert_eq!(layer.long_name, "Engine variant");
        assert_eq!(layer.parent_ref_id, "BV_1");
        assert_eq!(layer.units[0].display_name, "km/h");
        assert_eq!(layer.units[0].physical_dimension_ref, "PD_SPEED");
        assert_eq!(layer.data_object_props[0].compu_category, "LINEAR");
        let scale = &layer.compu_methods[0].scales[0];
        assert_eq!(scale.numerators, ["0", "0.5"]);
        assert_eq!(scale.denominators, ["1"]);
        assert_eq!(layer.dtcs[0].text, "MAF circuit");
        assert_eq!(layer.extensions.get("VENDOR-FLAG").map(String::as_str), Some("x"));
        assert!(!layer.extensions.contains_key("ID"));
    }

    #[test]
    fn links_are_ordered_and_deduplicated() {
        let el = parse_str(LAYER, EntityMode::Strict).unwrap();
        let ids: Vec<String> = collect_links(&el).into_iter().map(|l| l.0).collect();
        assert_eq!(ids, ["BV_1", "PR_1", "FG_1"]);
    }

    #[test]
    fn not_inherited_sets_are_typed() {
        let el = parse_str(LAYER, EntityMode::Strict).unwrap();
        let ni = collect_not_inherited(&el);
        assert!(ni.service_short_names.contains("Reset"));
        assert!(ni.service_ids.contains("DS_OLD"));
        assert_eq!(ni.service_short_names.len() + ni.service_ids.len(), 2);
    }
}
