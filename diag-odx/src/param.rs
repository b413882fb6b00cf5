//! Parameter resolution: PARAM element -> `Param` tree.
//!
//! Composite parameters are expanded recursively from the layer's structure,
//! DOP and table definitions. Every child is resolved in isolation: a child
//! that fails is logged and left out, its siblings are unaffected.

use diag_db::{Param, ParamParentKind};
use thiserror::Error;

use crate::identity;
use crate::tables::{LayerTables, StructureParams, TableDef};
use crate::xml::{self, Element};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("{field} is not an unsigned integer: '{value}'")]
    MalformedNumber { field: &'static str, value: String },
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("no row with key '{key}' in table '{table}'")]
    NoMatchingRow { table: String, key: String },
    #[error("structure of '{0}' contains itself")]
    CyclicStructure(String),
    #[error("structure nesting exceeds {0} levels")]
    DepthLimit(usize),
}

/// Coded value of a parameter: CODED-VALUE text, else V text, else a
/// CODED-VALUE attribute.
pub fn coded_value(el: &Element) -> String {
    el.first_descendant_text("CODED-VALUE")
        .or_else(|| el.first_descendant_text("V"))
        .unwrap_or_else(|| el.attr_ci(&["CODED-VALUE"]).unwrap_or_default().to_string())
}

fn unsigned(field: &'static str, value: String) -> Result<String, ParamError> {
    if value.is_empty() || value.parse::<u64>().is_ok() {
        Ok(value)
    } else {
        Err(ParamError::MalformedNumber { field, value })
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// ID-REF and short name of a table reference element.
fn table_ref(el: &Element) -> (&str, String) {
    let id = el
        .attr("ID-REF")
        .or_else(|| el.child("TABLE-REF").and_then(|r| r.attr("ID-REF")))
        .unwrap_or_default();
    let short_name = el
        .child("TABLE-SNREF")
        .and_then(|r| r.attr("SHORT-NAME"))
        .map(str::to_string)
        .unwrap_or_else(|| el.child_text("SHORT-NAME"));
    (id, short_name)
}

/// Resolves PARAM elements of one layer and service.
pub struct ParamResolver<'t, 'a> {
    tables: &'t LayerTables<'a>,
    layer_name: &'t str,
    service_name: &'t str,
    max_depth: usize,
}

impl<'t, 'a> ParamResolver<'t, 'a> {
    pub fn new(
        tables: &'t LayerTables<'a>,
        layer_name: &'t str,
        service_name: &'t str,
        max_depth: usize,
    ) -> Self {
        Self {
            tables,
            layer_name,
            service_name,
            max_depth,
        }
    }

    /// Resolve sibling PARAM elements under `parent_path` and assign their
    /// ids. Elements that fail are logged and omitted.
    pub fn resolve_params(
        &self,
        elements: &[&'a Element],
        parent_kind: ParamParentKind,
        parent_path: &str,
    ) -> Vec<Param> {
        let mut chain = Vec::new();
        let mut params = self.resolve_siblings(elements, parent_kind, parent_path, &mut chain);
        let scope = identity::IdScope {
            layer: self.layer_name,
            service: self.service_name,
            service_key: "",
        };
        identity::assign_ids(&mut params, &scope, &mut Vec::new());
        params
    }

    /// Resolve one PARAM element. The returned tree carries no ids yet.
    pub fn resolve(
        &self,
        el: &'a Element,
        parent_kind: ParamParentKind,
        parent_path: &str,
    ) -> Result<Param, ParamError> {
        self.resolve_in(el, parent_kind, parent_path, &mut Vec::new())
    }

    fn resolve_siblings(
        &self,
        elements: &[&'a Element],
        kind: ParamParentKind,
        parent_path: &str,
        chain: &mut Vec<&'a Element>,
    ) -> Vec<Param> {
        let mut out = Vec::with_capacity(elements.len());
        for &el in elements {
            match self.resolve_in(el, kind, parent_path, chain) {
                Ok(p) => out.push(p),
                Err(e) => log::warn!(
                    "Skipping PARAM '{}' under '{}' in layer '{}': {}",
                    el.child_text("SHORT-NAME"),
                    parent_path,
                    self.layer_name,
                    e
                ),
            }
        }
        out
    }

    /// `chain` holds the PARAM elements currently being expanded, outermost
    /// first.
    fn resolve_in(
        &self,
        el: &'a Element,
        kind: ParamParentKind,
        parent_path: &str,
        chain: &mut Vec<&'a Element>,
    ) -> Result<Param, ParamError> {
        let short_name = el.child_text("SHORT-NAME");
        if chain.iter().any(|active| std::ptr::eq(*active, el)) {
            return Err(ParamError::CyclicStructure(short_name));
        }
        if chain.len() > self.max_depth {
            return Err(ParamError::DepthLimit(self.max_depth));
        }

        let mut p = self.scalars(el, kind)?;
        let next_path = join_path(parent_path, &short_name);
        p.parent_name.clone_from(&next_path);

        let by_id = (!p.dop_ref_id.is_empty())
            .then(|| self.tables.dops.get_by_id(&p.dop_ref_id))
            .flatten();
        let dop = by_id.or_else(|| {
            (!p.dop_sn_ref_name.is_empty())
                .then(|| self.tables.dops.get_by_short_name(&p.dop_sn_ref_name))
                .flatten()
        });

        // A DOP is a type default and never overrides what the PARAM says
        let mut structure: StructureParams<'a> = Vec::new();
        if let Some(entry) = dop {
            let d = &entry.dop;
            fill_if_empty(&mut p.base_data_type, &d.base_data_type);
            fill_if_empty(&mut p.physical_base_type, &d.physical_base_data_type);
            fill_if_empty(&mut p.bit_length, &d.bit_length);
            fill_if_empty(&mut p.min_length, &d.min_length);
            fill_if_empty(&mut p.max_length, &d.max_length);
            fill_if_empty(&mut p.is_high_low_byte_order, &d.is_high_low_byte_order);
            structure.clone_from(&entry.structure_params);
        }
        if structure.is_empty() {
            // The DOP reference may point straight at a structure
            if let Some(params) = self
                .tables
                .structures
                .lookup(&p.dop_ref_id, &p.dop_sn_ref_name)
            {
                structure.clone_from(params);
            }
        }
        if structure.is_empty() {
            structure = self.tables.structures.resolve_ref(el);
        }

        chain.push(el);
        let expanded = self.expand(el, &p, &next_path, &structure, chain);
        chain.pop();
        p.children = expanded?;

        Ok(p)
    }

    fn expand(
        &self,
        el: &'a Element,
        p: &Param,
        next_path: &str,
        structure: &[&'a Element],
        chain: &mut Vec<&'a Element>,
    ) -> Result<Vec<Param>, ParamError> {
        let mut children =
            self.resolve_siblings(structure, ParamParentKind::Structure, next_path, chain);

        let diag = el.child("DIAG-CODED-TYPE");

        if let Some(tref) = xml::child(diag, "TABLE-REF") {
            let (id, short_name) = table_ref(tref);
            match self.table(id, &short_name) {
                Some(table) => {
                    children.extend(self.table_rows(table, next_path, chain));
                }
                None => log::debug!(
                    "TABLE-REF '{}' of '{}' does not resolve",
                    id,
                    p.short_name
                ),
            }
        }

        if let Some(tkey) = xml::child(diag, "TABLE-KEY") {
            let (id, short_name) = table_ref(tkey);
            let table = self.table(id, &short_name).ok_or_else(|| {
                ParamError::TableNotFound(if id.is_empty() { short_name.clone() } else { id.to_string() })
            })?;
            let row = table
                .row(&p.coded_const_value)
                .ok_or_else(|| ParamError::NoMatchingRow {
                    table: table.short_name.clone(),
                    key: p.coded_const_value.clone(),
                })?;
            children.extend(self.resolve_siblings(
                &row.structure_params,
                ParamParentKind::Structure,
                next_path,
                chain,
            ));
        }

        Ok(children)
    }

    fn table(&self, id: &str, short_name: &str) -> Option<&'t TableDef<'a>> {
        let tables = &self.tables.tables;
        (!id.is_empty())
            .then(|| tables.get(id))
            .flatten()
            .or_else(|| {
                (!short_name.is_empty())
                    .then(|| tables.get_by_short_name(short_name))
                    .flatten()
            })
    }

    /// One synthetic TABLE-ROW child per row, each carrying the row's
    /// structure.
    fn table_rows(
        &self,
        table: &TableDef<'a>,
        next_path: &str,
        chain: &mut Vec<&'a Element>,
    ) -> Vec<Param> {
        table
            .rows
            .iter()
            .map(|row| {
                let name = if row.short_name.is_empty() {
                    row.key.clone()
                } else {
                    row.short_name.clone()
                };
                let row_path = join_path(next_path, &name);
                let children = self.resolve_siblings(
                    &row.structure_params,
                    ParamParentKind::Structure,
                    &row_path,
                    chain,
                );
                Param {
                    short_name: name,
                    coded_const_value: row.key.clone(),
                    parent_type: ParamParentKind::TableRow,
                    parent_name: row_path,
                    layer_name: self.layer_name.to_string(),
                    service_short_name: self.service_name.to_string(),
                    children,
                    ..Default::default()
                }
            })
            .collect()
    }

    fn scalars(&self, el: &Element, kind: ParamParentKind) -> Result<Param, ParamError> {
        let el_opt = Some(el);
        let diag = el.child("DIAG-CODED-TYPE");
        let phys = el.child("PHYSICAL-TYPE");

        let dop_sn_ref_name = match el.child("DOP-SNREF") {
            Some(sn) => match sn.attr("SHORT-NAME") {
                Some(name) => name.to_string(),
                None => sn.child_text("SHORT-NAME"),
            },
            None => String::new(),
        };
        let phys_const_value = match el.child_text("PHYS-CONSTANT-VALUE") {
            v if v.is_empty() => el.child_text("PHYS-CONST-VALUE"),
            v => v,
        };

        Ok(Param {
            short_name: el.child_text("SHORT-NAME"),
            long_name: el.child_text("LONG-NAME"),
            description: el.child_text("DESC"),
            semantic: xml::attr_ci(el_opt, &["SEMANTIC"]).to_string(),
            byte_position: unsigned("BYTE-POSITION", el.child_text("BYTE-POSITION"))?,
            bit_position: unsigned("BIT-POSITION", el.child_text("BIT-POSITION"))?,
            bit_length: unsigned("BIT-LENGTH", xml::child_text(diag, "BIT-LENGTH"))?,
            min_length: unsigned("MIN-LENGTH", xml::child_text(diag, "MIN-LENGTH"))?,
            max_length: unsigned("MAX-LENGTH", xml::child_text(diag, "MAX-LENGTH"))?,
            base_data_type: xml::attr(diag, "BASE-DATA-TYPE", "").to_string(),
            physical_base_type: xml::attr(phys, "BASE-DATA-TYPE", "").to_string(),
            is_high_low_byte_order: xml::attr(diag, "IS-HIGHLOW-BYTE-ORDER", "").to_string(),
            coded_const_value: coded_value(el),
            phys_const_value,
            dop_ref_id: xml::ref_id(el_opt, "DOP-REF").to_string(),
            dop_sn_ref_name,
            compu_method_ref_id: xml::ref_id(el_opt, "COMPU-METHOD-REF").to_string(),
            parent_type: kind,
            layer_name: self.layer_name.to_string(),
            service_short_name: self.service_name.to_string(),
            attributes: el
                .attributes()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        })
    }
}

fn fill_if_empty(field: &mut String, default: &str) {
    if field.is_empty() && !default.is_empty() {
        *field = default.to_string();
    }
}
