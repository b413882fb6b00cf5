//! Per-layer lookup tables.
//!
//! Built once per layer before any service is resolved. Structure and row
//! definitions are kept as borrowed template elements: they are expanded
//! into parameters per use site by the parameter resolver, never stored in
//! the model.

use std::collections::HashMap;

use diag_db::DataObjectProp;

use crate::xml::{self, Element};

/// Element tags that define a reusable parameter structure.
pub const STRUCTURE_TAGS: [&str; 4] = ["STRUCTURE", "STRUCT", "STRUCTURE-DEF", "DATA-STRUCTURE-DEF"];

/// Ordered PARAM definitions of one structure.
pub type StructureParams<'a> = Vec<&'a Element>;

/// PARAM definitions of a structure element: the PARAMS block if there is
/// one, otherwise every PARAM below it.
pub fn structure_params(structure: &Element) -> StructureParams<'_> {
    match structure.child("PARAMS") {
        Some(block) => block.children_named("PARAM").collect(),
        None => structure.descendants("PARAM"),
    }
}

#[derive(Debug, Default)]
pub struct StructureTable<'a> {
    pub by_id: HashMap<String, StructureParams<'a>>,
    pub by_short_name: HashMap<String, StructureParams<'a>>,
}

impl<'a> StructureTable<'a> {
    /// Look up by id first, then by short name. Empty keys never match.
    pub fn lookup(&self, id: &str, short_name: &str) -> Option<&StructureParams<'a>> {
        let by_id = (!id.is_empty()).then(|| self.by_id.get(id)).flatten();
        by_id.or_else(|| {
            (!short_name.is_empty())
                .then(|| self.by_short_name.get(short_name))
                .flatten()
        })
    }

    pub fn len(&self) -> usize {
        self.by_id.len().max(self.by_short_name.len())
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty() && self.by_short_name.is_empty()
    }

    /// Resolve an element's `STRUCTURE-REF` child by ID-REF, then by the
    /// referenced short name.
    pub fn resolve_ref(&self, owner: &'a Element) -> StructureParams<'a> {
        let Some(sref) = owner.child("STRUCTURE-REF") else {
            return Vec::new();
        };
        let id = sref.attr("ID-REF").unwrap_or_default();
        let short_name = sref.child_text("SHORT-NAME");
        let short_name = if short_name.is_empty() {
            sref.attr("SHORT-NAME").unwrap_or_default().to_string()
        } else {
            short_name
        };
        self.lookup(id, &short_name).cloned().unwrap_or_default()
    }

    /// Structure children of a DOP or table row: an inline STRUCTURE first,
    /// then a STRUCTURE-REF.
    fn children_of(&self, owner: &'a Element) -> StructureParams<'a> {
        let inline = owner.child("STRUCTURE").map(structure_params).unwrap_or_default();
        if inline.is_empty() {
            self.resolve_ref(owner)
        } else {
            inline
        }
    }
}

pub fn harvest_structures(layer: &Element) -> StructureTable<'_> {
    let mut table = StructureTable::default();
    for tag in STRUCTURE_TAGS {
        for st in layer.descendants(tag) {
            let params = structure_params(st);
            let short_name = st.child_text("SHORT-NAME");
            if let Some(id) = st.attr("ID").filter(|id| !id.is_empty()) {
                table.by_id.insert(id.to_string(), params.clone());
            }
            if !short_name.is_empty() {
                table.by_short_name.insert(short_name, params);
            }
        }
    }
    table
}

/// A DOP plus its parse-time structure template.
#[derive(Debug, Clone)]
pub struct DopEntry<'a> {
    pub dop: DataObjectProp,
    pub structure_params: StructureParams<'a>,
}

pub fn parse_dop<'a>(el: &'a Element, structures: &StructureTable<'a>) -> DopEntry<'a> {
    let el_opt = Some(el);
    let diag = xml::child(el_opt, "DIAG-CODED-TYPE");
    let phys = xml::child(el_opt, "PHYSICAL-TYPE");
    let compu = xml::child(el_opt, "COMPU-METHOD");

    let structure_params = structures.children_of(el);
    let structure_ref = match el.child("STRUCTURE") {
        Some(inline) => xml::attr(Some(inline), "ID", "").to_string(),
        None => xml::ref_id(el_opt, "STRUCTURE-REF").to_string(),
    };

    let dop = DataObjectProp {
        id: xml::attr(el_opt, "ID", "").to_string(),
        short_name: el.child_text("SHORT-NAME"),
        long_name: el.child_text("LONG-NAME"),
        description: el.child_text("DESC"),
        base_data_type: xml::attr(diag, "BASE-DATA-TYPE", "").to_string(),
        physical_base_data_type: xml::attr(phys, "BASE-DATA-TYPE", "").to_string(),
        bit_length: xml::child_text(diag, "BIT-LENGTH"),
        min_length: xml::child_text(diag, "MIN-LENGTH"),
        max_length: xml::child_text(diag, "MAX-LENGTH"),
        is_high_low_byte_order: xml::attr(diag, "IS-HIGHLOW-BYTE-ORDER", "").to_string(),
        unit_ref_id: xml::ref_id(el_opt, "UNIT-REF").to_string(),
        compu_category: xml::child_text(compu, "CATEGORY"),
        structure_ref,
    };

    DopEntry {
        dop,
        structure_params,
    }
}

#[derive(Debug, Default)]
pub struct DopTable<'a> {
    entries: Vec<DopEntry<'a>>,
    by_id: HashMap<String, usize>,
    by_short_name: HashMap<String, usize>,
}

impl<'a> DopTable<'a> {
    pub fn insert(&mut self, entry: DopEntry<'a>) {
        let idx = self.entries.len();
        if !entry.dop.id.is_empty() {
            self.by_id.insert(entry.dop.id.clone(), idx);
        }
        if !entry.dop.short_name.is_empty() {
            self.by_short_name.insert(entry.dop.short_name.clone(), idx);
        }
        self.entries.push(entry);
    }

    pub fn get_by_id(&self, id: &str) -> Option<&DopEntry<'a>> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    pub fn get_by_short_name(&self, short_name: &str) -> Option<&DopEntry<'a>> {
        self.by_short_name.get(short_name).map(|&i| &self.entries[i])
    }

    /// Every harvested DOP in document order.
    pub fn dops(&self) -> impl Iterator<Item = &DataObjectProp> {
        self.entries.iter().map(|e| &e.dop)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn harvest_dops<'a>(layer: &'a Element, structures: &StructureTable<'a>) -> DopTable<'a> {
    let mut table = DopTable::default();
    for el in layer.descendants("DATA-OBJECT-PROP") {
        table.insert(parse_dop(el, structures));
    }
    table
}

#[derive(Debug, Clone)]
pub struct TableRowDef<'a> {
    pub id: String,
    pub short_name: String,
    pub key: String,
    pub structure_params: StructureParams<'a>,
}

#[derive(Debug, Clone)]
pub struct TableDef<'a> {
    pub id: String,
    pub short_name: String,
    pub key_dop_ref: String,
    pub rows: Vec<TableRowDef<'a>>,
}

impl<'a> TableDef<'a> {
    /// The row whose key equals `key` exactly.
    pub fn row(&self, key: &str) -> Option<&TableRowDef<'a>> {
        self.rows.iter().find(|r| r.key == key)
    }
}

#[derive(Debug, Default)]
pub struct TableMap<'a> {
    tables: Vec<TableDef<'a>>,
    by_id: HashMap<String, usize>,
    by_short_name: HashMap<String, usize>,
}

impl<'a> TableMap<'a> {
    pub fn insert(&mut self, table: TableDef<'a>) {
        let idx = self.tables.len();
        if !table.id.is_empty() {
            self.by_id.insert(table.id.clone(), idx);
        }
        if !table.short_name.is_empty() {
            self.by_short_name.insert(table.short_name.clone(), idx);
        }
        self.tables.push(table);
    }

    pub fn get(&self, id: &str) -> Option<&TableDef<'a>> {
        self.by_id.get(id).map(|&i| &self.tables[i])
    }

    pub fn get_by_short_name(&self, short_name: &str) -> Option<&TableDef<'a>> {
        self.by_short_name.get(short_name).map(|&i| &self.tables[i])
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

pub fn harvest_tables<'a>(layer: &'a Element, structures: &StructureTable<'a>) -> TableMap<'a> {
    let mut map = TableMap::default();
    for el in layer.descendants("TABLE") {
        let rows = el
            .descendants("TABLE-ROW")
            .into_iter()
            .map(|row| TableRowDef {
                id: row.attr("ID").unwrap_or_default().to_string(),
                short_name: row.child_text("SHORT-NAME"),
                key: row.child_text("KEY"),
                structure_params: structures.children_of(row),
            })
            .collect();
        map.insert(TableDef {
            id: el.attr("ID").unwrap_or_default().to_string(),
            short_name: el.child_text("SHORT-NAME"),
            key_dop_ref: xml::ref_id(Some(el), "KEY-DOP-REF").to_string(),
            rows,
        });
    }
    map
}

/// The three lookup tables of one layer.
#[derive(Debug, Default)]
pub struct LayerTables<'a> {
    pub structures: StructureTable<'a>,
    pub dops: DopTable<'a>,
    pub tables: TableMap<'a>,
}

impl<'a> LayerTables<'a> {
    pub fn harvest(layer: &'a Element) -> Self {
        let structures = harvest_structures(layer);
        let dops = harvest_dops(layer, &structures);
        let tables = harvest_tables(layer, &structures);
        log::debug!(
            "harvested {} structure(s), {} DOP(s), {} table(s)",
            structures.len(),
            dops.len(),
            tables.len()
        );
        Self {
            structures,
            dops,
            tables,
        }
    }
}
