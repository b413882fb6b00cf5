use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// --- Kinds ---

/// Kind of diagnostic layer, one per ODX layer element tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum LayerKind {
    Protocol,
    FunctionalGroup,
    BaseVariant,
    EcuVariant,
    EcuSharedData,
}

impl LayerKind {
    /// All kinds in container order.
    pub const ALL: [LayerKind; 5] = [
        LayerKind::Protocol,
        LayerKind::FunctionalGroup,
        LayerKind::BaseVariant,
        LayerKind::EcuVariant,
        LayerKind::EcuSharedData,
    ];

    /// The ODX element tag for this kind.
    pub fn tag(self) -> &'static str {
        match self {
            LayerKind::Protocol => "PROTOCOL",
            LayerKind::FunctionalGroup => "FUNCTIONAL-GROUP",
            LayerKind::BaseVariant => "BASE-VARIANT",
            LayerKind::EcuVariant => "ECU-VARIANT",
            LayerKind::EcuSharedData => "ECU-SHARED-DATA",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        LayerKind::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Context a parameter was resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParamParentKind {
    #[default]
    #[serde(rename = "REQUEST")]
    Request,
    #[serde(rename = "POS_RESPONSE")]
    PosResponse,
    #[serde(rename = "NEG_RESPONSE")]
    NegResponse,
    #[serde(rename = "STRUCTURE")]
    Structure,
    /// Key parameter of a table lookup. Rows selected by key are inlined as
    /// `Structure` children, so the resolver never assigns this itself.
    #[serde(rename = "TABLE-KEY")]
    TableKey,
    #[serde(rename = "TABLE-ROW")]
    TableRow,
}

impl ParamParentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamParentKind::Request => "REQUEST",
            ParamParentKind::PosResponse => "POS_RESPONSE",
            ParamParentKind::NegResponse => "NEG_RESPONSE",
            ParamParentKind::Structure => "STRUCTURE",
            ParamParentKind::TableKey => "TABLE-KEY",
            ParamParentKind::TableRow => "TABLE-ROW",
        }
    }
}

impl fmt::Display for ParamParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a service message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum MessageKind {
    #[default]
    Request,
    PosResponse,
    NegResponse,
}

impl MessageKind {
    /// The ODX element tag for an inline message of this kind.
    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::Request => "REQUEST",
            MessageKind::PosResponse => "POS-RESPONSE",
            MessageKind::NegResponse => "NEG-RESPONSE",
        }
    }
}

impl From<MessageKind> for ParamParentKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Request => ParamParentKind::Request,
            MessageKind::PosResponse => ParamParentKind::PosResponse,
            MessageKind::NegResponse => ParamParentKind::NegResponse,
        }
    }
}

/// ODX `ID` of a diagnostic layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        LayerId(s.to_string())
    }
}

impl From<String> for LayerId {
    fn from(s: String) -> Self {
        LayerId(s)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity used when deduplicating merged collections: the ODX `ID` if
/// present, else the short name. Items with neither have no key.
pub trait Keyed {
    fn id(&self) -> &str;
    fn short_name(&self) -> &str;

    fn key(&self) -> Option<&str> {
        if !self.id().is_empty() {
            Some(self.id())
        } else if !self.short_name().is_empty() {
            Some(self.short_name())
        } else {
            None
        }
    }
}

macro_rules! impl_keyed {
    ($($ty:ty),*) => {
        $(impl Keyed for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn short_name(&self) -> &str {
                &self.short_name
            }
        })*
    };
}

// --- Parameters ---

/// A diagnostic parameter. Composite parameters own their children.
///
/// ODX values are kept as the text found in the document; nothing here is
/// converted to physical values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Param {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub description: String,
    pub semantic: String,

    pub byte_position: String,
    pub bit_position: String,
    pub bit_length: String,
    pub min_length: String,
    pub max_length: String,

    pub base_data_type: String,
    pub physical_base_type: String,
    pub is_high_low_byte_order: String,

    pub coded_const_value: String,
    pub phys_const_value: String,

    pub dop_ref_id: String,
    pub dop_sn_ref_name: String,
    pub compu_method_ref_id: String,

    pub parent_type: ParamParentKind,
    /// Full dotted position inside the owning message, ending with this
    /// parameter's short name.
    pub parent_name: String,
    pub layer_name: String,
    pub service_short_name: String,

    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Param>,
}

impl Param {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// This parameter and all its descendants, depth-first pre-order.
    pub fn flatten(&self) -> Vec<&Param> {
        flatten_params(std::slice::from_ref(self))
    }

    /// Number of parameters in this subtree, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Param::node_count).sum::<usize>()
    }

    pub fn find_child(&self, short_name: &str) -> Option<&Param> {
        self.children.iter().find(|c| c.short_name == short_name)
    }
}

/// Depth-first pre-order flatten of a parameter forest.
pub fn flatten_params(params: &[Param]) -> Vec<&Param> {
    let mut out = Vec::new();
    let mut stack: Vec<&Param> = params.iter().rev().collect();
    while let Some(p) = stack.pop() {
        out.push(p);
        stack.extend(p.children.iter().rev());
    }
    out
}

/// Apply `f` to every parameter of a forest, parents before children.
pub fn for_each_param_mut(params: &mut [Param], f: &mut impl FnMut(&mut Param)) {
    for p in params {
        f(p);
        for_each_param_mut(&mut p.children, f);
    }
}

// --- Services ---

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub kind: MessageKind,
    pub params: Vec<Param>,
}

impl Message {
    pub fn find_param(&self, short_name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.short_name == short_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub description: String,
    pub semantic: String,
    pub addressing: String,
    pub request: Option<Message>,
    pub pos_responses: Vec<Message>,
    pub neg_responses: Vec<Message>,
    pub attributes: BTreeMap<String, String>,
}

impl Service {
    /// Request first, then positive and negative responses.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.request
            .iter()
            .chain(self.pos_responses.iter())
            .chain(self.neg_responses.iter())
    }

    pub fn messages_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.request
            .iter_mut()
            .chain(self.pos_responses.iter_mut())
            .chain(self.neg_responses.iter_mut())
    }

    /// Every parameter of every message, nested ones included.
    pub fn all_params(&self) -> Vec<&Param> {
        self.messages()
            .flat_map(|m| flatten_params(&m.params))
            .collect()
    }

    /// UDS service id from the request parameter with semantic SERVICE-ID.
    pub fn service_id(&self) -> Option<u8> {
        let value = self.request_value_by_semantic(&["SERVICE-ID", "SID"])?;
        u8::try_from(parse_coded_int(value)?).ok()
    }

    /// Data identifier from the request parameter with semantic DATA-ID/ID.
    pub fn data_identifier(&self) -> Option<u16> {
        let value = self.request_value_by_semantic(&["DATA-ID", "ID", "DID"])?;
        u16::try_from(parse_coded_int(value)?).ok()
    }

    fn request_value_by_semantic(&self, semantics: &[&str]) -> Option<&str> {
        self.request
            .as_ref()?
            .params
            .iter()
            .find(|p| {
                !p.coded_const_value.is_empty()
                    && semantics
                        .iter()
                        .any(|s| p.semantic.eq_ignore_ascii_case(s))
            })
            .map(|p| p.coded_const_value.as_str())
    }
}

/// Coded values are decimal in ODX, but hex (`0x..`) shows up in vendor files.
fn parse_coded_int(value: &str) -> Option<u64> {
    let v = value.trim();
    if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        v.parse().ok()
    }
}

// --- Types and metadata ---

/// Reusable type descriptor. Structure-child definitions are resolved per use
/// site at parse time and are not part of the exported record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataObjectProp {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub description: String,
    pub base_data_type: String,
    pub physical_base_data_type: String,
    pub bit_length: String,
    pub min_length: String,
    pub max_length: String,
    pub is_high_low_byte_order: String,
    pub unit_ref_id: String,
    pub compu_category: String,
    pub structure_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub display_name: String,
    pub factor_si_to_unit: String,
    pub offset_si_to_unit: String,
    pub physical_dimension_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompuScale {
    pub lower_limit: String,
    pub upper_limit: String,
    pub compu_const_v: String,
    pub compu_const_vt: String,
    pub numerators: Vec<String>,
    pub denominators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub description: String,
    pub key: String,
    pub structure_ref_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompuMethod {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub category: String,
    pub scales: Vec<CompuScale>,
    pub table_rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dtc {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub description: String,
    pub trouble_code: String,
    pub display_trouble_code: String,
    pub level: String,
    pub text: String,
}

impl_keyed!(Service, DataObjectProp, Unit, CompuMethod, Dtc);

// --- Layers ---

/// Services a layer refuses to inherit from its linked layers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotInherited {
    pub service_short_names: BTreeSet<String>,
    pub service_ids: BTreeSet<String>,
}

impl NotInherited {
    pub fn is_empty(&self) -> bool {
        self.service_short_names.is_empty() && self.service_ids.is_empty()
    }

    pub fn excludes(&self, service: &Service) -> bool {
        (!service.short_name.is_empty() && self.service_short_names.contains(&service.short_name))
            || (!service.id.is_empty() && self.service_ids.contains(&service.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub kind: LayerKind,
    pub id: LayerId,
    pub short_name: String,
    pub long_name: String,
    pub description: String,
    pub parent_ref_id: String,
    pub rx_id: String,
    pub tx_id: String,
    pub services: Vec<Service>,
    pub units: Vec<Unit>,
    pub compu_methods: Vec<CompuMethod>,
    pub data_object_props: Vec<DataObjectProp>,
    pub dtcs: Vec<Dtc>,
    /// Layers this one inherits from. References only.
    pub linked_layer_ids: Vec<LayerId>,
    pub not_inherited: NotInherited,
    /// Free-form vendor attributes of the layer element.
    pub extensions: BTreeMap<String, String>,
}

impl Layer {
    pub fn new(kind: LayerKind, id: impl Into<LayerId>, short_name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            short_name: short_name.into(),
            long_name: String::new(),
            description: String::new(),
            parent_ref_id: String::new(),
            rx_id: String::new(),
            tx_id: String::new(),
            services: Vec::new(),
            units: Vec::new(),
            compu_methods: Vec::new(),
            data_object_props: Vec::new(),
            dtcs: Vec::new(),
            linked_layer_ids: Vec::new(),
            not_inherited: NotInherited::default(),
            extensions: BTreeMap::new(),
        }
    }

    pub fn service(&self, short_name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.short_name == short_name)
    }

    /// Every parameter of every service, nested ones included.
    pub fn all_params(&self) -> Vec<&Param> {
        self.services.iter().flat_map(Service::all_params).collect()
    }
}

/// Layers of one parsed document, grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Container {
    pub protocols: Vec<Layer>,
    pub functional_groups: Vec<Layer>,
    pub base_variants: Vec<Layer>,
    pub ecu_variants: Vec<Layer>,
    pub ecu_shared_data: Vec<Layer>,
}

impl Container {
    pub fn push(&mut self, layer: Layer) {
        self.layers_of_mut(layer.kind).push(layer);
    }

    pub fn layers_of(&self, kind: LayerKind) -> &[Layer] {
        match kind {
            LayerKind::Protocol => &self.protocols,
            LayerKind::FunctionalGroup => &self.functional_groups,
            LayerKind::BaseVariant => &self.base_variants,
            LayerKind::EcuVariant => &self.ecu_variants,
            LayerKind::EcuSharedData => &self.ecu_shared_data,
        }
    }

    fn layers_of_mut(&mut self, kind: LayerKind) -> &mut Vec<Layer> {
        match kind {
            LayerKind::Protocol => &mut self.protocols,
            LayerKind::FunctionalGroup => &mut self.functional_groups,
            LayerKind::BaseVariant => &mut self.base_variants,
            LayerKind::EcuVariant => &mut self.ecu_variants,
            LayerKind::EcuSharedData => &mut self.ecu_shared_data,
        }
    }

    /// All layers in kind order.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        LayerKind::ALL
            .into_iter()
            .flat_map(move |k| self.layers_of(k).iter())
    }

    pub fn into_layers(self) -> Vec<Layer> {
        let mut out = self.protocols;
        out.extend(self.functional_groups);
        out.extend(self.base_variants);
        out.extend(self.ecu_variants);
        out.extend(self.ecu_shared_data);
        out
    }

    pub fn layer_count(&self) -> usize {
        LayerKind::ALL.iter().map(|k| self.layers_of(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.layer_count() == 0
    }
}

// --- Database ---

/// A flattened record annotated with the short name of the layer it was
/// collected from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerItem<T> {
    pub layer_name: String,
    #[serde(flatten)]
    pub item: T,
}

/// The merged, resolved view over every parsed container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Database {
    pub protocols: Vec<Layer>,
    pub functional_groups: Vec<Layer>,
    pub base_variants: Vec<Layer>,
    pub ecu_variants: Vec<Layer>,
    pub ecu_shared_data: Vec<Layer>,

    /// Every parameter of every layer, depth-first pre-order. Each entry is
    /// a full copy of its subtree, so nested parameters also appear inside
    /// their parent's `children`.
    pub all_params: Vec<Param>,
    pub all_units: Vec<LayerItem<Unit>>,
    pub all_compu_methods: Vec<LayerItem<CompuMethod>>,
    pub all_data_objects: Vec<LayerItem<DataObjectProp>>,
    pub all_dtcs: Vec<LayerItem<Dtc>>,
}

impl Database {
    pub fn layers_of(&self, kind: LayerKind) -> &[Layer] {
        match kind {
            LayerKind::Protocol => &self.protocols,
            LayerKind::FunctionalGroup => &self.functional_groups,
            LayerKind::BaseVariant => &self.base_variants,
            LayerKind::EcuVariant => &self.ecu_variants,
            LayerKind::EcuSharedData => &self.ecu_shared_data,
        }
    }

    /// All layers in kind order.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        LayerKind::ALL
            .into_iter()
            .flat_map(move |k| self.layers_of(k).iter())
    }

    pub fn layer(&self, short_name: &str) -> Option<&Layer> {
        self.layers().find(|l| l.short_name == short_name)
    }

    pub fn layer_count(&self) -> usize {
        self.layers().count()
    }

    pub fn service_count(&self) -> usize {
        self.layers().map(|l| l.services.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Param {
        Param {
            short_name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn parse_coded_int_decimal_and_hex() {
        assert_eq!(parse_coded_int("34"), Some(34));
        assert_eq!(parse_coded_int("0x22"), Some(34));
        assert_eq!(parse_coded_int(" 0XF190 "), Some(0xF190));
        assert_eq!(parse_coded_int("F190"), None);
    }

    #[test]
    fn keyed_prefers_id_then_short_name() {
        let mut u = Unit {
            short_name: "km".into(),
            ..Default::default()
        };
        assert_eq!(u.key(), Some("km"));
        u.id = "U_KM".into();
        assert_eq!(u.key(), Some("U_KM"));
        assert_eq!(Unit::default().key(), None);
    }

    #[test]
    fn layer_kind_tags_roundtrip() {
        for kind in LayerKind::ALL {
            assert_eq!(LayerKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(LayerKind::from_tag("DIAG-LAYER"), None);
    }

    #[test]
    fn flatten_is_pre_order() {
        let mut root = leaf("A");
        let mut b = leaf("B");
        b.children.push(leaf("B1"));
        root.children = vec![b, leaf("C")];
        let names: Vec<&str> = root.flatten().iter().map(|p| p.short_name.as_str()).collect();
        assert_eq!(names, ["A", "B", "B1", "C"]);
    }

    #[test]
    fn not_inherited_matches_short_name_or_id() {
        let mut ni = NotInherited::default();
        ni.service_short_names.insert("Reset".into());
        ni.service_ids.insert("DS_2".into());
        let by_name = Service {
            short_name: "Reset".into(),
            ..Default::default()
        };
        let by_id = Service {
            id: "DS_2".into(),
            short_name: "Other".into(),
            ..Default::default()
        };
        let kept = Service {
            id: "DS_3".into(),
            short_name: "Keep".into(),
            ..Default::default()
        };
        assert!(ni.excludes(&by_name));
        assert!(ni.excludes(&by_id));
        assert!(!ni.excludes(&kept));
        assert!(!ni.excludes(&Service::default()));
    }
}
