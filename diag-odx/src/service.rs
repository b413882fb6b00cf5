//! Message and service resolution.
//!
//! Messages are resolved reference-first: a REQUEST-REF or RESPONSE-REF is
//! looked up among the layer's standalone message definitions, and only
//! when no reference resolves is an inline message used. A shared message
//! is cloned per using service, so each use site gets its own paths and ids.

use std::collections::HashMap;

use diag_db::{Message, MessageKind, Service};

use crate::identity;
use crate::options::ParseOptions;
use crate::param::ParamResolver;
use crate::tables::LayerTables;
use crate::xml::Element;

/// What every resolver below the layer needs to know about it.
pub struct LayerContext<'t, 'a> {
    pub layer_name: &'t str,
    pub tables: &'t LayerTables<'a>,
    pub options: &'t ParseOptions,
}

/// PARAM children of a message: the PARAMS block if present, else direct
/// PARAM children.
fn param_elements(el: &Element) -> Vec<&Element> {
    match el.child("PARAMS") {
        Some(block) => block.children_named("PARAM").collect(),
        None => el.children_named("PARAM").collect(),
    }
}

pub fn resolve_message<'a>(
    ctx: &LayerContext<'_, 'a>,
    el: &'a Element,
    kind: MessageKind,
    service_name: &str,
) -> Message {
    let resolver = ParamResolver::new(
        ctx.tables,
        ctx.layer_name,
        service_name,
        ctx.options.max_structure_depth,
    );
    Message {
        id: el.attr("ID").unwrap_or_default().to_string(),
        short_name: el.child_text("SHORT-NAME"),
        long_name: el.child_text("LONG-NAME"),
        kind,
        params: resolver.resolve_params(&param_elements(el), kind.into(), ""),
    }
}

/// Standalone message definitions of a layer, keyed by ID. Their parameter
/// paths are relative until a service adopts them.
#[derive(Debug, Default)]
pub struct LayerMessages {
    pub requests: HashMap<String, Message>,
    pub pos_responses: HashMap<String, Message>,
    pub neg_responses: HashMap<String, Message>,
}

impl LayerMessages {
    pub fn harvest<'a>(ctx: &LayerContext<'_, 'a>, layer: &'a Element) -> Self {
        let mut out = LayerMessages::default();
        let blocks: [(&str, MessageKind); 4] = [
            ("REQUESTS", MessageKind::Request),
            ("POS-RESPONSES", MessageKind::PosResponse),
            ("NEG-RESPONSES", MessageKind::NegResponse),
            ("GLOBAL-NEG-RESPONSES", MessageKind::NegResponse),
        ];
        for (block_tag, kind) in blocks {
            let item_tag = match block_tag {
                "GLOBAL-NEG-RESPONSES" => "GLOBAL-NEG-RESPONSE",
                _ => kind.tag(),
            };
            for block in layer.descendants(block_tag) {
                for el in block.children_named(item_tag) {
                    let Some(id) = el.attr("ID").filter(|id| !id.is_empty()) else {
                        continue;
                    };
                    let msg = resolve_message(ctx, el, kind, "");
                    out.map_mut(kind).insert(id.to_string(), msg);
                }
            }
        }
        out
    }

    fn map(&self, kind: MessageKind) -> &HashMap<String, Message> {
        match kind {
            MessageKind::Request => &self.requests,
            MessageKind::PosResponse => &self.pos_responses,
            MessageKind::NegResponse => &self.neg_responses,
        }
    }

    fn map_mut(&mut self, kind: MessageKind) -> &mut HashMap<String, Message> {
        match kind {
            MessageKind::Request => &mut self.requests,
            MessageKind::PosResponse => &mut self.pos_responses,
            MessageKind::NegResponse => &mut self.neg_responses,
        }
    }

    pub fn get(&self, kind: MessageKind, id: &str) -> Option<&Message> {
        self.map(kind).get(id)
    }

    pub fn len(&self) -> usize {
        self.requests.len() + self.pos_responses.len() + self.neg_responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two response lists a DIAG-SERVICE carries.
#[derive(Debug, Clone, Copy)]
enum ResponseKind {
    Positive,
    Negative,
}

impl ResponseKind {
    fn message_kind(self) -> MessageKind {
        match self {
            ResponseKind::Positive => MessageKind::PosResponse,
            ResponseKind::Negative => MessageKind::NegResponse,
        }
    }

    /// `(refs wrapper, ref tag, inline wrapper)`.
    fn tags(self) -> (&'static str, &'static str, &'static str) {
        match self {
            ResponseKind::Positive => ("POS-RESPONSE-REFS", "POS-RESPONSE-REF", "POS-RESPONSES"),
            ResponseKind::Negative => ("NEG-RESPONSE-REFS", "NEG-RESPONSE-REF", "NEG-RESPONSES"),
        }
    }
}

fn resolve_responses<'a>(
    ctx: &LayerContext<'_, 'a>,
    el: &'a Element,
    response: ResponseKind,
    service_name: &str,
    messages: &LayerMessages,
) -> Vec<Message> {
    let kind = response.message_kind();
    let (refs_tag, ref_tag, inline_tag) = response.tags();

    let ref_ids = el
        .children_named(ref_tag)
        .chain(el.children_named(refs_tag).flat_map(|w| w.children_named(ref_tag)))
        .filter_map(|r| r.attr("ID-REF"));
    let mut resolved = Vec::new();
    for id in ref_ids {
        match messages.get(kind, id) {
            Some(msg) => resolved.push(msg.clone()),
            None => log::debug!("{} '{}' of '{}' does not resolve", ref_tag, id, service_name),
        }
    }
    if !resolved.is_empty() {
        return resolved;
    }

    el.children_named(kind.tag())
        .chain(el.children_named(inline_tag).flat_map(|w| w.children_named(kind.tag())))
        .map(|m| resolve_message(ctx, m, kind, service_name))
        .collect()
}

/// Resolve the `index`th DIAG-SERVICE of the layer.
pub fn resolve_service<'a>(
    ctx: &LayerContext<'_, 'a>,
    el: &'a Element,
    index: usize,
    messages: &LayerMessages,
) -> Service {
    let short_name = el.child_text("SHORT-NAME");

    let request_ref = el
        .child("REQUEST-REF")
        .and_then(|r| r.attr("ID-REF"))
        .unwrap_or_default();
    let request = messages
        .get(MessageKind::Request, request_ref)
        .cloned()
        .or_else(|| {
            if !request_ref.is_empty() {
                log::debug!("REQUEST-REF '{}' of '{}' does not resolve", request_ref, short_name);
            }
            el.child("REQUEST")
                .map(|r| resolve_message(ctx, r, MessageKind::Request, &short_name))
        });

    let mut service = Service {
        id: el.attr("ID").unwrap_or_default().to_string(),
        long_name: el.child_text("LONG-NAME"),
        description: el.child_text("DESC"),
        semantic: el.attr_ci(&["SEMANTIC"]).unwrap_or_default().to_string(),
        addressing: el.attr_ci(&["ADDRESSING"]).unwrap_or_default().to_string(),
        request,
        pos_responses: resolve_responses(ctx, el, ResponseKind::Positive, &short_name, messages),
        neg_responses: resolve_responses(ctx, el, ResponseKind::Negative, &short_name, messages),
        attributes: el
            .attributes()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        short_name,
    };
    annotate(&mut service, ctx.layer_name, index);
    service
}

/// Adopt every message into `service`: prefix parameter paths with
/// `"{service}.{message}"` and stamp service, layer and ids.
pub fn annotate(service: &mut Service, layer_name: &str, index: usize) {
    let service_name = service.short_name.clone();
    for msg in service.messages_mut() {
        let prefix = match (service_name.is_empty(), msg.short_name.is_empty()) {
            (false, false) => format!("{}.{}", service_name, msg.short_name),
            (false, true) => service_name.clone(),
            (true, _) => msg.short_name.clone(),
        };
        if !prefix.is_empty() {
            identity::prefix_paths(&mut msg.params, &prefix);
        }
    }
    identity::stamp_service(service, layer_name, index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{parse_str, EntityMode};

    const LAYER: &str = r#"
        <ECU-VARIANT ID="EV">
          <SHORT-NAME>EV</SHORT-NAME>
          <DIAG-COMMS>
            <DIAG-SERVICE ID="DS_A" SEMANTIC="DATA" ADDRESSING="PHYSICAL">
              <SHORT-NAME>ReadA</SHORT-NAME>
              <REQUEST-REF ID-REF="RQ_SHARED"/>
              <POS-RESPONSE-REFS><POS-RESPONSE-REF ID-REF="PR_SHARED"/></POS-RESPONSE-REFS>
              <NEG-RESPONSE-REFS><NEG-RESPONSE-REF ID-REF="NR_GONE"/></NEG-RESPONSE-REFS>
            </DIAG-SERVICE>
            <DIAG-SERVICE ID="DS_B">
              <SHORT-NAME>ReadB</SHORT-NAME>
              <REQUEST-REF ID-REF="RQ_SHARED"/>
              <POS-RESPONSE>
                <SHORT-NAME>PR_Inline</SHORT-NAME>
                <PARAMS><PARAM><SHORT-NAME>Ack</SHORT-NAME><CODED-VALUE>98</CODED-VALUE></PARAM></PARAMS>
              </POS-RESPONSE>
            </DIAG-SERVICE>
          </DIAG-COMMS>
          <REQUESTS>
            <REQUEST ID="RQ_SHARED">
              <SHORT-NAME>RQ_Shared</SHORT-NAME>
              <PARAMS>
                <PARAM SEMANTIC="SERVICE-ID"><SHORT-NAME>SID</SHORT-NAME><CODED-VALUE>34</CODED-VALUE></PARAM>
              </PARAMS>
            </REQUEST>
          </REQUESTS>
          <POS-RESPONSES>
            <POS-RESPONSE ID="PR_SHARED">
              <SHORT-NAME>PR_Shared</SHORT-NAME>
              <PARAM><SHORT-NAME>Data</SHORT-NAME></PARAM>
            </POS-RESPONSE>
          </POS-RESPONSES>
          <GLOBAL-NEG-RESPONSES>
            <GLOBAL-NEG-RESPONSE ID="NR_GLOBAL"><SHORT-NAME>NR</SHORT-NAME></GLOBAL-NEG-RESPONSE>
          </GLOBAL-NEG-RESPONSES>
        </ECU-VARIANT>"#;

    fn resolve_all(layer: &Element) -> Vec<Service> {
        let tables = LayerTables::harvest(layer);
        let options = ParseOptions::default();
        let ctx = LayerContext {
            layer_name: "EV",
            tables: &tables,
            options: &options,
        };
        let messages = LayerMessages::harvest(&ctx, layer);
        assert_eq!(messages.len(), 3);
        layer
            .descendants("DIAG-SERVICE")
            .into_iter()
            .enumerate()
            .map(|(index, el)| resolve_service(&ctx, el, index, &messages))
            .collect()
    }

    #[test]
    fn references_resolve_to_standalone_messages() {
        let layer = parse_str(LAYER, EntityMode::Strict).unwrap();
        let services = resolve_all(&layer);
        let a = &services[0];
        assert_eq!(a.id, "DS_A");
        assert_eq!(a.semantic, "DATA");
        assert_eq!(a.addressing, "PHYSICAL");
        assert_eq!(a.request.as_ref().unwrap().short_name, "RQ_Shared");
        assert_eq!(a.pos_responses[0].short_name, "PR_Shared");
        // dangling ref and no inline response
        assert!(a.neg_responses.is_empty());
        assert_eq!(a.service_id(), Some(0x22));
    }

    #[test]
    fn shared_request_gets_a_path_per_service() {
        let layer = parse_str(LAYER, EntityMode::Strict).unwrap();
        let services = resolve_all(&layer);
        let sid_a = &services[0].request.as_ref().unwrap().params[0];
        let sid_b = &services[1].request.as_ref().unwrap().params[0];
        assert_eq!(sid_a.parent_name, "ReadA.RQ_Shared.SID");
        assert_eq!(sid_b.parent_name, "ReadB.RQ_Shared.SID");
        assert_eq!(sid_a.service_short_name, "ReadA");
        assert_eq!(sid_b.layer_name, "EV");
        assert_ne!(sid_a.id, sid_b.id);
    }

    #[test]
    fn inline_response_used_when_no_reference() {
        let layer = parse_str(LAYER, EntityMode::Strict).unwrap();
        let services = resolve_all(&layer);
        let b = &services[1];
        assert_eq!(b.pos_responses.len(), 1);
        let ack = &b.pos_responses[0].params[0];
        assert_eq!(ack.parent_name, "ReadB.PR_Inline.Ack");
        assert_eq!(ack.coded_const_value, "98");
        assert_eq!(ack.parent_type, diag_db::ParamParentKind::PosResponse);
    }

    #[test]
    fn response_kinds_map_to_their_own_tags() {
        assert_eq!(ResponseKind::Positive.message_kind(), MessageKind::PosResponse);
        assert_eq!(ResponseKind::Negative.message_kind(), MessageKind::NegResponse);
        assert_eq!(ResponseKind::Positive.tags().1, "POS-RESPONSE-REF");
        assert_eq!(ResponseKind::Negative.tags().2, "NEG-RESPONSES");
    }
}
