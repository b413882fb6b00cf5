//! ODX inheritance merge.
//!
//! Splices content from linked layers into the layers that link to them,
//! respecting NOT-INHERITED exclusions, and flattens the result into a
//! `Database`. Links may form cycles (A -> B -> C -> A); every layer then
//! ends with the union of what the others inherit.

use std::collections::HashSet;

use diag_db::{
    flatten_params, Container, Database, Keyed, Layer, LayerItem, LayerKind, NotInherited,
};

use crate::identity;
use crate::options::{MergeOptions, PassPolicy, MAX_FIXPOINT_PASSES};
use crate::ref_resolver::InheritanceGraph;

/// Merge every container into one deduplicated, fully inherited database.
pub fn merge_containers(containers: Vec<Container>, options: &MergeOptions) -> Database {
    let layers = containers
        .into_iter()
        .flat_map(Container::into_layers)
        .collect();
    merge_layers(layers, options)
}

pub fn merge_layers(layers: Vec<Layer>, options: &MergeOptions) -> Database {
    let mut layers = dedup_layers(layers);
    let graph = InheritanceGraph::build(&layers);

    let passes = run_passes(&mut layers, &graph, options.passes);
    log::debug!("inheritance settled after {} pass(es)", passes);

    let db = flatten(layers);
    log::info!(
        "merged {} layer(s): {} service(s), {} parameter(s)",
        db.layer_count(),
        db.service_count(),
        db.all_params.len()
    );
    db
}

/// Drop later layers repeating an earlier one: same kind and id, or same
/// kind and short name when the id is empty.
pub fn dedup_layers(layers: Vec<Layer>) -> Vec<Layer> {
    let mut seen: HashSet<(LayerKind, bool, String)> = HashSet::new();
    let mut out = Vec::with_capacity(layers.len());
    for layer in layers {
        let key = if layer.id.is_empty() {
            (layer.kind, false, layer.short_name.clone())
        } else {
            (layer.kind, true, layer.id.as_str().to_string())
        };
        if !key.2.is_empty() && !seen.insert(key) {
            log::debug!("dropping duplicate {} '{}'", layer.kind, layer.short_name);
            continue;
        }
        out.push(layer);
    }
    out
}

/// Run inheritance passes per `policy`; returns the number of passes run.
fn run_passes(layers: &mut [Layer], graph: &InheritanceGraph, policy: PassPolicy) -> usize {
    match policy {
        PassPolicy::Fixed(n) => {
            for _ in 0..n {
                run_pass(layers, graph);
            }
            n
        }
        PassPolicy::Fixpoint => {
            for pass in 1..=MAX_FIXPOINT_PASSES {
                if !run_pass(layers, graph) {
                    return pass;
                }
            }
            log::warn!(
                "inheritance did not settle within {} passes",
                MAX_FIXPOINT_PASSES
            );
            MAX_FIXPOINT_PASSES
        }
    }
}

/// One pass: resolve every layer with a fresh visited set. Returns whether
/// any layer gained content.
fn run_pass(layers: &mut [Layer], graph: &InheritanceGraph) -> bool {
    let mut changed = false;
    for node in 0..layers.len() {
        let mut visited = vec![false; layers.len()];
        changed |= resolve_links(layers, graph, node, &mut visited);
    }
    changed
}

struct Frame {
    node: usize,
    next_link: usize,
    /// The current link's target has already been descended into.
    descended: bool,
}

/// Depth-first, post-order: a target with unvisited links of its own is
/// resolved before it is spliced into the layer linking to it.
pub fn resolve_links(
    layers: &mut [Layer],
    graph: &InheritanceGraph,
    start: usize,
    visited: &mut [bool],
) -> bool {
    if graph.links(start).is_empty() || visited[start] {
        return false;
    }
    visited[start] = true;

    let mut changed = false;
    let mut stack = vec![Frame {
        node: start,
        next_link: 0,
        descended: false,
    }];

    while let Some(frame) = stack.last_mut() {
        let node = frame.node;
        let Some(&target) = graph.links(node).get(frame.next_link) else {
            dedup_layer(&mut layers[node]);
            stack.pop();
            continue;
        };

        if !frame.descended && !graph.links(target).is_empty() && !visited[target] {
            frame.descended = true;
            visited[target] = true;
            stack.push(Frame {
                node: target,
                next_link: 0,
                descended: false,
            });
            continue;
        }

        frame.next_link += 1;
        frame.descended = false;
        if target != node {
            let (dest, source) = pair_mut(layers, node, target);
            changed |= splice_layer(dest, source) > 0;
        }
    }

    changed
}

/// `(&mut layers[a], &layers[b])` for `a != b`.
fn pair_mut(layers: &mut [Layer], a: usize, b: usize) -> (&mut Layer, &Layer) {
    if a < b {
        let (left, right) = layers.split_at_mut(b);
        (&mut left[a], &right[0])
    } else {
        let (left, right) = layers.split_at_mut(a);
        (&mut right[0], &left[b])
    }
}

/// Splice `source`'s content into `dest`. Services pass the exclusion
/// filter; other collections are inherited unconditionally. Returns the
/// number of items added.
fn splice_layer(dest: &mut Layer, source: &Layer) -> usize {
    let not_inherited: &NotInherited = &dest.not_inherited;
    let mut added = splice(&mut dest.services, &source.services, |s| {
        !not_inherited.excludes(s)
    });
    added += splice(&mut dest.units, &source.units, |_| true);
    added += splice(&mut dest.compu_methods, &source.compu_methods, |_| true);
    added += splice(&mut dest.data_object_props, &source.data_object_props, |_| true);
    added += splice(&mut dest.dtcs, &source.dtcs, |_| true);
    added
}

/// Append items of `source` accepted by `keep` whose key is not in `dest`
/// yet. Keyless items are appended unless an equal item is already there.
fn splice<T: Keyed + Clone + PartialEq>(
    dest: &mut Vec<T>,
    source: &[T],
    keep: impl Fn(&T) -> bool,
) -> usize {
    let mut keys: HashSet<String> = dest
        .iter()
        .filter_map(|item| item.key().map(str::to_string))
        .collect();
    let mut added = 0;
    for item in source.iter().filter(|item| keep(item)) {
        let fresh = match item.key() {
            Some(key) => keys.insert(key.to_string()),
            None => !dest.contains(item),
        };
        if fresh {
            dest.push(item.clone());
            added += 1;
        }
    }
    added
}

/// Order-preserving dedup by [`Keyed::key`]. Items without a key are kept.
pub fn dedup_by_key<T: Keyed>(items: &mut Vec<T>) {
    let mut seen: HashSet<String> = HashSet::new();
    items.retain(|item| match item.key() {
        Some(key) => seen.insert(key.to_string()),
        None => true,
    });
}

fn dedup_layer(layer: &mut Layer) {
    dedup_by_key(&mut layer.services);
    dedup_by_key(&mut layer.units);
    dedup_by_key(&mut layer.compu_methods);
    dedup_by_key(&mut layer.data_object_props);
    dedup_by_key(&mut layer.dtcs);
}

/// Stamp each layer's parameters with the layer and collect the flat views.
/// Layers are visited in kind order, matching [`Database::layers`].
fn flatten(mut layers: Vec<Layer>) -> Database {
    layers.sort_by_key(|layer| layer.kind);
    let mut db = Database::default();
    for mut layer in layers {
        let name = layer.short_name.clone();
        for (index, service) in layer.services.iter_mut().enumerate() {
            identity::stamp_service(service, &name, index);
        }
        for service in &layer.services {
            for msg in service.messages() {
                db.all_params
                    .extend(flatten_params(&msg.params).into_iter().cloned());
            }
        }
        db.all_units.extend(layer_items(&name, &layer.units));
        db.all_compu_methods
            .extend(layer_items(&name, &layer.compu_methods));
        db.all_data_objects
            .extend(layer_items(&name, &layer.data_object_props));
        db.all_dtcs.extend(layer_items(&name, &layer.dtcs));

        match layer.kind {
            LayerKind::Protocol => db.protocols.push(layer),
            LayerKind::FunctionalGroup => db.functional_groups.push(layer),
            LayerKind::BaseVariant => db.base_variants.push(layer),
            LayerKind::EcuVariant => db.ecu_variants.push(layer),
            LayerKind::EcuSharedData => db.ecu_shared_data.push(layer),
        }
    }
    db
}

fn layer_items<'a, T: Clone + 'a>(
    layer_name: &'a str,
    items: &'a [T],
) -> impl Iterator<Item = LayerItem<T>> + 'a {
    items.iter().map(move |item| LayerItem {
        layer_name: layer_name.to_string(),
        item: item.clone(),
    })
}
