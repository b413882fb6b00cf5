//! Layer reference resolution.
//!
//! Builds an arena index over the merged layer set so inheritance links
//! (typed `LayerId`s) can be followed as plain indices. The graph may contain
//! cycles; traversal is the merge engine's business.

use std::collections::HashMap;

use diag_db::{Layer, LayerId};

/// Adjacency lists over layer arena indices.
#[derive(Debug, Default)]
pub struct InheritanceGraph {
    index: HashMap<LayerId, usize>,
    edges: Vec<Vec<usize>>,
}

impl InheritanceGraph {
    /// Index every layer with a non-empty id (the first layer carrying an id
    /// owns it) and resolve each layer's links against that index. Links to
    /// unknown ids are dropped.
    pub fn build(layers: &[Layer]) -> Self {
        let mut index = HashMap::new();
        for (i, layer) in layers.iter().enumerate() {
            if !layer.id.is_empty() {
                index.entry(layer.id.clone()).or_insert(i);
            }
        }

        let edges = layers
            .iter()
            .map(|layer| {
                layer
                    .linked_layer_ids
                    .iter()
                    .filter_map(|id| {
                        let target = index.get(id).copied();
                        if target.is_none() {
                            log::debug!(
                                "layer '{}' links to unknown layer '{}'",
                                layer.short_name,
                                id
                            );
                        }
                        target
                    })
                    .collect()
            })
            .collect();

        Self { index, edges }
    }

    pub fn index_of(&self, id: &LayerId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Resolved link targets of `node`, in declaration order.
    pub fn links(&self, node: usize) -> &[usize] {
        self.edges.get(node).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diag_db::LayerKind;

    fn layer(id: &str, links: &[&str]) -> Layer {
        let mut l = Layer::new(LayerKind::BaseVariant, id, id);
        l.linked_layer_ids = links.iter().map(|s| LayerId::from(*s)).collect();
        l
    }

    #[test]
    fn dangling_links_are_dropped() {
        let layers = vec![layer("A", &["B", "NOPE"]), layer("B", &["A"])];
        let graph = InheritanceGraph::build(&layers);
        assert_eq!(graph.links(0), &[1]);
        assert_eq!(graph.links(1), &[0]);
        assert_eq!(graph.index_of(&LayerId::from("B")), Some(1));
        assert_eq!(graph.index_of(&LayerId::from("NOPE")), None);
    }

    #[test]
    fn layers_without_id_are_not_indexed() {
        let layers = vec![layer("", &[]), layer("A", &[""])];
        let graph = InheritanceGraph::build(&layers);
        assert_eq!(graph.len(), 2);
        assert!(graph.links(1).is_empty());
        assert!(graph.links(7).is_empty());
    }
}
