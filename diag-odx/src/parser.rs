//! ODX parser: document bytes -> `Container`.
//!
//! Orchestrates the per-document phases:
//! 1. Decoding and XML tree building (loader)
//! 2. Lookup table harvesting per layer (tables)
//! 3. Service and parameter resolution per layer (layer, service, param)
//!
//! Inheritance across layers happens later, over all documents at once
//! (inheritance).

use diag_db::{Container, LayerKind};

use crate::layer::resolve_layer;
use crate::loader::{LoadError, ensure_container, parse_document};
use crate::options::ParseOptions;
use crate::xml::Element;

/// Resolve every diagnostic layer below `root`, in kind order.
pub fn parse_container(root: &Element, options: &ParseOptions) -> Container {
    let dlc = ensure_container(root);
    let mut container = Container::default();
    for kind in LayerKind::ALL {
        for el in dlc.descendants(kind.tag()) {
            container.push(resolve_layer(el, kind, options));
        }
    }
    container
}

/// Parse one ODX document.
pub fn parse_odx(bytes: &[u8], options: &ParseOptions) -> Result<Container, LoadError> {
    let root = parse_document(bytes)?;
    Ok(parse_container(&root, options))
}
