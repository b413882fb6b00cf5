//! Deterministic parameter identity.
//!
//! A parameter id is derived from where the parameter sits, not from when it
//! was parsed, so re-parsing the same input yields the same ids. Ids are
//! recomputed whenever a parameter moves into a new context: when a shared
//! message definition is attached to a service, and when an inherited
//! service is stamped with the layer that inherited it.

use diag_db::{Param, Service};
use sha2::{Digest, Sha256};

/// Hex digits of the digest kept in the id.
const DIGEST_HEX_LEN: usize = 16;

const FIELD_SEPARATOR: u8 = 0x1f;

/// Context a parameter id is derived in.
#[derive(Debug, Clone, Copy)]
pub struct IdScope<'s> {
    pub layer: &'s str,
    pub service: &'s str,
    /// Tells apart services sharing a short name within one layer, as when a
    /// variant overrides an inherited service. See [`service_key`].
    pub service_key: &'s str,
}

/// The service's ODX id, or its index in the layer when it has none.
pub fn service_key(service: &Service, index: usize) -> String {
    if service.id.is_empty() {
        format!("#{index}")
    } else {
        service.id.clone()
    }
}

/// `"{layer}::{service}::{KIND}::{short}::{digest}"`.
///
/// `position` is the chain of sibling ordinals from the message down to the
/// parameter, which keeps repeated structure instances apart even though
/// their paths are equal.
pub fn param_id(scope: &IdScope<'_>, param: &Param, position: &[usize]) -> String {
    let mut hasher = Sha256::new();
    for field in [
        scope.layer,
        scope.service,
        scope.service_key,
        param.parent_type.as_str(),
        param.parent_name.as_str(),
    ] {
        hasher.update(field.as_bytes());
        hasher.update([FIELD_SEPARATOR]);
    }
    for &ordinal in position {
        // fixed width, so ids match across 32 and 64 bit targets
        hasher.update((ordinal as u64).to_le_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    format!(
        "{}::{}::{}::{}::{}",
        scope.layer,
        scope.service,
        param.parent_type,
        param.short_name,
        &digest[..DIGEST_HEX_LEN]
    )
}

/// Recompute ids for a parameter forest rooted at `position`.
pub fn assign_ids(params: &mut [Param], scope: &IdScope<'_>, position: &mut Vec<usize>) {
    for (ordinal, p) in params.iter_mut().enumerate() {
        position.push(ordinal);
        p.id = param_id(scope, p, position);
        assign_ids(&mut p.children, scope, position);
        position.pop();
    }
}

/// Prepend `prefix` to the path of every parameter in the forest.
pub fn prefix_paths(params: &mut [Param], prefix: &str) {
    diag_db::for_each_param_mut(params, &mut |p| {
        p.parent_name = if p.parent_name.is_empty() {
            prefix.to_string()
        } else {
            format!("{}.{}", prefix, p.parent_name)
        };
    });
}

/// Stamp every parameter of `service`, the `index`th service of its layer,
/// with the service and layer names and recompute its id.
pub fn stamp_service(service: &mut Service, layer_name: &str, index: usize) {
    let service_name = service.short_name.clone();
    let key = service_key(service, index);
    let scope = IdScope {
        layer: layer_name,
        service: &service_name,
        service_key: &key,
    };
    for (message_index, message) in service.messages_mut().enumerate() {
        diag_db::for_each_param_mut(&mut message.params, &mut |p| {
            p.layer_name = layer_name.to_string();
            p.service_short_name = service_name.clone();
        });
        let mut position = vec![message_index];
        assign_ids(&mut message.params, &scope, &mut position);
    }
}
