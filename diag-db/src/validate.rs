use crate::types::{Database, Keyed};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate parameter id '{0}'")]
    DuplicateParamId(String),
    #[error("duplicate parameter path '{0}' in layer '{1}'")]
    DuplicateParamPath(String, String),
    #[error("empty service name in layer '{0}'")]
    EmptyServiceName(String),
    #[error("duplicate service '{0}' in layer '{1}'")]
    DuplicateService(String, String),
}

impl ValidationError {
    /// Findings that do not make the database unusable. Repeated structure
    /// instances legitimately produce duplicate paths.
    pub fn is_warning(&self) -> bool {
        matches!(self, ValidationError::DuplicateParamPath(..))
    }
}

/// Validate a resolved Database for structural consistency.
///
/// See [`ValidationError::is_warning`] for the findings callers may report
/// without failing.
pub fn validate_database(db: &Database) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for layer in db.layers() {
        let lname = &layer.short_name;

        let mut service_keys = HashSet::new();
        for svc in &layer.services {
            if svc.short_name.is_empty() {
                errors.push(ValidationError::EmptyServiceName(lname.clone()));
            }
            if let Some(key) = svc.key() {
                if !service_keys.insert(key) {
                    errors.push(ValidationError::DuplicateService(
                        key.to_string(),
                        lname.clone(),
                    ));
                }
            }
        }

        // A variant may override an inherited service under the same short
        // name, so paths are scoped by the service key
        let mut paths = HashSet::new();
        for svc in &layer.services {
            let scope = svc.key().unwrap_or_default();
            for p in svc.all_params() {
                if !paths.insert((scope, p.parent_name.as_str())) {
                    errors.push(ValidationError::DuplicateParamPath(
                        p.parent_name.clone(),
                        lname.clone(),
                    ));
                }
            }
        }

        if layer.services.is_empty() {
            log::debug!("layer '{}' has no services", lname);
        }
    }

    // Ids must be unique database-wide, not just per layer
    let mut ids = HashSet::new();
    for p in &db.all_params {
        if !ids.insert(p.id.as_str()) {
            errors.push(ValidationError::DuplicateParamId(p.id.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
