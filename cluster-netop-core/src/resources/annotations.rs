use std::collections::BTreeMap;

/// Apply failures of objects carrying this annotation are logged and skipped.
pub const IGNORE_ERRORS_ANNOTATION: &str = "networkoperator.netop.dev/ignore-errors";
/// Lets the operator config change otherwise unsafe fields, e.g. the network type.
pub const NETWORK_MIGRATION_ANNOTATION: &str = "networkoperator.netop.dev/network-migration";
/// Workloads carrying this annotation are waited on after every apply.
pub const WAIT_FOR_READY_ANNOTATION: &str = "networkoperator.netop.dev/wait-for-ready";

pub fn get_ignore_errors_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(IGNORE_ERRORS_ANNOTATION.to_owned(), String::new())])
}

pub fn get_wait_for_ready_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(WAIT_FOR_READY_ANNOTATION.to_owned(), "true".to_owned())])
}

pub fn has_annotation(annotations: &Option<BTreeMap<String, String>>, key: &str) -> bool {
    annotations
        .as_ref()
        .map(|annotations| annotations.contains_key(key))
        .unwrap_or(false)
}
