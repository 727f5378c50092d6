use std::collections::BTreeMap;

pub const APP_LABEL: &str = "app";
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

pub fn get_operator_labels(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (NAME_LABEL.to_owned(), "cluster-netop".to_owned()),
        (COMPONENT_LABEL.to_owned(), component.to_owned()),
        (MANAGED_BY_LABEL.to_owned(), "cluster-netop".to_owned()),
    ])
}

/// Pod selector labels, kept minimal since they're immutable on workloads.
pub fn get_app_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_owned(), app.to_owned())])
}

pub fn get_workload_labels(app: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = get_operator_labels(component);
    labels.extend(get_app_labels(app));
    labels
}

pub fn get_joined_app_labels(app: &str) -> String {
    format!("{APP_LABEL}={app}")
}

pub fn join_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<String>>()
        .join(",")
}
