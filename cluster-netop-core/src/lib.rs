pub mod apply;
pub mod bootstrap;
pub mod classify;
pub mod helpers;
pub mod ip;
pub mod kubernetes;
pub mod network;
pub mod readiness;
pub mod resources;
pub mod status;

pub const RESOURCE_GROUP: &str = "operator.netop.dev";
pub const CONFIG_RESOURCE_GROUP: &str = "config.netop.dev";

pub const FIELD_MANAGER: &str = "cluster-netop";

/// The only operator configuration object that is ever acted upon.
pub const OPERATOR_CONFIG_NAME: &str = "cluster";
pub const CLUSTER_CONFIG_NAME: &str = "cluster";

pub const ALLOWLIST_CONFIG_NAME: &str = "cni-sysctl-allowlist";
pub const ALLOWLIST_DAEMONSET_NAME: &str = "cni-sysctl-allowlist-ds";
