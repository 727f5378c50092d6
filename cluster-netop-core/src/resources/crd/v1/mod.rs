pub mod cluster_network;
pub mod netattachdef;
pub mod network;
