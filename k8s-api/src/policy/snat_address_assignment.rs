use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cluster-wide view of per-node SNAT address assignments (§3/§4.4).
///
/// The allocator (out of scope for this agent, see spec §1 non-goals) is the
/// sole writer; this agent only reads `global_infos` and derives a per-node
/// slice plus the "remote" slice for every other node.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "snat.cni.example.com",
    version = "v1",
    kind = "SnatAddressAssignment",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SnatAddressAssignmentSpec {
    #[serde(default)]
    pub global_infos: BTreeMap<String, Vec<AssignmentEntry>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEntry {
    pub snat_ip: String,
    pub mac_address: String,
    pub port_range_start: u32,
    pub port_range_end: u32,
    pub snat_ip_uid: String,
    pub snat_policy_name: String,
}
