use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The control-plane feedback object: the set of policy names active on one
/// node (§4.7, §6). Named after the node; one instance per node, upserted
/// idempotently by that node's agent and never by anyone else.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "snat.cni.example.com",
    version = "v1",
    kind = "SnatNodeInfo",
    namespaced
)]
#[serde(rename_all = "PascalCase")]
pub struct SnatNodeInfoSpec {
    #[serde(default)]
    pub snat_policy_names: BTreeSet<String>,
    #[serde(default)]
    pub macaddress: String,
}
