use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declarative selector -> SNAT configuration object (§3).
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "snat.cni.example.com",
    version = "v1",
    kind = "SnatPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SnatPolicySpec {
    /// Empty means "service-mode": addresses are allocated per matched
    /// `Service` rather than one of the policy's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snat_ip: Option<String>,

    #[serde(default)]
    pub selector: PodSelector,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Destination CIDRs/IPs this policy applies to. Empty defaults to the
    /// whole default route at cache-insertion time (§4.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_ip: Option<Vec<String>>,
}
