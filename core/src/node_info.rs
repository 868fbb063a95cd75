use std::collections::BTreeSet;

/// The control-plane feedback payload: which policy names are currently
/// active on this node (§4.7, §8 invariant 4).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_name: String,
    pub mac_address: String,
    pub policy_names: BTreeSet<String>,
}
