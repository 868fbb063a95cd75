//! Glue between the index's caches and [`snat_agent_core::LocalInfo`]'s pure
//! resolve algorithm (§4.3).

use crate::index::Index;

/// Rebuilds `LocalInfo.stack` for one workload, given the index's current
/// policy cache and this node's address-assignment slice.
///
/// Removes the `LocalInfo` entry entirely once its stack resolves empty, per
/// §3's lifecycle rule. Returns `true` when the stack changed (an
/// endpoint-file resync is owed to the caller).
pub fn resolve_workload(idx: &mut Index, uid: &str) -> bool {
    let dest: ahash::AHashMap<String, Vec<ipnet::IpNet>> = idx
        .policies
        .iter()
        .map(|(name, p)| (name.clone(), p.selector.dest.clone()))
        .collect();
    let assignments_here = idx
        .assignments
        .get(&idx.cluster.node_name)
        .cloned()
        .unwrap_or_default();

    let Some(info) = idx.local_info.get_mut(uid) else {
        return false;
    };

    let changed = info.resolve_stack(
        |name| dest.get(name).cloned(),
        |name| {
            assignments_here
                .iter()
                .filter(|a| a.policy_name == name)
                .map(|a| a.uid.clone())
                .collect()
        },
    );

    if info.is_empty() && info.stack.is_empty() {
        idx.local_info.remove(uid);
    }

    changed
}
