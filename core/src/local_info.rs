use crate::dest_prefix::a_sorts_before_b;
use crate::resource_kind::ResourceKind;
use ahash::AHashMap as HashMap;
use ipnet::IpNet;

/// Per-workload record: the policies that apply, grouped by the scope they
/// matched at, and the resolved ordered list of address UUIDs (the "policy
/// stack").
///
/// Created on first match, mutated only under the index lock, and deleted by
/// the caller once [`LocalInfo::resolve_stack`] reports an empty stack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalInfo {
    policies: HashMap<ResourceKind, Vec<String>>,
    pub stack: Vec<String>,
    /// Set by the caller once this record is slated for removal. The record
    /// itself carries no behavior tied to this flag; it exists so callers can
    /// mark intent to delete before actually dropping the map entry.
    pub tombstone: bool,
}

impl LocalInfo {
    /// Record that `policy` matched this workload at `kind`, unless it is
    /// already recorded there (dedup happens properly at resolve time, but we
    /// avoid unbounded growth from repeated event fan-in here too).
    pub fn add_policy(&mut self, kind: ResourceKind, policy: &str) {
        let names = self.policies.entry(kind).or_default();
        if !names.iter().any(|n| n == policy) {
            names.push(policy.to_string());
        }
    }

    /// Remove `policy` from every scope in `mask`, per §4.2's
    /// `PolicyDeleted` handling.
    pub fn remove_policy(&mut self, mask: super::ResourceKindSet, policy: &str) {
        for kind in ResourceKind::ALL {
            if !mask.contains(kind) {
                continue;
            }
            if let Some(names) = self.policies.get_mut(&kind) {
                names.retain(|n| n != policy);
                if names.is_empty() {
                    self.policies.remove(&kind);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.policies.values().all(|v| v.is_empty())
    }

    /// Rebuilds `stack` per the algorithm in §4.3 and returns whether it
    /// changed.
    ///
    /// `dest_of` looks up a policy's current destination set (`None` if the
    /// policy has since disappeared from the cache). `uuids_for_policy`
    /// returns, in this node's assignment-list order, the address UUIDs
    /// allocated for a given policy name.
    pub fn resolve_stack(
        &mut self,
        dest_of: impl Fn(&str) -> Option<Vec<IpNet>>,
        uuids_for_policy: impl Fn(&str) -> Vec<String>,
    ) -> bool {
        let mut ordered_policies: Vec<String> = Vec::new();
        for kind in ResourceKind::ALL {
            let Some(names) = self.policies.get(&kind) else {
                continue;
            };
            let mut deduped: Vec<String> = Vec::new();
            for name in names {
                if !deduped.contains(name) {
                    deduped.push(name.clone());
                }
            }
            deduped.sort_by(|a, b| {
                let (Some(a_dest), Some(b_dest)) = (dest_of(a), dest_of(b)) else {
                    return std::cmp::Ordering::Equal;
                };
                if a_sorts_before_b(&a_dest, &b_dest) {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            });
            ordered_policies.extend(deduped);
        }

        let mut uuids = Vec::new();
        for name in &ordered_policies {
            uuids.extend(uuids_for_policy(name));
            let has_default_route = dest_of(name)
                .map(|dest| dest.iter().any(|n| n.prefix_len() == 0 && n.addr().is_ipv4()))
                .unwrap_or(false);
            if has_default_route {
                break;
            }
        }

        if uuids != self.stack {
            self.stack = uuids;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceKindSet;
    use maplit::hashmap;

    fn dest_map(m: &[(&str, &str)]) -> HashMap<String, Vec<IpNet>> {
        m.iter()
            .map(|(name, dest)| (name.to_string(), vec![dest.parse().unwrap()]))
            .collect()
    }

    #[test]
    fn orders_by_scope_then_specificity() {
        let mut info = LocalInfo::default();
        info.add_policy(ResourceKind::Namespace, "ns-wide");
        info.add_policy(ResourceKind::Pod, "pod-specific");

        let dest = dest_map(&[("ns-wide", "0.0.0.0/0"), ("pod-specific", "10.0.0.0/8")]);
        let uuids_by_policy: HashMap<String, Vec<String>> = hashmap! {
            "ns-wide".to_string() => vec!["u-ns".to_string()],
            "pod-specific".to_string() => vec!["u-pod".to_string()],
        };

        let changed = info.resolve_stack(
            |name| dest.get(name).cloned(),
            |name| uuids_by_policy.get(name).cloned().unwrap_or_default(),
        );
        assert!(changed);
        // Pod scope is more specific than namespace scope and must come
        // first regardless of destination specificity.
        assert_eq!(info.stack, vec!["u-pod".to_string(), "u-ns".to_string()]);
    }

    #[test]
    fn truncates_at_first_default_route() {
        let mut info = LocalInfo::default();
        info.add_policy(ResourceKind::Pod, "p2");
        info.add_policy(ResourceKind::Pod, "p1");

        let dest = dest_map(&[("p1", "0.0.0.0/0"), ("p2", "10.0.0.0/8")]);
        let uuids_by_policy: HashMap<String, Vec<String>> = hashmap! {
            "p1".to_string() => vec!["uA".to_string()],
            "p2".to_string() => vec!["uB".to_string()],
        };

        info.resolve_stack(
            |name| dest.get(name).cloned(),
            |name| uuids_by_policy.get(name).cloned().unwrap_or_default(),
        );
        assert_eq!(info.stack, vec!["uB".to_string(), "uA".to_string()]);
    }

    #[test]
    fn remove_policy_clears_only_masked_scopes() {
        let mut info = LocalInfo::default();
        info.add_policy(ResourceKind::Pod, "p");
        info.add_policy(ResourceKind::Namespace, "p");

        let mut mask = ResourceKindSet::EMPTY;
        mask.insert(ResourceKind::Pod);
        info.remove_policy(mask, "p");

        assert!(info.policies.get(&ResourceKind::Pod).is_none());
        assert!(info.policies.get(&ResourceKind::Namespace).is_some());
    }

    #[test]
    fn empty_after_all_scopes_cleared() {
        let mut info = LocalInfo::default();
        info.add_policy(ResourceKind::Pod, "p");
        let mut mask = ResourceKindSet::EMPTY;
        mask.insert(ResourceKind::Pod);
        info.remove_policy(mask, "p");
        assert!(info.is_empty());
    }
}
