//! The pure matching algorithm of the reconciliation core: given an object
//! and the current policy cache, decide which policies apply and at what
//! scope (§4.1). Performs lookups into the index's object caches but never
//! mutates anything.

use crate::index::Index;
use crate::workload::PodRecord;
use ahash::AHashMap;
use snat_agent_core::{Policy, ResourceKind};
use snat_agent_k8s_api::Labels;

/// The object being matched, carrying just enough to run the rules in §4.1.
pub enum Subject<'a> {
    Pod(&'a PodRecord),
    Service { namespace: &'a str, labels: &'a Labels },
    Controller { namespace: &'a str, labels: &'a Labels },
    Namespace { name: &'a str, labels: &'a Labels },
}

impl<'a> Subject<'a> {
    fn namespace(&self) -> &'a str {
        match self {
            Subject::Pod(p) => &p.namespace,
            Subject::Service { namespace, .. } => namespace,
            Subject::Controller { namespace, .. } => namespace,
            Subject::Namespace { name, .. } => name,
        }
    }

    fn labels(&self) -> &'a Labels {
        match self {
            Subject::Pod(p) => &p.labels,
            Subject::Service { labels, .. } => labels,
            Subject::Controller { labels, .. } => labels,
            Subject::Namespace { labels, .. } => labels,
        }
    }

    fn is_service(&self) -> bool {
        matches!(self, Subject::Service { .. })
    }

    fn native_kind(&self) -> ResourceKind {
        match self {
            Subject::Pod(_) => ResourceKind::Pod,
            Subject::Service { .. } => ResourceKind::Service,
            Subject::Controller { .. } => ResourceKind::Deployment,
            Subject::Namespace { .. } => ResourceKind::Namespace,
        }
    }
}

fn labels_subset(required: &ahash::AHashMap<String, String>, object: &Labels) -> bool {
    required.iter().all(|(k, v)| object.get(k) == Some(v.as_str()))
}

/// Runs the §4.1 rules for a single policy against a single subject. Rule 1
/// (deletion timestamp / missing namespace-name) is the caller's
/// responsibility: deleted or keyless objects should never reach here.
fn match_one(policy: &Policy, subject: &Subject<'_>, idx: &Index) -> Option<ResourceKind> {
    if policy.selector.is_empty() {
        return Some(ResourceKind::Cluster);
    }

    if policy.selector.labels.is_empty() {
        if let Some(ns) = &policy.selector.namespace {
            if ns == subject.namespace() {
                if subject.is_service() && policy.is_service_mode() {
                    return Some(ResourceKind::Service);
                }
                if !subject.is_service() && !policy.is_service_mode() {
                    return Some(ResourceKind::Namespace);
                }
                return None;
            }
        }
    }

    let namespace_ok = policy
        .selector
        .namespace
        .as_deref()
        .map_or(true, |ns| ns == subject.namespace());
    let labels_ok = labels_subset(&policy.selector.labels, subject.labels());
    if namespace_ok && labels_ok && !policy.is_service_mode() {
        return Some(subject.native_kind());
    }

    if let Subject::Pod(pod) = subject {
        return pod_fallback(policy, pod, idx);
    }
    None
}

/// The three pod-only fallbacks of §4.1 rule 2's last bullet, tried in order.
fn pod_fallback(policy: &Policy, pod: &PodRecord, idx: &Index) -> Option<ResourceKind> {
    let required = &policy.selector.labels;

    if idx
        .services
        .values()
        .any(|s| s.namespace == pod.namespace && labels_subset(required, &s.labels))
    {
        return Some(ResourceKind::Service);
    }

    if let Some(key) = &pod.controller_key {
        if let Some(ctrl) = idx.controllers.get(key) {
            if labels_subset(required, &ctrl.labels) {
                return Some(ResourceKind::Deployment);
            }
        }
    }

    if let Some(ns) = idx.namespaces.get(&pod.namespace) {
        if labels_subset(required, &ns.labels) {
            return Some(ResourceKind::Namespace);
        }
    }

    None
}

/// Matches every cached policy against `subject`, returning the scope each
/// matching policy was reached at.
pub fn match_policies(
    idx: &Index,
    subject: &Subject<'_>,
    policies: &AHashMap<String, Policy>,
) -> AHashMap<String, ResourceKind> {
    let mut matches = AHashMap::new();
    for (name, policy) in policies {
        if let Some(kind) = match_one(policy, subject, idx) {
            matches.insert(name.clone(), kind);
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;
    use crate::cluster_info::ClusterInfo;
    use snat_agent_core::Selector;
    use std::collections::BTreeMap;

    fn idx() -> Index {
        Index::new(ClusterInfo {
            node_name: "node-a".into(),
            uplink_mac: "aa:aa:aa:aa:aa:aa".into(),
            uplink_interface: "eth0".into(),
            vrf_domain: "dom".into(),
            vrf_tenant: "tenant".into(),
            service_vlan: 100,
            service_mac: "bb:bb:bb:bb:bb:bb".into(),
            service_ip: "10.0.0.1".into(),
            zone: 1,
            snat_namespace: "kube-system".into(),
        })
    }

    fn policy(name: &str, snat_ip: Option<&str>, namespace: Option<&str>, labels: &[(&str, &str)]) -> Policy {
        Policy {
            name: name.to_string(),
            snat_ip: snat_ip.map(str::to_string),
            selector: Selector {
                namespace: namespace.map(str::to_string),
                labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                dest: vec!["0.0.0.0/0".parse().unwrap()],
            },
        }
    }

    fn pod(ns: &str, name: &str, labels: &[(&str, &str)]) -> PodRecord {
        PodRecord {
            uid: format!("{ns}/{name}-uid"),
            namespace: ns.to_string(),
            name: name.to_string(),
            labels: Labels::from(Some(BTreeMap::from_iter(
                labels.iter().map(|(k, v)| (k.to_string(), v.to_string())),
            ))),
            node_name: Some("node-a".to_string()),
            controller_key: None,
        }
    }

    #[test]
    fn cluster_scoped_policy_matches_anything() {
        let p = policy("p1", Some("1.1.1.1"), None, &[]);
        let pod = pod("ns", "a", &[]);
        let subject = Subject::Pod(&pod);
        assert_eq!(match_one(&p, &subject, &idx()), Some(ResourceKind::Cluster));
    }

    #[test]
    fn namespace_scoped_policy_matches_pod_in_namespace() {
        let p = policy("p4", Some("1.1.1.1"), Some("ns1"), &[]);
        let pod_in = pod("ns1", "a", &[]);
        let pod_out = pod("ns2", "a", &[]);
        let i = idx();
        assert_eq!(
            match_one(&p, &Subject::Pod(&pod_in), &i),
            Some(ResourceKind::Namespace)
        );
        assert_eq!(match_one(&p, &Subject::Pod(&pod_out), &i), None);
    }

    #[test]
    fn label_selector_matches_native_kind() {
        let p = policy("p", Some("1.1.1.1"), None, &[("app", "web")]);
        let matching = pod("ns", "a", &[("app", "web")]);
        let not_matching = pod("ns", "b", &[("app", "other")]);
        let i = idx();
        assert_eq!(match_one(&p, &Subject::Pod(&matching), &i), Some(ResourceKind::Pod));
        assert_eq!(match_one(&p, &Subject::Pod(&not_matching), &i), None);
    }

    #[test]
    fn service_mode_label_selector_never_matches_natively() {
        // snat_ip absent => service-mode; direct pod match must not fire,
        // only the service fallback can.
        let p = policy("p3", None, None, &[("app", "svc")]);
        let matching = pod("ns", "a", &[("app", "svc")]);
        assert_eq!(match_one(&p, &Subject::Pod(&matching), &idx()), None);
    }
}
