//! The in-memory reconciliation index (§3, §5): policy cache,
//! address-assignment cache, per-workload `LocalInfo`, and the two
//! supporting reverse indices, all guarded by one lock.

use crate::cluster_info::ClusterInfo;
use crate::matcher::{self, Subject};
use crate::resolver;
use crate::scheduler::Scheduler;
use crate::workload::{object_key, ControllerRecord, NamespaceRecord, PodRecord, ServiceRecord};
use ahash::AHashMap;
use kubert::index::IndexNamespacedResource;
use parking_lot::RwLock;
use snat_agent_core::{AddressAssignment, NodeInfo, Policy, PortRange, ResourceKind, ResourceKindSet, Selector};
use snat_agent_k8s_api::{
    is_terminating, AssignmentEntry, Deployment, LabelSelector, Labels, Namespace, Pod, ResourceExt,
    Service, SnatAddressAssignment, SnatPolicy,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type SharedIndex = Arc<RwLock<Index>>;

pub struct Index {
    pub(crate) cluster: ClusterInfo,

    pub(crate) policies: AHashMap<String, Policy>,
    /// node name -> that node's assignment list.
    pub(crate) assignments: AHashMap<String, Vec<AddressAssignment>>,

    pub(crate) local_info: AHashMap<String, snat_agent_core::LocalInfo>,
    pub(crate) pods: AHashMap<String, PodRecord>,
    pub(crate) pod_uid_by_key: AHashMap<String, String>,

    pub(crate) services: AHashMap<String, ServiceRecord>,
    pub(crate) controllers: AHashMap<String, ControllerRecord>,
    pub(crate) namespaces: AHashMap<String, NamespaceRecord>,

    pub(crate) policy_to_workloads: AHashMap<String, AHashMap<String, ResourceKindSet>>,
    pub(crate) object_to_policies: AHashMap<String, AHashMap<String, ResourceKind>>,

    address_files: Scheduler,
    endpoint_files: Scheduler,
    node_info: Scheduler,
}

impl Index {
    pub fn new(cluster: ClusterInfo) -> Self {
        let (address_files, _) = Scheduler::new();
        let (endpoint_files, _) = Scheduler::new();
        let (node_info, _) = Scheduler::new();
        Self {
            cluster,
            policies: AHashMap::default(),
            assignments: AHashMap::default(),
            local_info: AHashMap::default(),
            pods: AHashMap::default(),
            pod_uid_by_key: AHashMap::default(),
            services: AHashMap::default(),
            controllers: AHashMap::default(),
            namespaces: AHashMap::default(),
            policy_to_workloads: AHashMap::default(),
            object_to_policies: AHashMap::default(),
            address_files,
            endpoint_files,
            node_info,
        }
    }

    /// Wires this index's schedulers to externally-owned tasks. Called once
    /// at startup by the binary crate, which owns the `SchedulerTask` halves.
    pub fn with_schedulers(
        mut self,
        address_files: Scheduler,
        endpoint_files: Scheduler,
        node_info: Scheduler,
    ) -> Self {
        self.address_files = address_files;
        self.endpoint_files = endpoint_files;
        self.node_info = node_info;
        self
    }

    pub fn shared(self) -> SharedIndex {
        Arc::new(RwLock::new(self))
    }

    /// The active-policy set for node-info reporting (§3 invariant 2, §4.7).
    pub fn node_info_snapshot(&self) -> NodeInfo {
        NodeInfo {
            node_name: self.cluster.node_name.clone(),
            mac_address: self.cluster.uplink_mac.clone(),
            policy_names: self
                .policy_to_workloads
                .iter()
                .filter(|(_, workloads)| !workloads.is_empty())
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }

    /// The number of workloads currently carrying at least one matched
    /// policy, sampled for the `active_local_info` admin metric.
    pub fn local_info_count(&self) -> usize {
        self.local_info.values().filter(|info| !info.is_empty()).count()
    }

    /// The namespace the node-info object is upserted into.
    pub fn cluster_snat_namespace(&self) -> String {
        self.cluster.snat_namespace.clone()
    }

    fn record_match(&mut self, policy_name: &str, uid: &str, kind: ResourceKind) {
        let info = self.local_info.entry(uid.to_string()).or_default();
        info.add_policy(kind, policy_name);
        self.policy_to_workloads
            .entry(policy_name.to_string())
            .or_default()
            .entry(uid.to_string())
            .or_default()
            .insert(kind);

        if resolver::resolve_workload(self, uid) {
            self.endpoint_files.request();
        }
        self.node_info.request();
    }

    fn local_pods_in_namespace<'a>(&'a self, ns: &'a str) -> impl Iterator<Item = &'a PodRecord> + 'a {
        self.pods
            .values()
            .filter(move |p| p.namespace == ns && p.is_local(&self.cluster.node_name))
    }

    fn local_pods_matching<'a>(
        &'a self,
        selector: &'a LabelSelector,
        namespace: Option<&'a str>,
    ) -> impl Iterator<Item = &'a PodRecord> + 'a {
        self.pods.values().filter(move |p| {
            p.is_local(&self.cluster.node_name)
                && namespace.map_or(true, |ns| p.namespace == ns)
                && selector.matches(&p.labels)
        })
    }

    /// §4.2: store the policy, then enumerate the workloads it reaches and
    /// record the match at the appropriate scope.
    pub fn apply_policy(&mut self, name: String, selector: Selector, snat_ip: Option<String>) {
        let selector = selector.with_default_dest();
        let policy = Policy { name: name.clone(), snat_ip, selector: selector.clone() };
        self.policies.insert(name.clone(), policy.clone());

        if policy.is_service_mode() {
            let matching_services: Vec<ServiceRecord> = self
                .services
                .values()
                .filter(|s| labels_subset_map(&selector.labels, &s.labels))
                .cloned()
                .collect();
            for svc in matching_services {
                let uids: Vec<String> = self
                    .local_pods_matching(&svc.selector, Some(&svc.namespace))
                    .map(|p| p.uid.clone())
                    .collect();
                for uid in uids {
                    self.record_match(&name, &uid, ResourceKind::Service);
                }
            }
            return;
        }

        if selector.is_empty() {
            let uids: Vec<String> = self
                .pods
                .values()
                .filter(|p| p.is_local(&self.cluster.node_name))
                .map(|p| p.uid.clone())
                .collect();
            for uid in uids {
                self.record_match(&name, &uid, ResourceKind::Cluster);
            }
            return;
        }

        if selector.is_namespace_only() {
            let ns = selector.namespace.clone().unwrap();
            let uids: Vec<String> = self.local_pods_in_namespace(&ns).map(|p| p.uid.clone()).collect();
            for uid in uids {
                self.record_match(&name, &uid, ResourceKind::Namespace);
            }
            return;
        }

        // General label selector: three parallel enumerations.
        let pod_sel = LabelSelector::from(BTreeMap::from_iter(selector.labels.clone()));

        let pod_uids: Vec<String> = self
            .local_pods_matching(&pod_sel, selector.namespace.as_deref())
            .map(|p| p.uid.clone())
            .collect();
        for uid in pod_uids {
            self.record_match(&name, &uid, ResourceKind::Pod);
        }

        let matching_controllers: Vec<ControllerRecord> = self
            .controllers
            .values()
            .filter(|c| {
                selector.namespace_matches(&c.namespace) && pod_sel.matches(&c.labels)
            })
            .cloned()
            .collect();
        for ctrl in matching_controllers {
            let key = object_key(&ctrl.namespace, &ctrl.name);
            self.object_to_policies
                .entry(key.clone())
                .or_default()
                .insert(name.clone(), ResourceKind::Deployment);
            let uids: Vec<String> = self
                .pods
                .values()
                .filter(|p| p.is_local(&self.cluster.node_name) && p.controller_key.as_deref() == Some(key.as_str()))
                .map(|p| p.uid.clone())
                .collect();
            for uid in uids {
                self.record_match(&name, &uid, ResourceKind::Deployment);
            }
        }

        let matching_namespaces: Vec<NamespaceRecord> = self
            .namespaces
            .values()
            .filter(|ns| selector.namespace_matches(&ns.name) && pod_sel.matches(&ns.labels))
            .cloned()
            .collect();
        for ns in matching_namespaces {
            self.object_to_policies
                .entry(ns.name.clone())
                .or_default()
                .insert(name.clone(), ResourceKind::Namespace);
            let uids: Vec<String> = self.local_pods_in_namespace(&ns.name).map(|p| p.uid.clone()).collect();
            for uid in uids {
                self.record_match(&name, &uid, ResourceKind::Namespace);
            }
        }
    }

    /// §4.2 `PolicyDeleted`.
    pub fn delete_policy(&mut self, name: &str) {
        self.policies.remove(name);
        let Some(workloads) = self.policy_to_workloads.remove(name) else {
            return;
        };
        for (uid, mask) in workloads {
            if let Some(info) = self.local_info.get_mut(&uid) {
                info.remove_policy(mask, name);
            }
            if resolver::resolve_workload(self, &uid) {
                self.endpoint_files.request();
            }
        }
        for policies in self.object_to_policies.values_mut() {
            policies.remove(name);
        }
        self.node_info.request();
    }

    /// §4.4: rebuild the per-node assignment lists from the cluster-wide
    /// `SnatAddressAssignment` object.
    pub fn apply_assignment(&mut self, global_infos: &BTreeMap<String, Vec<AssignmentEntry>>) {
        let mut changed_nodes = Vec::new();
        let mut new_assignments: AHashMap<String, Vec<AddressAssignment>> = AHashMap::default();

        for (node, entries) in global_infos {
            let list: Vec<AddressAssignment> = entries
                .iter()
                .map(|e| AddressAssignment {
                    snat_ip: e.snat_ip.clone(),
                    mac: e.mac_address.clone(),
                    port_range: PortRange { start: e.port_range_start, end: e.port_range_end },
                    uid: e.snat_ip_uid.clone(),
                    policy_name: e.snat_policy_name.clone(),
                })
                .collect();
            if self.assignments.get(node) != Some(&list) {
                changed_nodes.push(node.clone());
            }
            new_assignments.insert(node.clone(), list);
        }

        let this_node_changed = changed_nodes.iter().any(|n| n == &self.cluster.node_name)
            || self.assignments.contains_key(&self.cluster.node_name)
                && !new_assignments.contains_key(&self.cluster.node_name);

        self.assignments = new_assignments;

        if !changed_nodes.is_empty() {
            self.address_files.request();
        }
        if this_node_changed {
            let uids: Vec<String> = self.local_info.keys().cloned().collect();
            for uid in uids {
                if resolver::resolve_workload(self, &uid) {
                    self.endpoint_files.request();
                }
            }
        }
    }

    pub fn delete_assignment(&mut self) {
        if !self.assignments.is_empty() {
            self.assignments.clear();
            self.address_files.request();
            let uids: Vec<String> = self.local_info.keys().cloned().collect();
            for uid in uids {
                if resolver::resolve_workload(self, &uid) {
                    self.endpoint_files.request();
                }
            }
        }
    }

    fn apply_pod(&mut self, pod: &Pod) {
        let ns = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        let uid = pod.uid().unwrap_or_else(|| object_key(&ns, &name));
        if is_terminating(pod) {
            self.delete_pod(ns, name);
            return;
        }

        let controller_key = pod
            .metadata
            .owner_references
            .iter()
            .flatten()
            .find(|o| o.controller == Some(true))
            .map(|o| object_key(&ns, &o.name));

        let record = PodRecord {
            uid: uid.clone(),
            namespace: ns.clone(),
            name: name.clone(),
            labels: Labels::from(pod.metadata.labels.clone()),
            node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
            controller_key,
        };
        let key = object_key(&ns, &name);
        self.pod_uid_by_key.insert(key, uid.clone());
        self.pods.insert(uid.clone(), record);

        if !self.pods.get(&uid).unwrap().is_local(&self.cluster.node_name) {
            return;
        }

        let subject_pod = self.pods.get(&uid).unwrap().clone_ref();
        let matches = matcher::match_policies(self, &Subject::Pod(&subject_pod), &self.policies.clone());
        for (policy_name, kind) in matches {
            self.record_match(&policy_name, &uid, kind);
        }
    }

    fn delete_pod(&mut self, ns: String, name: String) {
        let key = object_key(&ns, &name);
        let Some(uid) = self.pod_uid_by_key.remove(&key) else {
            return;
        };
        self.pods.remove(&uid);
        self.local_info.remove(&uid);
        for workloads in self.policy_to_workloads.values_mut() {
            workloads.remove(&uid);
        }
        self.endpoint_files.request();
        self.node_info.request();
    }

    fn apply_service(&mut self, svc: &Service) {
        let ns = svc.namespace().unwrap_or_default();
        let name = svc.name_any();
        let key = object_key(&ns, &name);
        let selector_map = svc.spec.as_ref().and_then(|s| s.selector.clone()).unwrap_or_default();
        let record = ServiceRecord {
            namespace: ns.clone(),
            name: name.clone(),
            labels: Labels::from(svc.metadata.labels.clone()),
            selector: LabelSelector::from(BTreeMap::from_iter(selector_map)),
        };
        self.services.insert(key.clone(), record.clone());
        self.reconcile_object(key, ObjectDescriptor::Service { namespace: ns, labels: record.labels });
    }

    fn delete_service(&mut self, ns: String, name: String) {
        let key = object_key(&ns, &name);
        self.undo_object_matches(&key);
        self.services.remove(&key);
    }

    fn apply_controller(&mut self, dep: &Deployment) {
        let ns = dep.namespace().unwrap_or_default();
        let name = dep.name_any();
        let key = object_key(&ns, &name);
        let record = ControllerRecord { namespace: ns.clone(), name: name.clone(), labels: Labels::from(dep.metadata.labels.clone()) };
        self.controllers.insert(key.clone(), record.clone());
        self.reconcile_object(key, ObjectDescriptor::Controller { namespace: ns, labels: record.labels });
    }

    fn delete_controller(&mut self, ns: String, name: String) {
        let key = object_key(&ns, &name);
        self.undo_object_matches(&key);
        self.controllers.remove(&key);
    }

    fn apply_namespace(&mut self, namespace: &Namespace) {
        let name = namespace.name_any();
        let record = NamespaceRecord { name: name.clone(), labels: Labels::from(namespace.metadata.labels.clone()) };
        self.namespaces.insert(name.clone(), record.clone());
        self.reconcile_object(name.clone(), ObjectDescriptor::Namespace { name, labels: record.labels });
    }

    fn delete_namespace(&mut self, name: String) {
        self.undo_object_matches(&name);
        self.namespaces.remove(&name);
    }

    /// §4.5: diff this object's current matches against its prior recorded
    /// matches, applying newly-matched policies and undoing dropped ones.
    fn reconcile_object(&mut self, key: String, desc: ObjectDescriptor) {
        let policies = self.policies.clone();
        let new_matches: AHashMap<String, ResourceKind> = match &desc {
            ObjectDescriptor::Service { namespace, labels } => {
                matcher::match_policies(self, &Subject::Service { namespace, labels }, &policies)
            }
            ObjectDescriptor::Controller { namespace, labels } => {
                matcher::match_policies(self, &Subject::Controller { namespace, labels }, &policies)
            }
            ObjectDescriptor::Namespace { name, labels } => {
                matcher::match_policies(self, &Subject::Namespace { name, labels }, &policies)
            }
        };

        let old_matches = self.object_to_policies.get(&key).cloned().unwrap_or_default();

        for (policy, _) in old_matches.iter() {
            if !new_matches.contains_key(policy) {
                self.unmatch_object_pods(&key, policy, &desc);
            }
        }
        for (policy, kind) in new_matches.iter() {
            if old_matches.get(policy) != Some(kind) {
                self.match_object_pods(&key, policy, *kind, &desc);
            }
        }

        self.object_to_policies.insert(key, new_matches);
    }

    fn reachable_pod_uids(&self, key: &str, desc: &ObjectDescriptor) -> Vec<String> {
        match desc {
            ObjectDescriptor::Service { namespace, .. } => {
                let Some(svc) = self.services.get(key) else { return Vec::new() };
                self.local_pods_matching(&svc.selector, Some(namespace)).map(|p| p.uid.clone()).collect()
            }
            ObjectDescriptor::Controller { .. } => self
                .pods
                .values()
                .filter(|p| p.controller_key.as_deref() == Some(key) && p.is_local(&self.cluster.node_name))
                .map(|p| p.uid.clone())
                .collect(),
            ObjectDescriptor::Namespace { name, .. } => {
                self.local_pods_in_namespace(name).map(|p| p.uid.clone()).collect()
            }
        }
    }

    fn match_object_pods(&mut self, key: &str, policy_name: &str, kind: ResourceKind, desc: &ObjectDescriptor) {
        for uid in self.reachable_pod_uids(key, desc) {
            self.record_match(policy_name, &uid, kind);
        }
    }

    fn undo_object_matches(&mut self, key: &str) {
        let Some(matches) = self.object_to_policies.remove(key) else {
            return;
        };
        let desc = if self.services.contains_key(key) {
            let svc = self.services.get(key).unwrap();
            ObjectDescriptor::Service { namespace: svc.namespace.clone(), labels: svc.labels.clone() }
        } else if self.controllers.contains_key(key) {
            let ctrl = self.controllers.get(key).unwrap();
            ObjectDescriptor::Controller { namespace: ctrl.namespace.clone(), labels: ctrl.labels.clone() }
        } else {
            ObjectDescriptor::Namespace { name: key.to_string(), labels: Labels::default() }
        };
        for policy in matches.keys() {
            self.unmatch_object_pods(key, policy, &desc);
        }
        self.node_info.request();
    }

    fn unmatch_object_pods(&mut self, object_key: &str, policy_name: &str, desc: &ObjectDescriptor) {
        let kind = match desc {
            ObjectDescriptor::Service { .. } => ResourceKind::Service,
            ObjectDescriptor::Controller { .. } => ResourceKind::Deployment,
            ObjectDescriptor::Namespace { .. } => ResourceKind::Namespace,
        };
        let uids = self.reachable_pod_uids(object_key, desc);
        for uid in uids {
            if let Some(workloads) = self.policy_to_workloads.get_mut(policy_name) {
                if let Some(mask) = workloads.get_mut(&uid) {
                    mask.remove(kind);
                    if mask.is_empty() {
                        workloads.remove(&uid);
                    }
                }
                if workloads.is_empty() {
                    self.policy_to_workloads.remove(policy_name);
                }
            }
            let mut mask = ResourceKindSet::EMPTY;
            mask.insert(kind);
            if let Some(info) = self.local_info.get_mut(&uid) {
                info.remove_policy(mask, policy_name);
            }
            if resolver::resolve_workload(self, &uid) {
                self.endpoint_files.request();
            }
        }
        self.node_info.request();
    }
}

enum ObjectDescriptor {
    Service { namespace: String, labels: Labels },
    Controller { namespace: String, labels: Labels },
    Namespace { name: String, labels: Labels },
}

fn labels_subset_map(required: &ahash::AHashMap<String, String>, object: &Labels) -> bool {
    required.iter().all(|(k, v)| object.get(k) == Some(v.as_str()))
}

impl PodRecord {
    fn clone_ref(&self) -> PodRecord {
        self.clone()
    }
}

impl IndexNamespacedResource<Pod> for Index {
    fn apply(&mut self, obj: Pod) {
        self.apply_pod(&obj);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_pod(namespace, name);
    }
}

impl IndexNamespacedResource<Service> for Index {
    fn apply(&mut self, obj: Service) {
        self.apply_service(&obj);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_service(namespace, name);
    }
}

impl IndexNamespacedResource<Deployment> for Index {
    fn apply(&mut self, obj: Deployment) {
        self.apply_controller(&obj);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_controller(namespace, name);
    }
}

impl IndexNamespacedResource<Namespace> for Index {
    fn apply(&mut self, obj: Namespace) {
        self.apply_namespace(&obj);
    }

    fn delete(&mut self, _namespace: String, name: String) {
        self.delete_namespace(name);
    }
}

impl IndexNamespacedResource<SnatPolicy> for Index {
    fn apply(&mut self, obj: SnatPolicy) {
        let name = obj.name_any();
        let spec = obj.spec;
        let selector = Selector {
            namespace: spec.selector.namespace,
            labels: spec.selector.labels.unwrap_or_default().into_iter().collect(),
            dest: spec
                .selector
                .dest_ip
                .unwrap_or_default()
                .iter()
                .filter_map(|s| snat_agent_core::parse_dest(s))
                .collect(),
        };
        self.apply_policy(name, selector, spec.snat_ip);
    }

    fn delete(&mut self, _namespace: String, name: String) {
        self.delete_policy(&name);
    }
}

impl IndexNamespacedResource<SnatAddressAssignment> for Index {
    fn apply(&mut self, obj: SnatAddressAssignment) {
        self.apply_assignment(&obj.spec.global_infos);
    }

    fn delete(&mut self, _namespace: String, _name: String) {
        self.delete_assignment();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn cluster_info() -> ClusterInfo {
        ClusterInfo {
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
        }
    }

    fn insert_local_pod(idx: &mut Index, ns: &str, name: &str, labels: &[(&str, &str)]) -> String {
        let uid = format!("{ns}/{name}-uid");
        let record = PodRecord {
            uid: uid.clone(),
            namespace: ns.to_string(),
            name: name.to_string(),
            labels: Labels::from(Some(Map::from_iter(
                labels.iter().map(|(k, v)| (k.to_string(), v.to_string())),
            ))),
            node_name: Some(idx.cluster.node_name.clone()),
            controller_key: None,
        };
        idx.pod_uid_by_key.insert(object_key(ns, name), uid.clone());
        idx.pods.insert(uid.clone(), record);
        uid
    }

    fn assignment_entry(uid: &str, snat_ip: &str, mac: &str, policy: &str) -> AssignmentEntry {
        AssignmentEntry {
            snat_ip: snat_ip.to_string(),
            mac_address: mac.to_string(),
            port_range_start: 5000,
            port_range_end: 6000,
            snat_ip_uid: uid.to_string(),
            snat_policy_name: policy.to_string(),
        }
    }

    // S1: cluster-scoped policy with no explicit destination materializes a
    // single-entry policy stack once a matching local pod and assignment
    // both exist.
    #[test]
    fn s1_cluster_policy_no_destination() {
        let mut idx = Index::new(cluster_info());
        let uid = insert_local_pod(&mut idx, "ns1", "pod1", &[]);

        let mut global = Map::new();
        global.insert("node-a".to_string(), vec![assignment_entry("u1", "1.1.1.1", "aa:bb:cc:dd:ee:ff", "P1")]);
        idx.apply_assignment(&global);

        idx.apply_policy(
            "P1".to_string(),
            Selector { namespace: None, labels: AHashMap::default(), dest: vec![] },
            Some("1.1.1.1".to_string()),
        );

        assert_eq!(idx.local_info.get(&uid).unwrap().stack, vec!["u1".to_string()]);
        assert!(idx.policy_to_workloads.get("P1").unwrap().contains_key(&uid));
    }

    // S2: two policies at the same scope order by destination specificity,
    // more specific first, truncating at the default route.
    #[test]
    fn s2_specificity_ordering() {
        let mut idx = Index::new(cluster_info());
        let uid = insert_local_pod(&mut idx, "ns1", "w", &[("app", "x")]);

        let mut global = Map::new();
        global.insert(
            "node-a".to_string(),
            vec![
                assignment_entry("uA", "1.1.1.1", "mac-a", "P1"),
                assignment_entry("uB", "2.2.2.2", "mac-b", "P2"),
            ],
        );
        idx.apply_assignment(&global);

        idx.apply_policy(
            "P1".to_string(),
            Selector { namespace: Some("ns1".to_string()), labels: AHashMap::default(), dest: vec!["0.0.0.0/0".parse().unwrap()] },
            Some("1.1.1.1".to_string()),
        );
        idx.apply_policy(
            "P2".to_string(),
            Selector {
                namespace: None,
                labels: AHashMap::from_iter([("app".to_string(), "x".to_string())]),
                dest: vec!["10.0.0.0/8".parse().unwrap()],
            },
            Some("2.2.2.2".to_string()),
        );

        assert_eq!(idx.local_info.get(&uid).unwrap().stack, vec!["uB".to_string(), "uA".to_string()]);
    }

    // S3: a service-mode policy (no SNAT IP) attaches at SERVICE scope
    // through the service's own pod selector, and contributes to node-info.
    #[test]
    fn s3_service_mode_policy() {
        let mut idx = Index::new(cluster_info());
        let pb1 = insert_local_pod(&mut idx, "ns1", "pb1", &[("pod", "backend")]);
        let pb2 = insert_local_pod(&mut idx, "ns1", "pb2", &[("pod", "backend")]);

        let svc = ServiceRecord {
            namespace: "ns1".to_string(),
            name: "svc".to_string(),
            labels: Labels::from(Some(Map::from([("app".to_string(), "svc".to_string())]))),
            selector: LabelSelector::from(Map::from([("pod".to_string(), "backend".to_string())])),
        };
        idx.services.insert(object_key("ns1", "svc"), svc);

        idx.apply_policy(
            "P3".to_string(),
            Selector {
                namespace: None,
                labels: AHashMap::from_iter([("app".to_string(), "svc".to_string())]),
                dest: vec![],
            },
            None,
        );

        let workloads = idx.policy_to_workloads.get("P3").unwrap();
        assert!(workloads.get(&pb1).unwrap().contains(ResourceKind::Service));
        assert!(workloads.get(&pb2).unwrap().contains(ResourceKind::Service));
        assert!(idx.node_info_snapshot().policy_names.contains("P3"));
    }

    // S6: replaying the same policy application twice must not change the
    // resolved stack (idempotent reconciliation).
    #[test]
    fn s6_idempotent_reapply() {
        let mut idx = Index::new(cluster_info());
        let uid = insert_local_pod(&mut idx, "ns1", "w", &[]);
        let mut global = Map::new();
        global.insert("node-a".to_string(), vec![assignment_entry("u1", "1.1.1.1", "mac", "P1")]);
        idx.apply_assignment(&global);

        let selector = Selector { namespace: None, labels: AHashMap::default(), dest: vec![] };
        idx.apply_policy("P1".to_string(), selector.clone(), Some("1.1.1.1".to_string()));
        let first = idx.local_info.get(&uid).unwrap().stack.clone();
        idx.apply_policy("P1".to_string(), selector, Some("1.1.1.1".to_string()));
        let second = idx.local_info.get(&uid).unwrap().stack.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn policy_delete_clears_attachment_and_node_info() {
        let mut idx = Index::new(cluster_info());
        insert_local_pod(&mut idx, "ns1", "w", &[]);
        idx.apply_policy(
            "P1".to_string(),
            Selector { namespace: None, labels: AHashMap::default(), dest: vec![] },
            Some("1.1.1.1".to_string()),
        );
        assert!(idx.node_info_snapshot().policy_names.contains("P1"));
        idx.delete_policy("P1");
        assert!(!idx.node_info_snapshot().policy_names.contains("P1"));
        assert!(idx.local_info.is_empty());
    }
}
