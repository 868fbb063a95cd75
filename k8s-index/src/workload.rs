use snat_agent_k8s_api::Labels;

/// Builds the `"namespace/name"` key used throughout the index for
/// non-workload object lookups (`ObjectToPolicies`, services, controllers,
/// namespaces).
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// What the index remembers about one locally-relevant pod.
///
/// `controller_key` is the `object_key` of the pod's owning `Deployment`, if
/// any, resolved once from `ownerReferences` at apply time (mirrors
/// `depPods.GetObjForPod` in the reference implementation's controller
/// index).
#[derive(Clone, Debug)]
pub struct PodRecord {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub labels: Labels,
    pub node_name: Option<String>,
    pub controller_key: Option<String>,
}

impl PodRecord {
    pub fn is_local(&self, this_node: &str) -> bool {
        self.node_name.as_deref() == Some(this_node)
    }
}

#[derive(Clone, Debug)]
pub struct ServiceRecord {
    pub namespace: String,
    pub name: String,
    pub labels: Labels,
    /// The service's own pod selector (`spec.selector`), used to enumerate
    /// the pods it fronts.
    pub selector: snat_agent_k8s_api::LabelSelector,
}

#[derive(Clone, Debug)]
pub struct ControllerRecord {
    pub namespace: String,
    pub name: String,
    pub labels: Labels,
}

#[derive(Clone, Debug)]
pub struct NamespaceRecord {
    pub name: String,
    pub labels: Labels,
}
