use ahash::AHashMap as HashMap;
use ipnet::IpNet;

/// Selects the workloads a [`crate::Policy`](crate::policy::Policy) applies to.
///
/// An empty `namespace` means "any namespace"; an empty `labels` means "any
/// labels" (matches everything in scope); an empty `dest` defaults to the
/// whole default route, see [`Selector::with_default_dest`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    pub namespace: Option<String>,
    pub labels: HashMap<String, String>,
    pub dest: Vec<IpNet>,
}

impl Selector {
    /// `true` when neither a namespace nor labels are set: this selector is
    /// cluster-wide.
    pub fn is_empty(&self) -> bool {
        self.namespace.is_none() && self.labels.is_empty()
    }

    /// `true` when labels are unset but the namespace is set.
    pub fn is_namespace_only(&self) -> bool {
        self.labels.is_empty() && self.namespace.is_some()
    }

    /// Does `labels` appear as a subset of `object_labels`?
    pub fn labels_match(&self, object_labels: &HashMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| object_labels.get(k) == Some(v))
    }

    pub fn namespace_matches(&self, namespace: &str) -> bool {
        match &self.namespace {
            None => true,
            Some(ns) => ns == namespace,
        }
    }

    /// Returns a copy with an empty `dest` replaced by the whole default
    /// route, per the policy-cache invariant in §3.
    pub fn with_default_dest(mut self) -> Self {
        if self.dest.is_empty() {
            self.dest = vec!["0.0.0.0/0".parse().expect("valid default route")];
        }
        self
    }
}
