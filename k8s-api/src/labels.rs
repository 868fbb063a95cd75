use std::collections::BTreeMap;
use std::sync::Arc;

/// An object's labels, cheaply cloneable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(Arc<BTreeMap<String, String>>);

impl From<Option<BTreeMap<String, String>>> for Labels {
    fn from(labels: Option<BTreeMap<String, String>>) -> Self {
        Self(Arc::new(labels.unwrap_or_default()))
    }
}

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// A simple label-subset selector: unlike `k8s::labels::Selector` in the
/// broader ecosystem, this agent's `SnatPolicy` CRD only ever needs
/// "does this map of required labels appear in the object's labels", per
/// §4.1 (`P.Selector.Labels ⊆ object.Labels`). No expressions, no operators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector(BTreeMap<String, String>);

impl From<BTreeMap<String, String>> for LabelSelector {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl LabelSelector {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v.as_str()))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selector_matches_everything() {
        let sel = LabelSelector::default();
        let labels = Labels::from(Some(BTreeMap::from([("a".into(), "b".into())])));
        assert!(sel.matches(&labels));
    }

    #[test]
    fn selector_requires_subset() {
        let sel = LabelSelector::from(BTreeMap::from([("app".into(), "svc".into())]));
        let matching = Labels::from(Some(BTreeMap::from([
            ("app".into(), "svc".into()),
            ("extra".into(), "1".into()),
        ])));
        let not_matching = Labels::from(Some(BTreeMap::from([("app".into(), "other".into())])));
        assert!(sel.matches(&matching));
        assert!(!sel.matches(&not_matching));
    }
}
