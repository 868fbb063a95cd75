use std::fmt;

/// The scope at which a policy matched a workload, ordered from most to
/// least specific by bit value.
///
/// The same type doubles as a single-match classification (an enum) and, via
/// [`ResourceKindSet`], as a bitmask recording every scope through which one
/// workload was reached by one policy. Keep the two uses distinct at the type
/// level rather than reaching for a raw integer everywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ResourceKind {
    Pod = 1,
    Service = 2,
    Deployment = 4,
    Namespace = 8,
    Cluster = 16,
}

impl ResourceKind {
    /// All scopes, in ascending bit order (most specific first).
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Pod,
        ResourceKind::Service,
        ResourceKind::Deployment,
        ResourceKind::Namespace,
        ResourceKind::Cluster,
    ];

    pub const fn bit(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Cluster => "Cluster",
        };
        f.write_str(s)
    }
}

/// A bitmask union of [`ResourceKind`]s: the set of scopes through which a
/// single workload was reached by a single policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceKindSet(u8);

impl ResourceKindSet {
    pub const EMPTY: ResourceKindSet = ResourceKindSet(0);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, kind: ResourceKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: ResourceKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(self, kind: ResourceKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl From<ResourceKind> for ResourceKindSet {
    fn from(kind: ResourceKind) -> Self {
        let mut set = ResourceKindSet::EMPTY;
        set.insert(kind);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_bit_order_is_specificity_order() {
        let bits: Vec<u8> = ResourceKind::ALL.iter().map(|k| k.bit()).collect();
        assert_eq!(bits, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn set_tracks_multiple_scopes() {
        let mut set = ResourceKindSet::from(ResourceKind::Pod);
        set.insert(ResourceKind::Namespace);
        assert!(set.contains(ResourceKind::Pod));
        assert!(set.contains(ResourceKind::Namespace));
        assert!(!set.contains(ResourceKind::Service));

        set.remove(ResourceKind::Pod);
        assert!(!set.contains(ResourceKind::Pod));
        assert!(!set.is_empty());
    }
}
