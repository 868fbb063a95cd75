use crate::selector::Selector;

/// A cached SNAT policy: the declarative selector -> SNAT configuration
/// object described in §3.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    /// Empty means "service-mode": the policy allocates addresses per
    /// matched `Service` rather than an address of its own.
    pub snat_ip: Option<String>,
    pub selector: Selector,
}

impl Policy {
    pub fn is_service_mode(&self) -> bool {
        self.snat_ip.is_none()
    }

    /// Whether this policy's destination set contains the default route,
    /// i.e. `0.0.0.0/0`. Used by the resolver to truncate the policy stack.
    pub fn has_default_route(&self) -> bool {
        self.selector
            .dest
            .iter()
            .any(|net| net.prefix_len() == 0 && net.addr().is_ipv4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap as HashMap;

    fn policy(name: &str, dest: &[&str]) -> Policy {
        Policy {
            name: name.to_string(),
            snat_ip: Some("1.1.1.1".to_string()),
            selector: Selector {
                namespace: None,
                labels: HashMap::default(),
                dest: dest.iter().map(|d| d.parse().unwrap()).collect(),
            },
        }
    }

    #[test]
    fn detects_default_route() {
        assert!(policy("p", &["0.0.0.0/0"]).has_default_route());
        assert!(!policy("p", &["10.0.0.0/8"]).has_default_route());
    }

    #[test]
    fn service_mode_is_absent_snat_ip() {
        let mut p = policy("p", &["0.0.0.0/0"]);
        p.snat_ip = None;
        assert!(p.is_service_mode());
    }
}
