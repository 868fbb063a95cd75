/// Node-local configuration the index needs but cannot discover by watching
/// Kubernetes: interface names, VLAN/zone numbers and the namespace the
/// agent's own CRDs live in. Filled in from [`crate::Args`]-equivalent CLI
/// flags at startup; never mutated afterwards.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// This node's name, as it appears in `Pod.spec.nodeName`.
    pub node_name: String,
    /// The uplink MAC address reported in the node-info object and address
    /// files for locally-originated addresses.
    pub uplink_mac: String,
    /// The uplink interface name stamped into locally-originated address
    /// files (`interface-name`).
    pub uplink_interface: String,
    /// VRF/domain identifiers carried into the service descriptor.
    pub vrf_domain: String,
    pub vrf_tenant: String,
    /// Service-side VLAN, MAC and IP stamped into the service descriptor.
    pub service_vlan: u32,
    pub service_mac: String,
    pub service_ip: String,
    /// Zone id stamped into address files.
    pub zone: u32,
    /// Namespace the `SnatPolicy`/`SnatAddressAssignment`/`SnatNodeInfo`
    /// objects live in.
    pub snat_namespace: String,
}
