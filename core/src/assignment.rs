/// A single inclusive port range, as allocated by the (external) address
/// allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PortRange {
    pub start: u32,
    pub end: u32,
}

/// One control-plane-allocated `(SNAT IP, port range, UUID)` tuple bound to a
/// node and a policy. The agent never mutates these; it only reads the slice
/// for its own node plus the slices for every other node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressAssignment {
    pub snat_ip: String,
    pub mac: String,
    pub port_range: PortRange,
    pub uid: String,
    pub policy_name: String,
}
