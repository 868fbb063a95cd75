pub mod snat_address_assignment;
pub mod snat_node_info;
pub mod snat_policy;

pub use self::{
    snat_address_assignment::{AssignmentEntry, SnatAddressAssignment, SnatAddressAssignmentSpec},
    snat_node_info::{SnatNodeInfo, SnatNodeInfoSpec},
    snat_policy::{PodSelector, SnatPolicy, SnatPolicySpec},
};
