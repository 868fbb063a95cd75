use crate::assignment::PortRange;
use serde::Serialize;

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// The on-disk, per-address-UUID artifact consumed by the data plane (§6).
///
/// Field names and `omitempty`-style skipping match the existing data-plane
/// consumer's schema exactly; this is a wire format, not free to restyle.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AddressFile {
    pub uuid: String,

    #[serde(rename = "interface-name", skip_serializing_if = "String::is_empty")]
    pub interface_name: String,

    #[serde(rename = "snat-ip", skip_serializing_if = "String::is_empty")]
    pub snat_ip: String,

    #[serde(rename = "interface-mac", skip_serializing_if = "String::is_empty")]
    pub interface_mac: String,

    #[serde(skip_serializing_if = "is_false")]
    pub local: bool,

    #[serde(rename = "dest", skip_serializing_if = "Vec::is_empty")]
    pub dest_ip_address: Vec<String>,

    #[serde(rename = "port-range", skip_serializing_if = "Vec::is_empty")]
    pub port_range: Vec<PortRange>,

    #[serde(rename = "interface-vlan", skip_serializing_if = "is_zero_u32")]
    pub interface_vlan: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub zone: u32,

    #[serde(rename = "remote", skip_serializing_if = "Vec::is_empty")]
    pub remote: Vec<RemoteInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RemoteInfo {
    #[serde(rename = "snat_ip", skip_serializing_if = "String::is_empty")]
    pub snat_ip: String,

    #[serde(rename = "mac", skip_serializing_if = "String::is_empty")]
    pub mac_address: String,

    #[serde(rename = "port-range", skip_serializing_if = "Vec::is_empty")]
    pub port_range: Vec<PortRange>,

    #[serde(rename = "ref", skip_serializing_if = "is_zero_u32")]
    pub refcount: u32,
}

impl AddressFile {
    /// Canonical on-disk form: 2-space indent, no trailing newline (§4.6).
    pub fn to_canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(
            &mut buf,
            serde_json::ser::PrettyFormatter::with_indent(b"  "),
        );
        self.serialize(&mut ser)?;
        Ok(buf)
    }
}
