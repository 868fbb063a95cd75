//! Idempotent writer/deleter for per-address `.snat` files and the one
//! service-descriptor file (§4.6).

use crate::index::Index;
use ahash::AHashMap;
use serde::Serialize;
use snat_agent_core::{AddressFile, PortRange, RemoteInfo};
use std::path::{Path, PathBuf};

const SNAT_FILE_SUFFIX: &str = ".snat";

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("reading output directory {path}: {source}")]
    ReadDir { path: PathBuf, source: std::io::Error },
    #[error("writing {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("removing {path}: {source}")]
    Remove { path: PathBuf, source: std::io::Error },
    #[error("serializing {uuid}: {source}")]
    Serialize { uuid: String, source: serde_json::Error },
}

/// A point-in-time copy of exactly the state §4.6 step 1 says to snapshot
/// under the lock, so the actual filesystem work happens lock-free.
#[derive(Clone, Debug, Default)]
pub struct AssignmentSnapshot {
    pub this_node: String,
    /// node name -> that node's assignment list.
    pub by_node: AHashMap<String, Vec<snat_agent_core::AddressAssignment>>,
    /// policy name -> destination CIDRs, needed to populate `dest` on local
    /// entries.
    pub policy_dest: AHashMap<String, Vec<String>>,
    pub uplink_interface: String,
    pub uplink_vlan: u32,
    pub zone: u32,
}

impl AssignmentSnapshot {
    pub fn from_index(idx: &Index) -> Self {
        Self {
            this_node: idx.cluster.node_name.clone(),
            by_node: idx.assignments.clone(),
            policy_dest: idx
                .policies
                .iter()
                .map(|(name, p)| {
                    (
                        name.clone(),
                        p.selector.dest.iter().map(|n| n.to_string()).collect(),
                    )
                })
                .collect(),
            uplink_interface: idx.cluster.uplink_interface.clone(),
            uplink_vlan: idx.cluster.service_vlan,
            zone: idx.cluster.zone,
        }
    }

    /// Builds the expected `uuid -> AddressFile` map per §4.6 step 2.
    ///
    /// A uuid is "local" when it was allocated under this node's own list.
    /// Its `remote` entries are every *other* node's assignment sharing the
    /// same SNAT IP; this applies symmetrically to non-local uuids too, so a
    /// node always has a complete remote-mapping view of every SNAT IP it
    /// knows about, not only the ones it hosts.
    pub fn target_map(&self) -> AHashMap<String, AddressFile> {
        let mut files: AHashMap<String, AddressFile> = AHashMap::new();
        let mut origin_of: AHashMap<&str, &str> = AHashMap::new();

        for (node, list) in &self.by_node {
            for a in list {
                origin_of.insert(&a.uid, node.as_str());
                let file = files.entry(a.uid.clone()).or_insert_with(|| AddressFile {
                    uuid: a.uid.clone(),
                    ..Default::default()
                });
                if node == &self.this_node {
                    file.local = true;
                    file.snat_ip = a.snat_ip.clone();
                    file.interface_mac = a.mac.clone();
                    file.interface_name = self.uplink_interface.clone();
                    file.interface_vlan = self.uplink_vlan;
                    file.zone = self.zone;
                    file.port_range = vec![PortRange {
                        start: a.port_range.start,
                        end: a.port_range.end,
                    }];
                    file.dest_ip_address = self
                        .policy_dest
                        .get(&a.policy_name)
                        .cloned()
                        .unwrap_or_default();
                } else if file.snat_ip.is_empty() {
                    file.snat_ip = a.snat_ip.clone();
                }
            }
        }

        for file in files.values_mut() {
            let file_owner = origin_of.get(file.uuid.as_str()).copied();
            for (node, list) in &self.by_node {
                for a in list {
                    if file.snat_ip != a.snat_ip || file.uuid == a.uid {
                        continue;
                    }
                    let owner = origin_of.get(a.uid.as_str()).copied().unwrap_or(node.as_str());
                    if Some(owner) != file_owner {
                        file.remote.push(RemoteInfo {
                            snat_ip: a.snat_ip.clone(),
                            mac_address: a.mac.clone(),
                            port_range: vec![PortRange {
                                start: a.port_range.start,
                                end: a.port_range.end,
                            }],
                            refcount: 1,
                        });
                    }
                }
            }
        }

        files
    }
}

/// Runs the §4.6 step 3/4 diff-and-write procedure against `dir`. Returns
/// `true` ("needs retry") on any I/O error, after logging and continuing
/// with the remaining files.
pub fn sync_address_files(dir: &Path, target: &AHashMap<String, AddressFile>) -> bool {
    let mut needs_retry = false;

    let existing = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix(SNAT_FILE_SUFFIX).map(|uuid| (uuid.to_string(), e.path()))
            })
            .collect::<Vec<_>>(),
        Err(source) => {
            tracing::warn!(%source, dir = %dir.display(), "failed to read output directory");
            return true;
        }
    };

    for (uuid, path) in &existing {
        if !target.contains_key(uuid) {
            if let Err(source) = std::fs::remove_file(path) {
                tracing::warn!(%source, path = %path.display(), "failed to remove stale address file");
                needs_retry = true;
            }
        }
    }

    let existing_uuids: AHashMap<&str, &PathBuf> =
        existing.iter().map(|(u, p)| (u.as_str(), p)).collect();

    for (uuid, file) in target {
        let path = dir.join(format!("{uuid}{SNAT_FILE_SUFFIX}"));
        let want = match file.to_canonical_json() {
            Ok(bytes) => bytes,
            Err(source) => {
                tracing::warn!(%source, %uuid, "failed to serialize address file");
                needs_retry = true;
                continue;
            }
        };

        let current = existing_uuids
            .get(uuid.as_str())
            .and_then(|p| std::fs::read(p).ok());
        if current.as_deref() == Some(want.as_slice()) {
            continue;
        }

        if let Err(source) = std::fs::write(&path, &want) {
            tracing::warn!(%source, path = %path.display(), "failed to write address file");
            needs_retry = true;
        }
    }

    needs_retry
}

/// The fixed-name service descriptor consumed by the same data-plane process
/// (§6). Present iff the assignment cache is non-empty.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct ServiceDescriptor {
    pub uuid: String,
    #[serde(rename = "domain-vrf")]
    pub vrf_domain: String,
    #[serde(rename = "domain-tenant")]
    pub vrf_tenant: String,
    pub mode: &'static str,
    #[serde(rename = "service-mapping")]
    pub service_mapping: Vec<ServiceMapping>,
    #[serde(rename = "interface-name")]
    pub interface_name: String,
    #[serde(rename = "service-vlan")]
    pub service_vlan: u32,
    #[serde(rename = "service-mac")]
    pub service_mac: String,
    #[serde(rename = "interface-ip")]
    pub interface_ip: String,
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct ServiceMapping {
    pub conntrack: bool,
}

impl ServiceDescriptor {
    pub fn for_cluster(idx: &Index) -> Option<Self> {
        if idx.assignments.is_empty() {
            return None;
        }
        Some(Self {
            uuid: idx.cluster.snat_namespace.clone(),
            vrf_domain: idx.cluster.vrf_domain.clone(),
            vrf_tenant: idx.cluster.vrf_tenant.clone(),
            mode: "loadbalancer",
            service_mapping: vec![ServiceMapping { conntrack: true }],
            interface_name: idx.cluster.uplink_interface.clone(),
            service_vlan: idx.cluster.service_vlan,
            service_mac: idx.cluster.service_mac.clone(),
            interface_ip: idx.cluster.service_ip.clone(),
        })
    }

    fn canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(
            &mut buf,
            serde_json::ser::PrettyFormatter::with_indent(b"  "),
        );
        self.serialize(&mut ser)?;
        Ok(buf)
    }
}

/// Writes or removes the service descriptor at `path`, per §4.4: present iff
/// the assignment cache is non-empty. Write is skipped when the bytes are
/// already identical. Returns `true` on any I/O failure.
pub fn sync_service_descriptor(path: &Path, descriptor: Option<&ServiceDescriptor>) -> bool {
    match descriptor {
        None => {
            if path.exists() {
                if let Err(source) = std::fs::remove_file(path) {
                    tracing::warn!(%source, path = %path.display(), "failed to remove service descriptor");
                    return true;
                }
            }
            false
        }
        Some(descriptor) => {
            let want = match descriptor.canonical_json() {
                Ok(bytes) => bytes,
                Err(source) => {
                    tracing::warn!(%source, "failed to serialize service descriptor");
                    return true;
                }
            };
            let current = std::fs::read(path).ok();
            if current.as_deref() == Some(want.as_slice()) {
                return false;
            }
            if let Err(source) = std::fs::write(path, &want) {
                tracing::warn!(%source, path = %path.display(), "failed to write service descriptor");
                return true;
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_info::ClusterInfo;
    use crate::index::Index;
    use snat_agent_core::{AddressAssignment, PortRange};
    use tempfile::tempdir;

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

    fn assignment(uid: &str, snat_ip: &str, policy: &str) -> AddressAssignment {
        AddressAssignment {
            snat_ip: snat_ip.to_string(),
            mac: "cc:cc:cc:cc:cc:cc".to_string(),
            port_range: PortRange { start: 5000, end: 6000 },
            uid: uid.to_string(),
            policy_name: policy.to_string(),
        }
    }

    #[test]
    fn local_assignment_produces_local_true_file() {
        let mut idx = Index::new(cluster_info());
        idx.assignments
            .insert("node-a".to_string(), vec![assignment("u1", "1.1.1.1", "p1")]);
        let snap = AssignmentSnapshot::from_index(&idx);
        let target = snap.target_map();
        let file = target.get("u1").unwrap();
        assert!(file.local);
        assert_eq!(file.snat_ip, "1.1.1.1");
    }

    #[test]
    fn remote_only_uuid_is_marked_non_local() {
        let mut idx = Index::new(cluster_info());
        idx.assignments
            .insert("node-b".to_string(), vec![assignment("u2", "2.2.2.2", "p2")]);
        let snap = AssignmentSnapshot::from_index(&idx);
        let target = snap.target_map();
        let file = target.get("u2").unwrap();
        assert!(!file.local);
    }

    #[test]
    fn second_sync_with_unchanged_state_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut idx = Index::new(cluster_info());
        idx.assignments
            .insert("node-a".to_string(), vec![assignment("u1", "1.1.1.1", "p1")]);
        let target = AssignmentSnapshot::from_index(&idx).target_map();

        assert!(!sync_address_files(dir.path(), &target));
        let path = dir.path().join("u1.snat");
        let first_write_time = std::fs::metadata(&path).unwrap().modified().unwrap();

        assert!(!sync_address_files(dir.path(), &target));
        let second_write_time = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(first_write_time, second_write_time);
    }

    #[test]
    fn stale_file_is_removed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("stale.snat"), b"{}").unwrap();
        let target = AHashMap::new();
        assert!(!sync_address_files(dir.path(), &target));
        assert!(!dir.path().join("stale.snat").exists());
    }
}
