use anyhow::{bail, Context, Result};
use clap::Parser;
use kubert::{LogFilter, LogFormat};
use snat_agent_k8s_index::ClusterInfo;
use std::path::PathBuf;

/// A host-side SNAT reconciliation agent.
#[derive(Debug, Parser)]
#[clap(name = "snat-agent", about = "Reconciles per-node SNAT address state from cluster policy")]
pub struct Args {
    #[clap(long, default_value = "snat_agent=info,warn", env = "SNAT_AGENT_LOG")]
    pub log_level: LogFilter,

    #[clap(long, default_value = "plain")]
    pub log_format: LogFormat,

    #[clap(flatten)]
    pub client: kubert::ClientArgs,

    #[clap(flatten)]
    pub admin: kubert::AdminArgs,

    /// This node's name, as it appears in `Pod.spec.nodeName`.
    #[clap(long, env = "NODE_NAME")]
    pub node_name: String,

    /// The namespace the `SnatPolicy`/`SnatAddressAssignment`/`SnatNodeInfo`
    /// objects live in.
    #[clap(long, default_value = "kube-system", env = "SNAT_NAMESPACE")]
    pub snat_namespace: String,

    /// Directory the per-UUID `.snat` address files are written to.
    #[clap(long, default_value = "/var/run/snat/addresses", env = "SNAT_ADDRESS_DIR")]
    pub address_dir: PathBuf,

    /// Directory the service-descriptor file is written to.
    #[clap(long, default_value = "/var/run/snat/service", env = "SNAT_SERVICE_DIR")]
    pub service_dir: PathBuf,

    /// Filename of the service-descriptor file within `service_dir`.
    #[clap(long, default_value = "service.json", env = "SNAT_SERVICE_FILE")]
    pub service_file: String,

    /// The uplink MAC address reported in the node-info object and address
    /// files for locally-originated addresses.
    #[clap(long, env = "SNAT_UPLINK_MAC")]
    pub uplink_mac: String,

    /// The uplink interface name stamped into locally-originated address
    /// files (`interface-name`).
    #[clap(long, env = "SNAT_UPLINK_INTERFACE")]
    pub uplink_interface: String,

    #[clap(long, env = "SNAT_VRF_DOMAIN")]
    pub vrf_domain: String,

    #[clap(long, env = "SNAT_VRF_TENANT")]
    pub vrf_tenant: String,

    #[clap(long, env = "SNAT_SERVICE_VLAN")]
    pub service_vlan: u32,

    #[clap(long, env = "SNAT_SERVICE_MAC")]
    pub service_mac: String,

    #[clap(long, env = "SNAT_SERVICE_IP")]
    pub service_ip: String,

    #[clap(long, default_value = "0", env = "SNAT_ZONE")]
    pub zone: u32,
}

impl Args {
    /// Splits the flags into the `kubert`-facing pieces and the agent's own
    /// [`ClusterInfo`], and ensures the output directories exist before any
    /// watch is started (§7: a missing output directory is the one startup
    /// condition that's fatal).
    pub fn into_parts(self) -> Result<(LogFilter, LogFormat, kubert::ClientArgs, kubert::AdminArgs, ClusterInfo, PathBuf, PathBuf)> {
        std::fs::create_dir_all(&self.address_dir)
            .with_context(|| format!("creating address output directory {}", self.address_dir.display()))?;
        std::fs::create_dir_all(&self.service_dir)
            .with_context(|| format!("creating service output directory {}", self.service_dir.display()))?;

        if self.uplink_mac.is_empty() || self.uplink_interface.is_empty() {
            bail!("--uplink-mac and --uplink-interface are required");
        }

        let service_descriptor_path = self.service_dir.join(&self.service_file);
        let cluster = ClusterInfo {
            node_name: self.node_name,
            uplink_mac: self.uplink_mac,
            uplink_interface: self.uplink_interface,
            vrf_domain: self.vrf_domain,
            vrf_tenant: self.vrf_tenant,
            service_vlan: self.service_vlan,
            service_mac: self.service_mac,
            service_ip: self.service_ip,
            zone: self.zone,
            snat_namespace: self.snat_namespace,
        };

        Ok((
            self.log_level,
            self.log_format,
            self.client,
            self.admin,
            cluster,
            self.address_dir,
            service_descriptor_path,
        ))
    }
}
