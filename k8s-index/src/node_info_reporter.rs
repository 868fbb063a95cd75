//! Idempotent upsert of the node-info object (§4.7): create-on-404,
//! update-on-diff, no patch. Grounded directly on the reference project's
//! `InformNodeInfo` create/update pattern rather than a server-side-apply
//! `Patch`, since this object has exactly one writer (this node's own agent).

use kube::api::{Api, PostParams};
use snat_agent_core::NodeInfo;
use snat_agent_k8s_api::{SnatNodeInfo, SnatNodeInfoSpec};
use std::collections::BTreeSet;

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("creating node-info object: {0}")]
    Create(#[source] kube::Error),
    #[error("reading node-info object: {0}")]
    Get(#[source] kube::Error),
    #[error("replacing node-info object: {0}")]
    Replace(#[source] kube::Error),
}

/// Upserts the `SnatNodeInfo` object named after `info.node_name`. Returns
/// `Ok(true)` when a transient error occurred and the caller should
/// reschedule (§4.7: "any transport error returns needs retry"); `Ok(false)`
/// on success (including the no-op case).
pub async fn upsert(api: &Api<SnatNodeInfo>, info: &NodeInfo) -> Result<bool, ReportError> {
    let wanted_names: BTreeSet<String> = info.policy_names.clone();

    match api.get(&info.node_name).await {
        Ok(existing) => {
            let current_names = existing.spec.snat_policy_names.clone();
            if current_names == wanted_names && existing.spec.macaddress == info.mac_address {
                return Ok(false);
            }
            let mut updated = existing;
            updated.spec.snat_policy_names = wanted_names;
            updated.spec.macaddress = info.mac_address.clone();
            match api.replace(&info.node_name, &PostParams::default(), &updated).await {
                Ok(_) => Ok(false),
                Err(source) => {
                    tracing::warn!(%source, node = %info.node_name, "node-info replace failed");
                    Err(ReportError::Replace(source))
                }
            }
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            let object = SnatNodeInfo::new(
                &info.node_name,
                SnatNodeInfoSpec {
                    snat_policy_names: wanted_names,
                    macaddress: info.mac_address.clone(),
                },
            );
            match api.create(&PostParams::default(), &object).await {
                Ok(_) => Ok(false),
                Err(source) => {
                    tracing::warn!(%source, node = %info.node_name, "node-info create failed");
                    Err(ReportError::Create(source))
                }
            }
        }
        Err(source) => {
            tracing::warn!(%source, node = %info.node_name, "node-info get failed");
            Err(ReportError::Get(source))
        }
    }
}
