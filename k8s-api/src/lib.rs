//! Kubernetes API surface for the SNAT agent: the three custom resources this
//! agent reads/writes, plus the watched workload types re-exported from
//! `k8s-openapi`/`kube` the way the reference project's `k8s/api` crate does.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod policy;

pub use self::labels::{LabelSelector, Labels};
pub use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Namespace, Pod, Service},
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, Patch, PatchParams, PostParams},
    runtime::watcher,
    Client, Error, ResourceExt,
};
pub use policy::{
    AssignmentEntry, PodSelector, SnatAddressAssignment, SnatAddressAssignmentSpec, SnatNodeInfo,
    SnatNodeInfoSpec, SnatPolicy, SnatPolicySpec,
};

/// True when the object carries a non-nil deletion timestamp (§4.1 rule 1).
pub fn is_terminating<T: kube::Resource>(obj: &T) -> bool {
    obj.meta().deletion_timestamp.is_some()
}
