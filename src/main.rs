#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(all(target_os = "linux", target_arch = "x86_64", target_env = "gnu"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod admin;
mod cli;

use admin::{Metrics, Readiness};
use anyhow::{bail, Result};
use clap::Parser;
use cli::Args;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use snat_agent_k8s_api::{Deployment, Namespace, Pod, Service, SnatAddressAssignment, SnatPolicy};
use snat_agent_k8s_index::{Index, Scheduler};
use std::path::PathBuf;
use tracing::{info_span, Instrument};

#[tokio::main]
async fn main() -> Result<()> {
    let (log_level, log_format, client_args, admin_args, cluster, address_dir, service_descriptor_path) =
        Args::parse().into_parts()?;

    let mut prom = Registry::default();
    let metrics = Metrics::register(&mut prom);
    let (readiness, ready_watch) = Readiness::new();

    let runtime = kubert::Runtime::builder()
        .with_log(log_level, log_format)
        .with_client(client_args)
        .with_admin(admin_args.into_builder().with_prometheus(prom))
        .build()
        .await?;

    let (address_files, address_files_task) = Scheduler::new();
    let (endpoint_files, endpoint_files_task) = Scheduler::new();
    let (node_info, node_info_task) = Scheduler::new();

    let index = Index::new(cluster)
        .with_schedulers(address_files, endpoint_files, node_info)
        .shared();

    let client = runtime.client();

    let pods = runtime.watch_all::<Pod>(watcher::Config::default());
    tokio::spawn(kubert::index::namespaced(index.clone(), pods).instrument(info_span!("pods")));

    let services = runtime.watch_all::<Service>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")),
    );

    let deployments = runtime.watch_all::<Deployment>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(index.clone(), deployments)
            .instrument(info_span!("deployments")),
    );

    let namespaces = runtime.watch_all::<Namespace>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(index.clone(), namespaces).instrument(info_span!("namespaces")),
    );

    let policies = runtime.watch_all::<SnatPolicy>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(index.clone(), policies).instrument(info_span!("snatpolicies")),
    );

    let assignments = runtime.watch_all::<SnatAddressAssignment>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(index.clone(), assignments)
            .instrument(info_span!("snataddressassignments")),
    );

    // All six watches have now had their initial list spawned.
    readiness.set_ready();
    tracing::info!("watches started");

    tokio::spawn(metrics.clone().sample(index.clone()).instrument(info_span!("metrics")));

    spawn_address_sync(
        index.clone(),
        address_files_task,
        address_dir.clone(),
        service_descriptor_path.clone(),
        metrics.clone(),
    );
    spawn_address_sync(
        index.clone(),
        endpoint_files_task,
        address_dir,
        service_descriptor_path,
        metrics.clone(),
    );
    spawn_node_info_sync(index.clone(), node_info_task, client, metrics);

    if ready_watch.get() {
        tracing::debug!("ready");
    }

    if runtime.run().await.is_err() {
        bail!("Aborted");
    }

    Ok(())
}

/// Drives both file-backed outputs from one scheduler: address files encode
/// the per-workload destination set directly, so a stack-change ("endpoint")
/// resync and an assignment-change resync both resolve to the same write.
fn spawn_address_sync(
    index: snat_agent_k8s_index::SharedIndex,
    task: snat_agent_k8s_index::SchedulerTask,
    address_dir: PathBuf,
    service_descriptor_path: PathBuf,
    metrics: Metrics,
) {
    tokio::spawn(
        snat_agent_k8s_index::scheduler::drive(task, "address_files", move || {
            let index = index.clone();
            let address_dir = address_dir.clone();
            let service_descriptor_path = service_descriptor_path.clone();
            let metrics = metrics.clone();
            async move {
                let (target, descriptor) = {
                    let idx = index.read();
                    let snapshot = snat_agent_k8s_index::file_sync::AssignmentSnapshot::from_index(&idx);
                    let target = snapshot.target_map();
                    let descriptor = snat_agent_k8s_index::file_sync::ServiceDescriptor::for_cluster(&idx);
                    (target, descriptor)
                };
                let retry_addr = snat_agent_k8s_index::file_sync::sync_address_files(&address_dir, &target);
                let retry_svc = snat_agent_k8s_index::file_sync::sync_service_descriptor(
                    &service_descriptor_path,
                    descriptor.as_ref(),
                );
                let retry = retry_addr || retry_svc;
                if retry {
                    metrics.sync_retries.get_or_create(&admin::SyncLabels { sync: "address_files".into() }).inc();
                }
                retry
            }
        })
        .instrument(info_span!("address_files")),
    );
}

fn spawn_node_info_sync(
    index: snat_agent_k8s_index::SharedIndex,
    task: snat_agent_k8s_index::SchedulerTask,
    client: kube::Client,
    metrics: Metrics,
) {
    tokio::spawn(
        snat_agent_k8s_index::scheduler::drive(task, "node_info", move || {
            let index = index.clone();
            let client = client.clone();
            let metrics = metrics.clone();
            let namespace = index.read().cluster_snat_namespace();
            async move {
                let api = kube::Api::<snat_agent_k8s_api::SnatNodeInfo>::namespaced(client, &namespace);
                let info = index.read().node_info_snapshot();
                match snat_agent_k8s_index::node_info_reporter::upsert(&api, &info).await {
                    Ok(retry) => {
                        if retry {
                            metrics
                                .sync_retries
                                .get_or_create(&admin::SyncLabels { sync: "node_info".into() })
                                .inc();
                        }
                        retry
                    }
                    Err(source) => {
                        tracing::warn!(%source, "node-info upsert failed");
                        metrics
                            .sync_retries
                            .get_or_create(&admin::SyncLabels { sync: "node_info".into() })
                            .inc();
                        true
                    }
                }
            }
        })
        .instrument(info_span!("node_info")),
    );
}
