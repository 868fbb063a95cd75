use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{counter::Counter, family::Family, gauge::Gauge};
use prometheus_client::registry::Registry;
use snat_agent_k8s_index::SharedIndex;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SyncLabels {
    pub sync: String,
}

/// The handful of metrics the reconciliation invariants (§8) actually imply:
/// how many workloads currently have an active stack, and how often each
/// debounced sync has had to retry. Nothing else is registered.
#[derive(Clone)]
pub struct Metrics {
    pub active_local_info: Gauge,
    pub sync_retries: Family<SyncLabels, Counter>,
}

impl Metrics {
    pub fn register(prom: &mut Registry) -> Self {
        let active_local_info = Gauge::default();
        prom.register(
            "active_local_info",
            "Number of workloads with at least one resolved address in their policy stack",
            active_local_info.clone(),
        );

        let sync_retries = Family::default();
        prom.register(
            "sync_retries",
            "Count of debounced syncs that reported needs-retry",
            sync_retries.clone(),
        );

        Self { active_local_info, sync_retries }
    }

    /// Periodically samples the index so `active_local_info` reflects live
    /// state without threading a counter through every mutation path.
    pub async fn sample(self, index: SharedIndex) {
        let mut tick = tokio::time::interval(Duration::from_secs(10));
        loop {
            tick.tick().await;
            let count = index.read().local_info_count();
            self.active_local_info.set(count as i64);
        }
    }
}

/// Tracks whether every watched resource kind has completed its initial list,
/// gating the admin server's `/ready` endpoint (§10.5).
#[derive(Clone)]
pub struct Readiness {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ReadinessWatch(watch::Receiver<bool>);

impl Readiness {
    pub fn new() -> (Self, ReadinessWatch) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ReadinessWatch(rx))
    }

    pub fn set_ready(&self) {
        let _ = self.tx.send(true);
    }
}

impl ReadinessWatch {
    pub fn get(&self) -> bool {
        *self.0.borrow()
    }
}
