use tokio::sync::broadcast;

/// One observer callback's worth of DOM mutations. The host coalesces
/// individual mutations; batches are the unit of delivery.
#[derive(Clone, Copy, Debug)]
pub struct MutationBatch {
    pub changes: usize,
}

/// Bus carrying mutation batches from the host adapter to watchers.
pub type MutationBus = broadcast::Sender<MutationBatch>;

pub fn mutation_bus(capacity: usize) -> (MutationBus, broadcast::Receiver<MutationBatch>) {
    broadcast::channel(capacity.max(1))
}
