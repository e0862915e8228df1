// ── Reactive device registry ──
//
// Concurrent storage keyed by device address, with push-based change
// notification via `watch` channels. All mutations of a single record go
// through the DashMap entry lock, so writers to the same address are
// serialized while different addresses proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::Device;

/// The authoritative in-memory device set.
///
/// Every visible mutation bumps a version counter and rebuilds the sorted
/// snapshot that subscribers receive.
pub struct DeviceRegistry {
    /// Primary storage: address -> device.
    by_address: DashMap<String, Device>,

    /// Version counter, bumped on every visible mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, ordered by building, name, then address.
    snapshot: watch::Sender<Arc<Vec<Arc<Device>>>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_address: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Look up a device by address (owned copy).
    pub fn get(&self, address: &str) -> Option<Device> {
        self.by_address.get(address).map(|r| r.value().clone())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.by_address.contains_key(address)
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn all(&self) -> Arc<Vec<Arc<Device>>> {
        self.snapshot.borrow().clone()
    }

    /// All current addresses, in no particular order.
    pub fn addresses(&self) -> Vec<String> {
        self.by_address.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.snapshot.subscribe()
    }

    /// Mutate one device under its entry lock.
    ///
    /// Returns `None` if the address is unknown. Subscribers are notified
    /// only if the record actually changed. `f` must not call back into the
    /// registry.
    pub fn update<R>(&self, address: &str, f: impl FnOnce(&mut Device) -> R) -> Option<R> {
        let (result, changed) = {
            let mut entry = self.by_address.get_mut(address)?;
            let before = entry.value().clone();
            let result = f(entry.value_mut());
            (result, *entry.value() != before)
        };
        if changed {
            self.publish();
        }
        Some(result)
    }

    // ── Crate-internal mutation ──────────────────────────────────────

    /// Insert without notifying. Returns `false` if the address existed.
    pub(crate) fn insert_quiet(&self, device: Device) -> bool {
        match self.by_address.entry(device.address.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(device);
                true
            }
        }
    }

    /// Remove without notifying.
    pub(crate) fn remove_quiet(&self, address: &str) -> Option<Device> {
        self.by_address.remove(address).map(|(_, v)| v)
    }

    /// Mutate without notifying. Returns whether the record changed.
    pub(crate) fn update_quiet(&self, address: &str, f: impl FnOnce(&mut Device) -> bool) -> bool {
        self.by_address
            .get_mut(address)
            .is_some_and(|mut entry| f(entry.value_mut()))
    }

    /// Rebuild the snapshot and notify subscribers.
    ///
    /// The rebuild runs under the snapshot's write lock, so concurrent
    /// publishers are serialized and the last one to finish always reflects
    /// every mutation that preceded it. Shard locks are only ever taken
    /// after the snapshot lock, never the other way round.
    pub(crate) fn publish(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| {
            let mut values: Vec<Arc<Device>> = self
                .by_address
                .iter()
                .map(|r| Arc::new(r.value().clone()))
                .collect();
            values.sort_by(|a, b| {
                (a.building.as_str(), a.name.as_str(), a.address.as_str()).cmp(&(
                    b.building.as_str(),
                    b.name.as_str(),
                    b.address.as_str(),
                ))
            });
            *snap = Arc::new(values);
        });
        self.version.send_modify(|v| *v += 1);
    }
}
