//! Track registry - stable small-integer identities for host track handles
//!
//! The wire protocols talk about tracks as small non-negative integers; the
//! host talks in opaque handles. The registry owns the mapping: id 0 is
//! reserved for the master track, every other handle gets the next unused
//! positive id on first sight and keeps it for the session. Ids are never
//! reused.
//!
//! The registry is owned exclusively by the endpoint actor, which serializes
//! all mutation by construction.

use crate::host::{HostControl, TrackHandle};
use std::collections::HashMap;
use tracing::debug;

/// Track id reserved for the master/bus track.
pub const MASTER_ID: u32 = 0;

pub struct TrackRegistry {
    master: TrackHandle,
    by_handle: HashMap<TrackHandle, u32>,
    by_id: HashMap<u32, TrackHandle>,
    next_id: u32,
    /// Last-known linear volume per id, used for the connect-time state dump
    volumes: HashMap<u32, f64>,
}

impl TrackRegistry {
    pub fn new(master: TrackHandle) -> Self {
        let mut by_handle = HashMap::new();
        let mut by_id = HashMap::new();
        by_handle.insert(master, MASTER_ID);
        by_id.insert(MASTER_ID, master);
        Self {
            master,
            by_handle,
            by_id,
            next_id: 1,
            volumes: HashMap::new(),
        }
    }

    /// Resolve a handle to its id, allocating the next unused id on first
    /// sight. Deterministic within a session.
    pub fn id_for(&mut self, handle: TrackHandle) -> u32 {
        if handle == self.master {
            return MASTER_ID;
        }
        if let Some(&id) = self.by_handle.get(&handle) {
            return id;
        }

        while self.by_id.contains_key(&self.next_id) {
            self.next_id += 1;
        }
        let id = self.next_id;
        self.next_id += 1;

        self.by_handle.insert(handle, id);
        self.by_id.insert(id, handle);
        debug!("Registered track handle {:?} as id {}", handle, id);
        id
    }

    /// Reverse lookup. Unknown ids fall back to a 1-based index into the
    /// host's current track list and register that mapping lazily.
    pub fn track_for(&mut self, id: u32, host: &dyn HostControl) -> Option<TrackHandle> {
        if id == MASTER_ID {
            return Some(self.master);
        }
        if let Some(&handle) = self.by_id.get(&id) {
            return Some(handle);
        }

        let handle = host.tracks().get(id as usize - 1).copied()?;
        self.by_handle.insert(handle, id);
        self.by_id.insert(id, handle);
        debug!("Lazily registered track id {} from host index", id);
        Some(handle)
    }

    /// Record the last-known volume for a track.
    pub fn note_volume(&mut self, id: u32, volume: f64) {
        self.volumes.insert(id, volume);
    }

    pub fn volume(&self, id: u32) -> Option<f64> {
        self.volumes.get(&id).copied()
    }

    /// Known ids, master first, the rest ascending.
    pub fn known_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.by_id.keys().copied().filter(|&id| id != MASTER_ID).collect();
        ids.sort_unstable();
        let mut out = vec![MASTER_ID];
        out.extend(ids);
        out
    }
}
