//! Host capability surface
//!
//! The IPC endpoint lives inside a DAW but never touches the host SDK
//! directly; everything it needs is behind [`HostControl`]. A real deployment
//! implements the trait over the host's control-surface API. [`SimHost`] is an
//! in-memory implementation for standalone runs and tests.
//!
//! Volume-changed notifications arrive on whatever thread the host fancies,
//! so the registered handler must be `Send + Sync` and do nothing heavier
//! than a channel send.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Opaque reference to a host track.
///
/// The raw value is only meaningful to the host implementation. The session
/// tag changes every time a host instance is created, so a handle that leaked
/// out of a previous session can never collide with a current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    pub session: u32,
    pub raw: u64,
}

/// Handler invoked by the host whenever a track volume changes, regardless of
/// who changed it.
pub type VolumeChangedHandler = Box<dyn Fn(TrackHandle, f64) + Send + Sync>;

/// The slice of host functionality the endpoint consumes.
pub trait HostControl: Send + Sync {
    /// Regular tracks in host order, excluding the master track.
    fn tracks(&self) -> Vec<TrackHandle>;

    /// The master/bus track.
    fn master_track(&self) -> TrackHandle;

    /// Current linear volume of a track, if the handle is still valid.
    fn volume(&self, track: TrackHandle) -> Option<f64>;

    /// Write a linear volume into the host.
    ///
    /// The host may synchronously fire the volume-changed handler from inside
    /// this call; callers doing programmatic writes must hold the feedback
    /// suppressor across it.
    fn set_volume(&self, track: TrackHandle, volume: f64);

    /// Current peak level (linear) of a track, `None` when the host has no
    /// level-reading capability.
    fn peak_level(&self, track: TrackHandle) -> Option<f64>;

    /// Register the volume-changed notification handler.
    fn on_volume_changed(&self, handler: VolumeChangedHandler);
}

static NEXT_SESSION: AtomicU32 = AtomicU32::new(1);

struct SimHostInner {
    volumes: HashMap<u64, f64>,
    peaks: HashMap<u64, f64>,
    handler: Option<Arc<VolumeChangedHandler>>,
}

/// In-memory host with a master track plus `n` regular tracks, all starting
/// at unity gain.
///
/// `set_volume` fires the registered handler synchronously, mimicking a DAW
/// whose control-surface callback runs inside the volume write. It reports no
/// peak levels unless a test seeds them, which exercises the VU fallback path.
pub struct SimHost {
    session: u32,
    track_count: u64,
    inner: Mutex<SimHostInner>,
}

impl SimHost {
    pub fn new(track_count: usize) -> Self {
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let mut volumes = HashMap::new();
        for raw in 0..=track_count as u64 {
            volumes.insert(raw, 1.0);
        }
        Self {
            session,
            track_count: track_count as u64,
            inner: Mutex::new(SimHostInner {
                volumes,
                peaks: HashMap::new(),
                handler: None,
            }),
        }
    }

    fn handle(&self, raw: u64) -> TrackHandle {
        TrackHandle {
            session: self.session,
            raw,
        }
    }

    fn valid(&self, track: TrackHandle) -> bool {
        track.session == self.session && track.raw <= self.track_count
    }

    /// Seed a peak level so `peak_level` reports a real reading.
    pub fn set_peak(&self, track: TrackHandle, linear: f64) {
        if self.valid(track) {
            self.inner.lock().peaks.insert(track.raw, linear);
        }
    }
}

impl HostControl for SimHost {
    fn tracks(&self) -> Vec<TrackHandle> {
        (1..=self.track_count).map(|raw| self.handle(raw)).collect()
    }

    fn master_track(&self) -> TrackHandle {
        self.handle(0)
    }

    fn volume(&self, track: TrackHandle) -> Option<f64> {
        if !self.valid(track) {
            return None;
        }
        self.inner.lock().volumes.get(&track.raw).copied()
    }

    fn set_volume(&self, track: TrackHandle, volume: f64) {
        if !self.valid(track) {
            return;
        }
        let volume = volume.clamp(0.0, crate::fader::MAX_VOLUME);

        // Update under the lock, fire the handler outside it
        let handler = {
            let mut inner = self.inner.lock();
            inner.volumes.insert(track.raw, volume);
            inner.handler.clone()
        };
        if let Some(handler) = handler {
            handler(track, volume);
        }
    }

    fn peak_level(&self, track: TrackHandle) -> Option<f64> {
        if !self.valid(track) {
            return None;
        }
        self.inner.lock().peaks.get(&track.raw).copied()
    }

    fn on_volume_changed(&self, handler: VolumeChangedHandler) {
        self.inner.lock().handler = Some(Arc::new(handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_track_enumeration() {
        let host = SimHost::new(3);
        let tracks = host.tracks();
        assert_eq!(tracks.len(), 3);
        assert!(!tracks.contains(&host.master_track()));
    }

    #[test]
    fn test_set_volume_fires_handler_synchronously() {
        let host = SimHost::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        host.on_volume_changed(Box::new(move |_, _| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));

        let track = host.tracks()[0];
        host.set_volume(track, 0.5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.volume(track), Some(0.5));
    }

    #[test]
    fn test_volume_clamped_to_domain() {
        let host = SimHost::new(1);
        let track = host.tracks()[0];
        host.set_volume(track, 9.0);
        assert_eq!(host.volume(track), Some(4.0));
        host.set_volume(track, -1.0);
        assert_eq!(host.volume(track), Some(0.0));
    }

    #[test]
    fn test_stale_session_handle_is_rejected() {
        let old = SimHost::new(2);
        let stale = old.tracks()[0];
        let host = SimHost::new(2);
        assert_ne!(stale.session, host.tracks()[0].session);
        assert_eq!(host.volume(stale), None);
    }

    #[test]
    fn test_peak_level_absent_until_seeded() {
        let host = SimHost::new(1);
        let track = host.tracks()[0];
        assert_eq!(host.peak_level(track), None);
        host.set_peak(track, 0.5);
        assert_eq!(host.peak_level(track), Some(0.5));
    }
}
