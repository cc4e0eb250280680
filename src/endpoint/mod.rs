//! IPC endpoint - the DAW-resident server side of the bridge
//!
//! Accepts any number of gateway clients over TCP, keeps them synchronized
//! with authoritative track state, applies their `SET_VOL` requests to the
//! host under feedback suppression, and broadcasts VU meter levels at a fixed
//! cadence.
//!
//! All shared state (the track registry and the client set) is owned by a
//! single actor loop fed through an event channel. The accept loop, each
//! client's reader, and the host's volume-changed callback only ever send
//! events into that channel, so no mutation crosses task boundaries.

pub mod registry;
pub mod suppress;

use crate::config::EndpointConfig;
use crate::fader;
use crate::host::{HostControl, TrackHandle};
use crate::ipc::{self, Command};
use anyhow::Result;
use registry::TrackRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use suppress::FeedbackSuppressor;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Meter levels are clamped to this dB window before going on the wire.
pub const VU_MIN_DB: f64 = -60.0;
pub const VU_MAX_DB: f64 = 6.0;

/// Events consumed by the endpoint actor.
enum Event {
    ClientConnected {
        id: u64,
        tx: mpsc::UnboundedSender<String>,
        peer: std::net::SocketAddr,
    },
    ClientLine {
        id: u64,
        line: String,
    },
    ClientClosed {
        id: u64,
    },
    /// A genuine (unsuppressed) host-side volume change
    HostVolumeChanged {
        handle: TrackHandle,
        volume: f64,
    },
}

pub struct Endpoint {
    config: EndpointConfig,
    host: Arc<dyn HostControl>,
    suppressor: Arc<FeedbackSuppressor>,
}

impl Endpoint {
    pub fn new(config: EndpointConfig, host: Arc<dyn HostControl>) -> Self {
        Self {
            config,
            host,
            suppressor: Arc::new(FeedbackSuppressor::new()),
        }
    }

    /// Bind the configured listen address and serve until shutdown.
    ///
    /// A bind failure is logged and the endpoint keeps running without a
    /// listener; host events are still consumed so state stays current.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = match TcpListener::bind(self.config.listen_addr).await {
            Ok(listener) => {
                info!("IPC endpoint listening on {}", self.config.listen_addr);
                Some(listener)
            }
            Err(e) => {
                warn!(
                    "Failed to bind IPC listener on {}: {} (running without listener)",
                    self.config.listen_addr, e
                );
                None
            }
        };
        self.run(listener, shutdown).await
    }

    /// Serve on an already-bound listener. Used by tests to pick a free port.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.run(Some(listener), shutdown).await
    }

    async fn run(
        self,
        listener: Option<TcpListener>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();

        // Bridge the host callback into the event channel. The suppression
        // check happens here, at the moment the callback fires: if the flag
        // is up this is the echo of our own write and it dies on the spot.
        {
            let suppressor = Arc::clone(&self.suppressor);
            let events_tx = events_tx.clone();
            self.host.on_volume_changed(Box::new(move |handle, volume| {
                if suppressor.is_active() {
                    return;
                }
                let _ = events_tx.send(Event::HostVolumeChanged { handle, volume });
            }));
        }

        if let Some(listener) = listener {
            tokio::spawn(accept_loop(listener, events_tx, shutdown.clone()));
        }

        let mut registry = TrackRegistry::new(self.host.master_track());
        let mut clients: HashMap<u64, mpsc::UnboundedSender<String>> = HashMap::new();

        let period = self.config.vu_period();
        let mut vu_timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        vu_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Endpoint shutting down");
                        break;
                    }
                }

                _ = vu_timer.tick() => {
                    self.broadcast_vu(&mut registry, &mut clients);
                }

                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event, &mut registry, &mut clients),
                        None => break,
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_event(
        &self,
        event: Event,
        registry: &mut TrackRegistry,
        clients: &mut HashMap<u64, mpsc::UnboundedSender<String>>,
    ) {
        match event {
            Event::ClientConnected { id, tx, peer } => {
                info!("Client #{} connected from {}", id, peer);

                // Synchronize the newcomer: one VOL line per known track,
                // master first, fresh from the host.
                self.sync_registry(registry);
                for track_id in registry.known_ids() {
                    if let Some(volume) = registry.volume(track_id) {
                        let _ = tx.send(ipc::format_vol(track_id, volume));
                    }
                }
                clients.insert(id, tx);
            }

            Event::ClientClosed { id } => {
                if clients.remove(&id).is_some() {
                    info!("Client #{} disconnected", id);
                }
            }

            Event::ClientLine { id, line } => match ipc::parse(&line) {
                Some(Command::SetVol { id: track_id, volume }) => {
                    self.apply_set_vol(track_id, volume, registry, clients);
                }
                Some(other) => {
                    debug!("Client #{} sent non-request command: {:?}", id, other);
                }
                None => {
                    debug!("Client #{} sent unparsable line: {:?}", id, line);
                }
            },

            Event::HostVolumeChanged { handle, volume } => {
                let track_id = registry.id_for(handle);
                registry.note_volume(track_id, volume);
                debug!("Host volume change: track {} -> {:.6}", track_id, volume);
                broadcast(clients, ipc::format_vol(track_id, volume));
            }
        }
    }

    /// Apply a client's volume write and fan the new state out to everyone.
    fn apply_set_vol(
        &self,
        track_id: u32,
        volume: f64,
        registry: &mut TrackRegistry,
        clients: &mut HashMap<u64, mpsc::UnboundedSender<String>>,
    ) {
        let Some(handle) = registry.track_for(track_id, self.host.as_ref()) else {
            debug!("SET_VOL for unknown track id {}, dropped", track_id);
            return;
        };

        let volume = volume.clamp(0.0, fader::MAX_VOLUME);

        // The host may invoke its change callback from inside set_volume;
        // the suppressor flag makes that echo die in the callback bridge.
        self.suppressor
            .run_suppressed(|| self.host.set_volume(handle, volume));

        registry.note_volume(track_id, volume);
        broadcast(clients, ipc::format_vol(track_id, volume));
    }

    /// Refresh the registry from the host's current track list and volumes.
    fn sync_registry(&self, registry: &mut TrackRegistry) {
        let master = self.host.master_track();
        let id = registry.id_for(master);
        if let Some(volume) = self.host.volume(master) {
            registry.note_volume(id, volume);
        }
        for handle in self.host.tracks() {
            let id = registry.id_for(handle);
            if let Some(volume) = self.host.volume(handle) {
                registry.note_volume(id, volume);
            }
        }
    }

    /// Sample every track's level and broadcast one VU line each.
    ///
    /// Hosts without a peak-level capability fall back to an estimate derived
    /// from the configured volume. That is a documented degradation, not a
    /// real meter reading.
    fn broadcast_vu(
        &self,
        registry: &mut TrackRegistry,
        clients: &mut HashMap<u64, mpsc::UnboundedSender<String>>,
    ) {
        if clients.is_empty() {
            return;
        }

        let master = self.host.master_track();
        let all = std::iter::once(master).chain(self.host.tracks());
        for handle in all {
            let track_id = registry.id_for(handle);
            let level_db = match self.host.peak_level(handle) {
                Some(peak) => fader::volume_to_db(peak),
                None => {
                    // Fallback estimate from the track volume
                    let volume = self.host.volume(handle).unwrap_or(0.0);
                    fader::volume_to_db(volume)
                }
            };
            let level_db = level_db.clamp(VU_MIN_DB, VU_MAX_DB);
            broadcast(clients, ipc::format_vu(track_id, level_db));
        }
    }
}

/// Queue a line to every connected client, dropping clients whose writer has
/// gone away.
fn broadcast(clients: &mut HashMap<u64, mpsc::UnboundedSender<String>>, line: String) {
    clients.retain(|id, tx| {
        let alive = tx.send(line.clone()).is_ok();
        if !alive {
            debug!("Dropping client #{} from broadcast set", id);
        }
        alive
    });
}

/// Accept connections and wire each one up with its own reader and writer
/// tasks, so a slow or silent client never blocks the others.
async fn accept_loop(
    listener: TcpListener,
    events_tx: mpsc::UnboundedSender<Event>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("Accept loop shutting down");
                    break;
                }
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let id = next_id;
                        next_id += 1;
                        spawn_client(id, stream, peer, events_tx.clone());
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

fn spawn_client(
    id: u64,
    stream: TcpStream,
    peer: std::net::SocketAddr,
    events_tx: mpsc::UnboundedSender<Event>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for client #{}: {}", id, e);
    }

    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    if events_tx
        .send(Event::ClientConnected { id, tx, peer })
        .is_err()
    {
        return;
    }

    // Writer: drain the outbound queue until it closes or the socket dies
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    // Reader: forward complete lines, report the close
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if events_tx.send(Event::ClientLine { id, line }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Read error from client #{}: {}", id, e);
                    break;
                }
            }
        }
        let _ = events_tx.send(Event::ClientClosed { id });
    });
}
