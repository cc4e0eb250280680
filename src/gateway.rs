//! Gateway (hub) - translates between the GUI's OSC/UDP control plane and the
//! endpoint's line-based TCP IPC
//!
//! One task multiplexes three inputs with `tokio::select!`: UDP datagrams
//! from the GUI (commands), bytes from the TCP link to the endpoint (state),
//! and a periodic liveness tick that re-binds the UDP listener if it was
//! lost. Commands are forwarded the moment they decode - no batching, fader
//! latency is the whole point.
//!
//! The TCP link runs a never-give-up reconnect loop: any send/receive failure
//! drops the link back to `Connecting`, which retries with a fixed backoff
//! until the endpoint answers again.

use crate::config::GatewayConfig;
use crate::ipc::{self, Command, LineBuffer};
use crate::osc;
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connection state of the TCP link to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// What resolved first while the link was up.
enum Io {
    Shutdown,
    RebindTick,
    Udp(std::io::Result<usize>),
    Tcp(std::io::Result<usize>),
}

/// Why the connected loop ended.
enum Disconnect {
    Shutdown,
    LinkLost,
}

pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Run until shutdown. Connection trouble never ends the loop; only a
    /// failure to set up the outbound UDP socket (which needs no fixed port)
    /// is treated as fatal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        // Outbound state socket: ephemeral port, target is the GUI listener
        let udp_out = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .context("Failed to bind outbound OSC socket")?;

        // Inbound command socket: fixed port; a failed bind degrades and the
        // liveness tick keeps retrying
        let mut udp_in = self.bind_udp_in().await;

        let mut state = LinkState::Disconnected;

        loop {
            if *shutdown.borrow() {
                break;
            }

            transition(&mut state, LinkState::Connecting);
            info!("Connecting to IPC endpoint at {}...", self.config.ipc_addr);

            let stream = tokio::select! {
                _ = shutdown.changed() => continue,
                connected = TcpStream::connect(self.config.ipc_addr) => match connected {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(
                            "IPC connect failed: {} (retrying in {:?})",
                            e,
                            self.config.reconnect_delay()
                        );
                        tokio::select! {
                            _ = shutdown.changed() => {}
                            _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
                        }
                        continue;
                    }
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY: {}", e);
            }

            transition(&mut state, LinkState::Connected);
            info!("Connected to IPC endpoint");

            let disconnect = self
                .connected_loop(stream, &udp_out, &mut udp_in, &mut shutdown)
                .await;
            transition(&mut state, LinkState::Disconnected);

            match disconnect {
                Disconnect::Shutdown => break,
                Disconnect::LinkLost => {
                    warn!(
                        "IPC link lost, reconnecting in {:?}",
                        self.config.reconnect_delay()
                    );
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
                    }
                }
            }
        }

        info!("Gateway stopped");
        Ok(())
    }

    /// Multiplex both sockets while the TCP link is up.
    async fn connected_loop(
        &self,
        stream: TcpStream,
        udp_out: &UdpSocket,
        udp_in: &mut Option<UdpSocket>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Disconnect {
        let (mut tcp_read, mut tcp_write) = stream.into_split();

        let mut udp_buf = [0u8; 1024];
        let mut tcp_buf = [0u8; 1024];
        let mut lines = LineBuffer::new();

        let mut rebind_timer = tokio::time::interval(self.config.rebind_check_interval());
        rebind_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            // Select first, mutate after: the arm futures only borrow, every
            // state change happens once they are dropped.
            let io = tokio::select! {
                _ = shutdown.changed() => Io::Shutdown,
                _ = rebind_timer.tick() => Io::RebindTick,
                received = recv_or_pending(udp_in.as_ref(), &mut udp_buf) => {
                    Io::Udp(received.map(|(len, _peer)| len))
                }
                read = tcp_read.read(&mut tcp_buf) => Io::Tcp(read),
            };

            match io {
                Io::Shutdown => {
                    if *shutdown.borrow() {
                        return Disconnect::Shutdown;
                    }
                }

                // Self-healing bind for the command listener
                Io::RebindTick => {
                    if udp_in.is_none() {
                        *udp_in = self.bind_udp_in().await;
                    }
                }

                // GUI command: OSC in, SET_VOL out, immediately
                Io::Udp(Ok(len)) => {
                    if let Some(line) = translate_command(&udp_buf[..len]) {
                        if let Err(e) = tcp_write.write_all(line.as_bytes()).await {
                            warn!("IPC send failed: {}", e);
                            return Disconnect::LinkLost;
                        }
                    }
                }
                Io::Udp(Err(e)) => {
                    warn!("OSC receive failed: {} (listener will rebind)", e);
                    *udp_in = None;
                }

                // Endpoint state: VOL lines out to the GUI as OSC
                Io::Tcp(Ok(0)) => {
                    info!("IPC endpoint closed the connection");
                    return Disconnect::LinkLost;
                }
                Io::Tcp(Ok(len)) => {
                    for line in lines.push(&tcp_buf[..len]) {
                        self.forward_state(&line, udp_out).await;
                    }
                }
                Io::Tcp(Err(e)) => {
                    warn!("IPC receive failed: {}", e);
                    return Disconnect::LinkLost;
                }
            }
        }
    }

    /// Re-encode one endpoint state line as OSC toward the GUI.
    ///
    /// Only `VOL` lines have a GUI-side representation; the meter stream and
    /// anything unrecognized is dropped here.
    async fn forward_state(&self, line: &str, udp_out: &UdpSocket) {
        match ipc::parse(line) {
            Some(Command::Vol { id, volume }) => {
                let datagram = osc::encode(&osc::track_volume_address(id), volume as f32);
                debug!("State to GUI: track {} -> {:.6}", id, volume);
                if let Err(e) = udp_out.send_to(&datagram, self.config.osc_send_addr).await {
                    warn!("OSC send to GUI failed: {}", e);
                }
            }
            Some(_) => {}
            None => debug!("Ignoring unparsable IPC line: {:?}", line),
        }
    }

    async fn bind_udp_in(&self) -> Option<UdpSocket> {
        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, self.config.osc_listen_port).into();
        match UdpSocket::bind(addr).await {
            Ok(socket) => {
                info!("OSC command listener bound on {}", addr);
                Some(socket)
            }
            Err(e) => {
                warn!("Failed to bind OSC listener on {}: {}", addr, e);
                None
            }
        }
    }
}

fn transition(state: &mut LinkState, next: LinkState) {
    if *state != next {
        debug!("Link state: {:?} -> {:?}", *state, next);
        *state = next;
    }
}

/// Receive from the command socket, or park forever while it is unbound so
/// the other select arms keep running.
async fn recv_or_pending(
    socket: Option<&UdpSocket>,
    buf: &mut [u8],
) -> std::io::Result<(usize, SocketAddr)> {
    match socket {
        Some(socket) => socket.recv_from(buf).await,
        None => std::future::pending().await,
    }
}

/// Decode a GUI datagram into a `SET_VOL` line, or `None` if it isn't a
/// well-formed track-volume command.
fn translate_command(datagram: &[u8]) -> Option<String> {
    let (address, value) = match osc::decode(datagram) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!("Dropping malformed OSC datagram: {}", e);
            return None;
        }
    };

    let Some(id) = osc::parse_track_volume_address(&address) else {
        debug!("Dropping OSC message with unhandled address: {}", address);
        return None;
    };

    debug!("Command from GUI: track {} -> {:.6}", id, value);
    Some(ipc::format_set_vol(id, value as f64))
}
