//! Integration tests for the IPC endpoint: multi-client fan-out, connect-time
//! synchronization, feedback suppression, and the VU loop.

use mixer_gw::config::EndpointConfig;
use mixer_gw::endpoint::Endpoint;
use mixer_gw::host::{HostControl, SimHost};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

const TICK: Duration = Duration::from_secs(2);

/// Start an endpoint on an ephemeral port; returns its address and the
/// shutdown handle.
async fn start_endpoint(
    host: Arc<SimHost>,
    vu_rate_hz: f64,
) -> (SocketAddr, watch::Sender<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = EndpointConfig {
        listen_addr: addr,
        vu_rate_hz,
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(Endpoint::new(config, host).serve_on(listener, shutdown_rx));
    (addr, shutdown_tx)
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn next_line(&mut self) -> String {
        timeout(TICK, self.lines.next_line())
            .await
            .expect("timed out waiting for line")
            .expect("read error")
            .expect("connection closed")
    }

    async fn expect_no_line(&mut self, wait: Duration) {
        if let Ok(line) = timeout(wait, self.lines.next_line()).await {
            panic!("expected silence, got {:?}", line);
        }
    }

    async fn send(&mut self, line: &str) {
        self.write.write_all(line.as_bytes()).await.unwrap();
    }
}

// Slow enough that no VU tick fires during a test
const NO_VU: f64 = 0.1;

#[tokio::test]
async fn connect_time_dump_is_master_first() {
    let host = Arc::new(SimHost::new(2));
    host.set_volume(host.tracks()[0], 0.5);
    let (addr, _shutdown) = start_endpoint(Arc::clone(&host), NO_VU).await;

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.next_line().await, "VOL 0 1.000000");
    assert_eq!(client.next_line().await, "VOL 1 0.500000");
    assert_eq!(client.next_line().await, "VOL 2 1.000000");
}

#[tokio::test]
async fn set_vol_is_applied_and_broadcast_to_all_clients() {
    let host = Arc::new(SimHost::new(2));
    let (addr, _shutdown) = start_endpoint(Arc::clone(&host), NO_VU).await;

    let mut a = TestClient::connect(addr).await;
    for _ in 0..3 {
        a.next_line().await;
    }
    let mut b = TestClient::connect(addr).await;
    for _ in 0..3 {
        b.next_line().await;
    }

    a.send("SET_VOL 2 0.5\n").await;

    assert_eq!(a.next_line().await, "VOL 2 0.500000");
    assert_eq!(b.next_line().await, "VOL 2 0.500000");

    // Applied to the host
    assert_eq!(host.volume(host.tracks()[1]), Some(0.5));

    // Feedback suppression: the host's synchronous echo must not produce a
    // second broadcast
    a.expect_no_line(Duration::from_millis(200)).await;
    b.expect_no_line(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn garbage_line_is_ignored_and_connection_survives() {
    let host = Arc::new(SimHost::new(1));
    let (addr, _shutdown) = start_endpoint(Arc::clone(&host), NO_VU).await;

    let mut a = TestClient::connect(addr).await;
    for _ in 0..2 {
        a.next_line().await;
    }
    let mut b = TestClient::connect(addr).await;
    for _ in 0..2 {
        b.next_line().await;
    }

    a.send("GARBAGE DATA\n").await;
    b.expect_no_line(Duration::from_millis(200)).await;

    // The offending connection still works
    a.send("SET_VOL 1 0.25\n").await;
    assert_eq!(a.next_line().await, "VOL 1 0.250000");
    assert_eq!(b.next_line().await, "VOL 1 0.250000");
}

#[tokio::test]
async fn host_initiated_change_is_broadcast() {
    let host = Arc::new(SimHost::new(1));
    let (addr, _shutdown) = start_endpoint(Arc::clone(&host), NO_VU).await;

    let mut client = TestClient::connect(addr).await;
    for _ in 0..2 {
        client.next_line().await;
    }

    // A user moved a fader in the DAW
    host.set_volume(host.tracks()[0], 2.0);
    assert_eq!(client.next_line().await, "VOL 1 2.000000");
}

#[tokio::test]
async fn vu_loop_broadcasts_levels_with_fallback() {
    let host = Arc::new(SimHost::new(1));
    // Real peak on track 1, nothing on master -> volume-derived fallback
    host.set_peak(host.tracks()[0], 0.5);
    let (addr, _shutdown) = start_endpoint(Arc::clone(&host), 50.0).await;

    let mut client = TestClient::connect(addr).await;

    let mut saw_master = false;
    let mut saw_track = false;
    while !(saw_master && saw_track) {
        let line = client.next_line().await;
        match line.as_str() {
            // Fallback estimate: unity volume = 0 dB
            "VU 0 0.00" => saw_master = true,
            // 20*log10(0.5) = -6.02 dB
            "VU 1 -6.02" => saw_track = true,
            other => assert!(other.starts_with("VOL "), "unexpected line {:?}", other),
        }
    }
}

#[tokio::test]
async fn vu_levels_are_clamped() {
    let host = Arc::new(SimHost::new(1));
    // Way below the floor and way above the ceiling
    host.set_peak(host.tracks()[0], 0.000001);
    host.set_peak(host.master_track(), 4.0);
    let (addr, _shutdown) = start_endpoint(Arc::clone(&host), 50.0).await;

    let mut client = TestClient::connect(addr).await;

    let mut saw_master = false;
    let mut saw_track = false;
    while !(saw_master && saw_track) {
        let line = client.next_line().await;
        match line.as_str() {
            "VU 0 6.00" => saw_master = true,
            "VU 1 -60.00" => saw_track = true,
            other => assert!(other.starts_with("VOL "), "unexpected line {:?}", other),
        }
    }
}

#[tokio::test]
async fn dead_client_is_dropped_from_broadcast_set() {
    let host = Arc::new(SimHost::new(1));
    let (addr, _shutdown) = start_endpoint(Arc::clone(&host), NO_VU).await;

    let mut a = TestClient::connect(addr).await;
    for _ in 0..2 {
        a.next_line().await;
    }
    let mut b = TestClient::connect(addr).await;
    for _ in 0..2 {
        b.next_line().await;
    }

    drop(a);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Survivor still gets broadcasts
    b.send("SET_VOL 1 0.75\n").await;
    assert_eq!(b.next_line().await, "VOL 1 0.750000");
}
