//! Cluster bootstrap: one TCP connection per unordered pair of processes.
//!
//! Every process listens on its own roster address. It accepts connections
//! from each higher-ranked member and connects out to each lower-ranked
//! member, so across the cluster every pair is joined exactly once.
//! Accepting and connecting run concurrently.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::{NetError, Result};
use crate::peer_link::PeerLink;
use crate::roster::Roster;
use crate::transport::{FramedTransport, DEFAULT_MAX_FRAME_LEN};

/// Configuration for connection bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Roster file path.
    pub roster_path: PathBuf,
    /// This process's roster address. Also the listen address.
    pub local_addr: SocketAddr,
    /// Connection attempts per lower-ranked peer before giving up.
    pub connect_attempts: u32,
    /// Pause between connection attempts.
    pub connect_backoff: Duration,
    /// Largest accepted frame body.
    pub max_frame_len: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            roster_path: PathBuf::from("info.txt"),
            local_addr: SocketAddr::from(([0, 0, 0, 0], 9746)),
            connect_attempts: 10,
            connect_backoff: Duration::from_secs(3),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl BootstrapConfig {
    /// Config for `local_addr` with defaults elsewhere.
    pub fn new(roster_path: impl Into<PathBuf>, local_addr: SocketAddr) -> Self {
        Self {
            roster_path: roster_path.into(),
            local_addr,
            ..Self::default()
        }
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    pub fn with_connect_backoff(mut self, backoff: Duration) -> Self {
        self.connect_backoff = backoff;
        self
    }
}

/// Result of a successful bootstrap.
pub struct Cluster {
    /// This process's rank in the roster.
    pub rank: usize,
    /// The roster it was derived from.
    pub roster: Roster,
    /// One started link per peer.
    pub links: Vec<PeerLink>,
}

/// Read the roster named in `config` and connect to every peer.
pub async fn establish(config: &BootstrapConfig) -> Result<Cluster> {
    let roster = Roster::load(&config.roster_path)?;
    establish_with_roster(config, roster).await
}

/// Connect to every peer in `roster`.
///
/// Any failure here is fatal to the process: the cluster is fixed and cannot
/// run with a missing member.
pub async fn establish_with_roster(config: &BootstrapConfig, roster: Roster) -> Result<Cluster> {
    let rank = roster.rank_of(config.local_addr)?;
    for (i, member) in roster.members().iter().enumerate() {
        info!("[P{}] {}", i, member);
    }

    let listener = TcpListener::bind(config.local_addr)
        .await
        .map_err(|source| NetError::Bind {
            addr: config.local_addr,
            source,
        })?;
    info!(rank, "P{} ({}) is listening", rank, config.local_addr);

    let expected_inbound = roster.higher_ranked_count(rank);
    let lower = roster.lower_ranked(rank).to_vec();

    let (accepted, connected) = tokio::try_join!(
        accept_peers(&listener, expected_inbound, &roster, rank),
        connect_peers(&lower, config, rank),
    )?;
    drop(listener);

    let links = accepted
        .into_iter()
        .chain(connected)
        .map(|(stream, label)| {
            PeerLink::spawn(FramedTransport::with_max_frame_len(
                stream,
                label,
                config.max_frame_len,
            ))
        })
        .collect::<Vec<_>>();

    info!(rank, peers = links.len(), "all connected");
    Ok(Cluster {
        rank,
        roster,
        links,
    })
}

async fn accept_peers(
    listener: &TcpListener,
    expected: usize,
    roster: &Roster,
    rank: usize,
) -> Result<Vec<(TcpStream, String)>> {
    let mut streams = Vec::with_capacity(expected);
    while streams.len() < expected {
        let (stream, remote) = listener.accept().await.map_err(NetError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("cannot set TCP_NODELAY for {}: {}", remote, e);
        }
        let label = match roster.rank_of_ip(remote.ip()) {
            Some(peer) => {
                info!("P{} is connected from P{} ({})", rank, peer, remote);
                format!("P{}", peer)
            }
            None => {
                info!("P{} is connected from {}", rank, remote);
                remote.to_string()
            }
        };
        streams.push((stream, label));
    }
    Ok(streams)
}

async fn connect_peers(
    lower: &[SocketAddr],
    config: &BootstrapConfig,
    rank: usize,
) -> Result<Vec<(TcpStream, String)>> {
    let mut streams = Vec::with_capacity(lower.len());
    for (peer, addr) in lower.iter().enumerate() {
        let stream =
            connect_with_retry(*addr, config.connect_attempts, config.connect_backoff).await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("cannot set TCP_NODELAY for {}: {}", addr, e);
        }
        info!("P{} is connected to P{} ({})", rank, peer, addr);
        streams.push((stream, format!("P{}", peer)));
    }
    Ok(streams)
}

/// Connect to `addr`, retrying up to `attempts` times with `backoff` between
/// tries.
pub async fn connect_with_retry(
    addr: SocketAddr,
    attempts: u32,
    backoff: Duration,
) -> Result<TcpStream> {
    for attempt in 1..=attempts {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!(attempt, attempts, "connection to {} failed: {}", addr, e);
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(NetError::ConnectExhausted { addr, attempts })
}
