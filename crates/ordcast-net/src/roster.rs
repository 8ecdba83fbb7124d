//! Peer roster: the fixed set of processes in the cluster.
//!
//! The roster file holds one `<ip> <port>` pair per line. Blank lines and
//! lines starting with `#` are skipped. Line order carries no meaning; entries
//! are sorted by socket address and a process's rank is its index in that
//! order.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use crate::error::{NetError, Result};

/// The sorted list of cluster members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    members: Vec<SocketAddr>,
}

impl Roster {
    /// Build a roster from addresses in any order.
    pub fn from_addrs(mut members: Vec<SocketAddr>) -> Self {
        members.sort();
        members.dedup();
        Self { members }
    }

    /// Read and parse a roster file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| NetError::RosterRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse roster text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut members = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut fields = trimmed.split_whitespace();
            let (ip, port) = match (fields.next(), fields.next(), fields.next()) {
                (Some(ip), Some(port), None) => (ip, port),
                _ => {
                    return Err(NetError::RosterParse {
                        line,
                        reason: format!("expected '<address> <port>', got '{}'", trimmed),
                    })
                }
            };

            let ip: IpAddr = ip.parse().map_err(|_| NetError::RosterParse {
                line,
                reason: format!("invalid address '{}'", ip),
            })?;
            let port: u16 = port.parse().map_err(|_| NetError::RosterParse {
                line,
                reason: format!("invalid port '{}'", port),
            })?;

            let addr = SocketAddr::new(ip, port);
            if members.contains(&addr) {
                return Err(NetError::RosterParse {
                    line,
                    reason: format!("duplicate entry {}", addr),
                });
            }
            members.push(addr);
        }

        Ok(Self::from_addrs(members))
    }

    /// All members in rank order.
    pub fn members(&self) -> &[SocketAddr] {
        &self.members
    }

    /// Number of processes, including this one.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of peers excluding this process.
    pub fn peer_count(&self) -> usize {
        self.members.len().saturating_sub(1)
    }

    /// Rank of `addr`: lower address, lower rank.
    pub fn rank_of(&self, addr: SocketAddr) -> Result<usize> {
        self.members
            .binary_search(&addr)
            .map_err(|_| NetError::NotInRoster(addr))
    }

    /// Members ranked below `rank`. This process connects out to each of them.
    pub fn lower_ranked(&self, rank: usize) -> &[SocketAddr] {
        &self.members[..rank.min(self.members.len())]
    }

    /// How many members rank above `rank`. Each of them connects in.
    pub fn higher_ranked_count(&self, rank: usize) -> usize {
        self.members.len().saturating_sub(rank + 1)
    }

    /// Rank of a connecting peer, when its IP identifies a single member.
    pub fn rank_of_ip(&self, ip: IpAddr) -> Option<usize> {
        let mut matches = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, member)| member.ip() == ip);
        match (matches.next(), matches.next()) {
            (Some((rank, _)), None) => Some(rank),
            _ => None,
        }
    }
}
