//! IPv4 address blocks in CIDR notation.
//!
//! Blocks are normalized on parse: host bits must be zero, so `10.0.0.0/16`
//! is accepted and `10.0.1.0/16` is rejected.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// CIDR validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CidrError {
    #[error("invalid CIDR notation: {0}")]
    InvalidNotation(String),

    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefix(u8),

    #[error("{0} has host bits set (did you mean {1}?)")]
    HostBitsSet(String, String),
}

/// An IPv4 block such as `10.0.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr(Ipv4Net);

impl Cidr {
    /// `0.0.0.0/0`
    pub fn any_ipv4() -> Self {
        Self(Ipv4Net::default())
    }

    /// Build a block from its parts, rejecting set host bits.
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, CidrError> {
        let net = Ipv4Net::new(network, prefix).map_err(|_| CidrError::InvalidPrefix(prefix))?;
        let trunc = net.trunc();
        if trunc != net {
            return Err(CidrError::HostBitsSet(net.to_string(), trunc.to_string()));
        }
        Ok(Self(net))
    }

    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Whether `other` lies entirely inside this block.
    pub fn contains(&self, other: &Cidr) -> bool {
        self.0.contains(&other.0)
    }

    /// Whether the two blocks share any address. Aligned blocks either nest
    /// or are disjoint.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Every sub-block of length `prefix` in address order, or `None` when
    /// `prefix` is shorter than this block's or longer than 32.
    pub fn subnets(&self, prefix: u8) -> Option<impl Iterator<Item = Cidr>> {
        self.0.subnets(prefix).ok().map(|blocks| blocks.map(Self))
    }

    /// Usable host addresses: the network and broadcast addresses are
    /// excluded for blocks larger than /31.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        self.0.hosts()
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| CidrError::InvalidNotation(s.to_string()))?;
        let network = Ipv4Addr::from_str(addr)
            .map_err(|_| CidrError::InvalidAddress(addr.to_string()))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| CidrError::InvalidNotation(s.to_string()))?;
        Self::new(network, prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(value: Cidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
