// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing table.
//!
//! Trie-backed longest-prefix-match lookups plus loaders for the static
//! table files:
//!
//! - route table, one entry per line: `prefix next_hop mask iface`
//! - ARP table, one entry per line: `ipv4 aa:bb:cc:dd:ee:ff`
//!
//! Addresses are dotted-quad; fields are whitespace-separated.

use crate::packet::MacAddr;
use crate::trie::BinaryTrie;
use std::net::Ipv4Addr;
use std::path::Path;
use thiserror::Error;

/// Static table errors.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("mask {0} is not left-contiguous")]
    BadMask(Ipv4Addr),
}

/// One route: destination prefix, mask, next hop, outgoing interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub prefix: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub iface: usize,
}

impl RouteEntry {
    /// Number of leading one bits in the mask.
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.mask).leading_ones()
    }
}

/// Longest-prefix-match routing table.
#[derive(Default)]
pub struct RoutingTable {
    trie: BinaryTrie<u32, RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one route. The mask must be a run of ones followed by zeros.
    pub fn add_entry(&mut self, entry: RouteEntry) -> Result<(), TableError> {
        let mask = u32::from(entry.mask);
        if mask.count_ones() != mask.leading_ones() {
            return Err(TableError::BadMask(entry.mask));
        }
        self.trie
            .insert(u32::from(entry.prefix), entry.prefix_len(), entry);
        Ok(())
    }

    pub fn add_entries(
        &mut self,
        entries: impl IntoIterator<Item = RouteEntry>,
    ) -> Result<(), TableError> {
        for entry in entries {
            self.add_entry(entry)?;
        }
        Ok(())
    }

    /// Most specific route covering `dest`, if any.
    pub fn lookup(&self, dest: Ipv4Addr) -> Option<&RouteEntry> {
        self.trie.longest_prefix_match(u32::from(dest))
    }
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    line: usize,
    what: &str,
) -> Result<T, TableError> {
    field
        .ok_or_else(|| TableError::Parse {
            line,
            reason: format!("missing {}", what),
        })?
        .parse()
        .map_err(|_| TableError::Parse {
            line,
            reason: format!("invalid {}", what),
        })
}

/// Parse a route table from its text representation.
pub fn parse_route_table(text: &str) -> Result<Vec<RouteEntry>, TableError> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let mut fields = raw.split_whitespace();
        entries.push(RouteEntry {
            prefix: parse_field(fields.next(), line, "prefix")?,
            next_hop: parse_field(fields.next(), line, "next hop")?,
            mask: parse_field(fields.next(), line, "mask")?,
            iface: parse_field(fields.next(), line, "interface index")?,
        });
    }
    Ok(entries)
}

/// Load a route table file.
pub fn load_route_table<P: AsRef<Path>>(path: P) -> Result<Vec<RouteEntry>, TableError> {
    parse_route_table(&std::fs::read_to_string(path)?)
}

/// Parse a static ARP table from its text representation.
pub fn parse_arp_table(text: &str) -> Result<Vec<(Ipv4Addr, MacAddr)>, TableError> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let mut fields = raw.split_whitespace();
        let ip = parse_field(fields.next(), line, "address")?;
        let mac = parse_field(fields.next(), line, "MAC address")?;
        entries.push((ip, mac));
    }
    Ok(entries)
}

/// Load a static ARP table file.
pub fn load_arp_table<P: AsRef<Path>>(path: P) -> Result<Vec<(Ipv4Addr, MacAddr)>, TableError> {
    parse_arp_table(&std::fs::read_to_string(path)?)
}
