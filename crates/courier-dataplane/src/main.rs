// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! courier-dataplane - IPv4 forwarding engine over raw sockets
//!
//! # Usage
//!
//! ```bash
//! courier-dataplane routes.txt eth0 eth1 eth2
//! courier-dataplane routes.txt --arp-table arp.txt eth0 eth1
//! ```
//!
//! Interface names bind in order to interface indices 0, 1, 2, ... as used
//! by the routing-table file.

use anyhow::Context;
use clap::Parser;
use courier_dataplane::link::PacketSocket;
use courier_dataplane::rtable::{load_arp_table, load_route_table};
use courier_dataplane::{Router, RoutingTable};
use std::path::PathBuf;

/// IPv4 longest-prefix-match router with ARP resolution
#[derive(Parser, Debug)]
#[command(name = "courier-dataplane")]
#[command(about = "IPv4 forwarding engine (LPM routing, ARP, ICMP errors)")]
#[command(version)]
struct Args {
    /// Static routing-table file: `prefix next_hop mask iface` per line
    rtable: PathBuf,

    /// Optional static ARP-table file: `ipv4 mac` per line
    #[arg(long)]
    arp_table: Option<PathBuf>,

    /// Interface names, bound in order to interface indices
    #[arg(required = true)]
    ifaces: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let entries = load_route_table(&args.rtable)
        .with_context(|| format!("failed to load routing table {}", args.rtable.display()))?;
    log::info!("[dataplane] loaded {} routes", entries.len());

    let mut rtable = RoutingTable::new();
    rtable
        .add_entries(entries)
        .context("invalid routing table entry")?;

    let link = PacketSocket::open(&args.ifaces).context("failed to open interfaces")?;
    let mut router = Router::new(link, rtable);

    if let Some(path) = &args.arp_table {
        let seeded = load_arp_table(path)
            .with_context(|| format!("failed to load ARP table {}", path.display()))?;
        log::info!("[dataplane] seeded {} ARP entries", seeded.len());
        router.seed_arp(seeded);
    }

    router.run().context("receive loop failed")?;
    Ok(())
}
