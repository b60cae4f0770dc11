// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! courier-broker - telemetry publish/subscribe broker
//!
//! # Usage
//!
//! ```bash
//! courier-broker 12345
//! ```
//!
//! Publishers send datagrams to UDP `<port>`; subscribers connect to TCP
//! `<port>`. Type `exit` to shut the broker down.

use anyhow::Context;
use clap::Parser;
use courier::Broker;

/// Telemetry publish/subscribe broker
#[derive(Parser, Debug)]
#[command(name = "courier-broker")]
#[command(about = "Telemetry publish/subscribe broker (UDP ingress, TCP fan-out)")]
#[command(version)]
struct Args {
    /// Port shared by the UDP ingress and the TCP subscriber listener
    port: u16,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut broker = Broker::bind(args.port)
        .with_context(|| format!("failed to bind broker sockets on port {}", args.port))?;
    log::info!("[broker] listening on port {}", args.port);

    broker.run().context("broker event loop failed")?;
    Ok(())
}
