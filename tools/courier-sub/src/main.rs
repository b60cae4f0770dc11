// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! courier-sub - subscriber client for the courier broker
//!
//! # Usage
//!
//! ```bash
//! courier-sub sensor01 127.0.0.1 12345
//! ```
//!
//! Commands on standard input:
//!
//! - `subscribe <topic>` (topics may use `+` and `*` wildcards)
//! - `unsubscribe <topic>`
//! - `exit`
//!
//! Matching publications print as `<ip>:<port> - <topic> - <TYPE> - <value>`.

use anyhow::{bail, Context};
use clap::Parser;
use courier::codec::frame::EnvelopeKind;
use courier::codec::{Payload, Request, Response};
use courier::config::{CLIENT_ID_MAX_LEN, INNER_MAX_LEN, TOPIC_MAX_LEN};
use courier::transport::{send_all, FrameCodec};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io::{self, BufRead};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;

const STDIN_TOKEN: Token = Token(0);
const SOCKET_TOKEN: Token = Token(1);

/// Subscriber client for the courier broker
#[derive(Parser, Debug)]
#[command(name = "courier-sub")]
#[command(about = "Subscribe to broker topics and print matching publications")]
#[command(version)]
struct Args {
    /// Client identifier (at most 10 bytes; survives reconnection)
    id: String,

    /// Broker host
    host: String,

    /// Broker port
    port: u16,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.id.len() > CLIENT_ID_MAX_LEN {
        bail!(
            "client id '{}' exceeds {} bytes",
            args.id,
            CLIENT_ID_MAX_LEN
        );
    }

    let addr: SocketAddr = (args.host.as_str(), args.port)
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {}:{}", args.host, args.port))?
        .next()
        .with_context(|| format!("no address for {}:{}", args.host, args.port))?;
    let mut stream =
        TcpStream::connect(addr).with_context(|| format!("failed to connect to {}", addr))?;
    stream.set_nodelay(true).context("TCP_NODELAY failed")?;

    let connect = Request::Connect {
        id: args.id.clone(),
    }
    .encode()
    .context("failed to encode CONNECT")?;
    send_all(&mut stream, &connect).context("failed to send CONNECT")?;
    log::debug!("[sub] connected to {} as '{}'", addr, args.id);

    run(stream)
}

/// Multiplex stdin commands against incoming response frames.
///
/// The socket stays blocking; readiness comes from poll, and the framing
/// codec only reads once a frame has started arriving.
fn run(mut stream: TcpStream) -> anyhow::Result<()> {
    let mut poll = Poll::new().context("poll creation failed")?;
    poll.registry()
        .register(
            &mut SourceFd(&libc::STDIN_FILENO),
            STDIN_TOKEN,
            Interest::READABLE,
        )
        .context("failed to watch stdin")?;
    let socket_fd = stream.as_raw_fd();
    poll.registry()
        .register(&mut SourceFd(&socket_fd), SOCKET_TOKEN, Interest::READABLE)
        .context("failed to watch socket")?;

    let mut codec = FrameCodec::new(INNER_MAX_LEN);
    let mut events = Events::with_capacity(8);

    loop {
        if let Err(err) = poll.poll(&mut events, None) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err).context("poll failed");
        }

        for event in events.iter() {
            match event.token() {
                STDIN_TOKEN => {
                    if !handle_command(&mut stream)? {
                        return Ok(());
                    }
                }
                SOCKET_TOKEN => match codec.decode(&mut stream) {
                    Ok(Some((EnvelopeKind::Response, inner))) => match Response::decode(&inner) {
                        Ok(response) => print_response(&response),
                        Err(err) => log::warn!("[sub] malformed response: {}", err),
                    },
                    Ok(Some((EnvelopeKind::Request, _))) => {
                        log::warn!("[sub] unexpected request envelope from broker");
                    }
                    Ok(None) => {}
                    Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                        log::info!("[sub] broker closed the connection");
                        return Ok(());
                    }
                    Err(err) => return Err(err).context("broker stream failed"),
                },
                _ => {}
            }
        }
    }
}

/// Read one stdin command. Returns false when the client should exit.
fn handle_command(stream: &mut TcpStream) -> anyhow::Result<bool> {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(false); // EOF
    }

    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some("exit"), _) => return Ok(false),
        (Some("subscribe"), Some(topic)) => {
            send_topic_request(stream, topic, true)?;
        }
        (Some("unsubscribe"), Some(topic)) => {
            send_topic_request(stream, topic, false)?;
        }
        (Some(other), _) => println!("Unknown command: {}", other),
        (None, _) => {}
    }
    Ok(true)
}

fn send_topic_request(stream: &mut TcpStream, topic: &str, subscribe: bool) -> anyhow::Result<()> {
    if topic.len() > TOPIC_MAX_LEN {
        println!("Topic exceeds {} bytes.", TOPIC_MAX_LEN);
        return Ok(());
    }

    let request = if subscribe {
        Request::Subscribe {
            topic: topic.to_string(),
        }
    } else {
        Request::Unsubscribe {
            topic: topic.to_string(),
        }
    };
    let frame = request.encode().context("failed to encode request")?;
    send_all(stream, &frame).context("failed to send request")?;

    if subscribe {
        println!("Subscribed to topic.");
    } else {
        println!("Unsubscribed from topic.");
    }
    Ok(())
}

fn print_response(response: &Response) {
    println!(
        "{}:{} - {} - {} - {}",
        response.source_ip,
        response.source_port,
        response.topic,
        response.payload.kind().name(),
        format_value(&response.payload)
    );
}

/// Render a payload the way publishers meant it.
fn format_value(payload: &Payload) -> String {
    match payload {
        Payload::Int { sign, value } => {
            let value = i64::from(*value);
            if *sign != 0 {
                (-value).to_string()
            } else {
                value.to_string()
            }
        }
        Payload::ShortReal { value } => {
            format!("{}.{:02}", value / 100, value % 100)
        }
        Payload::Float {
            sign,
            value,
            exponent,
        } => {
            let minus = if *sign != 0 { "-" } else { "" };
            if *exponent == 0 {
                return format!("{}{}", minus, value);
            }
            let scale = 10u64.pow(u32::from(*exponent));
            let whole = u64::from(*value) / scale;
            let frac = u64::from(*value) % scale;
            format!(
                "{}{}.{:0width$}",
                minus,
                whole,
                frac,
                width = *exponent as usize
            )
        }
        Payload::Str(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
