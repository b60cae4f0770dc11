// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker event loop.
//!
//! One mio `Poll` multiplexes four descriptor groups: standard input for
//! operator commands, the UDP socket for publisher datagrams, the TCP
//! listener for new subscribers, and every connected subscriber stream.
//! Within one readiness batch the groups are always handled in that order,
//! subscribers in ascending token order.
//!
//! Handlers run to completion between waits and never block the loop on a
//! single peer: streams are non-blocking, each connection accumulates
//! partial frames in its codec and partial writes in its send queue.
//!
//! Failure policy: a malformed datagram is logged and dropped; a malformed
//! stream frame costs that subscriber its connection; a closed peer is
//! detached quietly. Only startup and the readiness wait itself are fatal.

use crate::codec::frame::EnvelopeKind;
use crate::codec::{Publication, Request, Response};
use crate::config::{DATAGRAM_MAX_LEN, INNER_MAX_LEN};
use crate::registry::{ConnId, RegistryError, SubscriberRegistry};
use crate::topic::TopicPattern;
use crate::transport::framing::FrameCodec;
use crate::transport::sock;
use crate::transport::stream::StreamError;
use mio::net::{TcpListener, TcpStream, UdpSocket};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;

// ============================================================================
// Constants
// ============================================================================

/// Token for standard input.
const STDIN_TOKEN: Token = Token(0);

/// Token for the publisher datagram socket.
const UDP_TOKEN: Token = Token(1);

/// Token for the subscriber listener.
const LISTENER_TOKEN: Token = Token(2);

/// First token handed to subscriber connections.
const CONN_TOKEN_START: usize = 3;

/// Maximum events drained per readiness wait.
const MAX_EVENTS: usize = 128;

// ============================================================================
// Connection state
// ============================================================================

/// Per-subscriber connection state.
struct Connection {
    stream: TcpStream,
    remote_addr: SocketAddr,
    codec: FrameCodec,
    send_queue: Vec<u8>,
    send_offset: usize,
}

impl Connection {
    fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            stream,
            remote_addr,
            codec: FrameCodec::new(INNER_MAX_LEN),
            send_queue: Vec::new(),
            send_offset: 0,
        }
    }

    fn queue_frame(&mut self, frame: &[u8]) {
        self.send_queue.extend_from_slice(frame);
    }

    /// Push queued bytes out. Returns without error when the kernel buffer
    /// fills; the pending tail goes out on the next writable event.
    fn flush(&mut self) -> io::Result<()> {
        while self.send_offset < self.send_queue.len() {
            match self.stream.write(&self.send_queue[self.send_offset..]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write returned 0"));
                }
                Ok(sent) => self.send_offset += sent,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        self.send_queue.clear();
        self.send_offset = 0;
        Ok(())
    }
}

// ============================================================================
// Broker
// ============================================================================

/// The publish/subscribe broker.
pub struct Broker {
    poll: Poll,
    listener: TcpListener,
    udp: UdpSocket,
    registry: SubscriberRegistry,
    conns: HashMap<Token, Connection>,
    next_token: usize,
    stdin_registered: bool,
    shutdown: bool,
}

impl Broker {
    /// Bind both sockets on `port` and register the permanent descriptors.
    pub fn bind(port: u16) -> io::Result<Self> {
        let (mut listener, mut udp) = sock::bind_pair(port)?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        poll.registry()
            .register(&mut udp, UDP_TOKEN, Interest::READABLE)?;

        // Stdin is best-effort: a broker without a terminal still serves.
        let stdin_registered = match poll.registry().register(
            &mut SourceFd(&libc::STDIN_FILENO),
            STDIN_TOKEN,
            Interest::READABLE,
        ) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("[broker] stdin not pollable, commands disabled: {}", err);
                false
            }
        };

        Ok(Self {
            poll,
            listener,
            udp,
            registry: SubscriberRegistry::new(),
            conns: HashMap::new(),
            next_token: CONN_TOKEN_START,
            stdin_registered,
            shutdown: false,
        })
    }

    /// Address of the subscriber listener.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address of the publisher datagram socket.
    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Run until `exit` arrives on standard input.
    ///
    /// The current readiness batch is always finished before the loop
    /// terminates; open subscriber sockets close on drop.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(MAX_EVENTS);

        while !self.shutdown {
            if let Err(err) = self.poll.poll(&mut events, None) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                // An unrecoverable readiness-wait error is fatal.
                return Err(err);
            }

            // Collect the batch, then dispatch in the fixed order:
            // stdin, datagrams, listener, subscribers (token-ascending).
            let mut stdin_ready = false;
            let mut udp_ready = false;
            let mut listener_ready = false;
            let mut readable: Vec<Token> = Vec::new();
            let mut writable: Vec<Token> = Vec::new();

            for event in events.iter() {
                match event.token() {
                    STDIN_TOKEN => stdin_ready = true,
                    UDP_TOKEN => udp_ready = true,
                    LISTENER_TOKEN => listener_ready = true,
                    token => {
                        if event.is_readable() || event.is_read_closed() {
                            readable.push(token);
                        }
                        if event.is_writable() {
                            writable.push(token);
                        }
                    }
                }
            }
            readable.sort_unstable();
            writable.sort_unstable();

            if stdin_ready {
                self.handle_stdin();
            }
            if udp_ready {
                self.handle_datagrams();
            }
            if listener_ready {
                self.handle_accept();
            }
            for token in readable {
                self.handle_conn_readable(token);
            }
            for token in writable {
                self.handle_conn_writable(token);
            }
        }

        log::info!("[broker] shutting down");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stdin
    // ------------------------------------------------------------------

    fn handle_stdin(&mut self) {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => {
                // EOF: stop watching so a closed stdin does not spin the loop.
                if self.stdin_registered {
                    let _ = self
                        .poll
                        .registry()
                        .deregister(&mut SourceFd(&libc::STDIN_FILENO));
                    self.stdin_registered = false;
                }
            }
            Ok(_) => match line.split_whitespace().next() {
                Some("exit") => self.shutdown = true,
                Some(other) => log::debug!("[broker] ignoring command '{}'", other),
                None => {}
            },
            Err(err) => log::warn!("[broker] stdin read failed: {}", err),
        }
    }

    // ------------------------------------------------------------------
    // Datagram ingress
    // ------------------------------------------------------------------

    fn handle_datagrams(&mut self) {
        // Stack buffer sized to the largest legal datagram; anything longer
        // is truncated by the kernel and fails decoding downstream.
        let mut buf = [0u8; DATAGRAM_MAX_LEN];
        loop {
            match self.udp.recv_from(&mut buf) {
                Ok((len, src)) => self.process_publication(&buf[..len], src),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::error!("[broker] datagram receive failed: {}", err);
                    break;
                }
            }
        }
    }

    fn process_publication(&mut self, datagram: &[u8], src: SocketAddr) {
        let publication = match Publication::decode(datagram) {
            Ok(publication) => publication,
            Err(err) => {
                log::warn!("[broker] dropping malformed datagram from {}: {}", src, err);
                return;
            }
        };

        let topic = match TopicPattern::parse(&publication.topic) {
            Ok(topic) if topic.is_concrete() => topic,
            Ok(_) => {
                log::warn!(
                    "[broker] dropping publication with wildcard topic '{}' from {}",
                    publication.topic,
                    src
                );
                return;
            }
            Err(err) => {
                log::warn!(
                    "[broker] dropping publication with invalid topic '{}' from {}: {}",
                    publication.topic,
                    src,
                    err
                );
                return;
            }
        };

        let mut recipients: Vec<ConnId> = self.registry.recipients_for(&topic).into_iter().collect();
        if recipients.is_empty() {
            return;
        }
        recipients.sort_unstable();

        let SocketAddr::V4(src_v4) = src else {
            log::warn!("[broker] dropping publication from non-IPv4 source {}", src);
            return;
        };

        // Serialize once, fan out to every recipient.
        let response = Response {
            source_ip: *src_v4.ip(),
            source_port: src_v4.port(),
            topic: publication.topic,
            payload: publication.payload,
        };
        let frame = match response.encode() {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("[broker] response serialization failed: {}", err);
                return;
            }
        };

        log::debug!(
            "[broker] publication topic='{}' from {} fan-out={}",
            response.topic,
            src,
            recipients.len()
        );

        for conn_id in recipients {
            self.send_to_conn(Token(conn_id as usize), &frame);
        }
    }

    /// Queue a frame on one connection and push what the kernel accepts.
    /// A per-recipient failure never stops the fan-out.
    fn send_to_conn(&mut self, token: Token, frame: &[u8]) {
        let Some(conn) = self.conns.get_mut(&token) else {
            return;
        };
        conn.queue_frame(frame);
        if let Err(err) = conn.flush() {
            self.handle_stream_error(token, err, "send");
        }
    }

    // ------------------------------------------------------------------
    // Listener
    // ------------------------------------------------------------------

    fn handle_accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, remote_addr)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        log::warn!("[broker] TCP_NODELAY failed for {}: {}", remote_addr, err);
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(err) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        log::error!("[broker] register failed for {}: {}", remote_addr, err);
                        continue;
                    }

                    log::debug!("[broker] accepted {} conn={}", remote_addr, token.0);
                    // No registry record yet: the client cannot receive
                    // publications until it issues a CONNECT.
                    self.conns.insert(token, Connection::new(stream, remote_addr));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::error!("[broker] accept failed: {}", err);
                    break;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Subscriber streams
    // ------------------------------------------------------------------

    fn handle_conn_readable(&mut self, token: Token) {
        loop {
            // The connection may have been dropped earlier in this batch.
            let Some(conn) = self.conns.get_mut(&token) else {
                return;
            };

            match conn.codec.decode(&mut conn.stream) {
                Ok(Some((EnvelopeKind::Request, inner))) => match Request::decode(&inner) {
                    Ok(request) => self.handle_request(token, request),
                    Err(err) => {
                        log::warn!(
                            "[broker] malformed request on conn {}: {}",
                            token.0,
                            err
                        );
                        self.close_conn(token, false);
                        return;
                    }
                },
                Ok(Some((EnvelopeKind::Response, _))) => {
                    log::warn!(
                        "[broker] unexpected response envelope on conn {}",
                        token.0
                    );
                    self.close_conn(token, false);
                    return;
                }
                Ok(None) => return,
                Err(err) => {
                    self.handle_stream_error(token, err, "receive");
                    return;
                }
            }
        }
    }

    fn handle_request(&mut self, token: Token, request: Request) {
        let conn_id = token.0 as ConnId;
        match request {
            Request::Connect { id } => {
                if self.registry.is_attached(conn_id) {
                    log::warn!(
                        "[broker] CONNECT on already-attached conn {} (id '{}')",
                        token.0,
                        id
                    );
                    self.close_conn(token, false);
                    return;
                }

                match self.registry.attach(conn_id, &id) {
                    Ok(()) => {
                        let remote_addr = self
                            .conns
                            .get(&token)
                            .map(|conn| conn.remote_addr.to_string())
                            .unwrap_or_default();
                        println!("New client {} connected from {}.", id, remote_addr);
                    }
                    Err(RegistryError::AlreadyAttached { id }) => {
                        println!("Client {} already connected.", id);
                        // The incumbent keeps its session; the newcomer goes.
                        self.close_conn(token, false);
                    }
                    Err(err) => {
                        log::error!("[broker] attach failed on conn {}: {}", token.0, err);
                        self.close_conn(token, false);
                    }
                }
            }
            Request::Subscribe { topic } => self.handle_subscription(token, &topic, true),
            Request::Unsubscribe { topic } => self.handle_subscription(token, &topic, false),
        }
    }

    fn handle_subscription(&mut self, token: Token, topic: &str, subscribe: bool) {
        let conn_id = token.0 as ConnId;
        let action = if subscribe { "SUBSCRIBE" } else { "UNSUBSCRIBE" };

        if !self.registry.is_attached(conn_id) {
            log::warn!(
                "[broker] {} from unattached conn {}, dropping connection",
                action,
                token.0
            );
            self.close_conn(token, false);
            return;
        }

        let pattern = match TopicPattern::parse(topic) {
            Ok(pattern) => pattern,
            Err(err) => {
                // Bad pattern costs the request, not the connection.
                log::warn!(
                    "[broker] invalid topic pattern '{}' in {} from conn {}: {}",
                    topic,
                    action,
                    token.0,
                    err
                );
                return;
            }
        };

        let result = if subscribe {
            self.registry.subscribe(conn_id, pattern)
        } else {
            self.registry.unsubscribe(conn_id, &pattern)
        };
        if let Err(err) = result {
            log::warn!("[broker] {} failed on conn {}: {}", action, token.0, err);
        }
    }

    fn handle_conn_writable(&mut self, token: Token) {
        let Some(conn) = self.conns.get_mut(&token) else {
            return;
        };
        if let Err(err) = conn.flush() {
            self.handle_stream_error(token, err, "send");
        }
    }

    // ------------------------------------------------------------------
    // Teardown helpers
    // ------------------------------------------------------------------

    fn handle_stream_error(&mut self, token: Token, err: io::Error, action: &str) {
        match StreamError::classify(err) {
            StreamError::PeerClosed => {
                self.close_conn(token, true);
            }
            StreamError::Io(err) => {
                log::error!("[broker] {} failed on conn {}: {}", action, token.0, err);
                self.close_conn(token, false);
            }
        }
    }

    /// Drop one connection: deregister, detach, close.
    ///
    /// With `announce`, an attached subscriber gets the operational
    /// "disconnected" line; an anonymous connection goes quietly.
    fn close_conn(&mut self, token: Token, announce: bool) {
        let Some(mut conn) = self.conns.remove(&token) else {
            return;
        };
        let _ = self.poll.registry().deregister(&mut conn.stream);

        let conn_id = token.0 as ConnId;
        if announce {
            if let Some(id) = self.registry.id_of(conn_id) {
                println!("Client {} disconnected.", id);
            }
        }
        self.registry.detach(conn_id);
        log::debug!("[broker] closed conn {} ({})", token.0, conn.remote_addr);
    }
}
