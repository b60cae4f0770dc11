// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking send/receive helpers for stream sockets.
//!
//! Both helpers resume through `EINTR` and distinguish an orderly peer
//! close from every other transport failure, because the two demand
//! different reactions: a closed peer is detached quietly, anything else
//! surfaces as a request-level error.

use std::io::{self, Read, Write};

/// Stream transfer outcome, split the way the callers need it.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The peer closed the connection (EOF on read, broken pipe on write).
    #[error("connection closed by peer")]
    PeerClosed,
    /// Any other transport failure.
    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl StreamError {
    /// Classify an I/O error the way `send_all`/`recv_all` do.
    pub fn classify(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => StreamError::PeerClosed,
            _ => StreamError::Io(err),
        }
    }

    pub fn is_peer_closed(&self) -> bool {
        matches!(self, StreamError::PeerClosed)
    }
}

/// Write the whole buffer, retrying through interruptions and short writes.
pub fn send_all<W: Write + ?Sized>(writer: &mut W, mut buf: &[u8]) -> Result<(), StreamError> {
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => return Err(StreamError::PeerClosed),
            Ok(sent) => buf = &buf[sent..],
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(StreamError::classify(err)),
        }
    }
    Ok(())
}

/// Fill the whole buffer, retrying through interruptions and short reads.
pub fn recv_all<R: Read + ?Sized>(reader: &mut R, mut buf: &mut [u8]) -> Result<(), StreamError> {
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => return Err(StreamError::PeerClosed),
            Ok(received) => buf = &mut buf[received..],
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(StreamError::classify(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Stream stub with scripted read/write behavior.
    struct Scripted {
        reads: VecDeque<io::Result<Vec<u8>>>,
        writes: VecDeque<io::Result<usize>>,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                reads: VecDeque::new(),
                writes: VecDeque::new(),
                written: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.writes.pop_front() {
                Some(Ok(n)) => {
                    let n = n.min(buf.len());
                    self.written.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                Some(Err(err)) => Err(err),
                None => {
                    self.written.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_all_resumes_partial_writes() {
        let mut stream = Scripted::new();
        stream.writes.push_back(Ok(2));
        stream.writes.push_back(Ok(3));

        send_all(&mut stream, b"hello").expect("send_all should succeed");
        assert_eq!(stream.written, b"hello");
    }

    #[test]
    fn test_send_all_retries_interrupted() {
        let mut stream = Scripted::new();
        stream
            .writes
            .push_back(Err(io::Error::new(io::ErrorKind::Interrupted, "signal")));
        stream.writes.push_back(Ok(5));

        send_all(&mut stream, b"hello").expect("send_all should succeed");
        assert_eq!(stream.written, b"hello");
    }

    #[test]
    fn test_send_all_broken_pipe_is_peer_closed() {
        let mut stream = Scripted::new();
        stream
            .writes
            .push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));

        let err = send_all(&mut stream, b"hello").unwrap_err();
        assert!(err.is_peer_closed());
    }

    #[test]
    fn test_recv_all_reassembles_short_reads() {
        let mut stream = Scripted::new();
        stream.reads.push_back(Ok(b"he".to_vec()));
        stream.reads.push_back(Ok(b"llo".to_vec()));

        let mut buf = [0u8; 5];
        recv_all(&mut stream, &mut buf).expect("recv_all should succeed");
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_recv_all_eof_is_peer_closed() {
        let mut stream = Scripted::new();
        let mut buf = [0u8; 4];
        let err = recv_all(&mut stream, &mut buf).unwrap_err();
        assert!(err.is_peer_closed());
    }

    #[test]
    fn test_recv_all_other_errors_propagate() {
        let mut stream = Scripted::new();
        stream
            .reads
            .push_back(Err(io::Error::new(io::ErrorKind::TimedOut, "late")));

        let mut buf = [0u8; 4];
        let err = recv_all(&mut stream, &mut buf).unwrap_err();
        assert!(!err.is_peer_closed());
    }
}
