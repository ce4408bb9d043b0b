use std::{io, net::SocketAddr, path::PathBuf, time::Duration};

use quinn::crypto::rustls::NoInitialCipherSuite;
use thiserror::Error;

use crate::config::HarnessConfigBuilderError;

/// Failure to establish the QUIC connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("{host}:{port} did not resolve to any address")]
    NoAddress { host: String, port: u16 },
    #[error("failed to bind local endpoint: {0}")]
    Bind(#[source] io::Error),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: quinn::ConnectError,
    },
    #[error("handshake with {addr} failed: {source}")]
    Handshake {
        addr: SocketAddr,
        #[source]
        source: quinn::ConnectionError,
    },
    #[error("handshake with {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to load CA certificates from {}: {source}", path.display())]
    CaFile {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },
    #[error("no trusted root certificates, pass --ca or --insecure")]
    NoRoots,
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
    #[error("TLS configuration has no cipher suite usable for QUIC: {0}")]
    NoInitialCipherSuite(#[from] NoInitialCipherSuite),
}

/// Failure to open a stream on the connection.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection closed: {0}")]
    ConnectionClosed(#[from] quinn::ConnectionError),
    #[error("not connected")]
    NotConnected,
    #[error("reconnect failed: {0}")]
    Reconnect(#[from] ConnectionError),
}

impl StreamError {
    /// Whether a new connection could make the next open succeed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            StreamError::ConnectionClosed(_) | StreamError::NotConnected
        )
    }
}

/// Failure while exchanging data on an open stream.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("write failed: {0}")]
    Write(#[from] quinn::WriteError),
    #[error("finish failed: {0}")]
    Finish(#[from] quinn::ClosedStream),
    #[error("read failed: {0}")]
    Read(#[from] quinn::ReadToEndError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Why one request failed, see [`crate::driver::Stage`] for where.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Io(#[from] IoError),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("invalid configuration: {0}")]
    Config(#[from] HarnessConfigBuilderError),
    #[error(transparent)]
    Workload(#[from] qworkload::WorkloadError),
    #[error("giving up after {0} consecutive failures")]
    TooManyFailures(u32),
}
