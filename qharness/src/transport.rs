//! The seam between the request driver and the QUIC library.
//!
//! A [`Transport`] owns one connection and hands out an [`Exchange`] per request. The driver
//! never talks to `quinn` directly, so tests can run it over an in-memory transport.

use std::future::Future;

use bytes::Bytes;

use crate::error::{ConnectionError, IoError, StreamError};

mod quic;
pub use quic::{QuicExchange, QuicTransport};

pub trait Transport {
    type Exchange: Exchange;

    /// Opens a new bidirectional stream on the current connection.
    fn open_stream(&mut self) -> impl Future<Output = Result<Self::Exchange, StreamError>> + Send;

    /// Replaces the current connection with a freshly established one.
    fn reconnect(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Closes the connection and waits until it is drained.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// One request/response over one stream. Closed when dropped.
pub trait Exchange {
    fn write(&mut self, payload: &[u8]) -> impl Future<Output = Result<(), IoError>> + Send;

    /// Finishes the send side, the peer sees end of stream after the written bytes.
    fn flush(&mut self) -> impl Future<Output = Result<(), IoError>> + Send;

    /// Reads until the peer finishes its send side.
    fn read_to_end(&mut self) -> impl Future<Output = Result<Bytes, IoError>> + Send;

    /// Releases the stream. Calling it again, or after the peer closed the stream, does nothing.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}
