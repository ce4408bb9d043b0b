use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use bytes::Bytes;
use quinn::{ClientConfig, Connection, Endpoint, RecvStream, SendStream, StreamId, VarInt};
use tokio::time;

use super::{Exchange, Transport};
use crate::{
    config::HarnessConfig,
    error::{ConnectionError, IoError, StreamError},
    tls,
};

/// Application error code used for graceful closes and stream resets.
const NO_ERROR: VarInt = VarInt::from_u32(0);

/// A client endpoint with at most one live connection to the configured server.
pub struct QuicTransport {
    endpoint: Endpoint,
    client_config: ClientConfig,
    host: String,
    port: u16,
    server_name: String,
    /// Candidates in the order they are tried. The last one reached comes first.
    server_addrs: Vec<SocketAddr>,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    max_response_size: usize,
    connection: Option<Connection>,
}

impl QuicTransport {
    /// Resolves the server and connects to the first address that completes the handshake.
    pub async fn connect(config: &HarnessConfig) -> Result<Self, ConnectionError> {
        let client_config = tls::client_config(config)?;
        let server_addrs = lookup(config.host(), config.port()).await?;
        Self::establish_new(config, client_config, server_addrs).await
    }

    /// Like [`QuicTransport::connect`] with already resolved addresses, tried in order.
    pub async fn connect_to(
        config: &HarnessConfig,
        server_addrs: Vec<SocketAddr>,
    ) -> Result<Self, ConnectionError> {
        let client_config = tls::client_config(config)?;
        Self::establish_new(config, client_config, server_addrs).await
    }

    async fn establish_new(
        config: &HarnessConfig,
        client_config: ClientConfig,
        server_addrs: Vec<SocketAddr>,
    ) -> Result<Self, ConnectionError> {
        let first = server_addrs
            .first()
            .copied()
            .ok_or_else(|| ConnectionError::NoAddress {
                host: config.host().clone(),
                port: config.port(),
            })?;
        let endpoint = bind(first, &client_config)?;

        let mut transport = Self {
            endpoint,
            client_config,
            host: config.host().clone(),
            port: config.port(),
            server_name: config.server_name().to_owned(),
            server_addrs,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_response_size: config.max_response_size(),
            connection: None,
        };
        transport.establish().await?;
        Ok(transport)
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn server_addrs(&self) -> &[SocketAddr] {
        &self.server_addrs
    }

    async fn establish(&mut self) -> Result<(), ConnectionError> {
        let mut last_error = None;
        for addr in self.server_addrs.clone() {
            match self.handshake(addr).await {
                Ok(connection) => {
                    tracing::info!(
                        remote = %connection.remote_address(),
                        server_name = %self.server_name,
                        "connection established"
                    );
                    self.server_addrs.sort_by_key(|candidate| *candidate != addr);
                    self.connection = Some(connection);
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(%addr, %error, "connection attempt failed");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ConnectionError::NoAddress {
            host: self.host.clone(),
            port: self.port,
        }))
    }

    async fn handshake(&mut self, addr: SocketAddr) -> Result<Connection, ConnectionError> {
        let same_family = self
            .endpoint
            .local_addr()
            .is_ok_and(|local| local.is_ipv4() == addr.is_ipv4());
        if !same_family {
            self.endpoint = bind(addr, &self.client_config)?;
        }

        let connecting = self
            .endpoint
            .connect(addr, &self.server_name)
            .map_err(|source| ConnectionError::Connect { addr, source })?;
        time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_elapsed| ConnectionError::Timeout {
                addr,
                timeout: self.connect_timeout,
            })?
            .map_err(|source| ConnectionError::Handshake { addr, source })
    }
}

impl Transport for QuicTransport {
    type Exchange = QuicExchange;

    async fn open_stream(&mut self) -> Result<QuicExchange, StreamError> {
        let connection = self.connection.as_ref().ok_or(StreamError::NotConnected)?;
        if let Some(reason) = connection.close_reason() {
            return Err(StreamError::ConnectionClosed(reason));
        }
        let (send, recv) = connection.open_bi().await?;
        tracing::debug!(stream = %send.id(), "opened bidi stream");
        Ok(QuicExchange::new(
            send,
            recv,
            self.max_response_size,
            self.read_timeout,
        ))
    }

    async fn reconnect(&mut self) -> Result<(), ConnectionError> {
        if let Some(connection) = self.connection.take() {
            connection.close(NO_ERROR, b"reconnecting");
        }
        self.establish().await
    }

    async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close(NO_ERROR, b"done");
            tracing::info!(remote = %connection.remote_address(), "connection closed");
        }
        self.endpoint.wait_idle().await;
    }
}

/// Both halves of one bidirectional stream.
pub struct QuicExchange {
    id: StreamId,
    send: SendStream,
    recv: RecvStream,
    max_response_size: usize,
    read_timeout: Option<Duration>,
    finished: bool,
    drained: bool,
    closed: bool,
}

impl QuicExchange {
    fn new(
        send: SendStream,
        recv: RecvStream,
        max_response_size: usize,
        read_timeout: Option<Duration>,
    ) -> Self {
        Self {
            id: send.id(),
            send,
            recv,
            max_response_size,
            read_timeout,
            finished: false,
            drained: false,
            closed: false,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }
}

impl Exchange for QuicExchange {
    async fn write(&mut self, payload: &[u8]) -> Result<(), IoError> {
        self.send.write_all(payload).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), IoError> {
        self.send.finish()?;
        self.finished = true;
        Ok(())
    }

    async fn read_to_end(&mut self) -> Result<Bytes, IoError> {
        let read = self.recv.read_to_end(self.max_response_size);
        let response = match self.read_timeout {
            Some(timeout) => time::timeout(timeout, read)
                .await
                .map_err(|_elapsed| IoError::Timeout(timeout))??,
            None => read.await?,
        };
        self.drained = true;
        Ok(Bytes::from(response))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.finished {
            if let Err(error) = self.send.reset(NO_ERROR) {
                tracing::debug!(stream = %self.id, %error, "send side already closed");
            }
        }
        if !self.drained {
            if let Err(error) = self.recv.stop(NO_ERROR) {
                tracing::debug!(stream = %self.id, %error, "receive side already closed");
            }
        }
        tracing::debug!(stream = %self.id, "stream closed");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for QuicExchange {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolves `host:port`, IPv6 results first.
async fn lookup(host: &str, port: u16) -> Result<Vec<SocketAddr>, ConnectionError> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| ConnectionError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .collect::<Vec<_>>();
    if addrs.is_empty() {
        return Err(ConnectionError::NoAddress {
            host: host.to_owned(),
            port,
        });
    }
    addrs.sort_by_key(|addr| addr.is_ipv4());
    tracing::debug!(host, ?addrs, "resolved server addresses");
    Ok(addrs)
}

/// A client endpoint on an ephemeral port of the same family as `addr`.
fn bind(addr: SocketAddr, client_config: &ClientConfig) -> Result<Endpoint, ConnectionError> {
    let bind_addr = if addr.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let mut endpoint = Endpoint::client(bind_addr).map_err(ConnectionError::Bind)?;
    endpoint.set_default_client_config(client_config.clone());
    Ok(endpoint)
}
