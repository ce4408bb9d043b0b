// shared by the quic integration tests
#![allow(unused)]

use std::{
    future::Future,
    io::Write,
    net::SocketAddr,
    sync::{Arc, LazyLock},
    time::Duration,
};

use qharness::HarnessConfigBuilder;
use quinn::{Endpoint, RecvStream, SendStream, crypto::rustls::QuicServerConfig};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tempfile::NamedTempFile;
use tokio::time;
use tokio_util::task::AbortOnDropHandle;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub fn run<F: Future>(future: F) -> F::Output {
    static RT: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
    });

    static TRACING: LazyLock<WorkerGuard> = LazyLock::new(|| {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_max_level(LevelFilter::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .init();
        guard
    });

    RT.block_on(async move {
        LazyLock::force(&TRACING);
        match time::timeout(Duration::from_secs(60), future).await {
            Ok(output) => output,
            Err(_timedout) => panic!("test timed out"),
        }
    })
}

/// How the test server answers each stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Echo,
    /// Answers like the SQL server: an ack for INSERT, a result set for anything else.
    Sql,
    /// Reads the request and never answers.
    Silent,
    /// Answers with this many bytes.
    Sized(usize),
    /// Resets SELECT streams without answering, echoes everything else.
    ResetSelects,
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub ca_file: NamedTempFile,
    endpoint: Endpoint,
    _task: AbortOnDropHandle<()>,
}

impl TestServer {
    pub fn accepted(&self) -> usize {
        self.endpoint.open_connections()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.endpoint.close(0u32.into(), b"test done");
    }
}

pub const ALPN: &str = "h3";

pub fn launch_server(reply: Reply) -> Result<TestServer, BoxError> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])?;
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)?;
    tls.alpn_protocols = vec![ALPN.as_bytes().to_vec()];

    let server_config =
        quinn::ServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(tls)?));
    let endpoint = Endpoint::server(server_config, "127.0.0.1:0".parse()?)?;
    let addr = endpoint.local_addr()?;

    let mut ca_file = NamedTempFile::new()?;
    ca_file.write_all(certified.cert.pem().as_bytes())?;
    ca_file.flush()?;

    let task = AbortOnDropHandle::new(tokio::spawn(serve(endpoint.clone(), reply)));
    Ok(TestServer {
        addr,
        ca_file,
        endpoint,
        _task: task,
    })
}

async fn serve(endpoint: Endpoint, reply: Reply) {
    while let Some(incoming) = endpoint.accept().await {
        tokio::spawn(async move {
            let connection = incoming.await?;
            tracing::info!(remote = %connection.remote_address(), "accepted new connection");
            while let Ok((send, recv)) = connection.accept_bi().await {
                tokio::spawn(answer(send, recv, reply));
            }
            Result::<(), BoxError>::Ok(())
        });
    }
}

async fn answer(mut send: SendStream, mut recv: RecvStream, reply: Reply) -> Result<(), BoxError> {
    let request = recv.read_to_end(64 * 1024).await?;
    let response = match reply {
        Reply::Echo => request,
        Reply::Sql if request.starts_with(b"INSERT") => b"insert query: OK".to_vec(),
        Reply::Sql => b"results: []".to_vec(),
        Reply::Silent => {
            time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }
        Reply::Sized(len) => vec![b'x'; len],
        Reply::ResetSelects if request.starts_with(b"SELECT") => {
            _ = recv.stop(0u32.into());
            send.reset(0u32.into())?;
            tracing::debug!("stream reset");
            return Ok(());
        }
        Reply::ResetSelects => request,
    };
    send.write_all(&response).await?;
    send.finish()?;
    // keep the stream until the peer has everything
    _ = send.stopped().await;
    tracing::debug!("stream answered");
    Ok(())
}

/// Client settings that trust the server's self-signed certificate.
pub fn client_config(server: &TestServer) -> HarnessConfigBuilder {
    let mut builder = qharness::HarnessConfig::builder();
    builder
        .host(server.addr.ip().to_string())
        .port(server.addr.port())
        .server_name("localhost")
        .alpn(vec![ALPN.to_owned()])
        .ca_paths(vec![server.ca_file.path().to_path_buf()])
        .connect_timeout(Duration::from_secs(5))
        .interval(Duration::from_millis(20))
        .backoff_jitter(false)
        .initial_backoff(Duration::from_millis(10));
    builder
}
