//! Request/response test client for SQL-over-QUIC servers.
//!
//! One QUIC connection, one bidirectional stream per statement: the [`Driver`] pulls a
//! [`qworkload::Request`], writes it, finishes the stream, reads the reply until the server
//! closes its side, then waits before the next one.
//!
//! ```no_run
//! use qharness::{Driver, HarnessConfig, QuicTransport};
//! use qworkload::Workload;
//!
//! # async fn run() -> Result<(), qharness::Error> {
//! let config = HarnessConfig::builder().insecure(true).count(10u64).build()?;
//! let transport = QuicTransport::connect(&config).await?;
//! let mut driver = Driver::new(transport, &config);
//! driver
//!     .run(Workload::default().requests(), futures::future::pending())
//!     .await?;
//! driver.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod driver;
pub mod error;
pub mod telemetry;
pub mod tls;
pub mod transport;

pub use config::{HarnessConfig, HarnessConfigBuilder, HarnessConfigBuilderError};
pub use driver::{Driver, Iteration, Stage, Summary};
pub use error::{ConnectionError, Error, ExchangeError, IoError, StreamError, TlsError};
pub use transport::{Exchange, QuicExchange, QuicTransport, Transport};
