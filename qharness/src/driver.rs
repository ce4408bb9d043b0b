use std::{borrow::Cow, future::Future, time::Duration};

use bytes::Bytes;
use derive_more::Display;
use getset::CopyGetters;
use qworkload::Request;
use tokio::time::{self, Instant};
use tracing::Instrument;

use crate::{
    backoff::Backoff,
    config::HarnessConfig,
    error::{Error, ExchangeError, IoError, StreamError},
    transport::{Exchange, Transport},
};


/// The step of an iteration that failed.
///
/// An iteration runs `OPEN_STREAM → WRITE → FLUSH → READ_UNTIL_CLOSE → CLOSE_STREAM → WAIT`.
/// Closing never fails and waiting is not part of [`Driver::exchange`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    #[display("OPEN_STREAM")]
    OpenStream,
    #[display("WRITE")]
    Write,
    #[display("FLUSH")]
    Flush,
    #[display("READ_UNTIL_CLOSE")]
    ReadUntilClose,
}

/// Outcome of one request.
#[derive(Debug)]
pub enum Iteration {
    Completed {
        request: Request,
        response: Bytes,
        elapsed: Duration,
    },
    Failed {
        request: Request,
        stage: Stage,
        error: ExchangeError,
    },
}

impl Iteration {
    pub fn request(&self) -> &Request {
        match self {
            Iteration::Completed { request, .. } | Iteration::Failed { request, .. } => request,
        }
    }

    pub fn index(&self) -> u64 {
        self.request().index()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Iteration::Completed { .. })
    }

    pub fn response_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Iteration::Completed { response, .. } => Some(String::from_utf8_lossy(response)),
            Iteration::Failed { .. } => None,
        }
    }

    fn log(&self) {
        match self {
            Iteration::Completed {
                request,
                response,
                elapsed,
            } => tracing::info!(
                index = request.index(),
                response = %String::from_utf8_lossy(response),
                ?elapsed,
                "received"
            ),
            Iteration::Failed {
                request,
                stage,
                error,
            } => tracing::warn!(
                index = request.index(),
                %stage,
                %error,
                "request failed"
            ),
        }
    }
}

#[derive(CopyGetters, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[getset(get_copy = "pub")]
pub struct Summary {
    completed: u64,
    failed: u64,
    consecutive_failures: u32,
}

impl Summary {
    fn record(&mut self, iteration: &Iteration) {
        if iteration.is_completed() {
            self.completed += 1;
            self.consecutive_failures = 0;
        } else {
            self.failed += 1;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
    }

    pub fn total(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Sends requests one at a time over a [`Transport`], one stream per request.
pub struct Driver<T> {
    transport: T,
    interval: Duration,
    count: Option<u64>,
    max_consecutive_failures: Option<u32>,
    reconnect: bool,
    backoff: Backoff,
    summary: Summary,
}

impl<T: Transport> Driver<T> {
    pub fn new(transport: T, config: &HarnessConfig) -> Self {
        Self {
            transport,
            interval: config.interval(),
            count: config.count(),
            max_consecutive_failures: config.max_consecutive_failures().filter(|&max| max > 0),
            reconnect: config.reconnect(),
            backoff: Backoff::new(
                config.initial_backoff(),
                config.max_backoff(),
                config.backoff_jitter(),
            ),
            summary: Summary::default(),
        }
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Performs one request without waiting afterwards. Failures are returned, not raised.
    pub async fn exchange(&mut self, request: Request) -> Iteration {
        tracing::info!(index = request.index(), request = %request.text(), "sending");

        let iteration = match self.open_stream().await {
            Ok(mut exchange) => {
                let started = Instant::now();
                let result = Self::drive(&mut exchange, &request).await;
                exchange.close();
                match result {
                    Ok(response) => Iteration::Completed {
                        request,
                        response,
                        elapsed: started.elapsed(),
                    },
                    Err((stage, error)) => Iteration::Failed {
                        request,
                        stage,
                        error: error.into(),
                    },
                }
            }
            Err(error) => Iteration::Failed {
                request,
                stage: Stage::OpenStream,
                error: error.into(),
            },
        };

        self.summary.record(&iteration);
        iteration.log();
        iteration
    }

    async fn drive(
        exchange: &mut T::Exchange,
        request: &Request,
    ) -> Result<Bytes, (Stage, IoError)> {
        exchange
            .write(request.payload())
            .await
            .map_err(|error| (Stage::Write, error))?;
        exchange
            .flush()
            .await
            .map_err(|error| (Stage::Flush, error))?;
        exchange
            .read_to_end()
            .await
            .map_err(|error| (Stage::ReadUntilClose, error))
    }

    async fn open_stream(&mut self) -> Result<T::Exchange, StreamError> {
        match self.transport.open_stream().await {
            Err(error) if self.reconnect && error.is_connection_lost() => {
                let delay = self.backoff.next_delay();
                tracing::warn!(
                    %error,
                    attempt = self.backoff.attempt(),
                    ?delay,
                    "connection lost, reconnecting"
                );
                time::sleep(delay).await;
                self.transport.reconnect().await?;
                self.backoff.reset();
                self.transport.open_stream().await
            }
            result => result,
        }
    }

    /// Runs requests in order until they run out, the configured count is reached, too many
    /// consecutive requests fail, or `shutdown` resolves.
    pub async fn run<I, S>(&mut self, requests: I, shutdown: S) -> Result<Summary, Error>
    where
        I: IntoIterator<Item = Request>,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut requests = requests.into_iter().peekable();
        let mut issued = 0u64;

        while !self.count.is_some_and(|count| issued >= count) {
            let Some(request) = requests.next() else {
                break;
            };
            issued += 1;
            let span = tracing::info_span!("request", index = request.index());
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, abandoning in-flight request");
                    break;
                }
                _iteration = self.exchange(request).instrument(span) => {}
            }

            if let Some(max) = self.max_consecutive_failures {
                if self.summary.consecutive_failures >= max {
                    tracing::error!(failures = max, "too many consecutive failures");
                    return Err(Error::TooManyFailures(max));
                }
            }

            let exhausted = self.count.is_some_and(|count| issued >= count)
                || requests.peek().is_none();
            if exhausted {
                break;
            }

            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                () = time::sleep(self.interval) => {}
            }
        }

        tracing::info!(
            completed = self.summary.completed,
            failed = self.summary.failed,
            "run finished"
        );
        Ok(self.summary)
    }

    /// Closes the connection and returns the final counts.
    pub async fn shutdown(mut self) -> Summary {
        self.transport.close().await;
        self.summary
    }
}
