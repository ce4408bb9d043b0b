use std::{path::PathBuf, time::Duration};

use clap::Parser;
use futures::future;
use qharness::{
    Driver, Error, HarnessConfig, HarnessConfigBuilderError, QuicTransport, config, telemetry,
};
use qworkload::{Mix, Workload, WorkloadError, statement};

#[derive(Parser, Debug)]
#[command(name = "qharness", about = "Sends SQL statements to a QUIC server, one stream each")]
struct Options {
    #[arg(long, env = "QHARNESS_HOST", default_value = config::DEFAULT_HOST)]
    host: String,
    #[arg(long, env = "QHARNESS_PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,
    #[arg(
        long,
        value_delimiter = ',',
        default_value = config::DEFAULT_ALPN,
        help = "ALPN protocol ids to offer"
    )]
    alpn: Vec<String>,
    #[arg(long, help = "Server name for SNI and certificate checks, defaults to --host")]
    server_name: Option<String>,
    #[arg(
        long,
        value_name = "PEM",
        help = "Trust the CA certificates in this file, may be repeated"
    )]
    ca: Vec<PathBuf>,
    #[arg(
        long,
        help = "DANGEROUS: accept any server certificate. Only for test servers with self-signed certificates"
    )]
    insecure: bool,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    interval: Duration,
    #[arg(long, help = "Stop after this many requests")]
    count: Option<u64>,
    #[arg(long, default_value_t = 0, help = "Index of the first request")]
    start: u64,
    #[arg(long, default_value_t = Mix::Alternate, help = "alternate, insert-only or select-only")]
    mix: Mix,
    #[arg(long, default_value = statement::DEFAULT_TABLE)]
    table: String,
    #[arg(long, default_value = statement::DEFAULT_KEY_PREFIX)]
    key_prefix: String,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    connect_timeout: Duration,
    #[arg(long, value_parser = humantime::parse_duration, help = "Give up on a response after this long")]
    read_timeout: Option<Duration>,
    #[arg(long, default_value_t = config::DEFAULT_MAX_RESPONSE_SIZE)]
    max_response_size: usize,
    #[arg(
        long,
        default_value_t = 10,
        help = "Exit with an error after this many consecutive failures, 0 never exits"
    )]
    max_failures: u32,
    #[arg(long, help = "Do not reconnect after the connection is lost")]
    no_reconnect: bool,

    #[arg(
        long,
        default_value = "true",
        action = clap::ArgAction::Set,
        help = "Enable ANSI color output in logs"
    )]
    ansi: bool,
}

impl Options {
    fn config(&self) -> Result<HarnessConfig, HarnessConfigBuilderError> {
        let mut builder = HarnessConfig::builder();
        builder
            .host(self.host.clone())
            .port(self.port)
            .alpn(self.alpn.clone())
            .ca_paths(self.ca.clone())
            .insecure(self.insecure)
            .interval(self.interval)
            .connect_timeout(self.connect_timeout)
            .max_response_size(self.max_response_size)
            .max_consecutive_failures(self.max_failures)
            .reconnect(!self.no_reconnect);
        if let Some(server_name) = &self.server_name {
            builder.server_name(server_name.clone());
        }
        if let Some(read_timeout) = self.read_timeout {
            builder.read_timeout(read_timeout);
        }
        if let Some(count) = self.count {
            builder.count(count);
        }
        builder.build()
    }

    fn workload(&self) -> Result<Workload, WorkloadError> {
        Ok(Workload::new()
            .with_table(self.table.clone())?
            .with_key_prefix(self.key_prefix.clone())?
            .with_mix(self.mix)
            .starting_at(self.start))
    }
}

#[tokio::main]
async fn main() {
    let options = Options::parse();
    telemetry::init(options.ansi);

    if let Err(error) = run(options).await {
        tracing::error!(%error, "harness failed");
        std::process::exit(1);
    }
}

async fn run(options: Options) -> Result<(), Error> {
    let config = options.config()?;
    let workload = options.workload()?;

    let transport = QuicTransport::connect(&config).await?;
    let mut driver = Driver::new(transport, &config);

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "cannot listen for ctrl-c, run until done");
            future::pending::<()>().await;
        }
    };
    let result = driver.run(workload.requests(), shutdown).await;

    let summary = driver.shutdown().await;
    tracing::info!(
        completed = summary.completed(),
        failed = summary.failed(),
        "harness stopped"
    );
    result.map(|_summary| ())
}
