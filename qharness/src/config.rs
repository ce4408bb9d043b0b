use std::{path::PathBuf, time::Duration};

use derive_builder::Builder;
use getset::{CopyGetters, Getters};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4433;
/// The companion server advertises the HTTP/3 identifier.
pub const DEFAULT_ALPN: &str = "h3";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 64 * 1024;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Everything the harness needs to reach the server and pace requests.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use qharness::HarnessConfig;
///
/// let config = HarnessConfig::builder()
///     .host("db.local")
///     .port(7000u16)
///     .interval(Duration::from_millis(100))
///     .count(10u64)
///     .build()
///     .unwrap();
/// assert_eq!(config.server_name(), "db.local");
/// assert_eq!(config.count(), Some(10));
/// ```
#[derive(Builder, Getters, CopyGetters, Debug, Clone, PartialEq, Eq)]
#[builder(default, setter(into), build_fn(validate = "Self::validate"))]
pub struct HarnessConfig {
    #[getset(get = "pub")]
    host: String,
    #[getset(get_copy = "pub")]
    port: u16,
    /// Name used for SNI and certificate verification, defaults to the host.
    #[builder(setter(into, strip_option))]
    server_name: Option<String>,
    #[getset(get = "pub")]
    alpn: Vec<String>,
    /// PEM files with extra trusted certificate authorities.
    #[getset(get = "pub")]
    ca_paths: Vec<PathBuf>,
    /// Accept any server certificate. Test setups only.
    #[getset(get_copy = "pub")]
    insecure: bool,
    #[getset(get_copy = "pub")]
    connect_timeout: Duration,
    #[builder(setter(into, strip_option))]
    #[getset(get_copy = "pub")]
    read_timeout: Option<Duration>,
    #[getset(get_copy = "pub")]
    max_response_size: usize,
    /// Pause between two requests.
    #[getset(get_copy = "pub")]
    interval: Duration,
    /// Stop after this many requests.
    #[builder(setter(into, strip_option))]
    #[getset(get_copy = "pub")]
    count: Option<u64>,
    #[builder(setter(into, strip_option))]
    #[getset(get_copy = "pub")]
    max_consecutive_failures: Option<u32>,
    #[getset(get_copy = "pub")]
    reconnect: bool,
    #[getset(get_copy = "pub")]
    initial_backoff: Duration,
    #[getset(get_copy = "pub")]
    max_backoff: Duration,
    #[getset(get_copy = "pub")]
    backoff_jitter: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            server_name: None,
            alpn: vec![DEFAULT_ALPN.to_owned()],
            ca_paths: Vec::new(),
            insecure: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            interval: DEFAULT_INTERVAL,
            count: None,
            max_consecutive_failures: None,
            reconnect: true,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            backoff_jitter: true,
        }
    }
}

impl HarnessConfig {
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }

    pub fn server_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.host)
    }

    pub fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        self.alpn.iter().map(|p| p.as_bytes().to_vec()).collect()
    }
}

impl HarnessConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if matches!(&self.host, Some(host) if host.is_empty()) {
            return Err("host must not be empty".to_owned());
        }
        if self.port == Some(0) {
            return Err("port must not be 0".to_owned());
        }
        if let Some(alpn) = &self.alpn {
            if alpn.is_empty() || alpn.iter().any(String::is_empty) {
                return Err("at least one non-empty ALPN protocol is required".to_owned());
            }
        }
        if self.max_response_size == Some(0) {
            return Err("max response size must be positive".to_owned());
        }
        if let (Some(initial), Some(max)) = (self.initial_backoff, self.max_backoff) {
            if initial > max {
                return Err("initial backoff exceeds max backoff".to_owned());
            }
        }
        Ok(())
    }
}
