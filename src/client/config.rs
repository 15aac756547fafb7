use std::{
    fmt, io,
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

use super::ClientError;
use crate::protocol::SECTOR_SIZE;

pub const DEFAULT_PORT: u16 = 10809;
pub const DEFAULT_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Server address as configured; resolved on every connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ClientError> {
        let host = host.into();
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(ClientError::InvalidEndpoint(String::from("empty host")));
        }
        if port == 0 {
            return Err(ClientError::InvalidEndpoint(String::from(
                "port must be between 1 and 65535",
            )));
        }

        Ok(Self {
            host: trimmed.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(value: SocketAddr) -> Self {
        Self {
            host: value.ip().to_string(),
            port: value.port(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Delay between attempts, indexed by the number of failures so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Constant(Duration),
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the `failures`-th consecutive failure (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Backoff::Constant(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let exponent = failures.saturating_sub(1);
                initial
                    .saturating_mul(2u32.saturating_pow(exponent))
                    .min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first. Zero is treated as one.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::Constant(DEFAULT_BACKOFF),
        }
    }
}

impl RetryPolicy {
    pub(crate) fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Legacy CHS geometry reported for the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub heads: u8,
    pub sectors: u8,
    pub cylinders: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub endpoint: Endpoint,
    /// Addressable size of the volume in bytes.
    pub size: u64,
    pub connect_timeout: Duration,
    /// Read/write timeout applied to the socket; `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint {
                host: String::from("127.0.0.1"),
                port: DEFAULT_PORT,
            },
            size: DEFAULT_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl DeviceConfig {
    pub fn new(endpoint: Endpoint, size: u64) -> Self {
        Self {
            endpoint,
            size,
            ..Self::default()
        }
    }

    pub fn sectors(&self) -> u64 {
        self.size / SECTOR_SIZE
    }

    pub fn geometry(&self) -> Geometry {
        let heads = 4;
        let sectors = 16;
        Geometry {
            heads,
            sectors,
            cylinders: self.sectors() / (u64::from(heads) * u64::from(sectors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_validation() {
        assert!(Endpoint::new("", 10809).is_err());
        assert!(Endpoint::new("   ", 10809).is_err());
        assert!(Endpoint::new("localhost", 0).is_err());

        let endpoint = Endpoint::new(" 192.168.1.22 ", 10809).unwrap();
        assert_eq!(endpoint.host(), "192.168.1.22");
        assert_eq!(endpoint.to_string(), "192.168.1.22:10809");
    }

    #[test]
    fn endpoint_resolves_ip_literal() {
        let endpoint = Endpoint::new("127.0.0.1", 4000).unwrap();
        let addrs = endpoint.resolve().unwrap();

        assert_eq!(addrs, vec!["127.0.0.1:4000".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff.delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff.delay(2), Duration::from_secs(1));
    }

    #[test]
    fn exponential_backoff_caps() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };

        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
        assert_eq!(backoff.delay(64), Duration::from_millis(500));
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let policy = RetryPolicy {
            max_retries: 0,
            backoff: Backoff::Constant(Duration::ZERO),
        };

        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn default_geometry() {
        let config = DeviceConfig::default();

        assert_eq!(config.sectors(), 204_800);
        assert_eq!(config.geometry().cylinders, 3200);
    }
}
