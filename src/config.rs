use std::env;
use std::time::Duration;

/// Service-level knobs for one logical connection.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URI all relative operation URIs are resolved against,
    /// e.g. `https://org.crm.dynamics.com/api/data/v9.2/`.
    pub base_url: String,
    /// Per-request transport timeout.
    pub request_timeout: Duration,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        ServiceConfig {
            base_url,
            request_timeout: default_request_timeout(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn default_request_timeout() -> Duration {
    env::var("ODATA_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(600))
}

/// Dispatcher-level knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Operations per batch. 0 means send every request immediately,
    /// unbatched.
    pub batch_size: usize,
    /// Maximum concurrently in-flight batch sends.
    pub max_in_flight: usize,
    /// Maximum compressed chunk size in bytes; `None` disables size-bounded
    /// chunking.
    pub max_chunk_bytes: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            batch_size: 0,
            max_in_flight: 20,
            max_chunk_bytes: None,
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n.max(1);
        self
    }

    pub fn with_max_chunk_bytes(mut self, bytes: usize) -> Self {
        self.max_chunk_bytes = Some(bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = ServiceConfig::new("https://org.example.com/api/data/v9.2");
        assert!(config.base_url.ends_with('/'));
    }

    #[test]
    fn dispatcher_defaults_are_unbatched() {
        let config = DispatcherConfig::default();
        assert_eq!(config.batch_size, 0);
        assert_eq!(config.max_in_flight, 20);
        assert!(config.max_chunk_bytes.is_none());
    }

    #[test]
    fn max_in_flight_is_clamped_to_one() {
        let config = DispatcherConfig::new().with_max_in_flight(0);
        assert_eq!(config.max_in_flight, 1);
    }
}
