//! Engine configuration.
//!
//! Both binaries read the same environment variables; the orchestrator uses
//! the bind address, the worker daemon uses the polling and lease settings.

use std::time::Duration;

use uuid::Uuid;

/// Process-wide configuration.
///
/// Retry backoff is a field rather than a constant so tests can shrink it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Store connection string; `memory://` or `postgres://...`.
    pub store_url: String,

    /// Submission API bind address.
    pub host: String,
    pub port: u16,

    /// Base identifier for worker loops in this process.
    pub worker_id: String,

    /// Number of worker loops the daemon runs.
    pub worker_count: usize,

    /// Sleep between empty claim attempts, and between remote status polls.
    pub poll_interval: Duration,

    /// Claim lease duration; heartbeats run at half this interval.
    pub claim_lease: Duration,

    /// Attempt cap for transport-failure retries.
    pub max_attempts: u32,

    /// Optional bound on a single remote execution; unbounded when unset.
    pub remote_timeout: Option<Duration>,

    /// Per-request timeout of the control client.
    pub request_timeout: Duration,

    /// Exponential retry backoff: base doubles per attempt up to the cap.
    pub retry_backoff_base: Duration,
    pub retry_backoff_cap: Duration,
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// Recognized variables:
    /// - STORE_URL (default: memory://)
    /// - HOST (default: 0.0.0.0), PORT (default: 8080)
    /// - WORKER_ID (default: generated)
    /// - WORKER_COUNT (default: 1)
    /// - WORKER_POLL_INTERVAL (seconds, fractional allowed, default: 1.0)
    /// - WORKER_CLAIM_LEASE (seconds, default: 30)
    /// - WORKER_MAX_ATTEMPTS (default: 3)
    /// - REMOTE_TIMEOUT (seconds, unset means unbounded)
    pub fn from_env() -> Self {
        let store_url =
            std::env::var("STORE_URL").unwrap_or_else(|_| "memory://".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);

        let worker_id =
            std::env::var("WORKER_ID").unwrap_or_else(|_| generated_worker_id());

        let worker_count = std::env::var("WORKER_COUNT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1);

        let poll_interval = std::env::var("WORKER_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::from_secs(1));

        let claim_lease = std::env::var("WORKER_CLAIM_LEASE")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let max_attempts = std::env::var("WORKER_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(3);

        let remote_timeout = std::env::var("REMOTE_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        Self {
            store_url,
            host,
            port,
            worker_id,
            worker_count,
            poll_interval,
            claim_lease,
            max_attempts,
            remote_timeout,
            request_timeout: Duration::from_secs(30),
            retry_backoff_base: Duration::from_secs(1),
            retry_backoff_cap: Duration::from_secs(30),
        }
    }

    /// Bind address for the submission API.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.store_url.is_empty() {
            return Err("store_url cannot be empty".to_string());
        }
        if self.worker_id.is_empty() {
            return Err("worker_id cannot be empty".to_string());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }
        if self.claim_lease.is_zero() {
            return Err("claim_lease must be greater than 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }
        if self.retry_backoff_base.is_zero() {
            return Err("retry_backoff_base must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_url: "memory://".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            worker_id: generated_worker_id(),
            worker_count: 1,
            poll_interval: Duration::from_secs(1),
            claim_lease: Duration::from_secs(30),
            max_attempts: 3,
            remote_timeout: None,
            request_timeout: Duration::from_secs(30),
            retry_backoff_base: Duration::from_secs(1),
            retry_backoff_cap: Duration::from_secs(30),
        }
    }
}

fn generated_worker_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("worker-{}", &id[..8])
}
