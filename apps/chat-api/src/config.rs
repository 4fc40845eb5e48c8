/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Redis connection string for the shared buffer store. When unset, the
    /// in-memory store is used instead (single-process development only).
    pub redis_url: Option<String>,
    /// Number of concurrent flush workers.
    pub flush_workers: usize,
    /// Capacity of the flush job queue.
    pub flush_queue_capacity: usize,
    /// Retry budget for a flush job (drain plus durable append).
    pub flush_max_attempts: u32,
    /// Retry budget for buffering a message after its live broadcast.
    pub append_max_attempts: u32,
    /// Seconds a room's buffer may sit idle before it is reclaimed.
    pub buffer_idle_ttl_secs: u64,
    /// Seconds between reconcile sweeps.
    pub reconcile_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables, with defaults suitable
    /// for local development.
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("PORT", 4003),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            flush_workers: env_parsed("FLUSH_WORKERS", 4),
            flush_queue_capacity: env_parsed("FLUSH_QUEUE_CAPACITY", 1024),
            flush_max_attempts: env_parsed("FLUSH_MAX_ATTEMPTS", 5),
            append_max_attempts: env_parsed("APPEND_MAX_ATTEMPTS", 3),
            buffer_idle_ttl_secs: env_parsed("BUFFER_IDLE_TTL_SECS", 3600),
            reconcile_interval_secs: env_parsed("RECONCILE_INTERVAL_SECS", 30),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
