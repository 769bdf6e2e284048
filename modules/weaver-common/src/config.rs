use std::env;

/// Runtime configuration loaded from environment variables.
///
/// Everything has a default; `from_env` never fails. Hosts that embed the
/// runtime directly can build one by hand instead.
#[derive(Debug, Clone)]
pub struct Config {
    /// Development mode. Registry integrity violations are hard errors when
    /// set; demoted to warnings in production.
    pub dev: bool,

    /// Serializer chunk threshold in bytes. The first chunk flushes as soon
    /// as any content exists; later chunks batch up to this size.
    pub chunk_bytes: usize,

    /// Quiet period after which an idle worker terminates.
    pub worker_idle_ms: u64,

    /// Endpoint the client posts signal chains to for server-context logic.
    pub rpc_url: String,

    // Web server
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev: false,
            chunk_bytes: 2048,
            worker_idle_ms: 30_000,
            rpc_url: "/weaver/execute".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, defaulting anything
    /// unset.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            dev: env::var("WEAVER_DEV").map(|v| v == "1" || v == "true").unwrap_or(false),
            chunk_bytes: parsed_env("WEAVER_CHUNK_BYTES", defaults.chunk_bytes),
            worker_idle_ms: parsed_env("WEAVER_WORKER_IDLE_MS", defaults.worker_idle_ms),
            rpc_url: env::var("WEAVER_RPC_URL").unwrap_or(defaults.rpc_url),
            host: env::var("WEAVER_HOST").unwrap_or(defaults.host),
            port: parsed_env("WEAVER_PORT", defaults.port),
        }
    }

    /// Development preset: strict integrity checking, tiny chunks so tests
    /// observe chunk boundaries.
    pub fn dev() -> Self {
        Self { dev: true, ..Config::default() }
    }
}

fn parsed_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
