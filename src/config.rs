//! Configuration loading from environment variables.
//!
//! All configuration values are loaded from `CLUSTERLOG_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CLUSTERLOG_ROLE` | primary | `primary` or `subordinate` (see [`crate::role`]) |
//! | `CLUSTERLOG_SUBORDINATE_ID` | own PID | Identifier announced to the primary |
//! | `CLUSTERLOG_ENDPOINT` | clusterlog.sock | Local socket name |
//! | `CLUSTERLOG_OUTPUT` | - | Primary sink: `-`/`stdout`, `stderr` or a file path |
//! | `CLUSTERLOG_USE_LOCAL_TIME` | false | Local time instead of UTC in sink lines |
//! | `CLUSTERLOG_FRAME_LIMIT` | 1048576 | Max IPC frame size (bytes) |
//! | `CLUSTERLOG_QUEUE_CAPACITY` | 1024 | Subordinate forwarding queue depth |
//! | `CLUSTERLOG_MAX_SUBORDINATES` | 64 | Max concurrent subordinate connections |
//! | `CLUSTERLOG_SHUTDOWN_TIMEOUT` | 5 | Connection drain timeout (secs) |

use std::path::PathBuf;
use std::time::Duration;

use crate::ipc::{ForwarderConfig, ServerConfig};
use crate::sink::{SinkConfig, SinkTarget};

pub const ENV_ROLE: &str = "CLUSTERLOG_ROLE";
pub const ENV_SUBORDINATE_ID: &str = "CLUSTERLOG_SUBORDINATE_ID";
pub const ENV_ENDPOINT: &str = "CLUSTERLOG_ENDPOINT";
pub const ENV_OUTPUT: &str = "CLUSTERLOG_OUTPUT";
pub const ENV_USE_LOCAL_TIME: &str = "CLUSTERLOG_USE_LOCAL_TIME";
pub const ENV_FRAME_LIMIT: &str = "CLUSTERLOG_FRAME_LIMIT";
pub const ENV_QUEUE_CAPACITY: &str = "CLUSTERLOG_QUEUE_CAPACITY";
pub const ENV_MAX_SUBORDINATES: &str = "CLUSTERLOG_MAX_SUBORDINATES";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "CLUSTERLOG_SHUTDOWN_TIMEOUT";

pub const DEFAULT_ENDPOINT: &str = "clusterlog.sock";
pub const DEFAULT_FRAME_LIMIT: usize = 1024 * 1024; // 1 MiB
const MIN_FRAME_LIMIT: usize = 4096;
/// Frame lengths travel as a u32.
pub const MAX_FRAME_LIMIT: usize = u32::MAX as usize;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_SUBORDINATES: usize = 64;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Effective configuration summary, flattened for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub endpoint: String,
    pub output: String,
    pub use_local_time: bool,
    pub frame_limit: usize,
    pub queue_capacity: usize,
    pub max_subordinates: usize,
    pub shutdown_timeout_secs: u64,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub endpoint: String,
    pub sink: SinkConfig,
    pub forwarder: ForwarderConfig,
    pub server: ServerConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        load_with(|_| None)
    }
}

fn parse_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    match lookup(key) {
        Some(val) => val.trim().parse::<usize>().unwrap_or(default),
        None => default,
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    match lookup(key) {
        Some(val) => val.trim().parse::<u64>().unwrap_or(default),
        None => default,
    }
}

/// Accepts `1/true/yes/on` and `0/false/no/off`, case-insensitive.
fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn parse_sink_target(raw: Option<String>) -> SinkTarget {
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("-") | Some("stdout") => SinkTarget::Stdout,
        Some("stderr") => SinkTarget::Stderr,
        Some(path) => SinkTarget::File(PathBuf::from(path)),
    }
}

fn load_sink_config(lookup: &impl Fn(&str) -> Option<String>) -> SinkConfig {
    SinkConfig {
        target: parse_sink_target(lookup(ENV_OUTPUT)),
        use_local_time: parse_bool(lookup, ENV_USE_LOCAL_TIME, false),
    }
}

fn load_frame_limit(lookup: &impl Fn(&str) -> Option<String>) -> usize {
    parse_usize(lookup, ENV_FRAME_LIMIT, DEFAULT_FRAME_LIMIT)
        .clamp(MIN_FRAME_LIMIT, MAX_FRAME_LIMIT)
}

fn load_forwarder_config(lookup: &impl Fn(&str) -> Option<String>) -> ForwarderConfig {
    let queue_capacity = parse_usize(lookup, ENV_QUEUE_CAPACITY, DEFAULT_QUEUE_CAPACITY).max(1);
    ForwarderConfig {
        queue_capacity,
        max_frame_size: load_frame_limit(lookup),
    }
}

fn load_server_config(lookup: &impl Fn(&str) -> Option<String>) -> ServerConfig {
    let max_subordinates =
        parse_usize(lookup, ENV_MAX_SUBORDINATES, DEFAULT_MAX_SUBORDINATES).max(1);
    let shutdown_secs =
        parse_u64(lookup, ENV_SHUTDOWN_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT_SECS).max(1);
    ServerConfig {
        max_frame_size: load_frame_limit(lookup),
        max_subordinates,
        shutdown_timeout: Duration::from_secs(shutdown_secs),
    }
}

/// Load configuration through an arbitrary variable lookup.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> EnvConfig {
    let endpoint = lookup(ENV_ENDPOINT)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    EnvConfig {
        endpoint,
        sink: load_sink_config(&lookup),
        forwarder: load_forwarder_config(&lookup),
        server: load_server_config(&lookup),
    }
}

/// Load all configuration from the process environment.
pub fn load() -> EnvConfig {
    load_with(|key| std::env::var(key).ok())
}

impl EnvConfig {
    /// Return a flat summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            endpoint: self.endpoint.clone(),
            output: self.sink.target.describe(),
            use_local_time: self.sink.use_local_time,
            frame_limit: self.server.max_frame_size,
            queue_capacity: self.forwarder.queue_capacity,
            max_subordinates: self.server.max_subordinates,
            shutdown_timeout_secs: self.server.shutdown_timeout.as_secs(),
        }
    }
}
