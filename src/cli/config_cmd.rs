// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables
//! without starting a primary or connecting to one.

use crate::config::{self, EffectiveConfig, EnvConfig};
use crate::config::{
    ENV_ENDPOINT, ENV_FRAME_LIMIT, ENV_MAX_SUBORDINATES, ENV_OUTPUT, ENV_QUEUE_CAPACITY,
    ENV_SHUTDOWN_TIMEOUT, ENV_USE_LOCAL_TIME,
};
use crate::role;

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    println!("# role: {}", role::current().as_str());
    print_config(&cfg);
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&EnvConfig::default().effective_config());
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    validate_with(|key| std::env::var(key).ok())
}

fn validate_with(lookup: impl Fn(&str) -> Option<String>) -> i32 {
    let cfg = config::load_with(&lookup).effective_config();
    let mut warnings = 0;

    // Values that were set but could not be used.
    for key in [
        ENV_FRAME_LIMIT,
        ENV_QUEUE_CAPACITY,
        ENV_MAX_SUBORDINATES,
        ENV_SHUTDOWN_TIMEOUT,
    ] {
        if let Some(raw) = lookup(key) {
            if raw.trim().parse::<u64>().is_err() {
                eprintln!("WARNING: {} is not a number ({:?}); using the default", key, raw);
                warnings += 1;
            }
        }
    }
    if let Some(raw) = lookup(ENV_USE_LOCAL_TIME) {
        let v = raw.trim().to_ascii_lowercase();
        if !matches!(v.as_str(), "1" | "true" | "yes" | "on" | "0" | "false" | "no" | "off") {
            eprintln!("WARNING: {} is not a boolean ({:?})", ENV_USE_LOCAL_TIME, raw);
            warnings += 1;
        }
    }

    if cfg.queue_capacity.saturating_mul(cfg.frame_limit) > 1 << 30 {
        eprintln!(
            "WARNING: {} x {} allows over 1 GiB of queued frames per subordinate",
            ENV_QUEUE_CAPACITY, ENV_FRAME_LIMIT
        );
        warnings += 1;
    }

    if warnings == 0 {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn print_config(cfg: &EffectiveConfig) {
    println!("{}={}", ENV_ENDPOINT, cfg.endpoint);
    println!("{}={}", ENV_OUTPUT, cfg.output);
    println!("{}={}", ENV_USE_LOCAL_TIME, cfg.use_local_time);
    println!("{}={}", ENV_FRAME_LIMIT, cfg.frame_limit);
    println!("{}={}", ENV_QUEUE_CAPACITY, cfg.queue_capacity);
    println!("{}={}", ENV_MAX_SUBORDINATES, cfg.max_subordinates);
    println!("{}={}", ENV_SHUTDOWN_TIMEOUT, cfg.shutdown_timeout_secs);
}
