// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! `run` subcommand: a small primary/subordinate topology.
//!
//! Started without a role the process is the primary. It opens the sink,
//! listens for subordinates and re-executes itself `--workers` times with
//! the subordinate environment. Each subordinate logs `--messages` events
//! cycling through the four levels and exits; the primary prints them with
//! their `(#pid) ` prefix next to its own lines.

use std::process::Stdio;

use tokio::process::{Child, Command};

use super::{EXIT_CONFIG_ERROR, EXIT_CONNECTION_ERROR, EXIT_FAILURE, EXIT_SUCCESS};
use crate::aggregator::Aggregator;
use crate::config::{self, EnvConfig};
use crate::context::LogContext;
use crate::event::{LogLevel, SubordinateId};
use crate::ipc::{connect_forwarder, AggregatorServer, ShutdownResult};
use crate::role::{self, Role};
use crate::telemetry::{init_logging, LogConfig};

/// Options for `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub workers: usize,
    pub messages: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            messages: 4,
        }
    }
}

/// Parse the arguments following `run`.
pub fn parse_args(args: &[String]) -> Result<RunOptions, String> {
    let mut opts = RunOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--workers" | "-w" => {
                opts.workers = parse_count(args.get(i + 1), "--workers")?;
                i += 2;
            }
            "--messages" | "-m" => {
                opts.messages = parse_count(args.get(i + 1), "--messages")?;
                i += 2;
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(opts)
}

fn parse_count(value: Option<&String>, flag: &str) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("Missing value for {}", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

/// Run in whichever role the environment assigns. Returns the exit code.
pub async fn run(opts: &RunOptions) -> i32 {
    let config = config::load();
    let ctx = LogContext::new(role::current(), config.sink.clone());

    if let Err(e) = init_logging(&LogConfig::from_env(), &ctx) {
        eprintln!("Failed to initialize logging: {}", e);
        return EXIT_CONFIG_ERROR;
    }

    match ctx.role() {
        Role::Primary => run_primary(&ctx, &config, opts).await,
        Role::Subordinate(id) => run_subordinate(&ctx, id, &config, opts).await,
    }
}

async fn run_primary(ctx: &LogContext, config: &EnvConfig, opts: &RunOptions) -> i32 {
    if let Err(e) = ctx.initialize() {
        eprintln!("Failed to open log output: {}", e);
        return EXIT_CONFIG_ERROR;
    }

    let aggregator = match Aggregator::with_frame_limit(ctx.clone(), config.server.max_frame_size)
    {
        Ok(aggregator) => aggregator,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_FAILURE;
        }
    };

    let (server, listener) =
        match AggregatorServer::bind(&config.endpoint, aggregator, config.server.clone()) {
            Ok(bound) => bound,
            Err(e) => {
                eprintln!("Failed to listen on {}: {}", config.endpoint, e);
                return EXIT_CONNECTION_ERROR;
            }
        };
    let serving = tokio::spawn({
        let server = server.clone();
        async move { server.serve(listener).await }
    });

    ctx.info(format!(
        "primary {} listening on {}, starting {} workers",
        std::process::id(),
        config.endpoint,
        opts.workers
    ));

    let mut children = spawn_workers(ctx, config, opts);
    let started = children.len();
    let failed = tokio::select! {
        failed = wait_all(ctx, &mut children) => failed,
        _ = tokio::signal::ctrl_c() => {
            ctx.warn("interrupted, stopping workers");
            // kill_on_drop takes the children down.
            children.clear();
            started
        }
    };

    server.shutdown();
    match serving.await {
        Ok(ShutdownResult::Complete) => {}
        Ok(ShutdownResult::Timeout { remaining }) => {
            ctx.warn(format!("{} worker connections did not drain", remaining));
        }
        Err(e) => ctx.error(format!("aggregator task failed: {}", e)),
    }

    let stats = server.aggregator().stats();
    match serde_json::to_string(&stats) {
        Ok(json) => ctx.info(format!("aggregator stats {}", json)),
        Err(e) => ctx.warn(format!("could not encode aggregator stats: {}", e)),
    }

    if failed == 0 && started == opts.workers {
        EXIT_SUCCESS
    } else {
        ctx.error(format!(
            "{} of {} workers failed",
            failed + (opts.workers - started),
            opts.workers
        ));
        EXIT_FAILURE
    }
}

fn spawn_workers(ctx: &LogContext, config: &EnvConfig, opts: &RunOptions) -> Vec<Child> {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            ctx.error(format!("cannot locate own executable: {}", e));
            return Vec::new();
        }
    };

    let mut children = Vec::with_capacity(opts.workers);
    for n in 0..opts.workers {
        let mut cmd = Command::new(&exe);
        cmd.arg("run")
            .arg("--messages")
            .arg(opts.messages.to_string())
            .envs(role::subordinate_env(&config.endpoint, None))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match cmd.spawn() {
            Ok(child) => children.push(child),
            Err(e) => ctx.error(format!("failed to start worker {}: {}", n, e)),
        }
    }
    children
}

/// Wait for every child; returns how many did not exit cleanly.
async fn wait_all(ctx: &LogContext, children: &mut [Child]) -> usize {
    let mut failed = 0;
    for child in children.iter_mut() {
        let pid = child.id().unwrap_or_default();
        match child.wait().await {
            Ok(status) if status.success() => {}
            Ok(status) => {
                ctx.warn(format!("worker {} exited with {}", pid, status));
                failed += 1;
            }
            Err(e) => {
                ctx.error(format!("waiting for worker {} failed: {}", pid, e));
                failed += 1;
            }
        }
    }
    failed
}

async fn run_subordinate(
    ctx: &LogContext,
    id: SubordinateId,
    config: &EnvConfig,
    opts: &RunOptions,
) -> i32 {
    let (forwarder, handle) =
        match connect_forwarder(&config.endpoint, id, &config.forwarder).await {
            Ok(connected) => connected,
            Err(e) => {
                eprintln!("Failed to connect to primary at {}: {}", config.endpoint, e);
                return EXIT_CONNECTION_ERROR;
            }
        };
    ctx.attach_forwarder(forwarder);

    for (n, level) in LogLevel::ALL.iter().cycle().take(opts.messages).enumerate() {
        ctx.log(*level, format!("message {} of {}", n + 1, opts.messages));
    }
    tracing::info!(target: "worker", messages = opts.messages, "done");

    let report = handle.close().await;
    if report.connection_failed {
        EXIT_CONNECTION_ERROR
    } else {
        EXIT_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse_args(&[]).unwrap(), RunOptions::default());
    }

    #[test]
    fn parses_counts() {
        let opts = parse_args(&args(&["--workers", "3", "-m", "10"])).unwrap();
        assert_eq!(opts.workers, 3);
        assert_eq!(opts.messages, 10);
    }

    #[test]
    fn rejects_missing_and_bad_values() {
        assert!(parse_args(&args(&["--workers"])).is_err());
        assert!(parse_args(&args(&["--messages", "many"])).is_err());
        assert!(parse_args(&args(&["--verbose"])).is_err());
    }
}
