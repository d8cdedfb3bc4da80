//! clusterlog entry point.
//!
//! ## CLI Subcommands
//!
//! - `clusterlog` or `clusterlog run` - Run a primary with subordinates (default)
//! - `clusterlog config show|defaults|validate` - Inspect configuration
//! - `clusterlog version` - Print the version

use std::process::ExitCode;

use clusterlog::cli::{self, config_cmd};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" | "" => match cli::parse_run_args(&args[2.min(args.len())..]) {
            Ok(opts) => exit_code(cli::run(&opts).await),
            Err(e) => {
                eprintln!("{}", e);
                print_command_help("run");
                ExitCode::from(cli::EXIT_CONFIG_ERROR as u8)
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit_code(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("clusterlog {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "clusterlog - role-aware log aggregation v{}

USAGE:
    clusterlog [COMMAND] [OPTIONS]

COMMANDS:
    run          Run a primary that aggregates subordinate logs (default)
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    CLUSTERLOG_ROLE              primary (default) or subordinate
    CLUSTERLOG_SUBORDINATE_ID    Identifier announced by a subordinate (default: PID)
    CLUSTERLOG_ENDPOINT          Local socket name (default: clusterlog.sock)
    CLUSTERLOG_OUTPUT            Primary output: -, stderr or a file path (default: -)
    CLUSTERLOG_USE_LOCAL_TIME    Local timestamps instead of UTC (default: false)
    RUST_LOG                     Filter for clusterlog's own diagnostics (default: warn)

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
    3  Connection error",
        version
    );
}

fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "clusterlog run - Run a primary with subordinate workers

USAGE:
    clusterlog run [--workers N] [--messages M]

OPTIONS:
    -w, --workers N    Subordinate processes to start (default: 2)
    -m, --messages M   Events each subordinate logs (default: 4)

DESCRIPTION:
    As the primary, opens the log output, listens on CLUSTERLOG_ENDPOINT
    and starts N copies of itself as subordinates. Lines from a
    subordinate are printed with a (#id) prefix.

    With CLUSTERLOG_ROLE=subordinate the process connects to the primary
    instead, logs M events cycling through error, warn, info and debug,
    and exits."
            );
        }
        "config" => {
            eprintln!(
                "clusterlog config - Inspect configuration

USAGE:
    clusterlog config [show|defaults|validate]

SUBCOMMANDS:
    show       Print the effective configuration (default)
    defaults   Print built-in defaults
    validate   Warn about unusable values (exit 1 on warnings)"
            );
        }
        _ => print_usage(),
    }
}
