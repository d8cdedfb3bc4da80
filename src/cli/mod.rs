// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for the `clusterlog` binary.
//!
//! ## Usage
//!
//! ```bash
//! clusterlog                      # run with defaults (2 workers, 4 messages)
//! clusterlog run --workers 3      # primary plus three subordinates
//! clusterlog config show          # effective configuration
//! ```

pub mod config_cmd;
pub mod run_cmd;

pub use run_cmd::{parse_args as parse_run_args, run, RunOptions};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;
pub const EXIT_CONNECTION_ERROR: i32 = 3;
