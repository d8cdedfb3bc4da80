//! Process role detection.
//!
//! A process is either the primary, which owns the log sink, or a
//! subordinate, which forwards its log events to the primary. The role is
//! read from the environment the spawner sets up and is cached for the rest
//! of the process lifetime: a later change to the environment is not seen.

use std::sync::OnceLock;

use crate::config::{ENV_ENDPOINT, ENV_ROLE, ENV_SUBORDINATE_ID};
use crate::event::SubordinateId;

/// Role of the current process in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Subordinate(SubordinateId),
}

impl Role {
    pub fn is_primary(&self) -> bool {
        matches!(self, Role::Primary)
    }

    pub fn subordinate_id(&self) -> Option<SubordinateId> {
        match self {
            Role::Primary => None,
            Role::Subordinate(id) => Some(*id),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Subordinate(_) => "subordinate",
        }
    }
}

static CURRENT: OnceLock<Role> = OnceLock::new();

/// Detect the role through an arbitrary variable lookup.
///
/// Anything other than `subordinate` (including a missing variable) is the
/// primary role. A subordinate without a usable id takes `own_pid`.
pub fn detect_with(lookup: impl Fn(&str) -> Option<String>, own_pid: u32) -> Role {
    let role = lookup(ENV_ROLE).map(|v| v.trim().to_ascii_lowercase());
    if role.as_deref() != Some("subordinate") {
        return Role::Primary;
    }

    let id = lookup(ENV_SUBORDINATE_ID)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(own_pid);
    Role::Subordinate(SubordinateId(id))
}

/// Detect the role from the process environment, without caching.
pub fn detect() -> Role {
    detect_with(|key| std::env::var(key).ok(), std::process::id())
}

/// The process-wide role. Detected on first call, fixed afterwards.
pub fn current() -> Role {
    *CURRENT.get_or_init(detect)
}

/// Shorthand for `current().is_primary()`.
pub fn is_primary() -> bool {
    current().is_primary()
}

/// Environment a spawner applies to a child so that it starts as a
/// subordinate forwarding to `endpoint`. With `id` unset the child
/// announces its own PID.
pub fn subordinate_env(endpoint: &str, id: Option<SubordinateId>) -> Vec<(String, String)> {
    let mut env = vec![
        (ENV_ROLE.to_string(), "subordinate".to_string()),
        (ENV_ENDPOINT.to_string(), endpoint.to_string()),
    ];
    if let Some(id) = id {
        env.push((ENV_SUBORDINATE_ID.to_string(), id.0.to_string()));
    }
    env
}
