//! Configuration and role detection tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clusterlog::config::{
    load_with, DEFAULT_ENDPOINT, ENV_ENDPOINT, ENV_FRAME_LIMIT, ENV_MAX_SUBORDINATES, ENV_OUTPUT,
    ENV_ROLE, ENV_SHUTDOWN_TIMEOUT, ENV_SUBORDINATE_ID, ENV_USE_LOCAL_TIME,
};
use clusterlog::role::{detect_with, subordinate_env};
use clusterlog::{Role, SinkTarget, SubordinateId};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

// =============================================================================
// Role detection
// =============================================================================

#[test]
fn no_role_means_primary() {
    assert_eq!(detect_with(env(&[]), 100), Role::Primary);
}

#[test]
fn subordinate_uses_announced_id() {
    let role = detect_with(
        env(&[(ENV_ROLE, "subordinate"), (ENV_SUBORDINATE_ID, "4321")]),
        100,
    );
    assert_eq!(role, Role::Subordinate(SubordinateId(4321)));
    assert!(!role.is_primary());
}

#[test]
fn subordinate_without_id_uses_pid() {
    let role = detect_with(env(&[(ENV_ROLE, "Subordinate")]), 777);
    assert_eq!(role, Role::Subordinate(SubordinateId(777)));
}

#[test]
fn unknown_role_value_is_primary() {
    assert_eq!(detect_with(env(&[(ENV_ROLE, "worker")]), 1), Role::Primary);
}

#[test]
fn spawner_env_round_trips_through_detection() {
    let vars = subordinate_env("/tmp/x.sock", Some(SubordinateId(9)));
    let pairs: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let lookup = env(&pairs);

    assert_eq!(detect_with(&lookup, 1), Role::Subordinate(SubordinateId(9)));
    assert_eq!(load_with(&lookup).endpoint, "/tmp/x.sock");
}

// =============================================================================
// Environment configuration
// =============================================================================

#[test]
fn defaults() {
    let cfg = load_with(env(&[]));
    assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
    assert_eq!(cfg.sink.target, SinkTarget::Stdout);
    assert!(!cfg.sink.use_local_time);
}

#[test]
fn output_targets() {
    let cases = [
        ("-", SinkTarget::Stdout),
        ("stdout", SinkTarget::Stdout),
        ("stderr", SinkTarget::Stderr),
        ("/var/log/app.log", SinkTarget::File(PathBuf::from("/var/log/app.log"))),
    ];
    for (raw, expected) in cases {
        assert_eq!(load_with(env(&[(ENV_OUTPUT, raw)])).sink.target, expected, "{raw}");
    }
}

#[test]
fn overrides_and_floors() {
    let cfg = load_with(env(&[
        (ENV_ENDPOINT, "custom.sock"),
        (ENV_USE_LOCAL_TIME, "yes"),
        (ENV_FRAME_LIMIT, "16"),
        (ENV_MAX_SUBORDINATES, "0"),
        (ENV_SHUTDOWN_TIMEOUT, "0"),
    ]));
    assert_eq!(cfg.endpoint, "custom.sock");
    assert!(cfg.sink.use_local_time);
    assert_eq!(cfg.server.max_frame_size, 4096);
    assert_eq!(cfg.forwarder.max_frame_size, 4096);
    assert_eq!(cfg.server.max_subordinates, 1);
    assert_eq!(cfg.server.shutdown_timeout, Duration::from_secs(1));
}

#[test]
fn effective_config_is_flat() {
    let cfg = load_with(env(&[(ENV_OUTPUT, "stderr")])).effective_config();
    assert_eq!(cfg.output, "stderr");
    assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
}
