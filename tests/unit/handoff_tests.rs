//! Unit tests for the config snapshot handoff.

use inferd::config::GlobalConfig;
use inferd::{handoff, SessionError};

fn sample_config() -> GlobalConfig {
    GlobalConfig::from_toml_str(
        r#"
model_name = "qwen2-moe"
temperature = 0.2
token_channel_capacity = 128

[scheduler]
bin = "/opt/sched/sched-rpc"
args = ["--numa", "0"]

[server]
host = "10.0.0.5"
port = 9001
"#,
    )
    .expect("valid config")
}

#[test]
fn write_then_load_round_trips() {
    let config = sample_config();
    let handle = handoff::write(&config).expect("snapshot written");

    let loaded = handle.load().expect("snapshot loads");
    assert_eq!(config, loaded);

    std::fs::remove_file(handle.path()).ok();
}

#[test]
fn snapshot_is_readable_without_the_writer() {
    // Simulate the scheduler side: read the file fresh from the path only.
    let config = sample_config();
    let handle = handoff::write(&config).expect("snapshot written");

    let raw = std::fs::read_to_string(handle.path()).expect("file exists and is readable");
    let reparsed = GlobalConfig::from_toml_str(&raw).expect("independent parse");
    assert_eq!(config, reparsed);

    std::fs::remove_file(handle.path()).ok();
}

#[test]
fn load_fails_as_persistence_error_when_snapshot_is_gone() {
    let config = sample_config();
    let handle = handoff::write(&config).expect("snapshot written");
    std::fs::remove_file(handle.path()).expect("remove snapshot");

    let err = handle.load().expect_err("load must fail");
    assert!(matches!(err, SessionError::Persistence(_)));
}
