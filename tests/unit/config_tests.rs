//! Unit tests for configuration parsing, defaults, and validation.

use inferd::config::GlobalConfig;
use inferd::SessionError;

fn sample_toml() -> String {
    r#"
model_name = "qwen2-moe"
api_key = "sk-test"
temperature = 0.4
top_p = 0.9
log_dir = "/tmp/inferd-logs"
token_channel_capacity = 256
shutdown_grace_seconds = 3
monitor_poll_seconds = 2

[server]
host = "0.0.0.0"
port = 8011

[scheduler]
bin = "/opt/sched/sched-rpc"
args = ["--verbose"]

[serving]
command = "/usr/local/bin/server"
args = ["--no-banner"]
"#
    .to_owned()
}

fn minimal_toml() -> String {
    r#"
model_name = "qwen2-moe"

[scheduler]
bin = "/opt/sched/sched-rpc"
"#
    .to_owned()
}

#[test]
fn parses_valid_config() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("config parses");

    assert_eq!(config.model_name, "qwen2-moe");
    assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8011);
    assert_eq!(
        config.scheduler.bin,
        std::path::PathBuf::from("/opt/sched/sched-rpc")
    );
    assert_eq!(config.scheduler.args, vec!["--verbose".to_owned()]);
    assert_eq!(config.token_channel_capacity, 256);
    assert_eq!(config.shutdown_grace().as_secs(), 3);
    assert_eq!(config.monitor_poll().as_secs(), 2);
}

#[test]
fn applies_defaults_for_omitted_fields() {
    let config = GlobalConfig::from_toml_str(&minimal_toml()).expect("config parses");

    assert!(config.api_key.is_none());
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 10_002);
    assert_eq!(config.token_channel_capacity, 1000);
    assert_eq!(config.shutdown_grace_seconds, 5);
    assert_eq!(config.monitor_poll_seconds, 5);
    assert_eq!(config.log_dir, std::path::PathBuf::from("logs"));
    assert!(config.serving.command.is_none());
    assert!(config.serving.args.is_empty());
    assert!(config.scheduler.args.is_empty());
}

#[test]
fn rejects_empty_model_name() {
    let toml = r#"
model_name = "  "

[scheduler]
bin = "/opt/sched/sched-rpc"
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must reject");
    assert!(matches!(err, SessionError::Config(_)));
    assert!(err.to_string().contains("model_name"));
}

#[test]
fn rejects_missing_scheduler_table() {
    let toml = r#"model_name = "m""#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must reject");
    assert!(matches!(err, SessionError::Config(_)));
}

#[test]
fn rejects_zero_capacity() {
    let toml = r#"
model_name = "m"
token_channel_capacity = 0

[scheduler]
bin = "/bin/true"
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must reject");
    assert!(err.to_string().contains("token_channel_capacity"));
}

#[test]
fn serializes_and_reparses_equal() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("config parses");
    let rendered = toml::to_string(&config).expect("serializes");
    let reparsed = GlobalConfig::from_toml_str(&rendered).expect("reparses");
    assert_eq!(config, reparsed);
}
