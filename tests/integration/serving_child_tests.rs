//! End-to-end tests driving the real serving child binary.
//!
//! `launch_serving` re-executes the `inferd` binary with
//! `--serving-child`; the child attaches to the token channel, runs its
//! queue proxy, and exits cleanly when the channel closes.

use std::time::Duration;

use serial_test::serial;

use inferd::config::GlobalConfig;
use inferd::ipc::{IpcChannelSet, TokenEvent};
use inferd::session::launcher;

fn child_config() -> GlobalConfig {
    let toml = format!(
        r#"
model_name = "test-model"
token_channel_capacity = 8

[scheduler]
bin = "/bin/true"

[serving]
command = '{exe}'
"#,
        exe = env!("CARGO_BIN_EXE_inferd"),
    );
    GlobalConfig::from_toml_str(&toml).expect("valid config")
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn serving_child_consumes_tokens_and_exits_cleanly_on_close() {
    let config = child_config();
    let ipc = IpcChannelSet::allocate(config.token_channel_capacity).expect("allocate");
    let handle = launcher::launch_serving(&config, &ipc)
        .await
        .expect("launch serving child");
    assert!(handle.pid() > 0, "pid announced at launch");

    let sender = ipc.tokens.sender();
    for i in 0..3u64 {
        let token = TokenEvent {
            stream_id: 0,
            text: format!("t{i}"),
            last: i == 2,
        };
        tokio::time::timeout(Duration::from_secs(10), sender.send(token))
            .await
            .expect("child attaches within bound")
            .expect("send");
    }
    sender.close().await;

    let status = handle
        .wait_timeout(Duration::from_secs(10))
        .await
        .expect("serving child exits after channel close");
    assert!(status.success(), "serving child exits 0, got {status:?}");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn serving_child_exits_cleanly_on_sigterm() {
    let config = child_config();
    let ipc = IpcChannelSet::allocate(config.token_channel_capacity).expect("allocate");
    let handle = launcher::launch_serving(&config, &ipc)
        .await
        .expect("launch serving child");

    // Deliver one token so the channel is fully established first.
    let sender = ipc.tokens.sender();
    let token = TokenEvent {
        stream_id: 0,
        text: "warm".into(),
        last: false,
    };
    tokio::time::timeout(Duration::from_secs(10), sender.send(token))
        .await
        .expect("child attaches within bound")
        .expect("send");

    // Let the child's signal handling settle before requesting exit.
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.terminate().await.expect("graceful request");
    let status = handle
        .wait_timeout(Duration::from_secs(10))
        .await
        .expect("serving child honors the graceful request");
    assert!(status.success(), "clean exit on SIGTERM, got {status:?}");
}
