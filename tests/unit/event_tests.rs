//! Unit tests for the one-shot event primitive.

use std::time::Duration;

use inferd::ipc::OneShotEvent;

#[tokio::test]
async fn signaled_event_is_set_and_waits_return_immediately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = OneShotEvent::at(dir.path().join("start.event"));

    assert!(!event.is_set());
    event.signal().expect("signal");
    assert!(event.is_set());

    let fired = event.wait(Duration::from_millis(10)).await.expect("wait");
    assert!(fired, "wait after signal must return immediately-true");
}

#[tokio::test]
async fn signal_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = OneShotEvent::at(dir.path().join("cache_ready.event"));

    event.signal().expect("first signal");
    event.signal().expect("second signal has no additional effect");
    assert!(event.is_set());
}

#[tokio::test]
async fn wait_times_out_on_unsignaled_event() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = OneShotEvent::at(dir.path().join("never.event"));

    let fired = event.wait(Duration::from_millis(200)).await.expect("wait");
    assert!(!fired);
}

#[tokio::test]
async fn wait_observes_signal_from_another_task() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = OneShotEvent::at(dir.path().join("late.event"));
    let signaler = event.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        signaler.signal().expect("signal");
    });

    let fired = event.wait(Duration::from_secs(5)).await.expect("wait");
    assert!(fired, "waiter must observe the cross-task signal");
}

#[tokio::test]
async fn events_are_monotonic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = OneShotEvent::at(dir.path().join("mono.event"));
    event.signal().expect("signal");

    for _ in 0..3 {
        let fired = event.wait(Duration::from_millis(10)).await.expect("wait");
        assert!(fired);
    }
}
