//! End-to-end tests against a running `MockDaemon`.

use std::time::Duration;

use serde_json::{json, Value};
use snapmock_core::{Settings, Snap, Store};
use snapmock_daemon::{DaemonConfig, MockDaemon, ShellError};

fn store() -> Store {
    let mut store = Store::new(Settings {
        progress_total: 1,
        ..Settings::default()
    });
    store.add_store_snap(Snap::new("hello").with_revision("2"));
    store
}

#[tokio::test]
async fn serves_requests_until_stopped() {
    let daemon = MockDaemon::start(&DaemonConfig::for_tests(), store()).unwrap();
    assert_ne!(daemon.local_addr().port(), 0);
    let url = format!("{}/v2/system-info", daemon.base_url());

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["type"], "sync");

    daemon.stop().unwrap();
    assert!(reqwest::get(&url).await.is_err());
}

#[tokio::test]
async fn bind_errors_are_reported_to_the_caller() {
    let first = MockDaemon::start(&DaemonConfig::for_tests(), store()).unwrap();
    let config = DaemonConfig {
        listen: first.local_addr(),
        ..DaemonConfig::for_tests()
    };
    let err = MockDaemon::start(&config, store()).unwrap_err();
    assert!(matches!(err, ShellError::Bind { .. }), "{err}");
    first.stop().unwrap();
}

#[tokio::test]
async fn stalled_request_does_not_block_stop() {
    let daemon = MockDaemon::start(&DaemonConfig::for_tests(), store()).unwrap();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let url = format!("{}/v2/find?q=do-not-respond", daemon.base_url());
    let err = client.get(&url).send().await.unwrap_err();
    assert!(err.is_timeout());

    // The worker still answers other requests.
    let ok = client
        .get(format!("{}/v2/sections", daemon.base_url()))
        .send()
        .await
        .unwrap();
    assert!(ok.status().is_success());

    daemon.stop().unwrap();
}

#[tokio::test]
async fn concurrent_installs_are_serialized() {
    let daemon = MockDaemon::start(&DaemonConfig::for_tests(), store()).unwrap();
    let client = reqwest::Client::new();
    let url = format!("{}/v2/snaps/hello", daemon.base_url());

    // The first accepted install only lands once its change is polled, so
    // drive it to completion before the concurrent attempts.
    let first: Value = client
        .post(&url)
        .json(&json!({"action": "install"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let change = first["change"].as_str().unwrap();
    let polled: Value = client
        .get(format!("{}/v2/changes/{change}", daemon.base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(polled["result"]["ready"], true);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            tokio::spawn(
                client
                    .post(&url)
                    .json(&json!({"action": "install"}))
                    .send(),
            )
        })
        .collect();
    for handle in handles {
        let body: Value = handle.await.unwrap().unwrap().json().await.unwrap();
        assert_eq!(body["result"]["kind"], "snap-already-installed");
    }

    daemon.stop().unwrap();
}

#[tokio::test]
async fn multipart_try_mode() {
    let daemon = MockDaemon::start(&DaemonConfig::for_tests(), store()).unwrap();
    let client = reqwest::Client::new();
    let form = reqwest::multipart::Form::new()
        .text("action", "try")
        .text("snap-path", "/home/dev/hello/prime");
    let body: Value = client
        .post(format!("{}/v2/snaps", daemon.base_url()))
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["type"], "async");
    let change = body["change"].as_str().unwrap();
    client
        .get(format!("{}/v2/changes/{change}", daemon.base_url()))
        .send()
        .await
        .unwrap();

    let snap: Value = client
        .get(format!("{}/v2/snaps/try", daemon.base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snap["result"]["trymode"], true);
    assert_eq!(snap["result"]["mounted-from"], "/home/dev/hello/prime");

    daemon.stop().unwrap();
}
