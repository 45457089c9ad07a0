//! End-to-end scenarios (§8) against a real orchestrator, the real
//! `mcp_test_server` fixture, and the real axum router.

mod common;

use std::time::Duration;

use serde_json::json;

#[tokio::test]
async fn test_single_request_response_round_trip() {
    let (addr, orchestrator) = common::spawn_server(common::test_config()).await;
    let client = reqwest::Client::new();

    let mut stream_resp = client
        .get(format!("http://{addr}/mcp/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(stream_resp.status(), 200);
    let opening = stream_resp.chunk().await.unwrap().unwrap();
    assert!(opening.starts_with(b": stream opened"));

    let post_resp = client
        .post(format!("http://{addr}/mcp"))
        .header("content-type", "application/json")
        .json(&json!({"jsonrpc":"2.0","id":1,"method":"ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(post_resp.status(), 202);
    let body: serde_json::Value = post_resp.json().await.unwrap();
    assert_eq!(body["messageCount"], 1);

    let chunk = tokio::time::timeout(Duration::from_secs(5), stream_resp.chunk())
        .await
        .expect("timed out waiting for ping response")
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.starts_with("data: "));
    assert!(text.contains("\"id\":1"));

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_batch_ingress_preserves_order() {
    let (addr, orchestrator) = common::spawn_server(common::test_config()).await;
    let client = reqwest::Client::new();

    let mut stream_resp = client
        .get(format!("http://{addr}/mcp/stream"))
        .send()
        .await
        .unwrap();
    let _opening = stream_resp.chunk().await.unwrap().unwrap();

    let post_resp = client
        .post(format!("http://{addr}/mcp"))
        .header("content-type", "application/json")
        .json(&json!([
            {"jsonrpc":"2.0","id":1,"method":"ping"},
            {"jsonrpc":"2.0","id":2,"method":"ping"}
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(post_resp.status(), 202);
    let body: serde_json::Value = post_resp.json().await.unwrap();
    assert_eq!(body["messageCount"], 2);

    let first = tokio::time::timeout(Duration::from_secs(5), stream_resp.chunk())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), stream_resp.chunk())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&first).contains("\"id\":1"));
    assert!(String::from_utf8_lossy(&second).contains("\"id\":2"));

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bad_jsonrpc_version_is_rejected() {
    let (addr, orchestrator) = common::spawn_server(common::test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/mcp"))
        .header("content-type", "application/json")
        .json(&json!({"jsonrpc":"1.0","id":1,"method":"ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_capacity_cap_rejects_beyond_max_subscribers() {
    let mut config = common::test_config();
    config.max_subscribers = 2;
    let (addr, orchestrator) = common::spawn_server(config).await;
    let client = reqwest::Client::new();

    let _a = client.get(format!("http://{addr}/mcp/stream")).send().await.unwrap();
    let _b = client.get(format!("http://{addr}/mcp/stream")).send().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let third = client.get(format!("http://{addr}/mcp/stream")).send().await.unwrap();
    assert_eq!(third.status(), 503);

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_client_is_evicted_on_buffer_overrun() {
    let mut config = common::test_config();
    config.max_buffer_size = 64;
    let (addr, orchestrator) = common::spawn_server(config).await;
    let client = reqwest::Client::new();

    // Attach but never read from the stream, so its queue fills up.
    let _slow = client.get(format!("http://{addr}/mcp/stream")).send().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    for i in 0..50 {
        let resp = client
            .post(format!("http://{addr}/mcp"))
            .header("content-type", "application/json")
            .json(&json!({"jsonrpc":"2.0","id":i,"method":"ping"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let health: serde_json::Value = client
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["subscribers"]["sse"], 0);

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_chunked_replay_delivered_to_first_attach() {
    let (addr, orchestrator) = common::spawn_server(common::test_config()).await;
    let client = reqwest::Client::new();

    let post_resp = client
        .post(format!("http://{addr}/mcp"))
        .header("content-type", "application/json")
        .json(&json!({"jsonrpc":"2.0","id":1,"method":"ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(post_resp.status(), 202);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut stream_resp = client
        .get(format!("http://{addr}/mcp/streamable"))
        .send()
        .await
        .unwrap();
    assert_eq!(stream_resp.status(), 200);

    let replayed = tokio::time::timeout(Duration::from_secs(5), stream_resp.chunk())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&replayed).contains("\"id\":1"));

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_crashing_child_is_restarted_with_backoff() {
    let supervisor = mcp_bridge::supervisor::ProcessSupervisor::new(
        "sh".to_string(),
        vec!["-c".to_string(), "exit 7".to_string()],
        Duration::from_millis(20),
        Duration::from_millis(200),
        false,
        tokio::sync::mpsc::unbounded_channel().0,
        tokio::sync::mpsc::unbounded_channel().0,
    );

    supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let state = supervisor.state().await;
    assert!(state.restart_count >= 1);

    supervisor.stop().await.unwrap();
}
