//! Integration tests for the relay pool against local mock relays


use memely_relay::config::PoolConfig;
use memely_relay::pool::RelayPool;
use memely_nostr::wire::RelayMessage;
use mock_relay::spawn_mock_relay;
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;

fn test_pool_config() -> PoolConfig {
    PoolConfig {
        connect_timeout: Duration::from_secs(2),
        send_retry_backoff: Duration::from_millis(50),
        frame_buffer: 1024,
    }
}

fn silent_handler(_text: &str) -> Vec<String> {
    Vec::new()
}

#[tokio::test]
async fn test_partial_connect_success() {
    let (url_a, _a) = spawn_mock_relay(silent_handler).await;
    let (url_b, _b) = spawn_mock_relay(silent_handler).await;
    let dead = "ws://127.0.0.1:1".to_string();

    let pool = RelayPool::new(vec![url_a.clone(), url_b.clone(), dead.clone()], test_pool_config());
    pool.connect_all().await;

    assert_eq!(pool.connected_count(), 2);
    let live = pool.live_relays().await;
    assert!(live.contains(&url_a));
    assert!(live.contains(&url_b));
    assert!(!live.contains(&dead));

    pool.close().await;
    assert_eq!(pool.connected_count(), 0);
}

#[tokio::test]
async fn test_merged_stream_tags_relay_origin() {
    let (url, _handle) = spawn_mock_relay(|_text| vec![json!(["NOTICE", "hello"]).to_string()]).await;

    let pool = RelayPool::new(vec![url.clone()], test_pool_config());
    pool.connect_all().await;
    assert_eq!(pool.connected_count(), 1);

    let mut frames = pool.frames();
    pool.broadcast(r#"["CLOSE","sub1"]"#).await;

    let frame = timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("no frame within deadline")
        .expect("stream closed");

    assert_eq!(frame.relay, url);
    match frame.message {
        RelayMessage::Notice { message } => assert_eq!(message, "hello"),
        other => panic!("expected NOTICE, got {:?}", other),
    }

    pool.close().await;
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (url, _handle) = spawn_mock_relay(|_text| {
        vec![
            "not json at all".to_string(),
            json!(["UNKNOWN", "type"]).to_string(),
            json!(["NOTICE", "still alive"]).to_string(),
        ]
    })
    .await;

    let pool = RelayPool::new(vec![url], test_pool_config());
    pool.connect_all().await;

    let mut frames = pool.frames();
    pool.broadcast(r#"["CLOSE","sub1"]"#).await;

    // Only the well-formed frame survives into the merged stream.
    let frame = timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("no frame within deadline")
        .expect("stream closed");
    assert!(matches!(frame.message, RelayMessage::Notice { .. }));

    pool.close().await;
}

#[tokio::test]
async fn test_update_relays_migrates_connections() {
    let (url_a, _a) = spawn_mock_relay(silent_handler).await;
    let (url_b, _b) = spawn_mock_relay(silent_handler).await;

    let pool = RelayPool::new(vec![url_a.clone()], test_pool_config());
    pool.connect_all().await;
    assert_eq!(pool.connected_count(), 1);

    let changed = pool.update_relays(vec![url_b.clone()]).await;
    assert!(changed);
    assert_eq!(pool.connected_count(), 1);
    assert_eq!(pool.live_relays().await, vec![url_b.clone()]);

    // Same set again, any order: no teardown happens.
    let changed = pool.update_relays(vec![url_b.clone()]).await;
    assert!(!changed);
    assert_eq!(pool.connected_count(), 1);

    pool.close().await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_live_relay() {
    let handler = |text: &str| match mock_relay::ok_reply_for_event(text, true, "") {
        Some(reply) => vec![reply],
        None => Vec::new(),
    };
    let (url_a, _a) = spawn_mock_relay(handler).await;
    let (url_b, _b) = spawn_mock_relay(handler).await;

    let pool = RelayPool::new(vec![url_a.clone(), url_b.clone()], test_pool_config());
    pool.connect_all().await;
    assert_eq!(pool.connected_count(), 2);

    let mut frames = pool.frames();
    let event = mock_relay::sample_event(&mock_relay::hex_id('d'), &mock_relay::hex_id('a'), 1, json!([]), "meme");
    pool.broadcast_with_retry(&json!(["EVENT", event]).to_string(), 2).await;

    let mut acked = Vec::new();
    for _ in 0..2 {
        let frame = timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("no frame within deadline")
            .expect("stream closed");
        if let RelayMessage::Ok { success, .. } = frame.message {
            assert!(success);
            acked.push(frame.relay);
        }
    }
    acked.sort();
    let mut expected = vec![url_a, url_b];
    expected.sort();
    assert_eq!(acked, expected);

    pool.close().await;
}

#[tokio::test]
async fn test_overflow_drops_oldest_and_consumer_resumes() {
    let flood: Vec<String> = (0..32)
        .map(|i| json!(["NOTICE", format!("frame {}", i)]).to_string())
        .collect();
    let (url, _handle) = spawn_mock_relay(move |_text| flood.clone()).await;

    let config = PoolConfig {
        frame_buffer: 4,
        ..test_pool_config()
    };
    let pool = RelayPool::new(vec![url], config);
    pool.connect_all().await;

    let mut frames = pool.frames();
    pool.broadcast(r#"["CLOSE","sub1"]"#).await;

    // Let the flood land before polling so the buffer wraps.
    tokio::time::sleep(Duration::from_millis(300)).await;

    match frames.recv().await {
        Err(RecvError::Lagged(skipped)) => assert!(skipped > 0),
        other => panic!("expected lag, got {:?}", other),
    }

    // After the lag report the consumer resumes from the oldest retained
    // frame and drains the rest.
    let frame = timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("no frame within deadline")
        .expect("stream closed");
    assert!(matches!(frame.message, RelayMessage::Notice { .. }));

    pool.close().await;
}

#[tokio::test]
async fn test_independent_consumers_do_not_disturb_each_other() {
    let (url, _handle) = spawn_mock_relay(|_text| vec![json!(["NOTICE", "tick"]).to_string()]).await;

    let pool = RelayPool::new(vec![url], test_pool_config());
    pool.connect_all().await;

    let mut first = pool.frames();
    let mut second = pool.frames();
    pool.broadcast(r#"["CLOSE","sub1"]"#).await;

    let a = timeout(Duration::from_secs(2), first.recv())
        .await
        .expect("no frame within deadline")
        .expect("stream closed");

    // Dropping one consumer must not end the stream for the other.
    drop(first);
    pool.broadcast(r#"["CLOSE","sub2"]"#).await;

    let b = timeout(Duration::from_secs(2), second.recv())
        .await
        .expect("no frame within deadline")
        .expect("stream closed");

    assert!(matches!(a.message, RelayMessage::Notice { .. }));
    assert!(matches!(b.message, RelayMessage::Notice { .. }));

    pool.close().await;
}
