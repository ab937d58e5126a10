use circuitbreaker_client::{
    BreakerState, Client, ClientError, FailureKind, HookRegistry, ScriptedTransport,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct InventoryItem {
    id: String,
    sku: String,
    product_name: String,
    category: String,
    stock: i64,
    price: f64,
    last_updated: String,
}

fn item() -> InventoryItem {
    InventoryItem {
        id: "1".to_string(),
        sku: "SKU-001".to_string(),
        product_name: "Cordless Drill".to_string(),
        category: "tools".to_string(),
        stock: 42,
        price: 89.99,
        last_updated: "2024-05-01".to_string(),
    }
}

fn client(transport: &ScriptedTransport) -> Client {
    Client::builder()
        .base_address("http://localhost:8080")
        .timeout(Duration::from_secs(2))
        .failure_threshold(3)
        .cooldown(Duration::from_millis(5000))
        .max_response_bytes(1024)
        .transport(transport.clone())
        .build()
        .expect("valid client")
}

async fn trip(client: &Client, transport: &ScriptedTransport) {
    for _ in 0..3 {
        transport.fail("connection refused");
        let result = client.get_json::<Vec<InventoryItem>>("/api/inventory").await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }
    assert_eq!(client.state(), BreakerState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_success_round_trips_payload() {
    let transport = ScriptedTransport::new();
    let body = serde_json::to_vec(&vec![item()]).unwrap();
    transport.respond(200, body);
    let client = client(&transport);

    let items: Vec<InventoryItem> = client.get_json("/api/inventory").await.unwrap();

    assert_eq!(items, vec![item()]);
    assert_eq!(
        transport.requests()[0].as_str(),
        "http://localhost:8080/api/inventory"
    );
    assert_eq!(client.breaker().failure_tally(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_failures_open_then_fail_fast() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);

    transport.fail("connection refused");
    let _ = client.get_json::<InventoryItem>("/api/inventory/1").await;
    transport.fail("connection refused");
    let _ = client.get_json::<InventoryItem>("/api/inventory/1").await;
    assert_eq!(client.state(), BreakerState::Closed);
    assert_eq!(client.breaker().failure_tally(), 2);

    transport.fail("connection refused");
    let _ = client.get_json::<InventoryItem>("/api/inventory/1").await;
    assert_eq!(client.state(), BreakerState::Open);
    assert_eq!(transport.calls(), 3);

    let result = client.get_json::<InventoryItem>("/api/inventory/1").await;
    match result {
        Err(ClientError::CircuitOpen { retry_after }) => {
            assert!(retry_after <= Duration::from_millis(5000))
        }
        other => panic!("expected CircuitOpen, got {:?}", other),
    }
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_successful_probe_closes_circuit() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);
    trip(&client, &transport).await;

    tokio::time::advance(Duration::from_millis(5000)).await;
    transport.respond(200, serde_json::to_vec(&item()).unwrap());

    let fetched: InventoryItem = client.get_json("/api/inventory/1").await.unwrap();
    assert_eq!(fetched, item());
    assert_eq!(client.state(), BreakerState::Closed);
    assert_eq!(client.breaker().failure_tally(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_restarts_cooldown() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);
    trip(&client, &transport).await;

    tokio::time::advance(Duration::from_millis(5000)).await;
    transport.respond(503, "maintenance");
    let result = client.get_json::<InventoryItem>("/api/inventory/1").await;
    assert!(matches!(result, Err(ClientError::Status { status: 503, .. })));
    assert_eq!(client.state(), BreakerState::Open);

    tokio::time::advance(Duration::from_millis(1)).await;
    let calls = transport.calls();
    let result = client.get_json::<InventoryItem>("/api/inventory/1").await;
    assert!(matches!(result, Err(ClientError::CircuitOpen { .. })));
    assert_eq!(transport.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_response_counts_as_failure() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);
    transport.respond(200, vec![b'['; 2048]);

    let result = client.get_json::<Vec<InventoryItem>>("/api/inventory").await;

    assert!(matches!(result, Err(ClientError::Oversized { limit: 1024 })));
    assert_eq!(client.breaker().failure_tally(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_decode_failure_counts_and_keeps_body() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);
    transport.respond(200, "not json");

    match client.get_json::<InventoryItem>("/api/inventory/1").await {
        Err(ClientError::Decode { body, .. }) => assert_eq!(body, "not json"),
        other => panic!("expected Decode, got {:?}", other),
    }
    assert_eq!(client.breaker().failure_tally(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_distinct_and_counts() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);
    transport.hang();

    let result = client.get_json::<InventoryItem>("/api/inventory/1").await;

    assert!(matches!(
        result,
        Err(ClientError::Timeout { after }) if after == Duration::from_secs(2)
    ));
    assert_eq!(client.breaker().failure_tally(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_body_within_deadline_succeeds() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);
    transport.respond_after(Duration::from_millis(1500), 200, "{\"status\":\"ok\"}");

    let body = client.get_bytes("/health").await.unwrap();
    assert_eq!(&body[..], b"{\"status\":\"ok\"}");
}

#[tokio::test(start_paused = true)]
async fn test_second_caller_rejected_while_probe_in_flight() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);
    trip(&client, &transport).await;

    tokio::time::advance(Duration::from_millis(5000)).await;
    transport.respond_after(Duration::from_millis(100), 200, serde_json::to_vec(&item()).unwrap());

    let probe_client = client.clone();
    let probe = tokio::spawn(async move {
        probe_client
            .get_json::<InventoryItem>("/api/inventory/1")
            .await
    });
    tokio::task::yield_now().await;
    assert_eq!(client.state(), BreakerState::HalfOpen);

    let calls = transport.calls();
    let result = client.get_json::<InventoryItem>("/api/inventory/1").await;
    assert!(matches!(result, Err(ClientError::ProbeInProgress)));
    assert_eq!(transport.calls(), calls);

    assert!(probe.await.unwrap().is_ok());
    assert_eq!(client.state(), BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_path_never_touches_breaker() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);

    for path in ["", "api/inventory", "/../etc/passwd", "//evil.example/x"] {
        let result = client.get_json::<InventoryItem>(path).await;
        assert!(matches!(result, Err(ClientError::InvalidInput(_))), "{path:?}");
    }
    assert_eq!(transport.calls(), 0);
    assert_eq!(client.breaker().stats().admitted, 0);
    assert_eq!(client.breaker().failure_tally(), 0);

    trip(&client, &transport).await;
    let result = client.get_json::<InventoryItem>("").await;
    assert!(matches!(result, Err(ClientError::InvalidInput(_))));
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_reports_once() {
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let hooks = HookRegistry::new();
    let seen = Arc::clone(&kinds);
    hooks.set_on_failure(move |kind| seen.lock().unwrap().push(kind));

    let transport = ScriptedTransport::new();
    let client = Client::builder()
        .hooks(hooks)
        .transport(transport.clone())
        .build()
        .unwrap();
    transport.hang();

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = client
        .get_json_with_cancel::<InventoryItem>("/api/inventory/1", &token)
        .await;

    assert!(matches!(result, Err(ClientError::Cancelled)));
    let stats = client.breaker().stats();
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(*kinds.lock().unwrap(), vec![FailureKind::Cancelled]);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_request_still_reports() {
    let transport = ScriptedTransport::new();
    let client = Client::builder()
        .failure_threshold(1)
        .transport(transport.clone())
        .build()
        .unwrap();
    transport.hang();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        client.get_json::<InventoryItem>("/api/inventory/1"),
    )
    .await;

    assert!(abandoned.is_err());
    assert_eq!(client.state(), BreakerState::Open);
    assert_eq!(client.breaker().stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_recovers_open_circuit() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);
    trip(&client, &transport).await;

    client.reset();
    assert_eq!(client.state(), BreakerState::Closed);
    assert_eq!(client.breaker().failure_tally(), 0);

    transport.respond(200, "[]");
    let items: Vec<InventoryItem> = client.get_json("/api/inventory").await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hooks_observe_lifecycle() {
    let opened = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let hooks = HookRegistry::new();
    let counter = Arc::clone(&opened);
    hooks.set_on_open(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&rejected);
    hooks.set_on_rejection(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let transport = ScriptedTransport::new();
    let client = Client::builder()
        .failure_threshold(1)
        .hooks(hooks)
        .transport(transport.clone())
        .build()
        .unwrap();

    transport.fail("connection refused");
    let _ = client.get_bytes("/health").await;
    let _ = client.get_bytes("/health").await;

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(rejected.load(Ordering::SeqCst), 1);
}
