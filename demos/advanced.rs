//! Walks a client through a full trip and recovery cycle against a scripted
//! upstream, printing hook notifications along the way.

use circuitbreaker_client::{
    BreakerState, Client, ClientError, HookRegistry, MetricSink, Outcome, ScriptedTransport,
    Transition,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct LatencySink {
    calls: AtomicU64,
    total_micros: AtomicU64,
}

impl MetricSink for LatencySink {
    fn record_state_transition(&self, transition: Transition) {
        println!("metrics: {} -> {}", transition.from, transition.to);
    }

    fn record_rejection(&self, _state: BreakerState) {}

    fn record_probe_attempt(&self, granted: bool) {
        println!("metrics: probe granted={}", granted);
    }

    fn record_call(&self, _outcome: Outcome, duration: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circuitbreaker_client=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("=== Circuit Breaker Client Demo ===\n");

    let hooks = HookRegistry::new();
    hooks.set_on_open(|| println!("hook: circuit OPEN, failing fast"));
    hooks.set_on_half_open(|| println!("hook: circuit HALF-OPEN, sending probe"));
    hooks.set_on_close(|| println!("hook: circuit CLOSED after recovery"));
    hooks.set_on_success(|| println!("hook: call succeeded"));
    hooks.set_on_failure(|kind| println!("hook: call failed ({})", kind));
    hooks.set_on_rejection(|state| println!("hook: call rejected while {}", state));

    let sink = Arc::new(LatencySink::default());
    let transport = ScriptedTransport::new();
    let client = Client::builder()
        .base_address("http://inventory.internal:8080")
        .timeout(Duration::from_millis(200))
        .failure_threshold(3)
        .cooldown(Duration::from_millis(500))
        .hooks(hooks)
        .metric_sink(Arc::clone(&sink))
        .transport(transport.clone())
        .build()?;

    // Healthy, then a burst of failures of every kind.
    transport
        .respond(200, r#"{"status":"ok"}"#)
        .fail("connection reset by peer")
        .respond(503, "service unavailable")
        .hang();

    for call in 1..=6 {
        println!("\n--- Call {} ---", call);
        match client.get_bytes("/health").await {
            Ok(body) => println!("response: {}", String::from_utf8_lossy(&body)),
            Err(err) => println!("error: {}", err),
        }
        println!("state: {}", client.state());
    }

    println!("\nWaiting for cooldown...");
    tokio::time::sleep(Duration::from_millis(600)).await;

    transport.respond(200, r#"{"status":"ok"}"#);
    println!("\n--- Probe ---");
    match client.get_bytes("/health").await {
        Ok(body) => println!("response: {}", String::from_utf8_lossy(&body)),
        Err(err) => println!("error: {}", err),
    }
    println!("state: {}", client.state());

    let stats = client.breaker().stats();
    let calls = sink.calls.load(Ordering::Relaxed).max(1);
    println!(
        "\nupstream calls={} rejections={} mean latency={}us",
        transport.calls(),
        stats.rejections,
        sink.total_micros.load(Ordering::Relaxed) / calls
    );

    println!("\n=== Demo Completed ===");
    Ok(())
}
