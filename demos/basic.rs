//! Fetches the inventory list from a local backend through the breaker.
//!
//! Run an inventory service on `localhost:8080` (or pass a config file path
//! as the first argument) and watch the circuit trip when it goes away.

use circuitbreaker_client::{BreakerState, Client, ClientConfig, ClientError};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct InventoryItem {
    id: String,
    sku: String,
    product_name: String,
    category: String,
    stock: i64,
    price: f64,
    last_updated: String,
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circuitbreaker_client=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig {
            timeout_ms: 2_000,
            failure_threshold: 3,
            cooldown_ms: 5_000,
            ..ClientConfig::default()
        },
    };

    let client = Client::new(config)?;
    println!("Circuit initial state: {}", client.state());

    for attempt in 1..=12 {
        println!("\nAttempt {}:", attempt);

        match client.get_json::<Vec<InventoryItem>>("/api/inventory").await {
            Ok(items) => {
                println!("Fetched {} items", items.len());
                for item in items.iter().take(3) {
                    println!("  {} {} (stock {})", item.sku, item.product_name, item.stock);
                }
            }
            Err(ClientError::CircuitOpen { retry_after }) => {
                println!("Circuit is open, retry in {:?}", retry_after);
            }
            Err(err) => println!("Call failed: {}", err),
        }

        println!("Circuit state: {}", client.state());
        if client.state() == BreakerState::Open {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    let stats = client.breaker().stats();
    println!(
        "\nadmitted={} successes={} failures={} rejections={} opened={}",
        stats.admitted, stats.successes, stats.failures, stats.rejections, stats.times_opened
    );

    Ok(())
}
