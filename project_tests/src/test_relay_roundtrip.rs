//! # Relay End-to-End Smoke Runner
//!
//! Boots the full relay in-process — poll loop plus API server — against a
//! mock source backend and a mock ESP receiver, then walks the public API:
//! register a receiver, wait for the periodic broadcast to arrive, and check
//! `/api/latest-data` and `/api/health` against what the source served.
//!
//! Everything binds to random loopback ports, so the runner needs no network
//! access and can run anywhere.

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

use servers::relay_logic::config::Config;
use servers::relay_logic::state::AppState;
use servers::relay_logic::{downstream, upstream};

const API_KEY: &str = "roundtrip-test-key";

async fn spawn_mock_source(body: Value) -> SocketAddr {
    let app = Router::new().route(
        "/api/latest-data",
        get(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_mock_receiver(seen: mpsc::UnboundedSender<Value>) -> SocketAddr {
    let app = Router::new().route(
        "/data",
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            async move {
                let _ = seen.send(body);
                "OK"
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// Reserve a free loopback port for the relay's API server.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Starting Relay Roundtrip Test ---");

    // 1. Mock source backend with one fixed reading.
    let source_addr = spawn_mock_source(json!({
        "data": {"temperature": 36.6, "pulse_rate": 72, "distress": true}
    }))
    .await;
    println!("Mock source listening on {}", source_addr);

    // 2. Boot the relay against it.
    let config = Config {
        port: free_port().await,
        log_dir: "./logs".into(),
        log_level: "info".to_string(),
        api_key: API_KEY.to_string(),
        source_url: format!("http://{}/api/latest-data", source_addr),
        poll_interval_ms: 200,
        request_timeout_secs: 2,
    };
    let relay_base = format!("http://127.0.0.1:{}", config.port);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = AppState::new(&config);
    tokio::spawn(upstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(downstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("Relay booted at {}", relay_base);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    // --- TEST 1: Registration with a wrong key is rejected ---
    println!("\n[Test 1] Registration requires the API key...");
    let res = client
        .post(format!("{}/api/register-esp", relay_base))
        .json(&json!({"apiKey": "wrong", "espUrl": "http://127.0.0.1:1/x"}))
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 401);
    println!("✅ Wrong key rejected with 401");

    // --- TEST 2: Register the mock receiver ---
    println!("\n[Test 2] Registering the mock receiver...");
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let receiver_addr = spawn_mock_receiver(seen_tx).await;
    let res: Value = client
        .post(format!("{}/api/register-esp", relay_base))
        .json(&json!({
            "apiKey": API_KEY,
            "espUrl": format!("http://{}/data", receiver_addr)
        }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(res["status"], "success");
    assert_eq!(res["registeredESPs"], 1);
    println!("✅ Receiver registered: {:?}", res["registeredESPs"]);

    // --- TEST 3: The periodic broadcast reaches the receiver ---
    println!("\n[Test 3] Waiting for a periodic push...");
    let pushed = tokio::time::timeout(Duration::from_secs(10), seen_rx.recv())
        .await?
        .ok_or("receiver channel closed")?;
    assert_eq!(pushed["temperature"], json!(36.6));
    assert_eq!(pushed["pulseRate"], json!(72.0));
    assert_eq!(pushed["distress"], json!(true));
    assert!(pushed["timestamp"].is_string());
    println!("✅ Push received: {}", pushed);

    // --- TEST 4: The cached snapshot is served back ---
    println!("\n[Test 4] Reading back /api/latest-data...");
    let res: Value = client
        .get(format!("{}/api/latest-data", relay_base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(res["data"]["temperature"], json!(36.6));
    assert_eq!(res["data"]["rfid"], json!(false));
    assert!(res["timestamp"].is_string());
    println!("✅ Snapshot cached and served: {}", res["data"]);

    // --- TEST 5: Health reflects the registered receiver ---
    println!("\n[Test 5] Checking /api/health...");
    let res: Value = client
        .get(format!("{}/api/health", relay_base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(res["status"], "ok");
    assert_eq!(res["registeredESPs"], 1);
    println!("✅ Health: uptime {:.2}s", res["uptime"].as_f64().unwrap_or(0.0));

    let _ = shutdown_tx.send(());
    println!("\n--- All relay roundtrip tests passed ---");
    Ok(())
}
