#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers_core::abi::{encode, Token};
use ethers_core::types::{Address, Bytes, Log, H256, U256, U64};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use memebase_stats::contract::MemebaseContract;
use memebase_stats::eth::{EthClient, FetchSettings};
use memebase_stats::models::EventKind;
use memebase_stats::price::PriceClient;
use memebase_stats::service::StatsService;

pub const ADDR: &str = "0x82A9c823332518c32a0c0eDC050Ef00934Cf04D4";
pub const OTHER: &str = "0x39FCE6a33596b7319d7941F3F90d256574bcc954";
pub const LATEST_BLOCK: u64 = 150;

pub fn contract() -> MemebaseContract {
    MemebaseContract::new(Address::from_low_u64_be(0xfac7)).unwrap()
}

pub fn settings() -> FetchSettings {
    FetchSettings {
        lookback_blocks: 100,
        max_block_range: 40,
        block_time_secs: 2,
        endpoint_timeout: Duration::from_secs(2),
    }
}

pub fn event_log(kind: EventKind, subject: &str, amount: U256, block: u64, tx: u64) -> Log {
    let c = contract();
    let subject: Address = subject.parse().unwrap();
    let (topics, data) = match kind {
        EventKind::Hearted | EventKind::Summoned => (
            vec![
                c.topic(kind).unwrap(),
                H256::from(subject),
                H256::from_low_u64_be(1),
            ],
            encode(&[Token::Uint(amount)]),
        ),
        EventKind::Collected => (
            vec![
                c.topic(kind).unwrap(),
                H256::from(subject),
                H256::from(Address::from_low_u64_be(0x70c)),
            ],
            encode(&[Token::Uint(amount)]),
        ),
        EventKind::Unleashed => (
            vec![
                c.topic(kind).unwrap(),
                H256::from(subject),
                H256::from(Address::from_low_u64_be(0x70c)),
                H256::from_low_u64_be(7),
            ],
            encode(&[Token::Uint(amount), Token::Uint(U256::zero())]),
        ),
        EventKind::Purged => (
            vec![c.topic(kind).unwrap(), H256::from(subject)],
            encode(&[Token::Uint(amount)]),
        ),
    };
    Log {
        address: c.address(),
        topics,
        data: Bytes::from(data),
        block_number: Some(U64::from(block)),
        transaction_hash: Some(H256::from_low_u64_be(tx)),
        log_index: Some(U256::zero()),
        ..Default::default()
    }
}

/// Three Hearted events for ADDR inside the range (1, 2 and 0 ETH), one for
/// OTHER, one Summoned for ADDR, and one Hearted for ADDR before the range.
pub fn chain_logs() -> Vec<Log> {
    let eth = |n: u64| U256::from(n) * U256::exp10(18);
    vec![
        event_log(EventKind::Hearted, ADDR, eth(1), 60, 1),
        event_log(EventKind::Hearted, ADDR, eth(2), 100, 2),
        event_log(EventKind::Hearted, ADDR, U256::zero(), 150, 3),
        event_log(EventKind::Hearted, OTHER, eth(5), 120, 4),
        event_log(EventKind::Summoned, ADDR, eth(4), 90, 5),
        event_log(EventKind::Hearted, ADDR, eth(9), 10, 6),
    ]
}

/// Same as `chain_logs()` plus one in-range Hearted log whose data is cut short.
pub fn chain_logs_with_garbage() -> Vec<Log> {
    let mut logs = chain_logs();
    let mut broken = event_log(EventKind::Hearted, ADDR, U256::one(), 70, 7);
    broken.data = Bytes::from(vec![0u8; 4]);
    logs.push(broken);
    logs
}

/// How a mock node answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcMode {
    Healthy,
    /// HTTP 429 on every call.
    RateLimited,
    /// HTTP 200 with a body that is not JSON-RPC.
    Malformed,
}

#[derive(Clone)]
struct MockChain {
    latest: u64,
    logs: Arc<Vec<Log>>,
    mode: RpcMode,
}

fn hex_block(value: &Value) -> Option<u64> {
    value
        .as_str()
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
}

fn topic_matches(filter: &Value, log: &Log) -> bool {
    let wanted: Vec<String> = match &filter["topics"][0] {
        Value::String(s) => vec![s.to_lowercase()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_lowercase))
            .collect(),
        _ => return true,
    };
    log.topics
        .first()
        .map(|t| wanted.contains(&format!("{:#x}", t)))
        .unwrap_or(false)
}

async fn rpc(State(chain): State<MockChain>, Json(req): Json<Value>) -> Response {
    match chain.mode {
        RpcMode::Healthy => {}
        RpcMode::RateLimited => {
            return (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response()
        }
        RpcMode::Malformed => return (StatusCode::OK, "<html>gateway</html>").into_response(),
    }
    let id = req["id"].clone();
    let result = match req["method"].as_str() {
        Some("eth_blockNumber") => json!(format!("{:#x}", chain.latest)),
        Some("eth_getLogs") => {
            let filter = &req["params"][0];
            let from = hex_block(&filter["fromBlock"]).unwrap_or(0);
            let to = hex_block(&filter["toBlock"]).unwrap_or(chain.latest);
            let logs: Vec<&Log> = chain
                .logs
                .iter()
                .filter(|log| {
                    let block = log.block_number.unwrap_or_default().as_u64();
                    block >= from && block <= to && topic_matches(filter, log)
                })
                .collect();
            json!(logs)
        }
        _ => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" }
            }))
            .into_response()
        }
    };
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}

pub async fn spawn(app: Router) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);
    let server = axum::serve(listener, app);
    let handle = tokio::spawn(async move {
        let _ = server.await;
    });
    (base_url, handle)
}

/// A JSON-RPC node serving `chain_logs()`; an unhealthy one answers 429.
pub async fn spawn_rpc(healthy: bool) -> (String, JoinHandle<()>) {
    let mode = if healthy {
        RpcMode::Healthy
    } else {
        RpcMode::RateLimited
    };
    spawn_rpc_with(mode, chain_logs()).await
}

pub async fn spawn_rpc_with(mode: RpcMode, logs: Vec<Log>) -> (String, JoinHandle<()>) {
    let state = MockChain {
        latest: LATEST_BLOCK,
        logs: Arc::new(logs),
        mode,
    };
    spawn(Router::new().route("/", post(rpc)).with_state(state)).await
}

/// A currency API quoting ETH at 2000 USD, or failing with 500.
pub async fn spawn_price(healthy: bool) -> (String, JoinHandle<()>) {
    let app = if healthy {
        Router::new().route(
            "/eth.json",
            get(|| async { Json(json!({ "date": "2024-05-01", "eth": { "usd": 2000.0 } })) }),
        )
    } else {
        Router::new().route(
            "/eth.json",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        )
    };
    let (base, handle) = spawn(app).await;
    (format!("{}/eth.json", base), handle)
}

pub fn service(rpc_urls: &[String], price_url: &str) -> StatsService {
    let timeout = Duration::from_secs(2);
    StatsService::new(
        EthClient::from_urls(rpc_urls, timeout).unwrap(),
        contract(),
        PriceClient::new(vec![price_url.to_string()], "usd", timeout).unwrap(),
        settings(),
    )
}
