use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use ethers_core::types::{BlockNumber, Filter, Log, ValueOrArray};
use ethers_providers::{Http, Middleware, Provider};
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    contract::MemebaseContract,
    models::{BlockRange, EventKind, EventRecord},
};

/// A read-only source of chain data. Implemented by [`EthClient`]; tests plug in fakes.
pub trait LogSource: Send + Sync {
    fn name(&self) -> &str;
    fn latest_block(&self) -> BoxFuture<'_, Result<u64>>;
    fn logs<'a>(&'a self, filter: &'a Filter) -> BoxFuture<'a, Result<Vec<Log>>>;
}

#[derive(Clone)]
pub struct EthClient {
    url: String,
    provider: Provider<Http>,
}

impl EthClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        let url = Url::parse(rpc_url).with_context(|| format!("invalid RPC url {}", rpc_url))?;
        let transport = Http::new_with_client(url, client);
        let provider = Provider::new(transport);
        Ok(Self {
            url: rpc_url.to_string(),
            provider,
        })
    }

    pub fn from_urls(urls: &[String], timeout: Duration) -> Result<Vec<Self>> {
        urls.iter().map(|url| Self::new(url, timeout)).collect()
    }
}

impl LogSource for EthClient {
    fn name(&self) -> &str {
        &self.url
    }

    fn latest_block(&self) -> BoxFuture<'_, Result<u64>> {
        async move {
            let latest = self
                .provider
                .get_block_number()
                .await
                .context("failed to fetch latest block number")?;
            Ok(latest.as_u64())
        }
        .boxed()
    }

    fn logs<'a>(&'a self, filter: &'a Filter) -> BoxFuture<'a, Result<Vec<Log>>> {
        async move {
            self.provider
                .get_logs(filter)
                .await
                .context("eth_getLogs failed")
        }
        .boxed()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("no RPC endpoints configured")]
    NoEndpoints,
    #[error("all {attempted} RPC endpoints failed; last error: {last_error}")]
    Exhausted { attempted: usize, last_error: String },
}

/// Knobs for one fetch run.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub lookback_blocks: u64,
    pub max_block_range: u64,
    pub block_time_secs: u64,
    pub endpoint_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub range: BlockRange,
    pub records: Vec<EventRecord>,
    /// Logs that came back but could not be decoded.
    pub undecoded: usize,
    /// Endpoints dropped during this run, in the order they failed.
    pub failed_endpoints: Vec<String>,
}

/// Walks endpoints in priority order. An endpoint that fails is skipped for
/// the rest of the run.
struct Failover<'s, S> {
    sources: &'s [S],
    current: usize,
    timeout: Duration,
    failed: Vec<String>,
    last_error: Option<String>,
}

impl<'s, S: LogSource> Failover<'s, S> {
    fn new(sources: &'s [S], timeout: Duration) -> Self {
        Self {
            sources,
            current: 0,
            timeout,
            failed: Vec::new(),
            last_error: None,
        }
    }

    fn active(&self) -> Option<&'s S> {
        self.sources.get(self.current)
    }

    fn fail_current(&mut self, err: String) {
        if let Some(source) = self.active() {
            warn!("RPC {} failed: {}; trying next endpoint", source.name(), err);
            self.failed.push(source.name().to_string());
        }
        self.last_error = Some(err);
        self.current += 1;
    }

    fn exhausted(&self) -> FetchError {
        FetchError::Exhausted {
            attempted: self.sources.len(),
            last_error: self
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }

    async fn latest_block(&mut self) -> Result<u64, FetchError> {
        while let Some(source) = self.active() {
            match tokio::time::timeout(self.timeout, source.latest_block()).await {
                Ok(Ok(latest)) => return Ok(latest),
                Ok(Err(err)) => self.fail_current(format!("{:#}", err)),
                Err(_) => self.fail_current(format!("timed out after {:?}", self.timeout)),
            }
        }
        Err(self.exhausted())
    }

    async fn logs(&mut self, filter: &Filter) -> Result<Vec<Log>, FetchError> {
        while let Some(source) = self.active() {
            match tokio::time::timeout(self.timeout, source.logs(filter)).await {
                Ok(Ok(logs)) => return Ok(logs),
                Ok(Err(err)) => self.fail_current(format!("{:#}", err)),
                Err(_) => self.fail_current(format!("timed out after {:?}", self.timeout)),
            }
        }
        Err(self.exhausted())
    }
}

/// Fetches and decodes contract events of the given kinds over the recent
/// block range, falling back across `sources` on failure.
pub async fn fetch_events<S: LogSource>(
    sources: &[S],
    contract: &MemebaseContract,
    kinds: &[EventKind],
    settings: &FetchSettings,
) -> Result<FetchOutcome, FetchError> {
    if sources.is_empty() {
        return Err(FetchError::NoEndpoints);
    }

    let mut failover = Failover::new(sources, settings.endpoint_timeout);
    let latest = failover.latest_block().await?;
    let anchor_ts = unix_now();
    let range = BlockRange::recent(latest, settings.lookback_blocks);
    info!(
        "scanning blocks {}..={} ({} blocks) for {:?}",
        range.from,
        range.to,
        range.len(),
        kinds
    );

    let topics = contract.topics(kinds);
    let mut logs = Vec::new();
    for chunk in range.chunks(settings.max_block_range) {
        let filter = Filter::new()
            .address(contract.address())
            .topic0(ValueOrArray::Array(topics.clone()))
            .from_block(BlockNumber::Number(chunk.from.into()))
            .to_block(BlockNumber::Number(chunk.to.into()));
        let chunk_logs = failover.logs(&filter).await?;
        debug!(
            "blocks {}..={}: {} logs",
            chunk.from,
            chunk.to,
            chunk_logs.len()
        );
        logs.extend(chunk_logs);
    }

    let logs = merge_logs(logs);
    let mut records = Vec::with_capacity(logs.len());
    let mut undecoded = 0usize;
    for log in &logs {
        let block = log.block_number.map(|b| b.as_u64()).unwrap_or(range.to);
        let timestamp = estimate_timestamp(anchor_ts, range.to, block, settings.block_time_secs);
        match contract.decode_log(log, timestamp) {
            Ok(record) => records.push(record),
            Err(err) => {
                undecoded += 1;
                warn!("skipping undecodable log: {:#}", err);
            }
        }
    }

    Ok(FetchOutcome {
        range,
        records,
        undecoded,
        failed_endpoints: failover.failed,
    })
}

/// Drops logs already seen under the same transaction hash and log index.
fn merge_logs(logs: Vec<Log>) -> Vec<Log> {
    let mut seen = HashSet::new();
    logs.into_iter()
        .filter(|log| match (log.transaction_hash, log.log_index) {
            (Some(hash), Some(index)) => seen.insert((hash, index)),
            _ => true,
        })
        .collect()
}

fn estimate_timestamp(anchor_ts: i64, anchor_block: u64, block: u64, block_time_secs: u64) -> i64 {
    let behind = anchor_block.saturating_sub(block);
    let secs = behind.saturating_mul(block_time_secs);
    anchor_ts.saturating_sub(i64::try_from(secs).unwrap_or(i64::MAX))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct EndpointHealth {
    pub url: String,
    pub latest_block: Result<u64, String>,
}

/// Asks every endpoint concurrently for its latest block number.
pub async fn check_endpoints<S: LogSource>(
    sources: &[S],
    timeout: Duration,
) -> Vec<EndpointHealth> {
    let checks = sources.iter().map(|source| async move {
        let latest_block = match tokio::time::timeout(timeout, source.latest_block()).await {
            Ok(Ok(latest)) => Ok(latest),
            Ok(Err(err)) => Err(format!("{:#}", err)),
            Err(_) => Err(format!("timed out after {:?}", timeout)),
        };
        EndpointHealth {
            url: source.name().to_string(),
            latest_block,
        }
    });
    join_all(checks).await
}
