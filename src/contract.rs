use anyhow::{anyhow, Context, Result};
use ethers_core::abi::{parse_abi, Event, RawLog, Token};
use ethers_core::types::{Address, Log, H256, U256};

use crate::models::{EventKind, EventRecord};

/// ABI fragment for one tracked event plus the argument names that carry the
/// subject address and the amount.
struct EventSpec {
    kind: EventKind,
    signature: &'static str,
    subject_arg: &'static str,
    amount_arg: &'static str,
}

const EVENT_SPECS: [EventSpec; 5] = [
    EventSpec {
        kind: EventKind::Hearted,
        signature: "event Hearted(address indexed hearter, uint256 indexed memeNonce, \
                    uint256 amount)",
        subject_arg: "hearter",
        amount_arg: "amount",
    },
    EventSpec {
        kind: EventKind::Collected,
        signature: "event Collected(address indexed hearter, address indexed memeToken, \
                    uint256 allocation)",
        subject_arg: "hearter",
        amount_arg: "allocation",
    },
    EventSpec {
        kind: EventKind::Summoned,
        signature: "event Summoned(address indexed summoner, uint256 indexed memeNonce, \
                    uint256 amount)",
        subject_arg: "summoner",
        amount_arg: "amount",
    },
    EventSpec {
        kind: EventKind::Unleashed,
        signature: "event Unleashed(address indexed unleasher, address indexed memeToken, \
                    uint256 indexed lpTokenId, uint256 liquidity, \
                    uint256 nativeAmountForOLASBurn)",
        subject_arg: "unleasher",
        amount_arg: "liquidity",
    },
    EventSpec {
        // The subject of a purge is the meme token itself.
        kind: EventKind::Purged,
        signature: "event Purged(address indexed memeToken, uint256 amount)",
        subject_arg: "memeToken",
        amount_arg: "amount",
    },
];

struct TrackedEvent {
    kind: EventKind,
    event: Event,
    subject_arg: &'static str,
    amount_arg: &'static str,
}

/// The fixed Memebase contract and its tracked events.
#[derive(Clone)]
pub struct MemebaseContract {
    address: Address,
    events: std::sync::Arc<Vec<TrackedEvent>>,
}

impl MemebaseContract {
    pub fn new(address: Address) -> Result<Self> {
        let signatures: Vec<&str> = EVENT_SPECS.iter().map(|spec| spec.signature).collect();
        let abi = parse_abi(&signatures).context("failed to parse Memebase event ABI")?;

        let mut events = Vec::with_capacity(EVENT_SPECS.len());
        for spec in &EVENT_SPECS {
            let event = abi
                .event(spec.kind.name())
                .with_context(|| format!("event {} missing from ABI", spec.kind))?
                .clone();
            events.push(TrackedEvent {
                kind: spec.kind,
                event,
                subject_arg: spec.subject_arg,
                amount_arg: spec.amount_arg,
            });
        }

        Ok(Self {
            address,
            events: std::sync::Arc::new(events),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// topic0 of the given event kind.
    pub fn topic(&self, kind: EventKind) -> Option<H256> {
        self.tracked(kind).map(|t| t.event.signature())
    }

    pub fn topics(&self, kinds: &[EventKind]) -> Vec<H256> {
        kinds.iter().filter_map(|kind| self.topic(*kind)).collect()
    }

    fn tracked(&self, kind: EventKind) -> Option<&TrackedEvent> {
        self.events.iter().find(|t| t.kind == kind)
    }

    /// Decodes a raw log emitted by the contract into an [`EventRecord`].
    ///
    /// `timestamp` is supplied by the caller since logs carry no block time.
    pub fn decode_log(&self, log: &Log, timestamp: i64) -> Result<EventRecord> {
        let topic0 = log
            .topics
            .first()
            .copied()
            .ok_or_else(|| anyhow!("log has no topics"))?;
        let tracked = self
            .events
            .iter()
            .find(|t| t.event.signature() == topic0)
            .ok_or_else(|| anyhow!("unknown event topic {:#x}", topic0))?;

        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let parsed = tracked
            .event
            .parse_log(raw)
            .with_context(|| format!("failed to decode {} log", tracked.kind))?;

        let mut subject = None;
        let mut amount = None;
        for param in parsed.params {
            if param.name == tracked.subject_arg {
                if let Token::Address(addr) = param.value {
                    subject = Some(addr);
                }
            } else if param.name == tracked.amount_arg {
                if let Token::Uint(value) = param.value {
                    amount = Some(value);
                }
            }
        }

        let subject =
            subject.ok_or_else(|| anyhow!("{} log missing {}", tracked.kind, tracked.subject_arg))?;
        let block_number = log
            .block_number
            .ok_or_else(|| anyhow!("{} log missing block number", tracked.kind))?
            .as_u64();

        Ok(EventRecord {
            kind: tracked.kind,
            block_number,
            timestamp,
            subject,
            amount,
            tx_hash: log.transaction_hash,
            log_index: log.log_index.map(u256_to_u64_lossy),
        })
    }
}

fn u256_to_u64_lossy(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
