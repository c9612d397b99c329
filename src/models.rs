use std::fmt;
use std::str::FromStr;

use ethers_core::types::{Address, H256, U256};
use serde::Serialize;

/// Actions emitted by the Memebase contract that the bot tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EventKind {
    Hearted,
    Collected,
    Summoned,
    Unleashed,
    Purged,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no event selected")]
    Empty,
    #[error("unknown event choice: {0}")]
    UnknownEvent(String),
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Hearted,
        EventKind::Collected,
        EventKind::Summoned,
        EventKind::Unleashed,
        EventKind::Purged,
    ];

    /// Menu key shown to users ("1" for Hearted, ...).
    pub fn key(self) -> u8 {
        match self {
            EventKind::Hearted => 1,
            EventKind::Collected => 2,
            EventKind::Summoned => 3,
            EventKind::Unleashed => 4,
            EventKind::Purged => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Hearted => "Hearted",
            EventKind::Collected => "Collected",
            EventKind::Summoned => "Summoned",
            EventKind::Unleashed => "Unleashed",
            EventKind::Purged => "Purged",
        }
    }

    /// Label used on reply keyboards and in the console menu, e.g. `1. Hearted`.
    pub fn menu_label(self) -> String {
        format!("{}. {}", self.key(), self.name())
    }

    /// Parses a user selection: `all`, `*`, `All Events`, a single key or name,
    /// a menu label, or a comma-separated list of those.
    pub fn parse_selection(input: &str) -> Result<Vec<EventKind>, SelectionError> {
        let trimmed = input.trim();
        let lowered = trimmed.to_lowercase();
        if matches!(lowered.as_str(), "all" | "*" | "all events") {
            return Ok(Self::ALL.to_vec());
        }

        let mut kinds = Vec::new();
        for part in trimmed.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind = part
                .parse::<EventKind>()
                .map_err(|_| SelectionError::UnknownEvent(part.to_string()))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        if kinds.is_empty() {
            return Err(SelectionError::Empty);
        }
        Ok(kinds)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1. Hearted" -> "1"
        let head = s.split('.').next().unwrap_or(s).trim();
        EventKind::ALL
            .into_iter()
            .find(|kind| head == kind.key().to_string() || head.eq_ignore_ascii_case(kind.name()))
            .ok_or_else(|| SelectionError::UnknownEvent(s.to_string()))
    }
}

/// One decoded contract log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub block_number: u64,
    /// Unix seconds, estimated from the range anchor and the average block time.
    pub timestamp: i64,
    pub subject: Address,
    pub amount: Option<U256>,
    pub tx_hash: Option<H256>,
    pub log_index: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTotals {
    pub count: u64,
    pub amount: U256,
}

/// Inclusive block span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// The `lookback` blocks ending at `latest`.
    pub fn recent(latest: u64, lookback: u64) -> Self {
        Self {
            from: latest.saturating_sub(lookback),
            to: latest,
        }
    }

    pub fn len(&self) -> u64 {
        if self.to < self.from {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the range into consecutive sub-ranges of at most `size` blocks.
    pub fn chunks(self, size: u64) -> impl Iterator<Item = BlockRange> {
        let size = size.max(1);
        let to = self.to;
        let mut next = Some(self.from);
        std::iter::from_fn(move || {
            let from = next?;
            if from > to {
                return None;
            }
            let end = from.saturating_add(size - 1).min(to);
            next = end.checked_add(1);
            Some(BlockRange { from, to: end })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub fiat: String,
    pub rate: f64,
}

impl PriceQuote {
    pub fn convert(&self, base_amount: f64) -> f64 {
        base_amount * self.rate
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventLine {
    pub event: EventKind,
    pub count: u64,
    /// Sum in base units (wei), as a decimal string.
    pub total_raw: String,
    /// Sum in whole base-asset units.
    pub total: String,
    pub total_fiat: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressReport {
    pub address: String,
    pub events: Vec<EventLine>,
}

impl AddressReport {
    pub fn has_matches(&self) -> bool {
        self.events.iter().any(|line| line.count > 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub range: BlockRange,
    pub price: Option<PriceQuote>,
    pub addresses: Vec<AddressReport>,
    pub notices: Vec<String>,
}

impl StatsReport {
    pub fn total_matches(&self) -> u64 {
        self.addresses
            .iter()
            .flat_map(|a| a.events.iter())
            .map(|line| line.count)
            .sum()
    }
}
