use std::collections::BTreeMap;

use ethers_core::types::{Address, U256};

use crate::models::{EventKind, EventRecord, EventTotals};

/// Per (address, event kind) counts and summed amounts.
///
/// Every requested pair has a bucket, so untouched pairs read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    buckets: BTreeMap<(Address, EventKind), EventTotals>,
}

impl AggregateResult {
    pub fn get(&self, address: &Address, kind: EventKind) -> EventTotals {
        self.buckets
            .get(&(*address, kind))
            .copied()
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Address, EventKind), &EventTotals)> {
        self.buckets.iter()
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.values().map(|t| t.count).sum()
    }
}

/// Folds records into buckets for the requested addresses and kinds; other
/// records are ignored.
pub fn aggregate(
    records: &[EventRecord],
    addresses: &[Address],
    kinds: &[EventKind],
) -> AggregateResult {
    let mut buckets = BTreeMap::new();
    for address in addresses {
        for kind in kinds {
            buckets.insert((*address, *kind), EventTotals::default());
        }
    }

    for record in records {
        if let Some(totals) = buckets.get_mut(&(record.subject, record.kind)) {
            totals.count += 1;
            totals.amount = totals
                .amount
                .saturating_add(record.amount.unwrap_or_else(U256::zero));
        }
    }

    AggregateResult { buckets }
}
