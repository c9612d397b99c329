use anyhow::Result;
use ethers_core::types::{Address, U256};
use ethers_core::utils::format_units;
use tracing::info;

use crate::{
    address::{display_address, parse_address_list},
    aggregate::{aggregate, AggregateResult},
    config::Config,
    contract::MemebaseContract,
    eth::{fetch_events, EthClient, FetchError, FetchSettings, LogSource},
    models::{AddressReport, EventKind, EventLine, PriceQuote, SelectionError, StatsReport},
    price::{convert, PriceClient},
};

#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error("no valid addresses provided")]
    NoValidAddresses { rejected: Vec<String> },
    #[error(transparent)]
    InvalidSelection(#[from] SelectionError),
    #[error("data unavailable: {0}")]
    Fetch(#[from] FetchError),
}

/// A validated request: who to look up and which events to count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    pub addresses: Vec<Address>,
    pub kinds: Vec<EventKind>,
    /// Entries dropped during validation, reported back as a notice.
    pub rejected: Vec<String>,
}

impl StatsQuery {
    pub fn parse(addresses: &str, events: &str) -> Result<Self, StatsError> {
        let kinds = EventKind::parse_selection(events)?;
        Self::from_addresses(addresses, kinds)
    }

    pub fn from_addresses(addresses: &str, kinds: Vec<EventKind>) -> Result<Self, StatsError> {
        let parsed = parse_address_list(addresses);
        if parsed.valid.is_empty() {
            return Err(StatsError::NoValidAddresses {
                rejected: parsed.rejected,
            });
        }
        Ok(Self {
            addresses: parsed.valid,
            kinds,
            rejected: parsed.rejected,
        })
    }
}

/// Runs the fetch -> aggregate -> convert pipeline for one query at a time.
pub struct StatsService<S = EthClient> {
    endpoints: Vec<S>,
    contract: MemebaseContract,
    prices: PriceClient,
    settings: FetchSettings,
}

impl StatsService<EthClient> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoints = EthClient::from_urls(config.require_rpc_urls()?, config.rpc_timeout)?;
        let contract = MemebaseContract::new(config.contract_address)?;
        let prices = PriceClient::new(
            config.price_urls.clone(),
            &config.fiat_currency,
            config.rpc_timeout,
        )?;
        Ok(Self::new(endpoints, contract, prices, config.fetch_settings()))
    }
}

impl<S: LogSource> StatsService<S> {
    pub fn new(
        endpoints: Vec<S>,
        contract: MemebaseContract,
        prices: PriceClient,
        settings: FetchSettings,
    ) -> Self {
        Self {
            endpoints,
            contract,
            prices,
            settings,
        }
    }

    pub fn endpoints(&self) -> &[S] {
        &self.endpoints
    }

    pub fn contract(&self) -> &MemebaseContract {
        &self.contract
    }

    pub async fn run(&self, query: &StatsQuery) -> Result<StatsReport, StatsError> {
        info!(
            "stats query: {} address(es), events {:?}",
            query.addresses.len(),
            query.kinds
        );

        let outcome =
            fetch_events(&self.endpoints, &self.contract, &query.kinds, &self.settings).await?;
        let result = aggregate(&outcome.records, &query.addresses, &query.kinds);
        let price = self.prices.fetch_quote().await;

        let mut notices = Vec::new();
        if price.is_none() {
            notices.push("Fiat rate not available; amounts shown in ETH only.".to_string());
        }
        if !query.rejected.is_empty() {
            notices.push(format!(
                "Ignored invalid address entries: {}",
                query.rejected.join(", ")
            ));
        }
        if outcome.undecoded > 0 {
            notices.push(format!(
                "{} log(s) could not be decoded and were skipped.",
                outcome.undecoded
            ));
        }
        if !outcome.failed_endpoints.is_empty() {
            notices.push(format!(
                "{} RPC endpoint(s) failed and were skipped.",
                outcome.failed_endpoints.len()
            ));
        }

        Ok(StatsReport {
            range: outcome.range,
            addresses: build_address_reports(&result, query, price.as_ref()),
            price,
            notices,
        })
    }
}

fn build_address_reports(
    result: &AggregateResult,
    query: &StatsQuery,
    price: Option<&PriceQuote>,
) -> Vec<AddressReport> {
    query
        .addresses
        .iter()
        .map(|address| AddressReport {
            address: display_address(address),
            events: query
                .kinds
                .iter()
                .map(|kind| {
                    let totals = result.get(address, *kind);
                    let total = format_ether(totals.amount);
                    let total_fiat = total.parse::<f64>().ok().and_then(|eth| convert(eth, price));
                    EventLine {
                        event: *kind,
                        count: totals.count,
                        total_raw: totals.amount.to_string(),
                        total,
                        total_fiat,
                    }
                })
                .collect(),
        })
        .collect()
}

/// Whole-ether decimal string of a wei amount.
pub fn format_ether(wei: U256) -> String {
    format_units(wei, "ether").unwrap_or_else(|_| wei.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::models::EventRecord;
    use ethers_core::utils::parse_ether;

    const ADDR: &str = "0x82A9c823332518c32a0c0eDC050Ef00934Cf04D4";

    #[test]
    fn query_keeps_valid_and_reports_rejected() {
        let query = StatsQuery::parse(&format!("{}, bogus", ADDR), "1").unwrap();
        assert_eq!(query.addresses.len(), 1);
        assert_eq!(query.kinds, vec![EventKind::Hearted]);
        assert_eq!(query.rejected, vec!["bogus"]);
    }

    #[test]
    fn query_without_valid_addresses_fails_before_fetch() {
        match StatsQuery::parse("bogus, 0x12", "all") {
            Err(StatsError::NoValidAddresses { rejected }) => {
                assert_eq!(rejected, vec!["bogus", "0x12"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn query_with_bad_event_choice_fails() {
        assert!(matches!(
            StatsQuery::parse(ADDR, "9. Nothing"),
            Err(StatsError::InvalidSelection(_))
        ));
    }

    #[test]
    fn reports_follow_request_order_and_convert_when_priced() {
        let query = StatsQuery::parse(ADDR, "1,3").unwrap();
        let address = query.addresses[0];
        let records = vec![
            EventRecord {
                kind: EventKind::Hearted,
                block_number: 1,
                timestamp: 0,
                subject: address,
                amount: Some(parse_ether("1.5").unwrap()),
                tx_hash: None,
                log_index: None,
            },
        ];
        let result = aggregate(&records, &query.addresses, &query.kinds);
        let quote = PriceQuote {
            fiat: "usd".to_string(),
            rate: 2_000.0,
        };

        let reports = build_address_reports(&result, &query, Some(&quote));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].address, ADDR);
        let lines = &reports[0].events;
        assert_eq!(lines[0].event, EventKind::Hearted);
        assert_eq!(lines[0].count, 1);
        assert_eq!(lines[0].total_raw, "1500000000000000000");
        assert_eq!(lines[0].total_fiat, Some(3_000.0));
        assert_eq!(lines[1].event, EventKind::Summoned);
        assert_eq!(lines[1].count, 0);

        let unpriced = build_address_reports(&result, &query, None);
        assert!(unpriced[0].events.iter().all(|l| l.total_fiat.is_none()));
        assert_eq!(unpriced[0].events[0].total_raw, "1500000000000000000");
    }

    #[test]
    fn format_ether_is_exact() {
        assert_eq!(format_ether(parse_ether(3).unwrap()), "3.000000000000000000");
        assert_eq!(format_ether(U256::zero()), "0.000000000000000000");
    }
}
