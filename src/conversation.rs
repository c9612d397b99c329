//! Chat flow: `/getstats` asks for addresses, then for an event choice, then
//! runs the query. `/cancel` aborts from any step.

use std::time::Duration;

use anyhow::{Context, Result};
use ethers_core::types::Address;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::{
    address::parse_address_list,
    eth::LogSource,
    models::EventKind,
    report::render_text,
    service::{StatsError, StatsQuery, StatsService},
};

pub const WELCOME: &str = "Welcome to the Memebase Game Stats Bot!\n\n\
This bot fetches on-chain event statistics for the Memebase contract on the Base network. \
It analyzes events such as Hearted, Collected, Summoned, Unleashed, and Purged.\n\n\
The data presented is for approximately the last 7 days of blockchain activity.\n\n\
To get started, use the /getstats command. You can provide a single Ethereum address \
or multiple addresses separated by commas.";

const ASK_ADDRESSES: &str =
    "Please enter the Ethereum address(es) you want to investigate (comma-separated):";
const NO_VALID_ADDRESSES: &str = "No valid Ethereum addresses provided. Please enter one or more \
valid addresses, separated by commas (e.g., 0x..., 0x...).\nYou can use /cancel to stop.";
const CANCELLED: &str = "Operation cancelled.";
const INVALID_CHOICE: &str = "Invalid event choice. Please start over with /getstats.";
const IDLE_HINT: &str = "Use /getstats to look up event statistics, or /start for help.";
const TIMED_OUT: &str = "No reply received in time; the conversation was abandoned.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Step {
    #[default]
    Idle,
    AwaitingAddresses,
    AwaitingEvents {
        addresses: Vec<Address>,
        rejected: Vec<String>,
    },
}

/// What the front-end should do after one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Say(String),
    Run(StatsQuery),
}

#[derive(Debug, Default)]
pub struct Conversation {
    step: Step,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn is_idle(&self) -> bool {
        self.step == Step::Idle
    }

    /// Drops an unfinished conversation after its step timed out.
    pub fn abandon(&mut self) -> Option<Reply> {
        if self.is_idle() {
            return None;
        }
        self.step = Step::Idle;
        Some(Reply::Say(TIMED_OUT.to_string()))
    }

    pub fn handle(&mut self, input: &str) -> Vec<Reply> {
        let input = input.trim();
        match input {
            "/start" => return vec![Reply::Say(WELCOME.to_string())],
            "/getstats" => {
                self.step = Step::AwaitingAddresses;
                return vec![Reply::Say(ASK_ADDRESSES.to_string())];
            }
            "/cancel" => {
                self.step = Step::Idle;
                return vec![Reply::Say(CANCELLED.to_string())];
            }
            _ if input.starts_with('/') => {
                return vec![Reply::Say(format!("Unknown command {}. {}", input, IDLE_HINT))];
            }
            _ => {}
        }

        match std::mem::take(&mut self.step) {
            Step::Idle => vec![Reply::Say(IDLE_HINT.to_string())],
            Step::AwaitingAddresses => self.addresses_received(input),
            Step::AwaitingEvents {
                addresses,
                rejected,
            } => events_received(input, addresses, rejected),
        }
    }

    fn addresses_received(&mut self, input: &str) -> Vec<Reply> {
        let parsed = parse_address_list(input);
        if parsed.valid.is_empty() {
            self.step = Step::AwaitingAddresses;
            return vec![Reply::Say(NO_VALID_ADDRESSES.to_string())];
        }
        info!("valid addresses to investigate: {}", parsed.valid.len());

        let mut replies = Vec::new();
        if !parsed.rejected.is_empty() {
            replies.push(Reply::Say(format!(
                "The following entries were not valid addresses and will be ignored: {}",
                parsed.rejected.join(", ")
            )));
        }
        replies.push(Reply::Say(event_menu()));
        self.step = Step::AwaitingEvents {
            addresses: parsed.valid,
            rejected: parsed.rejected,
        };
        replies
    }
}

fn events_received(input: &str, addresses: Vec<Address>, rejected: Vec<String>) -> Vec<Reply> {
    match EventKind::parse_selection(input) {
        Ok(kinds) => {
            let plural = if addresses.len() == 1 { "address" } else { "addresses" };
            vec![
                Reply::Say(format!(
                    "Fetching stats for {} {} concerning '{}'... \
                     Please wait, this may take a moment.",
                    addresses.len(),
                    plural,
                    input
                )),
                Reply::Run(StatsQuery {
                    addresses,
                    kinds,
                    rejected,
                }),
            ]
        }
        Err(_) => vec![Reply::Say(INVALID_CHOICE.to_string())],
    }
}

pub fn event_menu() -> String {
    let mut menu = String::from(
        "Which events do you want to analyze for the provided address(es)? \
Select one from the list, or type 'All Events'.\n  All Events",
    );
    for kind in EventKind::ALL {
        menu.push_str("\n  ");
        menu.push_str(&kind.menu_label());
    }
    menu
}

/// User-facing text for a failed query.
pub fn error_text(err: &StatsError) -> String {
    match err {
        StatsError::NoValidAddresses { .. } => NO_VALID_ADDRESSES.to_string(),
        StatsError::InvalidSelection(_) => INVALID_CHOICE.to_string(),
        StatsError::Fetch(_) => {
            "Blockchain data is currently unavailable from every configured endpoint. \
Please try again later."
                .to_string()
        }
    }
}

/// Drives a conversation over stdin/stdout until EOF.
pub async fn run_console<S: LogSource>(
    service: &StatsService<S>,
    step_timeout: Duration,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut conversation = Conversation::new();

    write_line(&mut stdout, WELCOME).await?;
    loop {
        let next = if conversation.is_idle() {
            lines.next_line().await.context("failed to read stdin")?
        } else {
            match tokio::time::timeout(step_timeout, lines.next_line()).await {
                Ok(line) => line.context("failed to read stdin")?,
                Err(_) => {
                    if let Some(Reply::Say(text)) = conversation.abandon() {
                        write_line(&mut stdout, &text).await?;
                    }
                    continue;
                }
            }
        };
        let Some(line) = next else {
            break;
        };

        for reply in conversation.handle(&line) {
            match reply {
                Reply::Say(text) => write_line(&mut stdout, &text).await?,
                Reply::Run(query) => {
                    let text = match service.run(&query).await {
                        Ok(report) => render_text(&report),
                        Err(err) => {
                            tracing::warn!("stats query failed: {}", err);
                            error_text(&err)
                        }
                    };
                    write_line(&mut stdout, &text).await?;
                }
            }
        }
    }
    Ok(())
}

async fn write_line(stdout: &mut tokio::io::Stdout, text: &str) -> Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x82A9c823332518c32a0c0eDC050Ef00934Cf04D4";

    fn says(replies: &[Reply]) -> Vec<&str> {
        replies
            .iter()
            .filter_map(|r| match r {
                Reply::Say(text) => Some(text.as_str()),
                Reply::Run(_) => None,
            })
            .collect()
    }

    #[test]
    fn full_flow_produces_a_query() {
        let mut convo = Conversation::new();
        let replies = convo.handle("/getstats");
        assert_eq!(says(&replies), vec![ASK_ADDRESSES]);
        assert_eq!(convo.step(), &Step::AwaitingAddresses);

        let replies = convo.handle(&format!("{}, nope", ADDR));
        assert!(says(&replies)[0].contains("nope"));
        assert!(matches!(convo.step(), Step::AwaitingEvents { .. }));

        let replies = convo.handle("1. Hearted");
        let query = replies
            .iter()
            .find_map(|r| match r {
                Reply::Run(q) => Some(q.clone()),
                Reply::Say(_) => None,
            })
            .unwrap();
        assert_eq!(query.kinds, vec![EventKind::Hearted]);
        assert_eq!(query.addresses.len(), 1);
        assert_eq!(query.rejected, vec!["nope"]);
        assert!(convo.is_idle());
    }

    #[test]
    fn invalid_addresses_keep_asking() {
        let mut convo = Conversation::new();
        convo.handle("/getstats");
        let replies = convo.handle("0x123, hello");
        assert_eq!(says(&replies), vec![NO_VALID_ADDRESSES]);
        assert_eq!(convo.step(), &Step::AwaitingAddresses);
    }

    #[test]
    fn invalid_event_choice_ends_conversation() {
        let mut convo = Conversation::new();
        convo.handle("/getstats");
        convo.handle(ADDR);
        let replies = convo.handle("Sneezed");
        assert_eq!(says(&replies), vec![INVALID_CHOICE]);
        assert!(convo.is_idle());
    }

    #[test]
    fn cancel_resets_from_any_step() {
        let mut convo = Conversation::new();
        convo.handle("/getstats");
        convo.handle(ADDR);
        assert_eq!(says(&convo.handle("/cancel")), vec![CANCELLED]);
        assert!(convo.is_idle());
        assert_eq!(says(&convo.handle("All Events")), vec![IDLE_HINT]);
    }

    #[test]
    fn abandon_only_applies_mid_conversation() {
        let mut convo = Conversation::new();
        assert_eq!(convo.abandon(), None);
        convo.handle("/getstats");
        assert_eq!(convo.abandon(), Some(Reply::Say(TIMED_OUT.to_string())));
        assert!(convo.is_idle());
    }

    #[test]
    fn menu_lists_every_event() {
        let menu = event_menu();
        assert!(menu.contains("All Events"));
        for kind in EventKind::ALL {
            assert!(menu.contains(&kind.menu_label()));
        }
    }
}
