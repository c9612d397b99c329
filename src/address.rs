use std::sync::OnceLock;

use ethers_core::types::Address;
use ethers_core::utils::to_checksum;
use regex::Regex;

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static address regex"))
}

/// Result of validating user-supplied address text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAddresses {
    /// Valid addresses in input order, without duplicates.
    pub valid: Vec<Address>,
    /// Non-empty entries that are not addresses, as typed.
    pub rejected: Vec<String>,
}

/// Splits comma-separated input and validates every entry.
pub fn parse_address_list(input: &str) -> ParsedAddresses {
    let mut parsed = ParsedAddresses::default();
    for entry in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match parse_address(entry) {
            Some(addr) => {
                if !parsed.valid.contains(&addr) {
                    parsed.valid.push(addr);
                }
            }
            None => parsed.rejected.push(entry.to_string()),
        }
    }
    parsed
}

/// Accepts `0x` + 40 hex digits. All-lowercase or all-uppercase digits carry no
/// checksum and pass as-is; mixed-case input is treated as checksummed and must
/// match its EIP-55 form, so a single wrong-case letter rejects the entry.
pub fn parse_address(input: &str) -> Option<Address> {
    if !address_pattern().is_match(input) {
        return None;
    }
    let addr: Address = input.parse().ok()?;

    let digits = &input[2..];
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&addr, None) != input {
        return None;
    }
    Some(addr)
}

/// EIP-55 rendering used everywhere addresses are shown.
pub fn display_address(addr: &Address) -> String {
    to_checksum(addr, None)
}
