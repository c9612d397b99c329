//! Plain-text rendering of a [`StatsReport`] for console and chat output.

use crate::models::{AddressReport, StatsReport};

const HEADERS: [&str; 4] = ["Event", "Count", "Total ETH", "Total Fiat"];

pub fn render_text(report: &StatsReport) -> String {
    let mut out = String::new();

    match &report.price {
        Some(quote) => out.push_str(&format!(
            "Current ETH to {} rate: {:.2}\n",
            quote.fiat.to_uppercase(),
            quote.rate
        )),
        None => out.push_str("ETH to fiat rate not available.\n"),
    }
    out.push_str(&format!(
        "Blocks {}..={} ({} blocks)\n",
        report.range.from,
        report.range.to,
        report.range.len()
    ));

    if report.total_matches() == 0 {
        out.push_str("\nNo matching events for the requested addresses in this range.\n");
    }

    for address in &report.addresses {
        out.push('\n');
        out.push_str(&format!("Analysis for address {}\n", address.address));
        if address.has_matches() {
            out.push_str(&render_table(address));
        } else {
            out.push_str("  No matching events.\n");
        }
    }

    if !report.notices.is_empty() {
        out.push_str("\nNotices:\n");
        for notice in &report.notices {
            out.push_str(&format!("- {}\n", notice));
        }
    }

    out
}

fn render_table(address: &AddressReport) -> String {
    let rows: Vec<[String; 4]> = address
        .events
        .iter()
        .map(|line| {
            let eth = line
                .total
                .parse::<f64>()
                .map(|v| format!("{:.6}", v))
                .unwrap_or_else(|_| line.total.clone());
            let fiat = line
                .total_fiat
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "N/A".to_string());
            [line.event.to_string(), line.count.to_string(), eth, fiat]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let border = {
        let mut line = String::from("+");
        for width in widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line.push('\n');
        line
    };

    let mut table = border.clone();
    table.push_str(&format_row(HEADERS, widths));
    table.push_str(&border);
    for row in &rows {
        table.push_str(&format_row(
            [row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str()],
            widths,
        ));
    }
    table.push_str(&border);
    table
}

fn format_row(cells: [&str; 4], widths: [usize; 4]) -> String {
    let mut line = String::from("|");
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        // first column left-aligned, numbers right-aligned
        if i == 0 {
            line.push_str(&format!(" {:<width$} |", cell, width = width));
        } else {
            line.push_str(&format!(" {:>width$} |", cell, width = width));
        }
    }
    line.push('\n');
    line
}
