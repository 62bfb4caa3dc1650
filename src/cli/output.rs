//! CLI output formatting.
//!
//! Text output is styled with `console`; JSON output is one document per
//! call so it can be piped.

use console::style;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::position::position::Position;
use crate::protocol::state_machine::Protocol;
use crate::utils::format::{format_amount, format_duration, format_ppm};

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
    /// Pretty JSON format
    JsonPretty,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIEWS
// ═══════════════════════════════════════════════════════════════════════════════

/// Summary row of a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionView {
    /// Position id
    pub id: u64,
    /// Variant
    pub kind: String,
    /// Owner
    pub owner: String,
    /// Lifecycle state
    pub state: String,
    /// Collateral held
    pub collateral: String,
    /// Liquidation price
    pub price: String,
    /// Outstanding principal
    pub principal: String,
    /// Interest owed now
    pub interest: String,
    /// Annual rate
    pub rate: String,
}

impl PositionView {
    /// Build the view at the protocol's current time
    pub fn new(protocol: &Protocol, position: &Position) -> Self {
        let now = protocol.timestamp();
        Self {
            id: position.id.0,
            kind: position.kind.to_string(),
            owner: position.owner.short(),
            state: position.state(now).to_string(),
            collateral: protocol
                .collateral_of(position.id)
                .map(format_amount)
                .unwrap_or_else(|_| "?".into()),
            price: format_amount(position.price),
            principal: format_amount(position.principal),
            interest: position
                .interest_at(now)
                .map(format_amount)
                .unwrap_or_else(|_| "?".into()),
            rate: format_ppm(position.fixed_annual_rate_ppm),
        }
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.kind.clone(),
            self.owner.clone(),
            self.state.clone(),
            self.collateral.clone(),
            self.price.clone(),
            self.principal.clone(),
            self.interest.clone(),
            self.rate.clone(),
        ]
    }
}

/// Protocol-wide figures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolSummary {
    /// Block height
    pub block_height: u64,
    /// Engine time
    pub timestamp: u64,
    /// Stablecoin supply
    pub total_supply: String,
    /// Stablecoin held by the reserve pool
    pub reserve: String,
    /// Reserve owed back to minters
    pub minter_reserve: String,
    /// Reserve minus minter reserve
    pub equity: String,
    /// Reserve shares outstanding
    pub total_shares: String,
    /// Leading rate
    pub leadrate: String,
    /// Savings deposits
    pub total_saved: String,
    /// Positions ever opened
    pub positions: usize,
    /// Events in the log
    pub events: usize,
}

impl ProtocolSummary {
    /// Collect the summary
    pub fn new(protocol: &Protocol) -> Self {
        let state = protocol.state();
        Self {
            block_height: protocol.block_height(),
            timestamp: protocol.timestamp(),
            total_supply: format_amount(state.stablecoin.total_supply()),
            reserve: format_amount(state.stablecoin.reserve_balance()),
            minter_reserve: format_amount(state.stablecoin.minter_reserve()),
            equity: format_amount(state.stablecoin.equity()),
            total_shares: format_amount(state.reserve.total_shares()),
            leadrate: format_ppm(state.leadrate.current_rate_ppm()),
            total_saved: format_amount(state.savings.total_saved()),
            positions: state.positions.len(),
            events: state.events.len(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMATTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Output formatter for CLI
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create new formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Get format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json | OutputFormat::JsonPretty)
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        self.status("success", message, || {
            println!("{} {}", style("✓").green(), message)
        });
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        self.status("error", message, || {
            eprintln!("{} {}", style("✗").red().bold(), message)
        });
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        self.status("warning", message, || {
            println!("{} {}", style("⚠").yellow(), message)
        });
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        self.status("info", message, || {
            println!("{} {}", style("→").cyan(), message)
        });
    }

    fn status(&self, status: &str, message: &str, text: impl FnOnce()) {
        if self.is_json() {
            self.print_json(&serde_json::json!({ "status": status, "message": message }));
        } else {
            text();
        }
    }

    /// Print section header
    pub fn section(&self, title: &str) {
        if !self.is_json() {
            println!();
            println!("{}", style(format!("=== {} ===", title)).cyan().bold());
        }
    }

    /// Print key-value pairs in order
    pub fn fields(&self, fields: &[(&str, String)]) {
        if self.is_json() {
            let map: BTreeMap<&str, &str> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
            self.print_json(&map);
            return;
        }
        let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in fields {
            println!("{:width$}  {}", style(key).bold(), value, width = width);
        }
    }

    /// Print the protocol summary
    pub fn summary(&self, summary: &ProtocolSummary) {
        if self.is_json() {
            self.print_json(summary);
            return;
        }
        self.fields(&[
            ("block", summary.block_height.to_string()),
            ("time", crate::utils::format::format_timestamp(summary.timestamp)),
            ("supply", summary.total_supply.clone()),
            ("reserve", summary.reserve.clone()),
            ("minter reserve", summary.minter_reserve.clone()),
            ("equity", summary.equity.clone()),
            ("shares", summary.total_shares.clone()),
            ("leading rate", summary.leadrate.clone()),
            ("savings", summary.total_saved.clone()),
            ("positions", summary.positions.to_string()),
            ("events", summary.events.to_string()),
        ]);
    }

    /// Print a position table
    pub fn positions(&self, positions: &[PositionView]) {
        if self.is_json() {
            self.print_json(&positions);
            return;
        }
        let rows: Vec<Vec<String>> = positions.iter().map(PositionView::row).collect();
        self.table(
            &[
                "id", "kind", "owner", "state", "collateral", "price", "principal", "interest",
                "rate",
            ],
            &rows,
        );
    }

    /// Print any serializable value
    pub fn data<T: Serialize>(&self, data: &T) {
        if self.is_json() {
            self.print_json(data);
        } else {
            match serde_json::to_string_pretty(data) {
                Ok(text) => println!("{}", text),
                Err(e) => self.error(&e.to_string()),
            }
        }
    }

    /// Print text table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if headers.is_empty() {
            return;
        }
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                widths[i] = widths[i].max(cell.len());
            }
        }

        let header: Vec<String> = headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:w$}", h, w = w))
            .collect();
        println!("{}", style(header.join(" | ")).bold());
        let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        println!("{}", separator.join("-+-"));
        for row in rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:w$}", cell, w = w))
                .collect();
            println!("{}", cells.join(" | "));
        }
    }

    fn print_json<T: Serialize + ?Sized>(&self, data: &T) {
        let output = if matches!(self.format, OutputFormat::JsonPretty) {
            serde_json::to_string_pretty(data)
        } else {
            serde_json::to_string(data)
        };
        match output {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e),
        }
    }
}

/// Render a cooldown end relative to `now`
pub fn cooldown_remaining(cooldown: u64, now: u64) -> String {
    if cooldown <= now {
        "none".into()
    } else {
        format_duration(cooldown - now)
    }
}
