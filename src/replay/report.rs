use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A message and the desk's reply to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub message: String,
    pub reply: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayReport {
    // Messages
    pub messages: usize,
    pub signals: usize,
    pub commands: usize,
    pub directives: usize,
    pub ignored: usize,
    pub rejected: usize,

    // Orders
    pub orders_placed: usize,
    pub orders_failed: usize,
    /// Pending orders filled by a quote.
    pub fills: usize,

    // Market
    pub quotes: usize,
    pub stopped_out: usize,
    pub took_profit: usize,

    // Trailing
    pub sl_updates: usize,
    pub trailing_failures: usize,

    // Book at the end of the run
    pub open_positions: usize,
    pub pending_orders: usize,
    pub ladders: usize,
    pub closed_trades: usize,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,

    pub transcript: Vec<TranscriptEntry>,
}

impl ReplayReport {
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(70));
        println!("  REPLAY REPORT");
        println!("{}", "=".repeat(70));
        println!();
        println!("  MESSAGES");
        println!("  ───────────────────────────────────");
        println!("  Total:       {}", self.messages);
        println!("  Signals:     {}", self.signals);
        println!("  Commands:    {}", self.commands);
        println!("  Directives:  {}", self.directives);
        println!("  Ignored:     {}", self.ignored);
        println!("  Rejected:    {}", self.rejected);
        println!();
        println!("  ORDERS");
        println!("  ───────────────────────────────────");
        println!("  Placed:      {}", self.orders_placed);
        println!("  Failed:      {}", self.orders_failed);
        println!("  Filled:      {}", self.fills);
        println!();
        println!("  TRAILING");
        println!("  ───────────────────────────────────");
        println!("  Quotes:      {}", self.quotes);
        println!("  SL updates:  {}", self.sl_updates);
        println!("  Failures:    {}", self.trailing_failures);
        println!();
        println!("  BOOK");
        println!("  ───────────────────────────────────");
        println!("  Open:        {}", self.open_positions);
        println!("  Pending:     {}", self.pending_orders);
        println!("  TP ladders:  {}", self.ladders);
        println!(
            "  Closed:      {} (SL {} / TP {})",
            self.closed_trades, self.stopped_out, self.took_profit
        );
        println!("  Realized:    {}", self.realized_pnl.round_dp(2));
        println!("  Unrealized:  {}", self.unrealized_pnl.round_dp(2));
        println!("{}", "=".repeat(70));
    }

    /// The transcript as `> message` / `< reply` lines.
    pub fn transcript_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.transcript {
            for line in entry.message.lines() {
                out.push_str("> ");
                out.push_str(line);
                out.push('\n');
            }
            if let Some(reply) = &entry.reply {
                for line in reply.lines() {
                    out.push_str("< ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        out
    }
}
