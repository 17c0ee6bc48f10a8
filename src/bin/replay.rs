use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use signal_ladder_bot::config::Config;
use signal_ladder_bot::replay::{ReplayReport, ReplayRunner};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.to_lowercase()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    // replay <script> [report-file]
    let args: Vec<String> = std::env::args().collect();
    let Some(script_path) = args.get(1) else {
        println!("Usage: replay <script> [report-file]");
        return Ok(());
    };
    let report_path = args.get(2);

    let script = std::fs::read_to_string(script_path)
        .with_context(|| format!("reading {}", script_path))?;

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║          SIGNAL LADDER BOT - REPLAY                      ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("  Script:     {}", script_path);
    println!("  Symbol:     {}", cfg.default_instrument());
    println!("  Magic:      {}", cfg.magic);
    println!("  Step:       {} ({:?})", cfg.ladder_step, cfg.lot_policy);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let mut runner = ReplayRunner::new(cfg).await;
    let report = runner.run_script(&script).await?;

    print!("{}", report.transcript_text());
    report.print_summary();

    if let Some(path) = report_path {
        save_report_to_file(&report, path)?;
        println!("\nReport saved to: {}", path);
    }

    Ok(())
}

fn save_report_to_file(report: &ReplayReport, path: &str) -> Result<()> {
    use std::io::Write;

    let mut f = std::fs::File::create(path)?;

    writeln!(f, "Signal Ladder Bot Replay Report")?;
    writeln!(f, "===============================")?;
    writeln!(f)?;
    writeln!(f, "Messages:")?;
    writeln!(f, "  Total:       {}", report.messages)?;
    writeln!(f, "  Signals:     {}", report.signals)?;
    writeln!(f, "  Commands:    {}", report.commands)?;
    writeln!(f, "  Directives:  {}", report.directives)?;
    writeln!(f, "  Ignored:     {}", report.ignored)?;
    writeln!(f, "  Rejected:    {}", report.rejected)?;
    writeln!(f)?;
    writeln!(f, "Orders:")?;
    writeln!(f, "  Placed:  {}", report.orders_placed)?;
    writeln!(f, "  Failed:  {}", report.orders_failed)?;
    writeln!(f, "  Filled:  {}", report.fills)?;
    writeln!(f)?;
    writeln!(f, "Trailing:")?;
    writeln!(f, "  SL updates:  {}", report.sl_updates)?;
    writeln!(f, "  Failures:    {}", report.trailing_failures)?;
    writeln!(f)?;
    writeln!(f, "Book:")?;
    writeln!(f, "  Open:        {}", report.open_positions)?;
    writeln!(f, "  Pending:     {}", report.pending_orders)?;
    writeln!(f, "  Closed:      {}", report.closed_trades)?;
    writeln!(f, "  Realized:    {}", report.realized_pnl.round_dp(2))?;
    writeln!(f, "  Unrealized:  {}", report.unrealized_pnl.round_dp(2))?;
    writeln!(f)?;
    writeln!(f, "Transcript:")?;
    write!(f, "{}", report.transcript_text())?;

    Ok(())
}
