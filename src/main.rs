mod bot;

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use signal_ladder_bot::config::Config;
use signal_ladder_bot::gateway::{PaperGateway, StdinSource};
use signal_ladder_bot::trading::Desk;

use crate::bot::LadderBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.to_lowercase()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let paper = Arc::new(PaperGateway::new());
    paper
        .add_instrument(&cfg.default_instrument(), cfg.paper_constraints)
        .await;

    let desk = Desk::open(cfg.clone(), paper.clone())?;
    let source = Box::new(StdinSource::new(cfg.chat_id.unwrap_or_default()));

    let mut bot = LadderBot::new(&cfg, desk, paper, source);
    bot.run().await?;

    Ok(())
}
