use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;

/// One event of a replay script.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayStep {
    Message(String),
    Quote {
        symbol: String,
        bid: Decimal,
        ask: Decimal,
    },
}

/// Parse a replay script.
///
/// Messages are blank-line delimited blocks of text. A line starting with
/// `@quote <SYMBOL> <bid> <ask>` publishes a quote and also ends the block
/// before it. Lines starting with `#` are comments.
pub fn parse_script(text: &str) -> Result<Vec<ReplayStep>> {
    let mut steps = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            continue;
        }
        if trimmed.is_empty() {
            flush(&mut block, &mut steps);
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("@quote") {
            flush(&mut block, &mut steps);
            steps.push(parse_quote(rest).with_context(|| format!("line {}", idx + 1))?);
            continue;
        }
        if trimmed.starts_with('@') {
            bail!("line {}: unknown directive '{}'", idx + 1, trimmed);
        }
        block.push(line);
    }
    flush(&mut block, &mut steps);

    Ok(steps)
}

fn flush(block: &mut Vec<&str>, steps: &mut Vec<ReplayStep>) {
    if !block.is_empty() {
        steps.push(ReplayStep::Message(block.join("\n")));
        block.clear();
    }
}

fn parse_quote(rest: &str) -> Result<ReplayStep> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let [symbol, bid, ask] = parts.as_slice() else {
        bail!("expected '@quote <SYMBOL> <bid> <ask>'");
    };
    let bid: Decimal = bid.parse().with_context(|| format!("bad bid '{}'", bid))?;
    let ask: Decimal = ask.parse().with_context(|| format!("bad ask '{}'", ask))?;
    if ask < bid {
        bail!("ask {} below bid {}", ask, bid);
    }
    Ok(ReplayStep::Quote {
        symbol: symbol.to_string(),
        bid,
        ask,
    })
}
