use regex::{Captures, Regex};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::ParseFailure;
use crate::models::{canonical_ladder, Direction, Entry, Signal, SignalKind, TakeProfit, ZoneBounds};

/// Upper bound on `Lots=<n>` order counts; larger values are treated as typos.
pub const MAX_ORDER_COUNT: usize = 100;

macro_rules! re {
    ($pat:expr) => {
        LazyLock::new(|| Regex::new($pat).unwrap())
    };
}

const NUM: &str = r"[0-9]+(?:\.[0-9]+)?";

static RE_LOT_SIZE: LazyLock<Regex> =
    re!(r"(?i)\blot[ \t]*size[ \t]*[:=\-]?[ \t]*([0-9]+(?:\.[0-9]+)?|\.[0-9]+)");
static RE_LOTS_COUNT: LazyLock<Regex> = re!(&format!(r"(?i)\blots[ \t]*[:=][ \t]*({NUM})"));
static RE_SYMBOL: LazyLock<Regex> = re!(r"(?i)\b(?:symbol|pair)[ \t]*[:=][ \t]*([A-Z0-9._]+)");
static RE_ZONE_DIR: LazyLock<Regex> =
    re!(r"(?i)\b([A-Z][A-Z0-9._]*)[ \t]+(?:LOOKING[ \t]+)?(BUY|SELL)\b[^\n]*?\bZONE\b");
static RE_ZONE_SIDE: LazyLock<Regex> = re!(r"(?i)\b(BUY|SELL)\b[^\n]*?\bZONE\b");
static RE_ZONE_PAIR: LazyLock<Regex> = re!(&format!(r"\b({NUM})[ \t]*/[ \t]*({NUM})\b"));
static RE_SL: LazyLock<Regex> = re!(&format!(r"(?i)\bSL[ \t]*[:=\-]?[ \t]*({NUM})"));
static RE_TP_INDEXED: LazyLock<Regex> = re!(&format!(
    r"(?i)\bTP[ \t]*([1-9][0-9]?)[ \t]*(?:-*>|=>|[:=\-]|[ \t])[ \t]*(open|{NUM})\b"
));
static RE_SINGLE_TP: LazyLock<Regex> =
    re!(&format!(r"(?i)\bTP\b[ \t]*[:=]?[ \t]*(open|{NUM})\b"));
static RE_LIMIT_PRICE: LazyLock<Regex> =
    re!(&format!(r"(?i)\b(buy|sell)[ \t]*limit[ \t]*[:=]?[ \t]*({NUM})"));
static RE_LIMIT_SIDE: LazyLock<Regex> = re!(r"(?i)\b(buy|sell)[ \t]*limit\b");
static RE_ENTRY_PAIR: LazyLock<Regex> = re!(&format!(
    r"(?i)\b({NUM})[ \t]*(?:-+>|=+>|>)[ \t]*(?:tp[ \t]*[:=]?[ \t]*)?(open|{NUM})\b"
));
static RE_NOW: LazyLock<Regex> = re!(r"(?i)\b(buy|sell)[ \t]+now\b");
static RE_STOP_SIDE: LazyLock<Regex> = re!(r"(?i)\b(buy|sell)[ \t]*stop\b");

/// Outcome of trying one template against a message.
enum Attempt {
    Matched(Signal),
    /// A required token is absent; the next template is tried.
    Missing(&'static str),
    /// The template matched structurally but a value is unusable.
    Invalid(String),
}

type TemplateFn = fn(&SignalParser, &str) -> Attempt;

/// Templates in detection priority order.
const TEMPLATES: [(SignalKind, TemplateFn); 5] = [
    (SignalKind::Zone, SignalParser::parse_zone),
    (SignalKind::Repeat, SignalParser::parse_repeat),
    (SignalKind::MultiEntry, SignalParser::parse_multi_entry),
    (SignalKind::Market, SignalParser::parse_market),
    (SignalKind::StopLadder, SignalParser::parse_stop_ladder),
];

pub struct SignalParser {
    default_symbol: String,
}

impl SignalParser {
    pub fn new(default_symbol: impl Into<String>) -> Self {
        Self {
            default_symbol: default_symbol.into().to_uppercase(),
        }
    }

    /// Classify `text` against the templates and extract a normalized signal.
    /// The first template whose required tokens are all present wins.
    pub fn parse(&self, text: &str) -> Result<Signal, ParseFailure> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseFailure::new("empty message"));
        }

        let mut misses = Vec::with_capacity(TEMPLATES.len());
        for (kind, template) in TEMPLATES {
            match template(self, text) {
                Attempt::Matched(signal) => {
                    debug!("Template {} matched: {}", kind, signal.summary());
                    return Ok(signal);
                }
                Attempt::Invalid(reason) => {
                    return Err(ParseFailure::invalid(
                        kind,
                        format!("{} signal rejected: {}", kind, reason),
                    ));
                }
                Attempt::Missing(what) => misses.push(format!("{} needs {}", kind, what)),
            }
        }

        Err(ParseFailure::new(format!(
            "unrecognized signal format ({})",
            misses.join("; ")
        )))
    }

    fn parse_zone(&self, text: &str) -> Attempt {
        let Some(pair) = RE_ZONE_PAIR.captures(text) else {
            return Attempt::Missing("a <low>/<high> zone");
        };
        let Some(stop_loss) = capture_decimal(&RE_SL, text) else {
            return Attempt::Missing("SL <price>");
        };
        let (symbol, direction) = if let Some(c) = RE_ZONE_DIR.captures(text) {
            (c[1].to_uppercase(), side(&c[2]))
        } else if let Some(c) = RE_ZONE_SIDE.captures(text) {
            (self.default_symbol.clone(), side(&c[1]))
        } else {
            return Attempt::Missing("a 'BUY|SELL ... ZONE' phrase");
        };
        let (Some(a), Some(b)) = (decimal(&pair[1]), decimal(&pair[2])) else {
            return Attempt::Invalid(format!("unreadable zone '{}'", &pair[0]));
        };

        let targets = indexed_targets(text);
        Attempt::Matched(Signal {
            symbol,
            direction,
            kind: SignalKind::Zone,
            lot_size: lot_size(text),
            stop_loss: Some(stop_loss),
            entries: Vec::new(),
            zone: Some(ZoneBounds::new(a, b)),
            tp_ladder: canonical_ladder(direction, &targets),
            original_text: text.to_string(),
        })
    }

    fn parse_repeat(&self, text: &str) -> Attempt {
        let limits: Vec<Captures> = RE_LIMIT_PRICE.captures_iter(text).collect();
        if limits.is_empty() {
            return Attempt::Missing("'Buy limit=<price>' or 'Sell limit=<price>'");
        }
        if limits.len() > 1 || RE_ENTRY_PAIR.is_match(text) {
            return Attempt::Missing("a single limit entry");
        }
        let Some(lots) = RE_LOTS_COUNT.captures(text) else {
            return Attempt::Missing("Lots=<n>");
        };
        let tps: Vec<Captures> = RE_SINGLE_TP.captures_iter(text).collect();
        if tps.len() != 1 {
            return Attempt::Missing("a single TP <price|open>");
        }

        let count = match order_count(&lots[1]) {
            Ok(n) => n,
            Err(reason) => return Attempt::Invalid(reason),
        };
        let direction = side(&limits[0][1]);
        let Some(price) = decimal(&limits[0][2]) else {
            return Attempt::Invalid(format!("unreadable entry '{}'", &limits[0][2]));
        };
        let Some(tp) = target(&tps[0][1]) else {
            return Attempt::Invalid(format!("unreadable TP '{}'", &tps[0][1]));
        };

        let entries = (0..count)
            .map(|_| Entry {
                price: Some(price),
                tp: Some(tp),
            })
            .collect();

        Attempt::Matched(Signal {
            symbol: self.symbol(text),
            direction,
            kind: SignalKind::Repeat,
            lot_size: lot_size(text),
            stop_loss: capture_decimal(&RE_SL, text),
            entries,
            zone: None,
            tp_ladder: canonical_ladder(direction, &[tp]),
            original_text: text.to_string(),
        })
    }

    fn parse_multi_entry(&self, text: &str) -> Attempt {
        let sides: Vec<Direction> = RE_LIMIT_SIDE
            .captures_iter(text)
            .map(|c| side(&c[1]))
            .collect();
        if sides.is_empty() {
            return Attempt::Missing("'Buy limit' or 'Sell limit'");
        }
        let pairs = entry_pairs(text);
        if pairs.is_empty() {
            return Attempt::Missing("<entry> -> TP <tp> lines");
        }
        let Some(stop_loss) = capture_decimal(&RE_SL, text) else {
            return Attempt::Missing("SL <price>");
        };

        let direction = sides[0];
        if sides.iter().any(|s| *s != direction) {
            return Attempt::Invalid("mixed BUY and SELL limit entries".to_string());
        }
        let targets: Vec<TakeProfit> = pairs.iter().filter_map(|e| e.tp).collect();

        Attempt::Matched(Signal {
            symbol: self.symbol(text),
            direction,
            kind: SignalKind::MultiEntry,
            lot_size: lot_size(text),
            stop_loss: Some(stop_loss),
            entries: pairs,
            zone: None,
            tp_ladder: canonical_ladder(direction, &targets),
            original_text: text.to_string(),
        })
    }

    fn parse_market(&self, text: &str) -> Attempt {
        let Some(now) = RE_NOW.captures(text) else {
            return Attempt::Missing("'Buy Now' or 'Sell Now'");
        };
        let Some(lots) = RE_LOTS_COUNT.captures(text) else {
            return Attempt::Missing("Lots=<n>");
        };
        let targets = indexed_targets(text);
        if targets.is_empty() {
            return Attempt::Missing("a TP1->.. TPk->.. list");
        }

        let count = match order_count(&lots[1]) {
            Ok(n) => n,
            Err(reason) => return Attempt::Invalid(reason),
        };
        let direction = side(&now[1]);
        let entries = (0..count)
            .map(|i| Entry {
                price: None,
                tp: targets.get(i).copied(),
            })
            .collect();

        Attempt::Matched(Signal {
            symbol: self.symbol(text),
            direction,
            kind: SignalKind::Market,
            lot_size: lot_size(text),
            stop_loss: capture_decimal(&RE_SL, text),
            entries,
            zone: None,
            tp_ladder: canonical_ladder(direction, &targets),
            original_text: text.to_string(),
        })
    }

    fn parse_stop_ladder(&self, text: &str) -> Attempt {
        let Some(stop) = RE_STOP_SIDE.captures(text) else {
            return Attempt::Missing("'Buy Stop' or 'Sell Stop'");
        };
        let Some(lots) = RE_LOTS_COUNT.captures(text) else {
            return Attempt::Missing("Lots=<n>");
        };
        let mut pairs = entry_pairs(text);
        if pairs.is_empty() {
            return Attempt::Missing("<entry> -> TP <tp> lines");
        }

        let count = match order_count(&lots[1]) {
            Ok(n) => n,
            Err(reason) => return Attempt::Invalid(reason),
        };
        if pairs.len() > count {
            debug!(
                "Stop ladder lists {} entries but Lots={}; keeping the first {}",
                pairs.len(),
                count,
                count
            );
            pairs.truncate(count);
        }
        let direction = side(&stop[1]);
        let targets: Vec<TakeProfit> = pairs.iter().filter_map(|e| e.tp).collect();

        Attempt::Matched(Signal {
            symbol: self.symbol(text),
            direction,
            kind: SignalKind::StopLadder,
            lot_size: lot_size(text),
            stop_loss: capture_decimal(&RE_SL, text),
            entries: pairs,
            zone: None,
            tp_ladder: canonical_ladder(direction, &targets),
            original_text: text.to_string(),
        })
    }

    fn symbol(&self, text: &str) -> String {
        RE_SYMBOL
            .captures(text)
            .map(|c| c[1].to_uppercase())
            .unwrap_or_else(|| self.default_symbol.clone())
    }
}

fn decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.starts_with('.') {
        Decimal::from_str(&format!("0{}", s)).ok()
    } else {
        Decimal::from_str(s).ok()
    }
}

fn capture_decimal(re: &Regex, text: &str) -> Option<Decimal> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| decimal(m.as_str()))
}

fn target(s: &str) -> Option<TakeProfit> {
    if s.eq_ignore_ascii_case("open") {
        Some(TakeProfit::Open)
    } else {
        decimal(s).map(TakeProfit::Price)
    }
}

fn side(s: &str) -> Direction {
    if s.eq_ignore_ascii_case("sell") {
        Direction::Sell
    } else {
        Direction::Buy
    }
}

/// A zero lot is treated as "not given".
fn lot_size(text: &str) -> Option<Decimal> {
    capture_decimal(&RE_LOT_SIZE, text).filter(|l| *l > Decimal::ZERO)
}

fn order_count(raw: &str) -> Result<usize, String> {
    let n = decimal(raw).ok_or_else(|| format!("unreadable Lots '{}'", raw))?;
    if !n.fract().is_zero() {
        return Err(format!("Lots={} is not a whole order count", raw));
    }
    let count = n.to_usize().unwrap_or(0);
    if count == 0 {
        return Err("Lots must be at least 1".to_string());
    }
    if count > MAX_ORDER_COUNT {
        return Err(format!("Lots={} exceeds the limit of {}", count, MAX_ORDER_COUNT));
    }
    Ok(count)
}

/// `TP<n>` targets ordered by their index.
fn indexed_targets(text: &str) -> Vec<TakeProfit> {
    let mut indexed: Vec<(u32, TakeProfit)> = RE_TP_INDEXED
        .captures_iter(text)
        .filter_map(|c| {
            let idx = c[1].parse::<u32>().ok()?;
            Some((idx, target(&c[2])?))
        })
        .collect();
    indexed.sort_by_key(|(idx, _)| *idx);
    indexed.into_iter().map(|(_, t)| t).collect()
}

fn entry_pairs(text: &str) -> Vec<Entry> {
    RE_ENTRY_PAIR
        .captures_iter(text)
        .filter_map(|c| {
            Some(Entry {
                price: Some(decimal(&c[1])?),
                tp: Some(target(&c[2])?),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::d;

    fn parser() -> SignalParser {
        SignalParser::new("XAUUSD")
    }

    const ZONE_SIGNAL: &str = "XAUUSD LOOKING BUY THIS ZONE\n\
        3463/3459\n\
        SL 3453\n\
        TP1 3467\n\
        TP2 3470\n\
        TP3 open";

    #[test]
    fn zone_signal_extracts_everything() {
        let s = parser().parse(ZONE_SIGNAL).unwrap();
        assert_eq!(s.kind, SignalKind::Zone);
        assert_eq!(s.symbol, "XAUUSD");
        assert_eq!(s.direction, Direction::Buy);
        assert_eq!(s.zone, Some(ZoneBounds::new(d("3459"), d("3463"))));
        assert_eq!(s.stop_loss, Some(d("3453")));
        assert_eq!(s.lot_size, None);
        assert_eq!(
            s.tp_ladder,
            vec![
                TakeProfit::Price(d("3467")),
                TakeProfit::Price(d("3470")),
                TakeProfit::Open
            ]
        );
        assert_eq!(s.first_numeric_tp(), Some(d("3467")));
    }

    #[test]
    fn zone_sell_with_lot_and_lowercase() {
        let text = "gbpjpy looking sell this zone\n198.50/199.10\nsl: 199.60\ntp1: 198.20\ntp2 197.90\nLot size: 0.05";
        let s = parser().parse(text).unwrap();
        assert_eq!(s.symbol, "GBPJPY");
        assert_eq!(s.direction, Direction::Sell);
        assert_eq!(s.lot_size, Some(d("0.05")));
        assert_eq!(s.numeric_tps(), vec![d("198.20"), d("197.90")]);
    }

    #[test]
    fn zone_without_symbol_uses_default() {
        let s = parser()
            .parse("SELL ZONE 2400/2405\nSL 2410\nTP1 2395")
            .unwrap();
        assert_eq!(s.symbol, "XAUUSD");
        assert_eq!(s.direction, Direction::Sell);
    }

    #[test]
    fn repeat_signal_expands_order_count() {
        let text = "Lot size=0.10\nLots=10\nBuy limit= 3410\nTP 3420\nSL 3400";
        let s = parser().parse(text).unwrap();
        assert_eq!(s.kind, SignalKind::Repeat);
        assert_eq!(s.entries.len(), 10);
        assert!(s.entries.iter().all(|e| e.price == Some(d("3410"))
            && e.tp == Some(TakeProfit::Price(d("3420")))));
        assert_eq!(s.lot_size, Some(d("0.10")));
        assert_eq!(s.stop_loss, Some(d("3400")));
    }

    #[test]
    fn repeat_with_open_tp() {
        let s = parser()
            .parse("Lots=3\nSell limit=2450\nTP open\nSL 2460")
            .unwrap();
        assert_eq!(s.entries.len(), 3);
        assert_eq!(s.entries[0].tp, Some(TakeProfit::Open));
        assert!(s.numeric_tps().is_empty());
    }

    #[test]
    fn repeat_rejects_fractional_count() {
        let err = parser()
            .parse("Lots=2.5\nBuy limit=3410\nTP 3420\nSL 3400")
            .unwrap_err();
        assert!(err.reason.contains("REPEAT"));
        assert!(err.reason.contains("whole"));
        assert_eq!(err.template, Some(SignalKind::Repeat));
    }

    #[test]
    fn multi_entry_with_header() {
        let text = "Lot size=0.20\nBuy limit\n3410 ->Tp 3412\n3408 ->Tp 3414\n3406 -> TP open\nSL 3350";
        let s = parser().parse(text).unwrap();
        assert_eq!(s.kind, SignalKind::MultiEntry);
        assert_eq!(s.entries.len(), 3);
        assert_eq!(s.entries[1].price, Some(d("3408")));
        assert_eq!(s.entries[1].tp, Some(TakeProfit::Price(d("3414"))));
        assert_eq!(s.entries[2].tp, Some(TakeProfit::Open));
        assert_eq!(s.stop_loss, Some(d("3350")));
    }

    #[test]
    fn multi_entry_per_line_sides() {
        let text = "Sell limit 2450 -> TP 2440\nSell limit 2455 -> TP 2442\nSL 2470";
        let s = parser().parse(text).unwrap();
        assert_eq!(s.kind, SignalKind::MultiEntry);
        assert_eq!(s.direction, Direction::Sell);
        assert_eq!(s.numeric_tps(), vec![d("2442"), d("2440")]);
    }

    #[test]
    fn multi_entry_mixed_sides_fails() {
        let text = "Buy limit 2450 -> TP 2460\nSell limit 2455 -> TP 2442\nSL 2470";
        let err = parser().parse(text).unwrap_err();
        assert!(err.reason.contains("mixed"));
        assert_eq!(err.template, Some(SignalKind::MultiEntry));
    }

    #[test]
    fn market_assigns_tps_by_index() {
        let text = "Buy Now\nLots=6\nTP1->3470\nTP2->3475\nTP3->3480\nTP4->3485\nTP5->3490\nTP6->open\nSL 3450";
        let s = parser().parse(text).unwrap();
        assert_eq!(s.kind, SignalKind::Market);
        assert_eq!(s.entries.len(), 6);
        assert!(s.entries.iter().all(|e| e.price.is_none()));
        assert_eq!(s.entries[0].tp, Some(TakeProfit::Price(d("3470"))));
        assert_eq!(s.entries[4].tp, Some(TakeProfit::Price(d("3490"))));
        assert_eq!(s.entries[5].tp, Some(TakeProfit::Open));
    }

    #[test]
    fn market_more_orders_than_tps() {
        let s = parser()
            .parse("Sell now\nLots=3\nTP1->2440\nSymbol=eurusd")
            .unwrap();
        assert_eq!(s.symbol, "EURUSD");
        assert_eq!(s.entries[2].tp, None);
    }

    #[test]
    fn stop_ladder_caps_entries_at_lots() {
        let text = "Buy Stop\nLots=2\n3480 -> TP 3490\n3485 -> TP 3495\n3490 -> TP 3500\nSL 3470";
        let s = parser().parse(text).unwrap();
        assert_eq!(s.kind, SignalKind::StopLadder);
        assert_eq!(s.entries.len(), 2);
        assert_eq!(s.entries[1].price, Some(d("3485")));
    }

    #[test]
    fn garbage_yields_reason() {
        let err = parser().parse("good morning traders").unwrap_err();
        assert!(err.reason.starts_with("unrecognized signal format"));
        assert!(err.reason.contains("ZONE needs"));
        assert!(err.reason.contains("STOP_LADDER needs"));
        assert!(!err.is_recognised());
        assert_eq!(parser().parse("   ").unwrap_err().reason, "empty message");
    }
}
