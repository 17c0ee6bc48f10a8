use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

use crate::error::CommandError;
use crate::models::{
    CommandKind, CommandParams, Direction, ManagementCommand, OrderType, PnlFilter, SymbolFilter,
};

/// Operator controls that change the bot itself rather than broker state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    GetId,
    /// Place the last parsed signal.
    Place,
    /// Dashboard fixed lot; `None` switches it off.
    Lot(Option<Decimal>),
    AutoPlace(bool),
    Status,
}

/// Parses chat commands. Matching is case-insensitive, the leading `/` is
/// optional and any amount of whitespace separates words.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandInterpreter;

/// Split into words, dropping a leading `/` and a `@botname` suffix on the verb.
fn words(text: &str) -> Vec<String> {
    let mut out: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    if let Some(first) = out.first_mut() {
        let verb = first.trim_start_matches('/');
        let verb = verb.split('@').next().unwrap_or(verb);
        *first = verb.to_lowercase();
    }
    out
}

fn price(verb: &str, token: Option<&String>, what: &str) -> Result<Decimal, CommandError> {
    let token = token.ok_or_else(|| CommandError::malformed(verb, format!("missing {}", what)))?;
    Decimal::from_str(token)
        .map_err(|_| CommandError::malformed(verb, format!("'{}' is not a valid {}", token, what)))
}

fn direction_word(token: &str) -> Option<Direction> {
    Direction::from_str(token).ok()
}

fn is_symbol(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '#')
}

/// Loose filter words after a verb: `all`, a symbol, a side and, when
/// `pnl_words` is set, `profit`/`loss`. Order does not matter.
struct Filters {
    symbol: SymbolFilter,
    direction: Option<Direction>,
    pnl: PnlFilter,
}

fn filters(verb: &str, args: &[String], pnl_words: bool) -> Result<Filters, CommandError> {
    let mut out = Filters {
        symbol: SymbolFilter::All,
        direction: None,
        pnl: PnlFilter::Any,
    };
    let mut symbol_seen = false;
    for arg in args {
        let lower = arg.to_lowercase();
        match lower.as_str() {
            "all" => {}
            "profit" | "profits" | "winning" if pnl_words => out.pnl = PnlFilter::Profit,
            "loss" | "losses" | "losing" if pnl_words => out.pnl = PnlFilter::Loss,
            "profit" | "profits" | "winning" | "loss" | "losses" | "losing" => {
                return Err(CommandError::malformed(
                    verb,
                    format!("'{}' only applies to close", arg),
                ))
            }
            _ if direction_word(&lower).is_some() => out.direction = direction_word(&lower),
            _ if is_symbol(arg) => {
                if symbol_seen {
                    return Err(CommandError::malformed(verb, format!("unexpected '{}'", arg)));
                }
                symbol_seen = true;
                out.symbol = SymbolFilter::Symbol(arg.to_uppercase());
            }
            _ => return Err(CommandError::malformed(verb, format!("unexpected '{}'", arg))),
        }
    }
    Ok(out)
}

fn command(kind: CommandKind, f: Filters) -> ManagementCommand {
    ManagementCommand::new(kind, f.symbol)
        .with_direction(f.direction)
        .with_pnl(f.pnl)
}

impl CommandInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Parse a management command. Text whose first word is not a command
    /// verb yields `NotACommand` so it can be tried as a signal.
    pub fn parse(&self, text: &str) -> Result<ManagementCommand, CommandError> {
        let words = words(text);
        let Some((verb, args)) = words.split_first() else {
            return Err(CommandError::NotACommand);
        };

        let cmd = match verb.as_str() {
            "cancel" => command(CommandKind::Cancel, filters(verb, args, false)?),
            "cancelall" => ManagementCommand::new(CommandKind::Cancel, SymbolFilter::All),
            "delete" => self.parse_delete(args)?,
            "close" => command(CommandKind::Close, filters(verb, args, true)?),
            "closeall" => ManagementCommand::new(CommandKind::Close, SymbolFilter::All),
            "closeprofit" | "closeprofits" => {
                ManagementCommand::new(CommandKind::Close, SymbolFilter::All).with_pnl(PnlFilter::Profit)
            }
            "closeloss" | "closelosses" => {
                ManagementCommand::new(CommandKind::Close, SymbolFilter::All).with_pnl(PnlFilter::Loss)
            }
            "kill" => command(CommandKind::Kill, filters(verb, args, false)?),
            "be" => {
                if args.is_empty() {
                    return Err(CommandError::malformed("be", "needs a symbol or 'all'"));
                }
                command(CommandKind::BreakEven, filters(verb, args, false)?)
            }
            // A bare "SL 3450" line starts many signals.
            "sl" if args.first().is_some_and(|a| a.eq_ignore_ascii_case("move")) => {
                self.parse_sl_move(&args[1..])?
            }
            "ch" => self.parse_change(args)?,
            _ => return Err(CommandError::NotACommand),
        };

        debug!("Command parsed: {:?}", cmd);
        Ok(cmd)
    }

    /// `delete pending|orders [SYM|all] [BUY|SELL]`, `delete [SYM|all]`,
    /// `delete order <price> <SYM> <BUY|SELL>`.
    fn parse_delete(&self, args: &[String]) -> Result<ManagementCommand, CommandError> {
        let first = args.first().map(|a| a.to_lowercase());
        match first.as_deref() {
            Some("order") if args.get(1).is_some_and(|a| Decimal::from_str(a).is_ok()) => {
                let at = price("delete", args.get(1), "price")?;
                let rest = filters("delete", &args[2..], false)?;
                if rest.symbol == SymbolFilter::All || rest.direction.is_none() {
                    return Err(CommandError::malformed(
                        "delete",
                        "usage: delete order <price> <SYMBOL> <BUY|SELL>",
                    ));
                }
                let mut cmd = command(CommandKind::Cancel, rest);
                cmd.params.price = Some(at);
                Ok(cmd)
            }
            Some("pending") | Some("orders") | Some("order") => {
                Ok(command(CommandKind::Cancel, filters("delete", &args[1..], false)?))
            }
            _ => Ok(command(CommandKind::Cancel, filters("delete", args, false)?)),
        }
    }

    /// `sl move <from> to <to> <SYM|all> [BUY|SELL]`
    fn parse_sl_move(&self, args: &[String]) -> Result<ManagementCommand, CommandError> {
        let (from, to, rest) = from_to("sl move", args)?;
        if rest.is_empty() {
            return Err(CommandError::malformed("sl move", "needs a symbol or 'all'"));
        }
        let mut cmd = command(CommandKind::SlMove, filters("sl move", rest, false)?);
        cmd.params = CommandParams {
            from_price: Some(from),
            to_price: Some(to),
            price: None,
        };
        Ok(cmd)
    }

    /// `ch buylimit|selllimit|buystop|sellstop <from> to <to> <SYM>`
    fn parse_change(&self, args: &[String]) -> Result<ManagementCommand, CommandError> {
        let target = args
            .first()
            .map(|a| a.to_lowercase())
            .ok_or_else(|| CommandError::malformed("ch", "missing order type"))?;
        let (direction, order_type) = match target.as_str() {
            "buylimit" => (Direction::Buy, OrderType::Limit),
            "selllimit" => (Direction::Sell, OrderType::Limit),
            "buystop" => (Direction::Buy, OrderType::Stop),
            "sellstop" => (Direction::Sell, OrderType::Stop),
            other => {
                return Err(CommandError::malformed(
                    "ch",
                    format!("unknown order type '{}'", other),
                ))
            }
        };
        let (from, to, rest) = from_to("ch", &args[1..])?;
        let f = filters("ch", rest, false)?;
        if f.symbol == SymbolFilter::All {
            return Err(CommandError::malformed("ch", "needs a symbol"));
        }
        let mut cmd = ManagementCommand::new(CommandKind::ChangePrice, f.symbol)
            .with_direction(Some(direction));
        cmd.filters.order_type = Some(order_type);
        cmd.params = CommandParams {
            from_price: Some(from),
            to_price: Some(to),
            price: None,
        };
        Ok(cmd)
    }

    /// Parse an operator directive (`getid`, `place`, `lot`, `autoplace`, `status`).
    pub fn parse_directive(&self, text: &str) -> Result<Directive, CommandError> {
        if text.trim().contains('\n') {
            return Err(CommandError::NotACommand);
        }
        let words = words(text);
        let Some((verb, args)) = words.split_first() else {
            return Err(CommandError::NotACommand);
        };
        let arg = args.first().map(|a| a.to_lowercase());

        match (verb.as_str(), arg.as_deref()) {
            ("getid", _) => Ok(Directive::GetId),
            ("place", None) => Ok(Directive::Place),
            ("status", None) => Ok(Directive::Status),
            ("lot", Some("off" | "auto" | "none")) => Ok(Directive::Lot(None)),
            ("lot", Some(raw)) => match Decimal::from_str(raw) {
                Ok(lot) if lot > Decimal::ZERO => Ok(Directive::Lot(Some(lot))),
                Ok(_) => Err(CommandError::malformed("lot", "lot must be positive")),
                // "Lot size=0.10" opens a signal, not a directive.
                Err(_) => Err(CommandError::NotACommand),
            },
            ("lot", None) => Err(CommandError::malformed("lot", "usage: lot <size>|off")),
            ("autoplace", Some("on" | "true" | "1")) => Ok(Directive::AutoPlace(true)),
            ("autoplace", Some("off" | "false" | "0")) => Ok(Directive::AutoPlace(false)),
            ("autoplace", _) => Err(CommandError::malformed("autoplace", "usage: autoplace on|off")),
            _ => Err(CommandError::NotACommand),
        }
    }
}

/// `<from> to <to> rest...`
fn from_to<'a>(verb: &str, args: &'a [String]) -> Result<(Decimal, Decimal, &'a [String]), CommandError> {
    let from = price(verb, args.first(), "from price")?;
    if !args.get(1).is_some_and(|w| w.eq_ignore_ascii_case("to")) {
        return Err(CommandError::malformed(verb, "expected '<from> to <to>'"));
    }
    let to = price(verb, args.get(2), "to price")?;
    Ok((from, to, args.get(3..).unwrap_or(&[])))
}
