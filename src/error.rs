use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::SignalKind;

/// Signal text matched no template, or matched one with unusable values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: String,
    /// Template the text was recognised as; `None` for plain chatter.
    pub template: Option<SignalKind>,
}

impl ParseFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            template: None,
        }
    }

    pub fn invalid(template: SignalKind, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            template: Some(template),
        }
    }

    /// A recognised signal that was dropped, as opposed to unrelated text.
    pub fn is_recognised(&self) -> bool {
        self.template.is_some()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The first word is not a command verb; the text may still be a signal.
    #[error("not a command")]
    NotACommand,

    #[error("{verb}: {reason}")]
    Malformed { verb: String, reason: String },
}

impl CommandError {
    pub fn malformed(verb: &str, reason: impl Into<String>) -> Self {
        CommandError::Malformed {
            verb: verb.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("symbol '{0}' could not be resolved to a tradable instrument")]
    UnresolvedSymbol(String),

    #[error("no positive lot size could be resolved")]
    NoPositiveLot,

    #[error("rung {rung}: volume {volume} is not positive")]
    InvalidVolume { rung: usize, volume: Decimal },

    #[error("signal produced no orders")]
    EmptyLadder,

    #[error("zone ladder has {count} rungs, limit is {max}")]
    TooManyRungs { count: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file format: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{op} timed out")]
    Timeout { op: String },

    #[error("gateway unreachable: {0}")]
    Connectivity(String),

    #[error("rejected ({code}): {reason}")]
    Rejected { code: u32, reason: String },

    #[error("unknown ticket {0}")]
    UnknownTicket(u64),

    #[error("no quote for {0}")]
    NoQuote(String),
}

impl GatewayError {
    pub fn rejected(code: u32, reason: impl Into<String>) -> Self {
        GatewayError::Rejected {
            code,
            reason: reason.into(),
        }
    }

    /// Transient failures are retried on the next tick or command;
    /// rejections are final for that request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Connectivity(_)
        )
    }
}
