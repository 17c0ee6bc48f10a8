pub mod paper;
pub mod source;
pub mod symbols;

pub use paper::PaperGateway;
pub use source::{MessageSource, ScriptedSource, StdinSource};
pub use symbols::SymbolResolver;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;
use crate::models::{OrderRequest, PendingOrder, Position, Quote, SymbolConstraints, Ticket};

/// Broker order book and position access.
///
/// A `magic` filter of `None` lists every order regardless of owner.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place(&self, order: &OrderRequest) -> Result<Ticket, GatewayError>;
    async fn modify_sl(&self, ticket: Ticket, new_sl: Decimal) -> Result<(), GatewayError>;
    /// Move a pending order to a new entry price.
    async fn modify_price(&self, ticket: Ticket, new_price: Decimal) -> Result<(), GatewayError>;
    async fn list_positions(&self, magic: Option<u64>) -> Result<Vec<Position>, GatewayError>;
    async fn list_pending(&self, magic: Option<u64>) -> Result<Vec<PendingOrder>, GatewayError>;
    async fn cancel(&self, ticket: Ticket) -> Result<(), GatewayError>;
    async fn close(&self, ticket: Ticket) -> Result<(), GatewayError>;
    async fn quote(&self, symbol: &str) -> Result<Quote, GatewayError>;
}

#[async_trait]
pub trait InstrumentMetadata: Send + Sync {
    /// Constraints for an exact broker symbol name, `None` when unknown.
    async fn constraints(&self, symbol: &str) -> Option<SymbolConstraints>;
}

/// Bound a gateway call; an elapsed deadline becomes `GatewayError::Timeout`.
pub async fn with_timeout<T, F>(op: &str, limit: Duration, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout { op: op.to_string() }),
    }
}
