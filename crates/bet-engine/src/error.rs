//! Engine error taxonomy.

use thiserror::Error;

use bet_ledger::LedgerError;
use bet_protocol::market::{FieldMarket, MappingKind};

/// Why validation rejected a betting transaction.
///
/// Every variant is an ordinary, expected consensus outcome; it rejects
/// the transaction (and the block carrying it) but never halts the node.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("betting transactions are temporarily disabled for maintenance")]
    MaintenanceMode,
    #[error("bet placed with invalid amount {amount}")]
    BetOutOfRange { amount: i64 },
    #[error("invalid parlay bet leg count {count}")]
    TooManyParlayLegs { count: usize },
    #[error("parlay bet has legs with the same event id {event_id}")]
    DuplicateParlayLeg { event_id: u32 },
    #[error("failed to find event {event_id}")]
    UnknownEvent { event_id: u32 },
    #[error("bet placed on resulted event {event_id}")]
    EventResulted { event_id: u32 },
    #[error("bet potential odds are zero for event {event_id}")]
    DeadMarket { event_id: u32 },
    #[error("multi-stage event {event_id} cannot be part of a parlay bet")]
    MultiStageEvent { event_id: u32 },
    #[error("market {market:?} is closed for event {event_id}")]
    MarketClosed { event_id: u32, market: FieldMarket },
    #[error("unknown contender {contender_id} for event {event_id}")]
    UnknownContender { event_id: u32, contender_id: u32 },
    #[error("chain and quick games transactions are disabled")]
    QuickGamesRetired,
    #[error("chain games bet amount {amount} does not equal entry fee {entry_fee}")]
    EntryFeeMismatch { amount: i64, entry_fee: i64 },
    #[error("{kind} is not active at this height")]
    PrematureKind { kind: &'static str },
    #[error("oracle transaction from a non-oracle address")]
    UnauthorizedOracle,
    #[error("mapping {kind:?}/{id} already exists")]
    DuplicateMapping { kind: MappingKind, id: u32 },
    #[error("event {event_id} already exists")]
    DuplicateEvent { event_id: u32 },
    #[error("unknown mapping {kind:?}/{id}")]
    UnknownMapping { kind: MappingKind, id: u32 },
    #[error("result already exists for event {event_id}")]
    DuplicateResult { event_id: u32 },
    #[error("unsupported result kind for field event {event_id}")]
    UnsupportedResultKind { event_id: u32 },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Fatal inconsistency found while disconnecting a block.
///
/// Any of these aborts the disconnect; a node cannot continue with a
/// half-reverted ledger.
#[derive(Debug, Error)]
pub enum UndoError {
    #[error("undo snapshot height {snapshot} does not match disconnect height {expected}")]
    HeightMismatch { snapshot: i64, expected: i64 },
    #[error("failed to revert {what}")]
    RevertFailed { what: &'static str },
    #[error("mapping kind is not active at the undo height")]
    PrematureMapping,
    #[error("payout reversal failed: {0}")]
    PayoutReversal(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
