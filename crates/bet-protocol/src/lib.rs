//! Betting Protocol - wire format and consensus constants
//!
//! Everything consensus-fixed that does not touch the ledger lives here:
//! the chain primitives the engines are expressed against, the betting
//! transaction sum type with its OP_RETURN encoding, the height-indexed
//! protocol parameters, and the fixed-point odds math.

pub mod chain;
pub mod market;
pub mod odds;
pub mod params;
pub mod tx;

pub use chain::{Block, OutPoint, Script, Transaction, TxId, TxIn, TxOut, COIN};
pub use market::{
    ContenderPlace, FieldGroup, FieldMarket, MappingKind, MarketFilter, Outcome, QuickGameKind,
    ResultKind,
};
pub use odds::{effective_odds, payout_and_burn, ODDS_DIVISOR};
pub use params::{ConsensusParams, ProtocolVersion};
pub use tx::{encode_betting_tx, parse_betting_tx, BettingTx};
