//! Consensus engines for the betting ledger.
//!
//! Four engines, all driven by the node through a [`LedgerOverlay`]:
//! - validation ([`check_betting_tx`]): reject malformed or unpayable
//!   betting transactions before they enter a block,
//! - processing ([`process_betting_tx`]): apply a connecting block's
//!   betting outputs to the overlay,
//! - payouts ([`get_betting_payouts`], [`is_block_payouts_valid`]):
//!   reconstruct and check the bet payouts a block must carry,
//! - undo ([`betting_undo`]): reverse all of it on disconnection.
//!
//! The node side of the chain (transaction lookup, block reads, oracle
//! keys, sporks, settlement formulas) is abstracted behind the traits in
//! [`context`] and [`payout::PayoutResolver`].
//!
//! [`LedgerOverlay`]: bet_ledger::view::LedgerOverlay

pub mod context;
pub mod error;
pub mod payout;
pub mod process;
pub mod undo;
pub mod validate;

pub use context::{ChainContext, OracleAuth, SporkSet};
pub use error::{CheckError, UndoError};
pub use payout::{
    extract_payouts, get_betting_payouts, is_block_payouts_valid, PayoutExtract, PayoutItem,
    PayoutResolver,
};
pub use process::process_betting_tx;
pub use undo::{betting_undo, undo_betting_tx, undo_event_changes};
pub use validate::check_betting_tx;

#[cfg(test)]
mod tests;
