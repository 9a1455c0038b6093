//! Collaborator seams provided by the host node.
//!
//! The engines never reach for globals; everything chain-shaped comes in
//! through these traits so tests can stub the surrounding node.

use bet_protocol::chain::{Block, Script, Transaction, TxId};

/// Block and transaction lookup against the active chain.
pub trait ChainContext {
    fn get_transaction(&self, txid: &TxId) -> Option<Transaction>;
    fn read_block(&self, height: i64) -> Option<Block>;
    fn tip_height(&self) -> i64;
}

/// Height-windowed oracle key set.
pub trait OracleAuth {
    /// Whether `script` belongs to an oracle key valid at `height`.
    fn is_oracle_script(&self, script: &Script, height: i64) -> bool;
    /// Dev and OMNO fee payout scripts for `height`, if configured.
    fn fee_payout_scripts(&self, height: i64) -> Option<(Script, Script)>;
}

/// Runtime feature flags broadcast over the spork channel.
pub trait SporkSet {
    /// Height from which betting transactions are rejected outright.
    fn betting_maintenance_height(&self) -> i64;
}
