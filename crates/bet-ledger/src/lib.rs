//! Betting ledger state.
//!
//! The ledger is a set of typed tables (events, bets, results, mappings,
//! payout audit rows, undo logs) over a pluggable key/value store. An
//! in-memory backend serves tests and reorg scratch work; the sled
//! backend persists across restarts. Block connection mutates state
//! through an overlay so a failed block never leaks partial writes.

pub mod entities;
pub mod store;
pub mod view;

pub use entities::{
    BetKey, BetRecord, ChainGamesBetRecord, ChainGamesEventRecord, ChainGamesResultRecord,
    ContenderInfo, EventKey, EventRecord, FieldBetRecord, FieldEventRecord, FieldResultRecord,
    KeyEncode, MappingKey, MappingRecord, PayoutInfo, PayoutKind, QuickGamesBetRecord,
    ResultRecord, UndoEntry, UndoKey, UndoSnapshot,
};
pub use store::{KvStore, MemoryStore, SledStore, StoreError};
pub use view::{
    BettingLedger, Bets, ChainGamesBets, ChainGamesEvents, ChainGamesResults, Events, FailedTxs,
    FieldBets, FieldEvents, FieldResults, LedgerError, LedgerOverlay, LedgerTable, Mappings,
    PayoutsInfo, QuickGamesBets, Results, Undos,
};
