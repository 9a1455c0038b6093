//! Typed views over the raw key/value store.
//!
//! [`BettingLedger`] is the committed state; [`LedgerOverlay`] stages one
//! block's mutations on top of it and either flushes them in a batch or
//! discards them when validation fails. The locked, pre-block view that
//! bet pricing reads is simply the overlay's base ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::entities::{
    BetKey, BetRecord, ChainGamesBetRecord, ChainGamesEventRecord, ChainGamesResultRecord,
    EventKey, EventRecord, FieldBetRecord, FieldEventRecord, FieldResultRecord, KeyEncode,
    MappingKey, MappingRecord, PayoutInfo, QuickGamesBetRecord, ResultRecord, UndoEntry, UndoKey,
};
use crate::store::{KvStore, StoreError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("codec error: {0}")]
    Codec(String),
}

/// A typed table: a name, a key encoding and a record type.
pub trait LedgerTable {
    const NAME: &'static str;
    type Key: KeyEncode;
    type Value: Serialize + DeserializeOwned;
}

macro_rules! ledger_table {
    ($table:ident, $name:literal, $key:ty, $value:ty) => {
        pub struct $table;
        impl LedgerTable for $table {
            const NAME: &'static str = $name;
            type Key = $key;
            type Value = $value;
        }
    };
}

ledger_table!(Events, "events", EventKey, EventRecord);
ledger_table!(FieldEvents, "field-events", EventKey, FieldEventRecord);
ledger_table!(Results, "results", EventKey, ResultRecord);
ledger_table!(FieldResults, "field-results", EventKey, FieldResultRecord);
ledger_table!(Mappings, "mappings", MappingKey, MappingRecord);
ledger_table!(Bets, "bets", BetKey, BetRecord);
ledger_table!(FieldBets, "field-bets", BetKey, FieldBetRecord);
ledger_table!(ChainGamesEvents, "cg-events", EventKey, ChainGamesEventRecord);
ledger_table!(ChainGamesBets, "cg-bets", BetKey, ChainGamesBetRecord);
ledger_table!(ChainGamesResults, "cg-results", EventKey, ChainGamesResultRecord);
ledger_table!(QuickGamesBets, "qg-bets", BetKey, QuickGamesBetRecord);
ledger_table!(PayoutsInfo, "payouts-info", BetKey, PayoutInfo);
ledger_table!(Undos, "undos", UndoKey, Vec<UndoEntry>);
ledger_table!(FailedTxs, "failed-txs", UndoKey, u8);

fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>, LedgerError> {
    bincode::serialize(value).map_err(|e| LedgerError::Codec(e.to_string()))
}

fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, LedgerError> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Codec(e.to_string()))
}

/// Committed betting state over an arbitrary [`KvStore`] backend.
#[derive(Clone)]
pub struct BettingLedger {
    store: Arc<dyn KvStore>,
}

impl BettingLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn read<T: LedgerTable>(&self, key: &T::Key) -> Result<Option<T::Value>, LedgerError> {
        match self.store.get(T::NAME, &key.to_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists<T: LedgerTable>(&self, key: &T::Key) -> Result<bool, LedgerError> {
        Ok(self.store.contains(T::NAME, &key.to_bytes())?)
    }

    /// Create-only insert; returns false and leaves the row untouched if
    /// the key is already present.
    pub fn write<T: LedgerTable>(
        &self,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<bool, LedgerError> {
        let key_bytes = key.to_bytes();
        if self.store.contains(T::NAME, &key_bytes)? {
            return Ok(false);
        }
        self.store.put(T::NAME, &key_bytes, &encode(value)?)?;
        Ok(true)
    }

    /// Replace an existing row; returns false if the key is absent.
    pub fn update<T: LedgerTable>(
        &self,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<bool, LedgerError> {
        let key_bytes = key.to_bytes();
        if !self.store.contains(T::NAME, &key_bytes)? {
            return Ok(false);
        }
        self.store.put(T::NAME, &key_bytes, &encode(value)?)?;
        Ok(true)
    }

    /// Insert or replace unconditionally.
    pub fn upsert<T: LedgerTable>(
        &self,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<(), LedgerError> {
        self.store.put(T::NAME, &key.to_bytes(), &encode(value)?)?;
        Ok(())
    }

    pub fn erase<T: LedgerTable>(&self, key: &T::Key) -> Result<bool, LedgerError> {
        Ok(self.store.delete(T::NAME, &key.to_bytes())?)
    }

    /// Key-ordered scan of a whole table.
    pub fn scan<T: LedgerTable>(&self) -> Result<Vec<(Vec<u8>, T::Value)>, LedgerError> {
        let rows = self.store.scan_prefix(T::NAME, &[])?;
        rows.into_iter()
            .map(|(key, bytes)| Ok((key, decode(&bytes)?)))
            .collect()
    }

    /// Key-ordered scan of the rows whose key starts with `prefix`.
    pub fn scan_prefix<T: LedgerTable>(
        &self,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, T::Value)>, LedgerError> {
        let rows = self.store.scan_prefix(T::NAME, prefix)?;
        rows.into_iter()
            .map(|(key, bytes)| Ok((key, decode(&bytes)?)))
            .collect()
    }
}

#[derive(Clone, Debug)]
enum PendingOp {
    Put(Vec<u8>),
    Del,
}

/// Staged mutations for one block on top of a committed ledger.
pub struct LedgerOverlay<'a> {
    base: &'a BettingLedger,
    pending: HashMap<&'static str, BTreeMap<Vec<u8>, PendingOp>>,
}

impl<'a> LedgerOverlay<'a> {
    pub fn new(base: &'a BettingLedger) -> Self {
        Self {
            base,
            pending: HashMap::new(),
        }
    }

    /// The pre-block view under this overlay. Bet pricing reads locked
    /// odds from here so every bet in a block prices against the same
    /// state.
    pub fn base(&self) -> &BettingLedger {
        self.base
    }

    fn pending_get(&self, table: &'static str, key: &[u8]) -> Option<&PendingOp> {
        self.pending.get(table)?.get(key)
    }

    fn pending_set(&mut self, table: &'static str, key: Vec<u8>, op: PendingOp) {
        self.pending.entry(table).or_default().insert(key, op);
    }

    pub fn read<T: LedgerTable>(&self, key: &T::Key) -> Result<Option<T::Value>, LedgerError> {
        let key_bytes = key.to_bytes();
        match self.pending_get(T::NAME, &key_bytes) {
            Some(PendingOp::Put(bytes)) => Ok(Some(decode(bytes)?)),
            Some(PendingOp::Del) => Ok(None),
            None => self.base.read::<T>(key),
        }
    }

    pub fn exists<T: LedgerTable>(&self, key: &T::Key) -> Result<bool, LedgerError> {
        let key_bytes = key.to_bytes();
        match self.pending_get(T::NAME, &key_bytes) {
            Some(PendingOp::Put(_)) => Ok(true),
            Some(PendingOp::Del) => Ok(false),
            None => self.base.exists::<T>(key),
        }
    }

    /// Create-only insert through the overlay.
    pub fn write<T: LedgerTable>(
        &mut self,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<bool, LedgerError> {
        if self.exists::<T>(key)? {
            return Ok(false);
        }
        self.pending_set(T::NAME, key.to_bytes(), PendingOp::Put(encode(value)?));
        Ok(true)
    }

    /// Replace-only write through the overlay.
    pub fn update<T: LedgerTable>(
        &mut self,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<bool, LedgerError> {
        if !self.exists::<T>(key)? {
            return Ok(false);
        }
        self.pending_set(T::NAME, key.to_bytes(), PendingOp::Put(encode(value)?));
        Ok(true)
    }

    pub fn upsert<T: LedgerTable>(
        &mut self,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<(), LedgerError> {
        self.pending_set(T::NAME, key.to_bytes(), PendingOp::Put(encode(value)?));
        Ok(())
    }

    pub fn erase<T: LedgerTable>(&mut self, key: &T::Key) -> Result<bool, LedgerError> {
        let present = self.exists::<T>(key)?;
        self.pending_set(T::NAME, key.to_bytes(), PendingOp::Del);
        Ok(present)
    }

    /// Record the pre-mutation snapshots of one betting output. A betting
    /// output mutates state at most once, so this is a plain write; an
    /// empty batch still leaves a record behind.
    pub fn save_betting_undo(
        &mut self,
        key: &UndoKey,
        entries: Vec<UndoEntry>,
    ) -> Result<(), LedgerError> {
        self.upsert::<Undos>(key, &entries)
    }

    pub fn get_betting_undo(&self, key: &UndoKey) -> Result<Vec<UndoEntry>, LedgerError> {
        Ok(self.read::<Undos>(key)?.unwrap_or_default())
    }

    pub fn exists_betting_undo(&self, key: &UndoKey) -> Result<bool, LedgerError> {
        self.exists::<Undos>(key)
    }

    pub fn erase_betting_undo(&mut self, key: &UndoKey) -> Result<bool, LedgerError> {
        self.erase::<Undos>(key)
    }

    /// Mark a betting tx whose legacy processing found nothing to mutate.
    pub fn save_failed_tx(&mut self, key: &UndoKey) -> Result<(), LedgerError> {
        self.upsert::<FailedTxs>(key, &1u8)
    }

    pub fn exists_failed_tx(&self, key: &UndoKey) -> Result<bool, LedgerError> {
        self.exists::<FailedTxs>(key)
    }

    pub fn erase_failed_tx(&mut self, key: &UndoKey) -> Result<bool, LedgerError> {
        self.erase::<FailedTxs>(key)
    }

    /// Drop every payout-audit row written at `height`, both staged and
    /// committed.
    pub fn erase_payouts_at_height(&mut self, height: i64) -> Result<(), LedgerError> {
        let prefix = BetKey::height_prefix(height);
        let committed = self.base.scan_prefix::<PayoutsInfo>(&prefix)?;

        if let Some(table) = self.pending.get_mut(PayoutsInfo::NAME) {
            let staged: Vec<Vec<u8>> = table
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .map(|(key, _)| key.clone())
                .collect();
            for key in staged {
                table.insert(key, PendingOp::Del);
            }
        }
        for (key, _) in committed {
            self.pending_set(PayoutsInfo::NAME, key, PendingOp::Del);
        }
        Ok(())
    }

    /// Apply every staged mutation to the base ledger.
    pub fn flush(self) -> Result<(), LedgerError> {
        for (table, ops) in self.pending {
            debug!(table, ops = ops.len(), "flushing ledger overlay");
            for (key, op) in ops {
                match op {
                    PendingOp::Put(bytes) => {
                        self.base.store.put(table, &key, &bytes)?;
                    }
                    PendingOp::Del => {
                        self.base.store.delete(table, &key)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop every staged mutation.
    pub fn discard(self) {}
}
