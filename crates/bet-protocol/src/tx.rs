//! Betting transaction wire format.
//!
//! A betting payload rides in an OP_RETURN output: a 3-byte header
//! (`b'B'`, format version, kind tag) followed by a borsh-encoded body.
//! [`parse_betting_tx`] is the classifier: anything that does not decode
//! cleanly end-to-end is simply not a betting transaction.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::chain::{Script, Transaction, TxOut};
use crate::market::{
    ContenderPlace, FieldGroup, FieldMarket, MappingKind, MarketFilter, Outcome, QuickGameKind,
    ResultKind,
};

/// First header byte of every betting payload.
pub const BTX_PREFIX: u8 = b'B';
/// Wire format version this node understands.
pub const BTX_FORMAT_VERSION: u8 = 0x01;

/// Oracle mapping creation: binds an id to a display name in one namespace.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct MappingTx {
    pub kind: MappingKind,
    pub id: u32,
    pub name: String,
}

/// Oracle creation of a moneyline event.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessEventTx {
    pub event_id: u32,
    pub start_time: u32,
    pub sport: u16,
    pub tournament: u16,
    pub stage: u16,
    pub home_team: u32,
    pub away_team: u32,
    pub home_odds: u32,
    pub away_odds: u32,
    pub draw_odds: u32,
}

/// Single moneyline / spread / total bet leg.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessBetTx {
    pub event_id: u32,
    pub outcome: Outcome,
}

/// Oracle result publication for a moneyline event.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessResultTx {
    pub event_id: u32,
    pub result_kind: ResultKind,
    pub home_score: u16,
    pub away_score: u16,
}

/// Oracle moneyline odds refresh.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessUpdateOddsTx {
    pub event_id: u32,
    pub home_odds: u32,
    pub away_odds: u32,
    pub draw_odds: u32,
}

/// Oracle creation of a lottery-style chain-game event. Entry fee is in
/// coin units.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct ChainGamesEventTx {
    pub event_id: u32,
    pub entry_fee: u32,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct ChainGamesBetTx {
    pub event_id: u32,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct ChainGamesResultTx {
    pub event_id: u32,
}

/// Oracle spread market attach/refresh.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessSpreadsEventTx {
    pub event_id: u32,
    pub points: i16,
    pub home_odds: u32,
    pub away_odds: u32,
}

/// Oracle totals market attach/refresh.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessTotalsEventTx {
    pub event_id: u32,
    pub points: u16,
    pub over_odds: u32,
    pub under_odds: u32,
}

/// Oracle start-time correction.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessEventPatchTx {
    pub event_id: u32,
    pub start_time: u32,
}

/// Multi-leg bet; every leg must win.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessParlayBetTx {
    pub legs: Vec<PeerlessBetTx>,
}

/// Bet on a self-contained quick game; `bet_info` is game-specific.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct QuickGamesBetTx {
    pub game: QuickGameKind,
    pub bet_info: Vec<u8>,
}

/// Oracle kill-switch zeroing every market of the listed events.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct PeerlessEventZeroingOddsTx {
    pub event_ids: Vec<u32>,
}

/// Oracle creation of a field event (many contenders, one winner).
/// `contender_odds` maps contender id to its input odds.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldEventTx {
    pub event_id: u32,
    pub start_time: u32,
    pub sport: u16,
    pub tournament: u16,
    pub stage: u16,
    pub group_type: FieldGroup,
    pub market_type: MarketFilter,
    pub margin_percent: u32,
    pub contender_odds: BTreeMap<u32, u32>,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldUpdateOddsTx {
    pub event_id: u32,
    pub contender_odds: BTreeMap<u32, u32>,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldZeroingOddsTx {
    pub event_id: u32,
}

/// Oracle field result: the final placing of every contender.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldResultTx {
    pub event_id: u32,
    pub result_kind: ResultKind,
    pub contender_results: BTreeMap<u32, ContenderPlace>,
}

/// Single field bet leg on one contender in one market.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldBetTx {
    pub event_id: u32,
    pub market: FieldMarket,
    pub contender_id: u32,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldParlayBetTx {
    pub legs: Vec<FieldBetTx>,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldUpdateMarginTx {
    pub event_id: u32,
    pub margin_percent: u32,
}

/// Oracle per-contender odds modifiers, in permille.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldUpdateModifiersTx {
    pub event_id: u32,
    pub contender_modifiers: BTreeMap<u32, u32>,
}

/// Every recognized betting transaction kind.
///
/// The discriminants are the consensus-fixed kind tags; validation,
/// processing and undo all match exhaustively on this enum.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum BettingTx {
    Mapping(MappingTx) = 0x01,
    PeerlessEvent(PeerlessEventTx) = 0x02,
    PeerlessBet(PeerlessBetTx) = 0x03,
    PeerlessResult(PeerlessResultTx) = 0x04,
    PeerlessUpdateOdds(PeerlessUpdateOddsTx) = 0x05,
    ChainGamesEvent(ChainGamesEventTx) = 0x06,
    ChainGamesBet(ChainGamesBetTx) = 0x07,
    ChainGamesResult(ChainGamesResultTx) = 0x08,
    PeerlessSpreadsEvent(PeerlessSpreadsEventTx) = 0x09,
    PeerlessTotalsEvent(PeerlessTotalsEventTx) = 0x0a,
    PeerlessEventPatch(PeerlessEventPatchTx) = 0x0b,
    PeerlessParlayBet(PeerlessParlayBetTx) = 0x0c,
    QuickGamesBet(QuickGamesBetTx) = 0x0d,
    PeerlessEventZeroingOdds(PeerlessEventZeroingOddsTx) = 0x0e,
    FieldEvent(FieldEventTx) = 0x0f,
    FieldUpdateOdds(FieldUpdateOddsTx) = 0x10,
    FieldZeroingOdds(FieldZeroingOddsTx) = 0x11,
    FieldResult(FieldResultTx) = 0x12,
    FieldBet(FieldBetTx) = 0x13,
    FieldParlayBet(FieldParlayBetTx) = 0x14,
    FieldUpdateMargin(FieldUpdateMarginTx) = 0x15,
    FieldUpdateModifiers(FieldUpdateModifiersTx) = 0x16,
}

impl BettingTx {
    /// True for oracle administration kinds, which must be signed by a
    /// height-authorized oracle key.
    pub fn is_oracle_tx(&self) -> bool {
        matches!(
            self,
            BettingTx::Mapping(_)
                | BettingTx::PeerlessEvent(_)
                | BettingTx::PeerlessResult(_)
                | BettingTx::PeerlessUpdateOdds(_)
                | BettingTx::ChainGamesEvent(_)
                | BettingTx::ChainGamesResult(_)
                | BettingTx::PeerlessSpreadsEvent(_)
                | BettingTx::PeerlessTotalsEvent(_)
                | BettingTx::PeerlessEventPatch(_)
                | BettingTx::PeerlessEventZeroingOdds(_)
                | BettingTx::FieldEvent(_)
                | BettingTx::FieldUpdateOdds(_)
                | BettingTx::FieldZeroingOdds(_)
                | BettingTx::FieldResult(_)
                | BettingTx::FieldUpdateMargin(_)
                | BettingTx::FieldUpdateModifiers(_)
        )
    }

    /// True for player bet kinds.
    pub fn is_bet_tx(&self) -> bool {
        !self.is_oracle_tx()
    }

    /// Kind name for log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            BettingTx::Mapping(_) => "Mapping",
            BettingTx::PeerlessEvent(_) => "PeerlessEvent",
            BettingTx::PeerlessBet(_) => "PeerlessBet",
            BettingTx::PeerlessResult(_) => "PeerlessResult",
            BettingTx::PeerlessUpdateOdds(_) => "PeerlessUpdateOdds",
            BettingTx::ChainGamesEvent(_) => "ChainGamesEvent",
            BettingTx::ChainGamesBet(_) => "ChainGamesBet",
            BettingTx::ChainGamesResult(_) => "ChainGamesResult",
            BettingTx::PeerlessSpreadsEvent(_) => "PeerlessSpreadsEvent",
            BettingTx::PeerlessTotalsEvent(_) => "PeerlessTotalsEvent",
            BettingTx::PeerlessEventPatch(_) => "PeerlessEventPatch",
            BettingTx::PeerlessParlayBet(_) => "PeerlessParlayBet",
            BettingTx::QuickGamesBet(_) => "QuickGamesBet",
            BettingTx::PeerlessEventZeroingOdds(_) => "PeerlessEventZeroingOdds",
            BettingTx::FieldEvent(_) => "FieldEvent",
            BettingTx::FieldUpdateOdds(_) => "FieldUpdateOdds",
            BettingTx::FieldZeroingOdds(_) => "FieldZeroingOdds",
            BettingTx::FieldResult(_) => "FieldResult",
            BettingTx::FieldBet(_) => "FieldBet",
            BettingTx::FieldParlayBet(_) => "FieldParlayBet",
            BettingTx::FieldUpdateMargin(_) => "FieldUpdateMargin",
            BettingTx::FieldUpdateModifiers(_) => "FieldUpdateModifiers",
        }
    }
}

/// Serialize a betting transaction into its OP_RETURN payload bytes.
pub fn encode_betting_tx(tx: &BettingTx) -> Vec<u8> {
    let mut payload = vec![BTX_PREFIX, BTX_FORMAT_VERSION];
    // Writing borsh into a Vec cannot fail.
    let body = borsh::to_vec(tx).expect("borsh encode to Vec");
    payload.extend_from_slice(&body);
    payload
}

/// Build a ready-to-embed OP_RETURN script for a betting transaction.
pub fn betting_op_return(tx: &BettingTx) -> Script {
    Script::op_return(&encode_betting_tx(tx))
}

/// Decode one transaction output into a betting transaction, or `None`
/// if it is not one. Trailing bytes after the body are a decode failure.
///
/// Range checks on enum-valued fields (quick-game variant, field group,
/// market filter, outcome) happen here: an out-of-range discriminant
/// fails the borsh decode, so validation never sees the output and the
/// transaction is treated as non-betting rather than rejected.
pub fn parse_betting_tx(out: &TxOut) -> Option<BettingTx> {
    let payload = out.script.op_return_payload()?;
    if payload.len() < 3 || payload[0] != BTX_PREFIX || payload[1] != BTX_FORMAT_VERSION {
        return None;
    }
    BettingTx::try_from_slice(&payload[2..]).ok()
}

/// Cheap pre-filter before walking a transaction's outputs.
pub fn has_op_return_output(tx: &Transaction) -> bool {
    tx.vout.iter().any(|out| out.script.is_op_return())
}
