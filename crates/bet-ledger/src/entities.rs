//! Ledger entity records and their table keys.
//!
//! Records are bincode-serialized through serde; every key has a
//! deterministic big-endian byte encoding so `(height, outpoint)` keys
//! scan in height order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use bet_protocol::chain::{OutPoint, Script, TxId};
use bet_protocol::market::{
    ContenderPlace, FieldGroup, FieldMarket, MappingKind, MarketFilter, Outcome, QuickGameKind,
    ResultKind,
};
use bet_protocol::odds::ODDS_DIVISOR;
use bet_protocol::tx::{FieldBetTx, FieldEventTx, PeerlessBetTx, PeerlessEventTx};
use bet_protocol::COIN;

/// Moneyline event with attached spread/total markets, exposure
/// accumulators and bet counters.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct EventRecord {
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
    pub spread_points: i16,
    pub spread_home_odds: u32,
    pub spread_away_odds: u32,
    pub total_points: u16,
    pub total_over_odds: u32,
    pub total_under_odds: u32,

    // Potential liabilities, in coin units.
    pub home_liability: i64,
    pub away_liability: i64,
    pub draw_liability: i64,
    pub spread_home_liability: i64,
    pub spread_away_liability: i64,
    pub spread_push_liability: i64,
    pub total_over_liability: i64,
    pub total_under_liability: i64,
    pub total_push_liability: i64,

    pub home_bets: u32,
    pub away_bets: u32,
    pub draw_bets: u32,
    pub spread_home_bets: u32,
    pub spread_away_bets: u32,
    pub spread_push_bets: u32,
    pub total_over_bets: u32,
    pub total_under_bets: u32,
    pub total_push_bets: u32,

    /// Stamped only by pre-V3 event creation.
    pub creation_height: i64,
    /// Pre-V3 spread semantics depended on which side opened as favorite.
    pub legacy_home_favorite: bool,
}

impl EventRecord {
    pub fn from_create(tx: &PeerlessEventTx) -> Self {
        Self {
            event_id: tx.event_id,
            start_time: tx.start_time,
            sport: tx.sport,
            tournament: tx.tournament,
            stage: tx.stage,
            home_team: tx.home_team,
            away_team: tx.away_team,
            home_odds: tx.home_odds,
            away_odds: tx.away_odds,
            draw_odds: tx.draw_odds,
            ..Self::default()
        }
    }

    /// Republish semantics: overwrite descriptive fields and moneyline
    /// odds, keep markets and accumulators.
    pub fn apply_republish(&mut self, tx: &PeerlessEventTx) {
        self.start_time = tx.start_time;
        self.sport = tx.sport;
        self.tournament = tx.tournament;
        self.stage = tx.stage;
        self.home_team = tx.home_team;
        self.away_team = tx.away_team;
        self.home_odds = tx.home_odds;
        self.away_odds = tx.away_odds;
        self.draw_odds = tx.draw_odds;
    }

    pub fn apply_update_odds(&mut self, home: u32, away: u32, draw: u32) {
        self.home_odds = home;
        self.away_odds = away;
        self.draw_odds = draw;
    }

    pub fn apply_spreads(&mut self, points: i16, home: u32, away: u32) {
        self.spread_points = points;
        self.spread_home_odds = home;
        self.spread_away_odds = away;
    }

    pub fn apply_totals(&mut self, points: u16, over: u32, under: u32) {
        self.total_points = points;
        self.total_over_odds = over;
        self.total_under_odds = under;
    }

    pub fn apply_patch(&mut self, start_time: u32) {
        self.start_time = start_time;
    }

    pub fn zero_odds(&mut self) {
        self.home_odds = 0;
        self.away_odds = 0;
        self.draw_odds = 0;
        self.spread_home_odds = 0;
        self.spread_away_odds = 0;
        self.total_over_odds = 0;
        self.total_under_odds = 0;
    }

    /// Currently posted odds for one outcome.
    pub fn odds_for(&self, outcome: Outcome) -> u32 {
        match outcome {
            Outcome::MoneyLineHomeWin => self.home_odds,
            Outcome::MoneyLineAwayWin => self.away_odds,
            Outcome::MoneyLineDraw => self.draw_odds,
            Outcome::SpreadHome => self.spread_home_odds,
            Outcome::SpreadAway => self.spread_away_odds,
            Outcome::TotalOver => self.total_over_odds,
            Outcome::TotalUnder => self.total_under_odds,
        }
    }

    /// Accumulate a priced single bet: directional liability plus counter,
    /// and the shared push accumulators for spread/total markets. Amounts
    /// are smallest units, liabilities stored per coin.
    pub fn register_bet(&mut self, outcome: Outcome, payout: i64, stake: i64) {
        match outcome {
            Outcome::MoneyLineHomeWin => {
                self.home_liability += payout / COIN;
                self.home_bets += 1;
            }
            Outcome::MoneyLineAwayWin => {
                self.away_liability += payout / COIN;
                self.away_bets += 1;
            }
            Outcome::MoneyLineDraw => {
                self.draw_liability += payout / COIN;
                self.draw_bets += 1;
            }
            Outcome::SpreadHome => {
                self.spread_home_liability += payout / COIN;
                self.spread_push_liability += stake / COIN;
                self.spread_home_bets += 1;
                self.spread_push_bets += 1;
            }
            Outcome::SpreadAway => {
                self.spread_away_liability += payout / COIN;
                self.spread_push_liability += stake / COIN;
                self.spread_away_bets += 1;
                self.spread_push_bets += 1;
            }
            Outcome::TotalOver => {
                self.total_over_liability += payout / COIN;
                self.total_push_liability += stake / COIN;
                self.total_over_bets += 1;
                self.total_push_bets += 1;
            }
            Outcome::TotalUnder => {
                self.total_under_liability += payout / COIN;
                self.total_push_liability += stake / COIN;
                self.total_under_bets += 1;
                self.total_push_bets += 1;
            }
        }
    }

    /// Parlay legs only bump the bet counters; parlay exposure is not
    /// tracked per event.
    pub fn register_parlay_leg(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::MoneyLineHomeWin => self.home_bets += 1,
            Outcome::MoneyLineAwayWin => self.away_bets += 1,
            Outcome::MoneyLineDraw => self.draw_bets += 1,
            Outcome::SpreadHome => {
                self.spread_home_bets += 1;
                self.spread_push_bets += 1;
            }
            Outcome::SpreadAway => {
                self.spread_away_bets += 1;
                self.spread_push_bets += 1;
            }
            Outcome::TotalOver => {
                self.total_over_bets += 1;
                self.total_push_bets += 1;
            }
            Outcome::TotalUnder => {
                self.total_under_bets += 1;
                self.total_push_bets += 1;
            }
        }
    }
}

/// One contender inside a field event.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct ContenderInfo {
    pub input_odds: u32,
    /// Permille adjustment applied to derived odds; 0 means neutral.
    pub modifier: u32,
    pub outright_odds: u32,
    pub place_odds: u32,
    pub show_odds: u32,
    pub outright_liability: i64,
    pub place_liability: i64,
    pub show_liability: i64,
    pub outright_bets: u32,
    pub place_bets: u32,
    pub show_bets: u32,
}

/// Field event: many contenders, outright/place/show markets.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldEventRecord {
    pub event_id: u32,
    pub start_time: u32,
    pub sport: u16,
    pub tournament: u16,
    pub stage: u16,
    pub group_type: FieldGroup,
    pub market_type: MarketFilter,
    pub margin_percent: u32,
    pub contenders: BTreeMap<u32, ContenderInfo>,
}

/// Place-odds fraction of net outright winnings, in percent.
const PLACE_ODDS_PERCENT: u64 = 35;
/// Show-odds fraction of net outright winnings, in percent.
const SHOW_ODDS_PERCENT: u64 = 20;

impl FieldEventRecord {
    pub fn from_create(tx: &FieldEventTx) -> Self {
        let contenders = tx
            .contender_odds
            .iter()
            .map(|(&id, &odds)| {
                (
                    id,
                    ContenderInfo {
                        input_odds: odds,
                        ..ContenderInfo::default()
                    },
                )
            })
            .collect();
        Self {
            event_id: tx.event_id,
            start_time: tx.start_time,
            sport: tx.sport,
            tournament: tx.tournament,
            stage: tx.stage,
            group_type: tx.group_type,
            market_type: tx.market_type,
            margin_percent: tx.margin_percent,
            contenders,
        }
    }

    pub fn is_market_open(&self, market: FieldMarket) -> bool {
        self.market_type.is_market_open(market)
    }

    /// Merge fresh input odds; unknown contender ids are added.
    pub fn apply_update_odds(&mut self, contender_odds: &BTreeMap<u32, u32>) {
        for (&id, &odds) in contender_odds {
            self.contenders.entry(id).or_default().input_odds = odds;
        }
    }

    pub fn apply_modifiers(&mut self, contender_modifiers: &BTreeMap<u32, u32>) {
        for (&id, &modifier) in contender_modifiers {
            self.contenders.entry(id).or_default().modifier = modifier;
        }
    }

    pub fn apply_margin(&mut self, margin_percent: u32) {
        self.margin_percent = margin_percent;
    }

    pub fn zero_odds(&mut self) {
        for contender in self.contenders.values_mut() {
            contender.input_odds = 0;
            contender.outright_odds = 0;
            contender.place_odds = 0;
            contender.show_odds = 0;
        }
    }

    /// Re-derive the posted odds of every contender from its input odds,
    /// the event margin and the per-contender modifier. Closed markets
    /// are forced to zero odds.
    pub fn calc_odds(&mut self) {
        for contender in self.contenders.values_mut() {
            if contender.input_odds == 0 || self.margin_percent == 0 {
                contender.outright_odds = 0;
                contender.place_odds = 0;
                contender.show_odds = 0;
                continue;
            }
            let mut outright =
                contender.input_odds as u64 * 100 / self.margin_percent as u64;
            if contender.modifier != 0 {
                outright = outright * contender.modifier as u64 / 1000;
            }
            contender.outright_odds = outright as u32;

            let net = outright.saturating_sub(ODDS_DIVISOR as u64);
            contender.place_odds = if self.market_type.is_market_open(FieldMarket::Place) && net > 0
            {
                (ODDS_DIVISOR as u64 + net * PLACE_ODDS_PERCENT / 100) as u32
            } else {
                0
            };
            contender.show_odds = if self.market_type.is_market_open(FieldMarket::Show) && net > 0 {
                (ODDS_DIVISOR as u64 + net * SHOW_ODDS_PERCENT / 100) as u32
            } else {
                0
            };
        }
    }

    /// Posted odds of a contender in one market; 0 for an unknown
    /// contender.
    pub fn market_odds(&self, contender_id: u32, market: FieldMarket) -> u32 {
        let Some(contender) = self.contenders.get(&contender_id) else {
            return 0;
        };
        match market {
            FieldMarket::Outright => contender.outright_odds,
            FieldMarket::Place => contender.place_odds,
            FieldMarket::Show => contender.show_odds,
        }
    }

    /// Accumulate a priced field bet on one contender/market.
    pub fn register_bet(&mut self, contender_id: u32, market: FieldMarket, payout: i64) {
        let contender = self.contenders.entry(contender_id).or_default();
        match market {
            FieldMarket::Outright => {
                contender.outright_liability += payout / COIN;
                contender.outright_bets += 1;
            }
            FieldMarket::Place => {
                contender.place_liability += payout / COIN;
                contender.place_bets += 1;
            }
            FieldMarket::Show => {
                contender.show_liability += payout / COIN;
                contender.show_bets += 1;
            }
        }
    }

    pub fn register_parlay_leg(&mut self, contender_id: u32, market: FieldMarket) {
        let contender = self.contenders.entry(contender_id).or_default();
        match market {
            FieldMarket::Outright => contender.outright_bets += 1,
            FieldMarket::Place => contender.place_bets += 1,
            FieldMarket::Show => contender.show_bets += 1,
        }
    }
}

/// Terminal outcome of a moneyline event. Its existence forbids further
/// bets and odds mutation.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ResultRecord {
    pub event_id: u32,
    pub result_kind: ResultKind,
    pub home_score: u16,
    pub away_score: u16,
}

/// Terminal outcome of a field event: final placing per contender.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldResultRecord {
    pub event_id: u32,
    pub result_kind: ResultKind,
    pub contender_results: BTreeMap<u32, ContenderPlace>,
}

/// Oracle id-to-name binding; immutable once written.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct MappingRecord {
    pub name: String,
}

/// A placed single or parlay bet with the event states frozen at bet time.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct BetRecord {
    pub amount: i64,
    pub address: Script,
    pub legs: Vec<PeerlessBetTx>,
    /// Locked pre-block event snapshots, one per found leg.
    pub locked_events: Vec<EventRecord>,
    pub bet_time: i64,
    /// Set by payout enumerators once the bet has been paid.
    pub completed: bool,
}

impl BetRecord {
    pub fn new(
        amount: i64,
        address: Script,
        legs: Vec<PeerlessBetTx>,
        locked_events: Vec<EventRecord>,
        bet_time: i64,
    ) -> Self {
        Self {
            amount,
            address,
            legs,
            locked_events,
            bet_time,
            completed: false,
        }
    }
}

/// Field analogue of [`BetRecord`].
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct FieldBetRecord {
    pub amount: i64,
    pub address: Script,
    pub legs: Vec<FieldBetTx>,
    pub locked_events: Vec<FieldEventRecord>,
    pub bet_time: i64,
    pub completed: bool,
}

impl FieldBetRecord {
    pub fn new(
        amount: i64,
        address: Script,
        legs: Vec<FieldBetTx>,
        locked_events: Vec<FieldEventRecord>,
        bet_time: i64,
    ) -> Self {
        Self {
            amount,
            address,
            legs,
            locked_events,
            bet_time,
            completed: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ChainGamesEventRecord {
    pub event_id: u32,
    /// Exact required stake, in coin units.
    pub entry_fee: u32,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ChainGamesBetRecord {
    pub event_id: u32,
    pub amount: i64,
    pub address: Script,
    pub bet_time: i64,
    pub completed: bool,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ChainGamesResultRecord {
    pub event_id: u32,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct QuickGamesBetRecord {
    pub game: QuickGameKind,
    pub bet_info: Vec<u8>,
    pub amount: i64,
    pub address: Script,
    pub bet_time: i64,
    pub completed: bool,
}

/// What a winning block output paid for.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum PayoutKind {
    BetPayout,
    BetRefund,
    ChainGamesPayout,
    QuickGamesPayout,
    FieldBetPayout,
    FieldBetRefund,
}

/// Audit row mapping a coinstake output back to the bet that earned it.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct PayoutInfo {
    pub bet_key: BetKey,
    pub kind: PayoutKind,
}

/// Snapshot of an entity taken before a mutation, for reorg reversal.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub enum UndoSnapshot {
    Event(EventRecord),
    FieldEvent(FieldEventRecord),
}

/// One undo-log entry; `height` pins the snapshot to the block that
/// took it.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct UndoEntry {
    pub snapshot: UndoSnapshot,
    pub height: i64,
}

// --- keys ---

/// Byte encoding of a table key.
pub trait KeyEncode {
    fn to_bytes(&self) -> Vec<u8>;
}

/// Key of events, results, chain-game events and results.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct EventKey(pub u32);

impl KeyEncode for EventKey {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

/// Key of the mappings table: namespace tag plus id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct MappingKey {
    pub kind: MappingKind,
    pub id: u32,
}

impl KeyEncode for MappingKey {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5);
        bytes.push(self.kind as u8);
        bytes.extend_from_slice(&self.id.to_be_bytes());
        bytes
    }
}

/// Key of bet and payout-audit tables. Height leads so rows group by
/// block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct BetKey {
    pub height: i64,
    pub outpoint: OutPoint,
}

impl BetKey {
    pub fn new(height: i64, outpoint: OutPoint) -> Self {
        Self { height, outpoint }
    }

    /// Key prefix covering every row of one height.
    pub fn height_prefix(height: i64) -> Vec<u8> {
        height.to_be_bytes().to_vec()
    }
}

impl KeyEncode for BetKey {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(44);
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend_from_slice(self.outpoint.txid.as_bytes());
        bytes.extend_from_slice(&self.outpoint.n.to_be_bytes());
        bytes
    }
}

/// Key of the undo log and failed-tx marker tables: a synthetic id
/// derived from the betting output's outpoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct UndoKey(pub TxId);

impl UndoKey {
    /// Synthetic betting-tx id for one tagged output.
    pub fn for_outpoint(outpoint: &OutPoint) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(outpoint.txid.as_bytes());
        hasher.update(&outpoint.n.to_le_bytes());
        Self(TxId(*hasher.finalize().as_bytes()))
    }
}

impl KeyEncode for UndoKey {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bet_protocol::chain::{OutPoint, TxId};

    #[test]
    fn test_register_bet_accumulates_liability_and_push() {
        let mut event = EventRecord::default();
        event.register_bet(Outcome::MoneyLineHomeWin, 194 * COIN, 100 * COIN);
        assert_eq!(event.home_liability, 194);
        assert_eq!(event.home_bets, 1);
        assert_eq!(event.spread_push_bets, 0);

        event.register_bet(Outcome::SpreadAway, 150 * COIN, 100 * COIN);
        assert_eq!(event.spread_away_liability, 150);
        assert_eq!(event.spread_push_liability, 100);
        assert_eq!(event.spread_away_bets, 1);
        assert_eq!(event.spread_push_bets, 1);
    }

    #[test]
    fn test_parlay_leg_touches_counters_only() {
        let mut event = EventRecord::default();
        event.register_parlay_leg(Outcome::TotalUnder);
        assert_eq!(event.total_under_bets, 1);
        assert_eq!(event.total_push_bets, 1);
        assert_eq!(event.total_under_liability, 0);
        assert_eq!(event.total_push_liability, 0);
    }

    #[test]
    fn test_zero_odds_kills_every_market() {
        let mut event = EventRecord {
            home_odds: 15_000,
            away_odds: 25_000,
            draw_odds: 30_000,
            spread_home_odds: 19_000,
            spread_away_odds: 19_000,
            total_over_odds: 18_000,
            total_under_odds: 20_000,
            ..EventRecord::default()
        };
        event.zero_odds();
        for outcome in [
            Outcome::MoneyLineHomeWin,
            Outcome::MoneyLineAwayWin,
            Outcome::MoneyLineDraw,
            Outcome::SpreadHome,
            Outcome::SpreadAway,
            Outcome::TotalOver,
            Outcome::TotalUnder,
        ] {
            assert_eq!(event.odds_for(outcome), 0);
        }
    }

    #[test]
    fn test_field_calc_odds_margin_and_markets() {
        let mut event = FieldEventRecord {
            event_id: 1,
            start_time: 0,
            sport: 1,
            tournament: 1,
            stage: 0,
            group_type: FieldGroup::Other,
            market_type: MarketFilter::OutrightPlace,
            margin_percent: 100,
            contenders: BTreeMap::new(),
        };
        event.contenders.insert(
            7,
            ContenderInfo {
                input_odds: 30_000,
                ..ContenderInfo::default()
            },
        );
        event.calc_odds();

        // Neutral margin keeps the outright odds.
        assert_eq!(event.market_odds(7, FieldMarket::Outright), 30_000);
        // Place derives from net winnings; show is closed by market type.
        assert_eq!(event.market_odds(7, FieldMarket::Place), 17_000);
        assert_eq!(event.market_odds(7, FieldMarket::Show), 0);

        // A 120% margin shrinks outright odds.
        event.apply_margin(120);
        event.calc_odds();
        assert_eq!(event.market_odds(7, FieldMarket::Outright), 25_000);
    }

    #[test]
    fn test_field_zeroing_clears_all_odds() {
        let mut event = FieldEventRecord {
            event_id: 1,
            start_time: 0,
            sport: 1,
            tournament: 1,
            stage: 0,
            group_type: FieldGroup::Other,
            market_type: MarketFilter::AllMarkets,
            margin_percent: 100,
            contenders: [(3, ContenderInfo { input_odds: 20_000, ..ContenderInfo::default() })]
                .into_iter()
                .collect(),
        };
        event.calc_odds();
        assert!(event.market_odds(3, FieldMarket::Show) > 0);
        event.zero_odds();
        assert_eq!(event.market_odds(3, FieldMarket::Outright), 0);
        assert_eq!(event.market_odds(3, FieldMarket::Place), 0);
        assert_eq!(event.market_odds(3, FieldMarket::Show), 0);
    }

    #[test]
    fn test_key_encodings_are_prefix_scannable() {
        let txid = TxId([7u8; 32]);
        let key = BetKey::new(1234, OutPoint::new(txid, 2));
        let bytes = key.to_bytes();
        assert_eq!(bytes.len(), 44);
        assert!(bytes.starts_with(&BetKey::height_prefix(1234)));

        let other = BetKey::new(1235, OutPoint::new(txid, 2));
        assert!(!other.to_bytes().starts_with(&BetKey::height_prefix(1234)));
    }

    #[test]
    fn test_undo_key_is_outpoint_deterministic() {
        let txid = TxId([9u8; 32]);
        let a = UndoKey::for_outpoint(&OutPoint::new(txid, 0));
        let b = UndoKey::for_outpoint(&OutPoint::new(txid, 0));
        let c = UndoKey::for_outpoint(&OutPoint::new(txid, 1));
        assert_eq!(a, b);
        assert_ne!(a.0, c.0);
    }
}
