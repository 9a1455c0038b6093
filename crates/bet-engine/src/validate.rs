//! Transaction validation.
//!
//! Pure acceptance check over the pre-state: nothing here writes to the
//! ledger. Runs for every candidate transaction from the V3 activation
//! height on; earlier blocks carry historical data that predates these
//! rules and is handled by the processing fallbacks instead.
//!
//! A tagged output failing any sub-check rejects the whole transaction,
//! so this is a single fail-fast scan over the outputs.

use std::collections::BTreeSet;

use tracing::debug;

use bet_ledger::entities::{EventKey, MappingKey};
use bet_ledger::view::{
    ChainGamesEvents, ChainGamesResults, Events, FieldEvents, FieldResults, LedgerOverlay,
    Mappings, Results,
};
use bet_protocol::chain::{Script, Transaction};
use bet_protocol::market::{MappingKind, ResultKind};
use bet_protocol::params::{ConsensusParams, ProtocolVersion};
use bet_protocol::tx::{has_op_return_output, parse_betting_tx, BettingTx};
use bet_protocol::COIN;

use crate::context::{ChainContext, OracleAuth, SporkSet};
use crate::error::CheckError;

/// Script of the output the first input spends, fetched from the
/// committed chain.
fn prev_out_script(chain: &dyn ChainContext, tx: &Transaction) -> Option<Script> {
    let input = tx.vin.first()?;
    let prev_tx = chain.get_transaction(&input.prevout.txid)?;
    prev_tx
        .vout
        .get(input.prevout.n as usize)
        .map(|out| out.script.clone())
}

fn require_mapping(
    overlay: &LedgerOverlay<'_>,
    kind: MappingKind,
    id: u32,
) -> Result<(), CheckError> {
    if !overlay.exists::<Mappings>(&MappingKey { kind, id })? {
        return Err(CheckError::UnknownMapping { kind, id });
    }
    Ok(())
}

/// Validate one transaction's betting outputs against the current ledger
/// state. Returns the first rejection reason, or `Ok` for transactions
/// that carry no recognized betting payload at all.
pub fn check_betting_tx(
    chain: &dyn ChainContext,
    oracle: &dyn OracleAuth,
    sporks: &dyn SporkSet,
    params: &ConsensusParams,
    overlay: &LedgerOverlay<'_>,
    tx: &Transaction,
    height: i64,
) -> Result<(), CheckError> {
    if params.protocol_version(height) < ProtocolVersion::V3 {
        return Ok(());
    }
    if !has_op_return_output(tx) {
        return Ok(());
    }

    let v4_active = params.protocol_version(height) >= ProtocolVersion::V4;

    for out in &tx.vout {
        let Some(betting_tx) = parse_betting_tx(out) else {
            continue;
        };

        if height >= sporks.betting_maintenance_height() {
            return Err(CheckError::MaintenanceMode);
        }

        let bet_amount = out.value;
        debug!(kind = betting_tx.kind_name(), height, bet_amount, "checking betting tx");

        match &betting_tx {
            BettingTx::PeerlessBet(bet) => {
                if bet_amount < params.min_bet() || bet_amount > params.max_bet() {
                    return Err(CheckError::BetOutOfRange { amount: bet_amount });
                }
                let key = EventKey(bet.event_id);
                let Some(event) = overlay.read::<Events>(&key)? else {
                    return Err(CheckError::UnknownEvent { event_id: bet.event_id });
                };
                if overlay.exists::<Results>(&key)? {
                    return Err(CheckError::EventResulted { event_id: bet.event_id });
                }
                if v4_active && event.odds_for(bet.outcome) == 0 {
                    return Err(CheckError::DeadMarket { event_id: bet.event_id });
                }
            }
            BettingTx::PeerlessParlayBet(parlay) => {
                if parlay.legs.len() > params.max_parlay_legs {
                    return Err(CheckError::TooManyParlayLegs { count: parlay.legs.len() });
                }
                if bet_amount < params.min_bet() || bet_amount > params.max_parlay_bet() {
                    return Err(CheckError::BetOutOfRange { amount: bet_amount });
                }
                let mut ids = BTreeSet::new();
                for leg in &parlay.legs {
                    if !ids.insert(leg.event_id) {
                        return Err(CheckError::DuplicateParlayLeg { event_id: leg.event_id });
                    }
                }
                for leg in &parlay.legs {
                    let key = EventKey(leg.event_id);
                    let Some(event) = overlay.read::<Events>(&key)? else {
                        return Err(CheckError::UnknownEvent { event_id: leg.event_id });
                    };
                    if overlay.exists::<Results>(&key)? {
                        return Err(CheckError::EventResulted { event_id: leg.event_id });
                    }
                    if v4_active {
                        if event.odds_for(leg.outcome) == 0 {
                            return Err(CheckError::DeadMarket { event_id: leg.event_id });
                        }
                        if event.stage != 0 {
                            return Err(CheckError::MultiStageEvent { event_id: leg.event_id });
                        }
                    }
                }
            }
            BettingTx::FieldBet(bet) => {
                if !v4_active {
                    return Err(CheckError::PrematureKind { kind: "field bet" });
                }
                if bet_amount < params.min_bet() || bet_amount > params.max_bet() {
                    return Err(CheckError::BetOutOfRange { amount: bet_amount });
                }
                let key = EventKey(bet.event_id);
                let Some(event) = overlay.read::<FieldEvents>(&key)? else {
                    return Err(CheckError::UnknownEvent { event_id: bet.event_id });
                };
                if overlay.exists::<FieldResults>(&key)? {
                    return Err(CheckError::EventResulted { event_id: bet.event_id });
                }
                if !event.is_market_open(bet.market) {
                    return Err(CheckError::MarketClosed {
                        event_id: bet.event_id,
                        market: bet.market,
                    });
                }
                if !event.contenders.contains_key(&bet.contender_id) {
                    return Err(CheckError::UnknownContender {
                        event_id: bet.event_id,
                        contender_id: bet.contender_id,
                    });
                }
                if event.market_odds(bet.contender_id, bet.market) == 0 {
                    return Err(CheckError::DeadMarket { event_id: bet.event_id });
                }
            }
            BettingTx::FieldParlayBet(parlay) => {
                if !v4_active {
                    return Err(CheckError::PrematureKind { kind: "field parlay bet" });
                }
                if bet_amount < params.min_bet() || bet_amount > params.max_bet() {
                    return Err(CheckError::BetOutOfRange { amount: bet_amount });
                }
                if parlay.legs.len() > params.max_parlay_legs {
                    return Err(CheckError::TooManyParlayLegs { count: parlay.legs.len() });
                }
                let mut ids = BTreeSet::new();
                for leg in &parlay.legs {
                    if !ids.insert(leg.event_id) {
                        return Err(CheckError::DuplicateParlayLeg { event_id: leg.event_id });
                    }
                }
                for leg in &parlay.legs {
                    let key = EventKey(leg.event_id);
                    let Some(event) = overlay.read::<FieldEvents>(&key)? else {
                        return Err(CheckError::UnknownEvent { event_id: leg.event_id });
                    };
                    if overlay.exists::<FieldResults>(&key)? {
                        return Err(CheckError::EventResulted { event_id: leg.event_id });
                    }
                    if !event.is_market_open(leg.market) {
                        return Err(CheckError::MarketClosed {
                            event_id: leg.event_id,
                            market: leg.market,
                        });
                    }
                    if !event.contenders.contains_key(&leg.contender_id) {
                        return Err(CheckError::UnknownContender {
                            event_id: leg.event_id,
                            contender_id: leg.contender_id,
                        });
                    }
                    if event.market_odds(leg.contender_id, leg.market) == 0 {
                        return Err(CheckError::DeadMarket { event_id: leg.event_id });
                    }
                    if event.stage != 0 {
                        return Err(CheckError::MultiStageEvent { event_id: leg.event_id });
                    }
                }
            }
            BettingTx::ChainGamesBet(bet) => {
                if height >= params.quick_games_end_height {
                    return Err(CheckError::QuickGamesRetired);
                }
                let key = EventKey(bet.event_id);
                let Some(event) = overlay.read::<ChainGamesEvents>(&key)? else {
                    return Err(CheckError::UnknownEvent { event_id: bet.event_id });
                };
                if overlay.exists::<ChainGamesResults>(&key)? {
                    return Err(CheckError::EventResulted { event_id: bet.event_id });
                }
                let entry_fee = event.entry_fee as i64 * COIN;
                if bet_amount != entry_fee {
                    return Err(CheckError::EntryFeeMismatch { amount: bet_amount, entry_fee });
                }
            }
            BettingTx::QuickGamesBet(_) => {
                if height >= params.quick_games_end_height {
                    return Err(CheckError::QuickGamesRetired);
                }
                if bet_amount < params.min_bet() || bet_amount > params.max_bet() {
                    return Err(CheckError::BetOutOfRange { amount: bet_amount });
                }
            }
            oracle_tx => {
                // If the spending input cannot be resolved, the output is
                // passed through; processing applies its own fallbacks.
                let Some(prev_script) = prev_out_script(chain, tx) else {
                    return Ok(());
                };
                let authorized = oracle.is_oracle_script(&prev_script, height);

                match oracle_tx {
                    BettingTx::Mapping(map_tx) => {
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !v4_active
                            && matches!(
                                map_tx.kind,
                                MappingKind::IndividualSport | MappingKind::Contender
                            )
                        {
                            return Err(CheckError::PrematureKind { kind: "mapping kind" });
                        }
                        let key = MappingKey { kind: map_tx.kind, id: map_tx.id };
                        if overlay.exists::<Mappings>(&key)? {
                            return Err(CheckError::DuplicateMapping {
                                kind: map_tx.kind,
                                id: map_tx.id,
                            });
                        }
                    }
                    BettingTx::PeerlessEvent(event_tx) => {
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if overlay.exists::<Events>(&EventKey(event_tx.event_id))? {
                            return Err(CheckError::DuplicateEvent {
                                event_id: event_tx.event_id,
                            });
                        }
                        require_mapping(overlay, MappingKind::Sport, event_tx.sport as u32)?;
                        require_mapping(
                            overlay,
                            MappingKind::Tournament,
                            event_tx.tournament as u32,
                        )?;
                        require_mapping(overlay, MappingKind::Round, event_tx.stage as u32)?;
                        require_mapping(overlay, MappingKind::Team, event_tx.home_team)?;
                        require_mapping(overlay, MappingKind::Team, event_tx.away_team)?;
                    }
                    BettingTx::FieldEvent(event_tx) => {
                        if !v4_active {
                            return Err(CheckError::PrematureKind { kind: "field event" });
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if overlay.exists::<FieldEvents>(&EventKey(event_tx.event_id))? {
                            return Err(CheckError::DuplicateEvent {
                                event_id: event_tx.event_id,
                            });
                        }
                        require_mapping(
                            overlay,
                            MappingKind::IndividualSport,
                            event_tx.sport as u32,
                        )?;
                        require_mapping(
                            overlay,
                            MappingKind::Tournament,
                            event_tx.tournament as u32,
                        )?;
                        require_mapping(overlay, MappingKind::Round, event_tx.stage as u32)?;
                        for &contender_id in event_tx.contender_odds.keys() {
                            require_mapping(overlay, MappingKind::Contender, contender_id)?;
                        }
                    }
                    BettingTx::FieldUpdateOdds(update_tx) => {
                        if !v4_active {
                            return Err(CheckError::PrematureKind { kind: "field odds update" });
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !overlay.exists::<FieldEvents>(&EventKey(update_tx.event_id))? {
                            return Err(CheckError::UnknownEvent {
                                event_id: update_tx.event_id,
                            });
                        }
                        for &contender_id in update_tx.contender_odds.keys() {
                            require_mapping(overlay, MappingKind::Contender, contender_id)?;
                        }
                    }
                    BettingTx::FieldUpdateModifiers(update_tx) => {
                        if !v4_active {
                            return Err(CheckError::PrematureKind {
                                kind: "field modifier update",
                            });
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !overlay.exists::<FieldEvents>(&EventKey(update_tx.event_id))? {
                            return Err(CheckError::UnknownEvent {
                                event_id: update_tx.event_id,
                            });
                        }
                        for &contender_id in update_tx.contender_modifiers.keys() {
                            require_mapping(overlay, MappingKind::Contender, contender_id)?;
                        }
                    }
                    BettingTx::FieldUpdateMargin(update_tx) => {
                        if !v4_active {
                            return Err(CheckError::PrematureKind { kind: "field margin update" });
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !overlay.exists::<FieldEvents>(&EventKey(update_tx.event_id))? {
                            return Err(CheckError::UnknownEvent {
                                event_id: update_tx.event_id,
                            });
                        }
                    }
                    BettingTx::FieldZeroingOdds(zeroing_tx) => {
                        if !v4_active {
                            return Err(CheckError::PrematureKind { kind: "field odds zeroing" });
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !overlay.exists::<FieldEvents>(&EventKey(zeroing_tx.event_id))? {
                            return Err(CheckError::UnknownEvent {
                                event_id: zeroing_tx.event_id,
                            });
                        }
                    }
                    BettingTx::FieldResult(result_tx) => {
                        if !v4_active {
                            return Err(CheckError::PrematureKind { kind: "field result" });
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if result_tx.result_kind == ResultKind::MoneyLineRefund {
                            return Err(CheckError::UnsupportedResultKind {
                                event_id: result_tx.event_id,
                            });
                        }
                        let key = EventKey(result_tx.event_id);
                        let Some(event) = overlay.read::<FieldEvents>(&key)? else {
                            return Err(CheckError::UnknownEvent {
                                event_id: result_tx.event_id,
                            });
                        };
                        if overlay.exists::<FieldResults>(&key)? {
                            return Err(CheckError::DuplicateResult {
                                event_id: result_tx.event_id,
                            });
                        }
                        for &contender_id in result_tx.contender_results.keys() {
                            require_mapping(overlay, MappingKind::Contender, contender_id)?;
                            if !event.contenders.contains_key(&contender_id) {
                                return Err(CheckError::UnknownContender {
                                    event_id: result_tx.event_id,
                                    contender_id,
                                });
                            }
                        }
                    }
                    BettingTx::PeerlessResult(result_tx) => {
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        let key = EventKey(result_tx.event_id);
                        if !overlay.exists::<Events>(&key)? {
                            return Err(CheckError::UnknownEvent {
                                event_id: result_tx.event_id,
                            });
                        }
                        if overlay.exists::<Results>(&key)? {
                            return Err(CheckError::DuplicateResult {
                                event_id: result_tx.event_id,
                            });
                        }
                    }
                    BettingTx::PeerlessUpdateOdds(update_tx) => {
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !overlay.exists::<Events>(&EventKey(update_tx.event_id))? {
                            return Err(CheckError::UnknownEvent {
                                event_id: update_tx.event_id,
                            });
                        }
                    }
                    BettingTx::ChainGamesEvent(event_tx) => {
                        if height >= params.quick_games_end_height {
                            return Err(CheckError::QuickGamesRetired);
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if overlay.exists::<ChainGamesEvents>(&EventKey(event_tx.event_id))? {
                            return Err(CheckError::DuplicateEvent {
                                event_id: event_tx.event_id,
                            });
                        }
                    }
                    BettingTx::ChainGamesResult(result_tx) => {
                        if height >= params.quick_games_end_height {
                            return Err(CheckError::QuickGamesRetired);
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        let key = EventKey(result_tx.event_id);
                        if !overlay.exists::<ChainGamesEvents>(&key)? {
                            return Err(CheckError::UnknownEvent {
                                event_id: result_tx.event_id,
                            });
                        }
                        if overlay.exists::<ChainGamesResults>(&key)? {
                            return Err(CheckError::DuplicateResult {
                                event_id: result_tx.event_id,
                            });
                        }
                    }
                    BettingTx::PeerlessSpreadsEvent(spreads_tx) => {
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !overlay.exists::<Events>(&EventKey(spreads_tx.event_id))? {
                            return Err(CheckError::UnknownEvent {
                                event_id: spreads_tx.event_id,
                            });
                        }
                    }
                    BettingTx::PeerlessTotalsEvent(totals_tx) => {
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !overlay.exists::<Events>(&EventKey(totals_tx.event_id))? {
                            return Err(CheckError::UnknownEvent {
                                event_id: totals_tx.event_id,
                            });
                        }
                    }
                    BettingTx::PeerlessEventPatch(patch_tx) => {
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        if !overlay.exists::<Events>(&EventKey(patch_tx.event_id))? {
                            return Err(CheckError::UnknownEvent {
                                event_id: patch_tx.event_id,
                            });
                        }
                    }
                    BettingTx::PeerlessEventZeroingOdds(zeroing_tx) => {
                        if !v4_active {
                            return Err(CheckError::PrematureKind { kind: "event odds zeroing" });
                        }
                        if !authorized {
                            return Err(CheckError::UnauthorizedOracle);
                        }
                        for &event_id in &zeroing_tx.event_ids {
                            if !overlay.exists::<Events>(&EventKey(event_id))? {
                                return Err(CheckError::UnknownEvent { event_id });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
