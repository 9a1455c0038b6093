//! Block-connection processing.
//!
//! Runs after validation for every transaction of a connecting block and
//! applies its betting outputs to the ledger overlay. Bets are priced
//! against the overlay's base, which still holds the pre-block odds, so
//! an odds update earlier in the same block never changes what a bet
//! pays; liability accumulates on the overlay state.
//!
//! Unlike validation, nothing here rejects: a reference that cannot be
//! resolved is skipped, which from the V3 era on cannot happen for a
//! transaction that passed validation. The pre-V3 fallbacks (failed-tx
//! markers, event republish on create collision) exist to reproduce the
//! historical chain, where validation did not yet run.

use tracing::{debug, warn};

use bet_ledger::entities::{
    BetKey, BetRecord, ChainGamesBetRecord, ChainGamesEventRecord, ChainGamesResultRecord,
    EventKey, EventRecord, FieldBetRecord, FieldEventRecord, FieldResultRecord, MappingKey,
    MappingRecord, QuickGamesBetRecord, ResultRecord, UndoEntry, UndoKey, UndoSnapshot,
};
use bet_ledger::view::{
    Bets, ChainGamesBets, ChainGamesEvents, ChainGamesResults, Events, FieldBets, FieldEvents,
    FieldResults, LedgerError, LedgerOverlay, Mappings, QuickGamesBets, Results,
};
use bet_protocol::chain::{Block, OutPoint, Script, Transaction};
use bet_protocol::market::{ContenderPlace, MappingKind};
use bet_protocol::odds::{gross_payout, payout_and_burn};
use bet_protocol::params::{ConsensusParams, ProtocolVersion};
use bet_protocol::tx::{has_op_return_output, parse_betting_tx, BettingTx};

use crate::context::{ChainContext, OracleAuth};

/// Script of the output the transaction's first input spends. Falls back
/// to the block's own transactions, since a bet can spend a funding
/// transaction from the same block.
fn spending_script(
    chain: &dyn ChainContext,
    block: &Block,
    tx: &Transaction,
) -> Option<Script> {
    let input = tx.vin.first()?;
    if let Some(prev_tx) = chain.get_transaction(&input.prevout.txid) {
        if let Some(out) = prev_tx.vout.get(input.prevout.n as usize) {
            return Some(out.script.clone());
        }
    }
    block
        .txs
        .iter()
        .find(|block_tx| block_tx.txid() == input.prevout.txid)
        .and_then(|prev_tx| prev_tx.vout.get(input.prevout.n as usize))
        .map(|out| out.script.clone())
}

fn event_undo(event: &EventRecord, height: i64) -> UndoEntry {
    UndoEntry {
        snapshot: UndoSnapshot::Event(event.clone()),
        height,
    }
}

fn field_event_undo(event: &FieldEventRecord, height: i64) -> UndoEntry {
    UndoEntry {
        snapshot: UndoSnapshot::FieldEvent(event.clone()),
        height,
    }
}

/// Apply one accepted transaction's betting outputs to the overlay.
///
/// Only ledger failures propagate; every semantic miss is a logged skip.
pub fn process_betting_tx(
    chain: &dyn ChainContext,
    oracle: &dyn OracleAuth,
    params: &ConsensusParams,
    overlay: &mut LedgerOverlay<'_>,
    tx: &Transaction,
    height: i64,
    block: &Block,
) -> Result<(), LedgerError> {
    if !has_op_return_output(tx) {
        return Ok(());
    }

    let v3_active = params.protocol_version(height) >= ProtocolVersion::V3;
    let v4_active = params.protocol_version(height) >= ProtocolVersion::V4;

    debug!(txid = %tx.txid(), height, time = block.time, "processing betting tx");

    for (n, out) in tx.vout.iter().enumerate() {
        let Some(betting_tx) = parse_betting_tx(out) else {
            continue;
        };

        let Some(address) = spending_script(chain, block, tx) else {
            debug!(txid = %tx.txid(), vout = n, "cannot resolve spending script, skipping output");
            continue;
        };

        let amount = out.value;
        let outpoint = OutPoint::new(tx.txid(), n as u32);
        let betting_tx_id = UndoKey::for_outpoint(&outpoint);
        let bet_key = BetKey::new(height, outpoint);

        match &betting_tx {
            BettingTx::PeerlessBet(bet_tx) => {
                let key = EventKey(bet_tx.event_id);
                let locked = overlay.base().read::<Events>(&key)?;
                let cached = overlay.read::<Events>(&key)?;
                let (Some(locked), Some(mut event)) = (locked, cached) else {
                    warn!(event_id = bet_tx.event_id, "failed to find event for bet");
                    continue;
                };
                overlay.save_betting_undo(&betting_tx_id, vec![event_undo(&event, height)])?;

                let (payout, _burn) = payout_and_burn(amount, locked.odds_for(bet_tx.outcome));
                event.register_bet(bet_tx.outcome, payout, amount);
                if !overlay.update::<Events>(&key, &event)? {
                    warn!(event_id = bet_tx.event_id, "failed to update event");
                    continue;
                }
                overlay.write::<Bets>(
                    &bet_key,
                    &BetRecord::new(amount, address, vec![bet_tx.clone()], vec![locked], block.time),
                )?;
            }
            BettingTx::PeerlessParlayBet(parlay_tx) => {
                if !v3_active {
                    continue;
                }
                let mut locked_events = Vec::new();
                let mut undos = Vec::new();
                for leg in &parlay_tx.legs {
                    let key = EventKey(leg.event_id);
                    let locked = overlay.base().read::<Events>(&key)?;
                    let cached = overlay.read::<Events>(&key)?;
                    let (Some(locked), Some(mut event)) = (locked, cached) else {
                        warn!(event_id = leg.event_id, "failed to find event for parlay leg");
                        continue;
                    };
                    undos.push(event_undo(&event, height));
                    event.register_parlay_leg(leg.outcome);
                    locked_events.push(locked);
                    overlay.update::<Events>(&key, &event)?;
                }
                if !parlay_tx.legs.is_empty() {
                    overlay.save_betting_undo(&betting_tx_id, undos)?;
                    overlay.write::<Bets>(
                        &bet_key,
                        &BetRecord::new(
                            amount,
                            address,
                            parlay_tx.legs.clone(),
                            locked_events,
                            block.time,
                        ),
                    )?;
                }
            }
            BettingTx::FieldBet(bet_tx) => {
                if !v4_active {
                    continue;
                }
                let key = EventKey(bet_tx.event_id);
                let Some(locked) = overlay.base().read::<FieldEvents>(&key)? else {
                    debug!(event_id = bet_tx.event_id, "field event missing from locked view");
                    continue;
                };
                let Some(mut event) = overlay.read::<FieldEvents>(&key)? else {
                    debug!(event_id = bet_tx.event_id, "failed to find field event");
                    continue;
                };
                overlay
                    .save_betting_undo(&betting_tx_id, vec![field_event_undo(&event, height)])?;

                let payout =
                    gross_payout(amount, locked.market_odds(bet_tx.contender_id, bet_tx.market));
                event.register_bet(bet_tx.contender_id, bet_tx.market, payout);
                if !overlay.update::<FieldEvents>(&key, &event)? {
                    warn!(event_id = bet_tx.event_id, "failed to update field event");
                    continue;
                }
                if !overlay.write::<FieldBets>(
                    &bet_key,
                    &FieldBetRecord::new(
                        amount,
                        address,
                        vec![bet_tx.clone()],
                        vec![locked],
                        block.time,
                    ),
                )? {
                    warn!(event_id = bet_tx.event_id, "failed to write field bet");
                }
            }
            BettingTx::FieldParlayBet(parlay_tx) => {
                if !v4_active {
                    continue;
                }
                let mut locked_events = Vec::new();
                let mut undos = Vec::new();
                for leg in &parlay_tx.legs {
                    let key = EventKey(leg.event_id);
                    let Some(locked) = overlay.base().read::<FieldEvents>(&key)? else {
                        debug!(event_id = leg.event_id, "field event missing from locked view");
                        continue;
                    };
                    let Some(mut event) = overlay.read::<FieldEvents>(&key)? else {
                        debug!(event_id = leg.event_id, "failed to find field event");
                        continue;
                    };
                    locked_events.push(locked);
                    undos.push(field_event_undo(&event, height));
                    event.register_parlay_leg(leg.contender_id, leg.market);
                    overlay.update::<FieldEvents>(&key, &event)?;
                }
                if !parlay_tx.legs.is_empty() {
                    overlay.save_betting_undo(&betting_tx_id, undos)?;
                    overlay.write::<FieldBets>(
                        &bet_key,
                        &FieldBetRecord::new(
                            amount,
                            address,
                            parlay_tx.legs.clone(),
                            locked_events,
                            block.time,
                        ),
                    )?;
                }
            }
            BettingTx::ChainGamesBet(bet_tx) => {
                if !v3_active || height >= params.quick_games_end_height {
                    continue;
                }
                // The event check runs against the locked view.
                if !overlay.base().exists::<ChainGamesEvents>(&EventKey(bet_tx.event_id))? {
                    warn!(event_id = bet_tx.event_id, "failed to find chain games event");
                    continue;
                }
                if !overlay.write::<ChainGamesBets>(
                    &bet_key,
                    &ChainGamesBetRecord {
                        event_id: bet_tx.event_id,
                        amount,
                        address,
                        bet_time: block.time,
                        completed: false,
                    },
                )? {
                    warn!(event_id = bet_tx.event_id, "failed to write chain games bet");
                }
            }
            BettingTx::QuickGamesBet(bet_tx) => {
                if !v3_active || height >= params.quick_games_end_height {
                    continue;
                }
                if !overlay.write::<QuickGamesBets>(
                    &bet_key,
                    &QuickGamesBetRecord {
                        game: bet_tx.game,
                        bet_info: bet_tx.bet_info.clone(),
                        amount,
                        address,
                        bet_time: block.time,
                        completed: false,
                    },
                )? {
                    warn!("failed to write quick games bet");
                }
            }
            oracle_tx => {
                if !oracle.is_oracle_script(&address, height) {
                    continue;
                }
                match oracle_tx {
                    BettingTx::Mapping(map_tx) => {
                        if !v4_active
                            && matches!(
                                map_tx.kind,
                                MappingKind::IndividualSport | MappingKind::Contender
                            )
                        {
                            continue;
                        }
                        let key = MappingKey { kind: map_tx.kind, id: map_tx.id };
                        let record = MappingRecord { name: map_tx.name.clone() };
                        if !overlay.write::<Mappings>(&key, &record)? {
                            if !v3_active {
                                overlay.save_failed_tx(&betting_tx_id)?;
                            }
                            warn!(kind = ?map_tx.kind, id = map_tx.id, "failed to write new mapping");
                        }
                    }
                    BettingTx::PeerlessEvent(event_tx) => {
                        let mut event = EventRecord::from_create(event_tx);
                        if !v3_active {
                            event.creation_height = height;
                            event.legacy_home_favorite = event_tx.home_odds < event_tx.away_odds;
                        }
                        let key = EventKey(event.event_id);
                        if !overlay.write::<Events>(&key, &event)? {
                            // Legacy republish: before V3 the oracle reused
                            // event creation to refresh a live event.
                            let existing = if !v3_active {
                                overlay.read::<Events>(&key)?
                            } else {
                                None
                            };
                            if let Some(mut existing) = existing {
                                overlay.save_betting_undo(
                                    &betting_tx_id,
                                    vec![event_undo(&existing, height)],
                                )?;
                                existing.apply_republish(event_tx);
                                if !overlay.update::<Events>(&key, &existing)? {
                                    warn!(event_id = event_tx.event_id, "failed to update event");
                                }
                            } else {
                                if !v3_active {
                                    overlay.save_failed_tx(&betting_tx_id)?;
                                }
                                warn!(event_id = event_tx.event_id, "failed to write new event");
                            }
                        }
                    }
                    BettingTx::FieldEvent(event_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let mut event = FieldEventRecord::from_create(event_tx);
                        event.calc_odds();
                        if !overlay.write::<FieldEvents>(&EventKey(event.event_id), &event)? {
                            warn!(event_id = event_tx.event_id, "failed to write new field event");
                        }
                    }
                    BettingTx::FieldUpdateOdds(update_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let key = EventKey(update_tx.event_id);
                        let Some(mut event) = overlay.read::<FieldEvents>(&key)? else {
                            warn!(event_id = update_tx.event_id, "failed to find field event");
                            continue;
                        };
                        overlay.save_betting_undo(
                            &betting_tx_id,
                            vec![field_event_undo(&event, height)],
                        )?;
                        event.apply_update_odds(&update_tx.contender_odds);
                        event.calc_odds();
                        if !overlay.update::<FieldEvents>(&key, &event)? {
                            warn!(event_id = update_tx.event_id, "failed to update field event");
                        }
                    }
                    BettingTx::FieldUpdateModifiers(update_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let key = EventKey(update_tx.event_id);
                        let Some(mut event) = overlay.read::<FieldEvents>(&key)? else {
                            warn!(event_id = update_tx.event_id, "failed to find field event");
                            continue;
                        };
                        overlay.save_betting_undo(
                            &betting_tx_id,
                            vec![field_event_undo(&event, height)],
                        )?;
                        event.apply_modifiers(&update_tx.contender_modifiers);
                        event.calc_odds();
                        if !overlay.update::<FieldEvents>(&key, &event)? {
                            warn!(event_id = update_tx.event_id, "failed to update field event");
                        }
                    }
                    BettingTx::FieldUpdateMargin(update_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let key = EventKey(update_tx.event_id);
                        let Some(mut event) = overlay.read::<FieldEvents>(&key)? else {
                            warn!(event_id = update_tx.event_id, "failed to find field event");
                            continue;
                        };
                        overlay.save_betting_undo(
                            &betting_tx_id,
                            vec![field_event_undo(&event, height)],
                        )?;
                        event.apply_margin(update_tx.margin_percent);
                        event.calc_odds();
                        if !overlay.update::<FieldEvents>(&key, &event)? {
                            warn!(event_id = update_tx.event_id, "failed to update field event");
                        }
                    }
                    BettingTx::FieldZeroingOdds(zeroing_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let key = EventKey(zeroing_tx.event_id);
                        let Some(mut event) = overlay.read::<FieldEvents>(&key)? else {
                            warn!(event_id = zeroing_tx.event_id, "failed to find field event");
                            continue;
                        };
                        overlay.save_betting_undo(
                            &betting_tx_id,
                            vec![field_event_undo(&event, height)],
                        )?;
                        event.zero_odds();
                        if !overlay.update::<FieldEvents>(&key, &event)? {
                            warn!(event_id = zeroing_tx.event_id, "failed to update field event");
                        }
                    }
                    BettingTx::FieldResult(result_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let key = EventKey(result_tx.event_id);
                        let Some(event) = overlay.read::<FieldEvents>(&key)? else {
                            warn!(event_id = result_tx.event_id, "failed to find field event");
                            continue;
                        };
                        // The stored result covers every contender of the
                        // event; unmentioned contenders did not finish.
                        let contender_results = event
                            .contenders
                            .keys()
                            .map(|&id| {
                                let place = result_tx
                                    .contender_results
                                    .get(&id)
                                    .copied()
                                    .unwrap_or(ContenderPlace::DidNotFinish);
                                (id, place)
                            })
                            .collect();
                        let result = FieldResultRecord {
                            event_id: result_tx.event_id,
                            result_kind: result_tx.result_kind,
                            contender_results,
                        };
                        if !overlay.write::<FieldResults>(&key, &result)? {
                            warn!(event_id = result_tx.event_id, "failed to write field result");
                        }
                    }
                    BettingTx::PeerlessResult(result_tx) => {
                        let key = EventKey(result_tx.event_id);
                        if !overlay.exists::<Events>(&key)? {
                            if !v3_active {
                                overlay.save_failed_tx(&betting_tx_id)?;
                            }
                            warn!(event_id = result_tx.event_id, "failed to find event");
                            continue;
                        }
                        let result = ResultRecord {
                            event_id: result_tx.event_id,
                            result_kind: result_tx.result_kind,
                            home_score: result_tx.home_score,
                            away_score: result_tx.away_score,
                        };
                        if !overlay.write::<Results>(&key, &result)? {
                            if !v3_active {
                                overlay.save_failed_tx(&betting_tx_id)?;
                            }
                            warn!(event_id = result_tx.event_id, "failed to write result");
                        }
                    }
                    BettingTx::PeerlessUpdateOdds(update_tx) => {
                        let key = EventKey(update_tx.event_id);
                        let Some(mut event) = overlay.read::<Events>(&key)? else {
                            if !v3_active {
                                overlay.save_failed_tx(&betting_tx_id)?;
                            }
                            warn!(event_id = update_tx.event_id, "failed to find event");
                            continue;
                        };
                        overlay
                            .save_betting_undo(&betting_tx_id, vec![event_undo(&event, height)])?;
                        event.apply_update_odds(
                            update_tx.home_odds,
                            update_tx.away_odds,
                            update_tx.draw_odds,
                        );
                        if !overlay.update::<Events>(&key, &event)? {
                            warn!(event_id = update_tx.event_id, "failed to update event");
                        }
                    }
                    BettingTx::ChainGamesEvent(event_tx) => {
                        if !v3_active || height >= params.quick_games_end_height {
                            continue;
                        }
                        if !overlay.write::<ChainGamesEvents>(
                            &EventKey(event_tx.event_id),
                            &ChainGamesEventRecord {
                                event_id: event_tx.event_id,
                                entry_fee: event_tx.entry_fee,
                            },
                        )? {
                            warn!(event_id = event_tx.event_id, "failed to write new chain games event");
                        }
                    }
                    BettingTx::ChainGamesResult(result_tx) => {
                        if !v3_active || height >= params.quick_games_end_height {
                            continue;
                        }
                        let key = EventKey(result_tx.event_id);
                        if !overlay.exists::<ChainGamesEvents>(&key)? {
                            warn!(event_id = result_tx.event_id, "failed to find chain games event");
                            continue;
                        }
                        if !overlay.write::<ChainGamesResults>(
                            &key,
                            &ChainGamesResultRecord { event_id: result_tx.event_id },
                        )? {
                            warn!(event_id = result_tx.event_id, "failed to write chain games result");
                        }
                    }
                    BettingTx::PeerlessSpreadsEvent(spreads_tx) => {
                        let key = EventKey(spreads_tx.event_id);
                        let Some(mut event) = overlay.read::<Events>(&key)? else {
                            if !v3_active {
                                overlay.save_failed_tx(&betting_tx_id)?;
                            }
                            warn!(event_id = spreads_tx.event_id, "failed to find event");
                            continue;
                        };
                        overlay
                            .save_betting_undo(&betting_tx_id, vec![event_undo(&event, height)])?;
                        event.apply_spreads(
                            spreads_tx.points,
                            spreads_tx.home_odds,
                            spreads_tx.away_odds,
                        );
                        if !overlay.update::<Events>(&key, &event)? {
                            warn!(event_id = spreads_tx.event_id, "failed to update event");
                        }
                    }
                    BettingTx::PeerlessTotalsEvent(totals_tx) => {
                        let key = EventKey(totals_tx.event_id);
                        let Some(mut event) = overlay.read::<Events>(&key)? else {
                            if !v3_active {
                                overlay.save_failed_tx(&betting_tx_id)?;
                            }
                            warn!(event_id = totals_tx.event_id, "failed to find event");
                            continue;
                        };
                        overlay
                            .save_betting_undo(&betting_tx_id, vec![event_undo(&event, height)])?;
                        event.apply_totals(
                            totals_tx.points,
                            totals_tx.over_odds,
                            totals_tx.under_odds,
                        );
                        if !overlay.update::<Events>(&key, &event)? {
                            warn!(event_id = totals_tx.event_id, "failed to update event");
                        }
                    }
                    BettingTx::PeerlessEventPatch(patch_tx) => {
                        let key = EventKey(patch_tx.event_id);
                        let Some(mut event) = overlay.read::<Events>(&key)? else {
                            if !v3_active {
                                overlay.save_failed_tx(&betting_tx_id)?;
                            }
                            warn!(event_id = patch_tx.event_id, "failed to find event");
                            continue;
                        };
                        overlay
                            .save_betting_undo(&betting_tx_id, vec![event_undo(&event, height)])?;
                        event.apply_patch(patch_tx.start_time);
                        if !overlay.update::<Events>(&key, &event)? {
                            warn!(event_id = patch_tx.event_id, "failed to update event");
                        }
                    }
                    BettingTx::PeerlessEventZeroingOdds(zeroing_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let mut undos = Vec::new();
                        for &event_id in &zeroing_tx.event_ids {
                            let key = EventKey(event_id);
                            let Some(mut event) = overlay.read::<Events>(&key)? else {
                                continue;
                            };
                            undos.push(event_undo(&event, height));
                            event.zero_odds();
                            if !overlay.update::<Events>(&key, &event)? {
                                warn!(event_id, "failed to update event");
                            }
                        }
                        if !undos.is_empty() {
                            overlay.save_betting_undo(&betting_tx_id, undos)?;
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
