//! Block-disconnection reversal.
//!
//! Everything here is the mirror image of connection: payouts are
//! reversed first, then each transaction's betting outputs in reverse
//! order. Connection tolerates semantic misses, disconnection does not:
//! a snapshot that cannot be applied, or a record that cannot be erased,
//! leaves the ledger inconsistent with the chain and is fatal.

use tracing::{debug, warn};

use bet_ledger::entities::{BetKey, EventKey, MappingKey, UndoKey, UndoSnapshot};
use bet_ledger::view::{
    Bets, ChainGamesBets, ChainGamesEvents, ChainGamesResults, Events, FieldBets, FieldEvents,
    FieldResults, LedgerOverlay, Mappings, QuickGamesBets, Results,
};
use bet_protocol::chain::{Block, OutPoint, Script, Transaction};
use bet_protocol::market::{MappingKind, ResultKind};
use bet_protocol::params::{ConsensusParams, ProtocolVersion};
use bet_protocol::tx::{parse_betting_tx, BettingTx};

use crate::context::{ChainContext, OracleAuth};
use crate::error::UndoError;
use crate::payout::PayoutResolver;

/// Script of the output the transaction's first input spends, looked up
/// through the chain only. During disconnection the block's funding
/// transactions are still indexed, so no in-block fallback is needed.
fn spending_script(chain: &dyn ChainContext, tx: &Transaction) -> Option<Script> {
    let input = tx.vin.first()?;
    let prev_tx = chain.get_transaction(&input.prevout.txid)?;
    prev_tx
        .vout
        .get(input.prevout.n as usize)
        .map(|out| out.script.clone())
}

/// Restore the snapshots recorded under `key` and drop the undo record.
///
/// Every snapshot must carry `expected_height` and must apply cleanly;
/// anything else means the undo log disagrees with the chain.
pub fn undo_event_changes(
    overlay: &mut LedgerOverlay<'_>,
    key: &UndoKey,
    expected_height: i64,
) -> Result<(), UndoError> {
    for entry in overlay.get_betting_undo(key)? {
        if entry.height != expected_height {
            return Err(UndoError::HeightMismatch {
                snapshot: entry.height,
                expected: expected_height,
            });
        }
        match &entry.snapshot {
            UndoSnapshot::Event(event) => {
                if !overlay.update::<Events>(&EventKey(event.event_id), event)? {
                    return Err(UndoError::RevertFailed { what: "event" });
                }
            }
            UndoSnapshot::FieldEvent(event) => {
                if !overlay.update::<FieldEvents>(&EventKey(event.event_id), event)? {
                    return Err(UndoError::RevertFailed { what: "field event" });
                }
            }
        }
    }
    overlay.erase_betting_undo(key)?;
    Ok(())
}

/// Revert one transaction's betting outputs, in reverse output order.
pub fn undo_betting_tx(
    chain: &dyn ChainContext,
    oracle: &dyn OracleAuth,
    params: &ConsensusParams,
    overlay: &mut LedgerOverlay<'_>,
    tx: &Transaction,
    height: i64,
) -> Result<(), UndoError> {
    let v3_active = params.protocol_version(height) >= ProtocolVersion::V3;
    let v4_active = params.protocol_version(height) >= ProtocolVersion::V4;

    let oracle_tx = spending_script(chain, tx)
        .map(|script| oracle.is_oracle_script(&script, height))
        .unwrap_or(false);

    debug!(txid = %tx.txid(), height, "undoing betting tx");

    for (n, out) in tx.vout.iter().enumerate().rev() {
        let Some(betting_tx) = parse_betting_tx(out) else {
            continue;
        };

        let outpoint = OutPoint::new(tx.txid(), n as u32);
        let betting_tx_id = UndoKey::for_outpoint(&outpoint);
        let bet_key = BetKey::new(height, outpoint);

        // Legacy outputs that found nothing to mutate at connection left
        // a marker instead of an undo record.
        if !v3_active && overlay.exists_failed_tx(&betting_tx_id)? {
            overlay.erase_failed_tx(&betting_tx_id)?;
            continue;
        }

        match &betting_tx {
            BettingTx::PeerlessBet(bet_tx) => {
                if overlay.exists::<Events>(&EventKey(bet_tx.event_id))? {
                    undo_event_changes(overlay, &betting_tx_id, height)?;
                    overlay.erase::<Bets>(&bet_key)?;
                } else {
                    debug!(event_id = bet_tx.event_id, "failed to find event");
                }
            }
            BettingTx::PeerlessParlayBet(parlay_tx) => {
                if !v3_active {
                    continue;
                }
                let mut all_found = !parlay_tx.legs.is_empty();
                for leg in &parlay_tx.legs {
                    if !overlay.exists::<Events>(&EventKey(leg.event_id))? {
                        debug!(event_id = leg.event_id, "failed to find event");
                        all_found = false;
                    }
                }
                if all_found {
                    undo_event_changes(overlay, &betting_tx_id, height)?;
                    overlay.erase::<Bets>(&bet_key)?;
                }
            }
            BettingTx::FieldBet(bet_tx) => {
                if !v4_active {
                    continue;
                }
                if !overlay.exists::<FieldEvents>(&EventKey(bet_tx.event_id))? {
                    debug!(event_id = bet_tx.event_id, "failed to find field event");
                    continue;
                }
                undo_event_changes(overlay, &betting_tx_id, height)?;
                overlay.erase::<FieldBets>(&bet_key)?;
            }
            BettingTx::FieldParlayBet(parlay_tx) => {
                if !v4_active {
                    continue;
                }
                let mut all_found = !parlay_tx.legs.is_empty();
                for leg in &parlay_tx.legs {
                    if !overlay.exists::<FieldEvents>(&EventKey(leg.event_id))? {
                        debug!(event_id = leg.event_id, "failed to find field event");
                        all_found = false;
                    }
                }
                if all_found {
                    undo_event_changes(overlay, &betting_tx_id, height)?;
                    overlay.erase::<FieldBets>(&bet_key)?;
                }
            }
            BettingTx::ChainGamesBet(bet_tx) => {
                if !v3_active {
                    continue;
                }
                // The event check runs against the locked view, matching
                // connection.
                if !overlay.base().exists::<ChainGamesEvents>(&EventKey(bet_tx.event_id))? {
                    warn!(event_id = bet_tx.event_id, "failed to find chain games event");
                    continue;
                }
                if !overlay.erase::<ChainGamesBets>(&bet_key)? {
                    return Err(UndoError::RevertFailed { what: "chain games bet" });
                }
            }
            BettingTx::QuickGamesBet(_) => {
                if !v3_active {
                    continue;
                }
                if !overlay.erase::<QuickGamesBets>(&bet_key)? {
                    return Err(UndoError::RevertFailed { what: "quick games bet" });
                }
            }
            oracle_kind => {
                if !oracle_tx {
                    continue;
                }
                match oracle_kind {
                    BettingTx::Mapping(map_tx) => {
                        if !v4_active
                            && matches!(
                                map_tx.kind,
                                MappingKind::IndividualSport | MappingKind::Contender
                            )
                        {
                            return Err(UndoError::PrematureMapping);
                        }
                        let key = MappingKey { kind: map_tx.kind, id: map_tx.id };
                        if overlay.exists::<Mappings>(&key)? {
                            if !overlay.erase::<Mappings>(&key)? {
                                return Err(UndoError::RevertFailed { what: "mapping" });
                            }
                        }
                    }
                    BettingTx::PeerlessEvent(event_tx) => {
                        let key = EventKey(event_tx.event_id);
                        if !overlay.exists::<Events>(&key)? {
                            debug!(event_id = event_tx.event_id, "failed to find event");
                            continue;
                        }
                        // A legacy republish left an undo record; a plain
                        // create left only the event.
                        if !v3_active && overlay.exists_betting_undo(&betting_tx_id)? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        } else if !overlay.erase::<Events>(&key)? {
                            return Err(UndoError::RevertFailed { what: "event" });
                        }
                    }
                    BettingTx::FieldEvent(event_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let key = EventKey(event_tx.event_id);
                        if overlay.exists::<FieldEvents>(&key)? {
                            if !overlay.erase::<FieldEvents>(&key)? {
                                return Err(UndoError::RevertFailed { what: "field event" });
                            }
                        }
                    }
                    BettingTx::FieldUpdateOdds(update_tx) => {
                        if !v4_active {
                            continue;
                        }
                        if overlay.exists::<FieldEvents>(&EventKey(update_tx.event_id))? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    BettingTx::FieldUpdateModifiers(update_tx) => {
                        if !v4_active {
                            continue;
                        }
                        if overlay.exists::<FieldEvents>(&EventKey(update_tx.event_id))? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    BettingTx::FieldUpdateMargin(update_tx) => {
                        if !v4_active {
                            continue;
                        }
                        if overlay.exists::<FieldEvents>(&EventKey(update_tx.event_id))? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    BettingTx::FieldZeroingOdds(zeroing_tx) => {
                        if !v4_active {
                            continue;
                        }
                        if overlay.exists::<FieldEvents>(&EventKey(zeroing_tx.event_id))? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    BettingTx::FieldResult(result_tx) => {
                        if !v4_active {
                            continue;
                        }
                        if result_tx.result_kind == ResultKind::MoneyLineRefund {
                            continue;
                        }
                        let key = EventKey(result_tx.event_id);
                        if !overlay.exists::<FieldEvents>(&key)? {
                            debug!(event_id = result_tx.event_id, "failed to find field event");
                            continue;
                        }
                        if overlay.exists::<FieldResults>(&key)? {
                            if !overlay.erase::<FieldResults>(&key)? {
                                return Err(UndoError::RevertFailed { what: "field result" });
                            }
                        }
                    }
                    BettingTx::PeerlessResult(result_tx) => {
                        let key = EventKey(result_tx.event_id);
                        if overlay.exists::<Results>(&key)? {
                            if !overlay.erase::<Results>(&key)? {
                                return Err(UndoError::RevertFailed { what: "result" });
                            }
                        }
                    }
                    BettingTx::PeerlessUpdateOdds(update_tx) => {
                        if overlay.exists::<Events>(&EventKey(update_tx.event_id))? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    BettingTx::ChainGamesEvent(event_tx) => {
                        if !v3_active {
                            continue;
                        }
                        if !overlay.erase::<ChainGamesEvents>(&EventKey(event_tx.event_id))? {
                            return Err(UndoError::RevertFailed { what: "chain games event" });
                        }
                    }
                    BettingTx::ChainGamesResult(result_tx) => {
                        if !v3_active {
                            continue;
                        }
                        if !overlay.erase::<ChainGamesResults>(&EventKey(result_tx.event_id))? {
                            return Err(UndoError::RevertFailed { what: "chain games result" });
                        }
                    }
                    BettingTx::PeerlessSpreadsEvent(spreads_tx) => {
                        if overlay.exists::<Events>(&EventKey(spreads_tx.event_id))? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    BettingTx::PeerlessTotalsEvent(totals_tx) => {
                        if overlay.exists::<Events>(&EventKey(totals_tx.event_id))? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    BettingTx::PeerlessEventPatch(patch_tx) => {
                        if overlay.exists::<Events>(&EventKey(patch_tx.event_id))? {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    BettingTx::PeerlessEventZeroingOdds(zeroing_tx) => {
                        if !v4_active {
                            continue;
                        }
                        let mut all_found = true;
                        for &event_id in &zeroing_tx.event_ids {
                            if !overlay.exists::<Events>(&EventKey(event_id))? {
                                debug!(event_id, "failed to find event");
                                all_found = false;
                            }
                        }
                        if all_found {
                            undo_event_changes(overlay, &betting_tx_id, height)?;
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Disconnect a block's betting effects: reverse the payouts settled at
/// `height`, drop its payout-audit rows, then revert every transaction
/// in reverse order.
pub fn betting_undo(
    chain: &dyn ChainContext,
    oracle: &dyn OracleAuth,
    params: &ConsensusParams,
    resolver: &dyn PayoutResolver,
    overlay: &mut LedgerOverlay<'_>,
    height: i64,
    txs: &[Transaction],
) -> Result<(), UndoError> {
    if height <= params.v2_start_height {
        return Ok(());
    }

    if let Some(results_block) = chain.read_block(height - 1) {
        resolver
            .undo_peerless_payouts(overlay, &results_block, height)
            .map_err(|err| UndoError::PayoutReversal(format!("peerless: {err}")))?;
    } else {
        debug!(height = height - 1, "unable to read results block");
    }
    resolver
        .undo_quick_games_payouts(overlay, height)
        .map_err(|err| UndoError::PayoutReversal(format!("quick games: {err}")))?;
    if height > params.v4_start_height {
        resolver
            .undo_field_payouts(overlay, height)
            .map_err(|err| UndoError::PayoutReversal(format!("field: {err}")))?;
    }

    overlay.erase_payouts_at_height(height)?;

    for tx in txs.iter().rev() {
        undo_betting_tx(chain, oracle, params, overlay, tx, height)?;
    }
    Ok(())
}
