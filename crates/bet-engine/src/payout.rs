//! Payout reconstruction and block payout validation.
//!
//! A winning block's coinstake pays the stake return first, then every
//! settled bet. [`extract_payouts`] re-derives which coinstake outputs
//! are bet payouts purely from output order and values, and
//! [`is_block_payouts_valid`] compares that set against what the ledger
//! says the height owes. The per-version settlement formulas live behind
//! [`PayoutResolver`]; the engine owns the dispatch and the comparison.

use tracing::{debug, warn};

use bet_ledger::entities::{BetKey, PayoutInfo};
use bet_ledger::view::{LedgerError, LedgerOverlay, PayoutsInfo};
use bet_protocol::chain::{Block, OutPoint, Script, TxOut};
use bet_protocol::params::{ConsensusParams, ProtocolVersion};

use crate::context::{ChainContext, OracleAuth};

/// One expected payout: the amount, where it goes, and the audit row
/// tying it back to the bet that earned it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PayoutItem {
    pub value: i64,
    pub script: Script,
    pub info: PayoutInfo,
}

/// Version-specific payout enumeration, provided by the host.
///
/// The enumerators walk the ledger for bets settled by results within
/// the lookback window and mark paid bets completed, so they take the
/// overlay mutably; the undo counterparts reverse exactly those marks.
pub trait PayoutResolver {
    fn peerless_payouts_v2(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        results_block: &Block,
        height: i64,
    ) -> Result<Vec<PayoutItem>, LedgerError>;

    fn peerless_payouts_v3(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        results_block: &Block,
        height: i64,
    ) -> Result<Vec<PayoutItem>, LedgerError>;

    fn chain_games_payouts_v2(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        results_block: &Block,
        height: i64,
    ) -> Result<Vec<PayoutItem>, LedgerError>;

    fn chain_games_payouts_v3(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        results_block: &Block,
        height: i64,
    ) -> Result<Vec<PayoutItem>, LedgerError>;

    fn quick_games_payouts(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        height: i64,
    ) -> Result<Vec<PayoutItem>, LedgerError>;

    fn field_payouts_v4(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        height: i64,
    ) -> Result<Vec<PayoutItem>, LedgerError>;

    fn undo_peerless_payouts(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        results_block: &Block,
        height: i64,
    ) -> Result<(), LedgerError>;

    fn undo_quick_games_payouts(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        height: i64,
    ) -> Result<(), LedgerError>;

    fn undo_field_payouts(
        &self,
        overlay: &mut LedgerOverlay<'_>,
        height: i64,
    ) -> Result<(), LedgerError>;
}

/// Bet payouts re-derived from a block's coinstake outputs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PayoutExtract {
    /// Every non-zero output after the stake-return prefix, fee outputs
    /// included.
    pub payouts: Vec<TxOut>,
    /// Number of stake-return outputs preceding the payouts.
    pub payout_offset: u32,
    /// Payout outputs that are not the dev or OMNO fee script.
    pub winner_count: u32,
}

/// Classify the coinstake's outputs into stake return and bet payouts.
///
/// The stake-return prefix accumulates output values until it reaches
/// the staking input plus the expected mint (less a trailing masternode
/// reward, if one is carved off the end); everything after that point is
/// a payout. Returns `None` when the prefix never closes and there are
/// payouts anyway, which marks the block invalid.
pub fn extract_payouts(
    chain: &dyn ChainContext,
    oracle: &dyn OracleAuth,
    block: &Block,
    height: i64,
    expected_mint: i64,
    expected_mn_reward: i64,
) -> Option<PayoutExtract> {
    let coinstake = block.coinstake()?;
    let prevout = coinstake.vin.first()?.prevout;

    let prev_tx = chain.get_transaction(&prevout.txid)?;
    let stake_amount = prev_tx.vout.get(prevout.n as usize)?.value + expected_mint;

    let Some((dev_script, omno_script)) = oracle.fee_payout_scripts(height) else {
        warn!(height, "unable to find fee payout scripts, skipping payouts");
        return None;
    };

    let mut payouts = Vec::new();
    let mut payout_offset = 0u32;
    let mut winner_count = 0u32;
    let mut stakes_found = false;
    let mut stake_acc = 0i64;

    let mut max_vout = coinstake.vout.len();
    let mut mn_reward = 0;
    if max_vout > 2 && coinstake.vout[max_vout - 1].value == expected_mn_reward {
        max_vout -= 1;
        mn_reward = expected_mn_reward;
    }

    for out in &coinstake.vout[..max_vout] {
        if stakes_found {
            if out.script != dev_script && out.script != omno_script {
                winner_count += 1;
            }
            if out.value > 0 {
                payouts.push(out.clone());
            }
        } else {
            payout_offset += 1;
            stake_acc += out.value;
            if stake_acc + mn_reward == stake_amount {
                stakes_found = true;
            }
        }
    }

    // A block with nothing to pay never closes the prefix; that is fine
    // as long as no payout outputs were claimed.
    if stakes_found || (winner_count == 0 && stake_acc + mn_reward < stake_amount) {
        Some(PayoutExtract { payouts, payout_offset, winner_count })
    } else {
        None
    }
}

/// Compare the block's actual payouts against the expected set as
/// order-independent multisets of `(value, script)`, and on match write
/// one `PayoutInfo` audit row per coinstake payout output.
pub fn is_block_payouts_valid(
    chain: &dyn ChainContext,
    oracle: &dyn OracleAuth,
    overlay: &mut LedgerOverlay<'_>,
    expected: &[PayoutItem],
    block: &Block,
    height: i64,
    expected_mint: i64,
    expected_mn_reward: i64,
) -> Result<bool, LedgerError> {
    let Some(extract) =
        extract_payouts(chain, oracle, block, height, expected_mint, expected_mn_reward)
    else {
        warn!(height, "not all payouts found");
        return Ok(false);
    };

    let mut found_set: Vec<(i64, &Script)> =
        extract.payouts.iter().map(|out| (out.value, &out.script)).collect();
    let mut expected_set: Vec<(i64, &Script)> =
        expected.iter().map(|item| (item.value, &item.script)).collect();
    found_set.sort();
    expected_set.sort();

    if found_set != expected_set {
        warn!(height, "expected payouts:");
        for (value, script) in &expected_set {
            warn!("  {} {:?}", value, script);
        }
        warn!(height, "found payouts:");
        for (value, script) in &found_set {
            warn!("  {} {:?}", value, script);
        }
        warn!(height, "not all payouts validate");
        return Ok(false);
    }

    // Pair each coinstake output with one expected entry, consuming
    // matches so duplicate (value, script) pairs pair off one-to-one.
    let coinstake_txid = match block.coinstake() {
        Some(tx) => tx.txid(),
        // Unreachable: extract_payouts already required a coinstake.
        None => return Ok(false),
    };
    let mut remaining: Vec<&PayoutItem> = expected.iter().collect();
    for (i, out) in extract.payouts.iter().enumerate() {
        let matched = remaining
            .iter()
            .position(|item| item.value == out.value && item.script == out.script);
        let Some(pos) = matched else {
            warn!(height, "could not find expected payout");
            return Ok(false);
        };
        let key = BetKey::new(
            height,
            OutPoint::new(coinstake_txid, i as u32 + extract.payout_offset),
        );
        overlay.write::<PayoutsInfo>(&key, &remaining[pos].info)?;
        remaining.swap_remove(pos);
    }

    Ok(true)
}

/// Enumerate every payout owed at `height` from results settled in the
/// predecessor block, dispatched by protocol generation. Returns the
/// total expected mint and the payout set.
pub fn get_betting_payouts(
    chain: &dyn ChainContext,
    resolver: &dyn PayoutResolver,
    params: &ConsensusParams,
    overlay: &mut LedgerOverlay<'_>,
    height: i64,
) -> Result<(i64, Vec<PayoutItem>), LedgerError> {
    let Some(results_block) = chain.read_block(height - 1) else {
        debug!(height = height - 1, "unable to read results block");
        return Ok((0, Vec::new()));
    };

    let mut payouts = Vec::new();
    match params.protocol_version(height) {
        ProtocolVersion::V5 => {}
        ProtocolVersion::V4 => {
            payouts.extend(resolver.peerless_payouts_v3(overlay, &results_block, height)?);
            payouts.extend(resolver.chain_games_payouts_v3(overlay, &results_block, height)?);
            payouts.extend(resolver.quick_games_payouts(overlay, height)?);
            payouts.extend(resolver.field_payouts_v4(overlay, height)?);
        }
        ProtocolVersion::V3 => {
            payouts.extend(resolver.peerless_payouts_v3(overlay, &results_block, height)?);
            payouts.extend(resolver.chain_games_payouts_v3(overlay, &results_block, height)?);
            payouts.extend(resolver.quick_games_payouts(overlay, height)?);
        }
        ProtocolVersion::V2 => {
            payouts.extend(resolver.peerless_payouts_v2(overlay, &results_block, height)?);
            payouts.extend(resolver.chain_games_payouts_v2(overlay, &results_block, height)?);
        }
        ProtocolVersion::V1 => {}
    }

    let expected_mint = payouts.iter().map(|item| item.value).sum();
    Ok((expected_mint, payouts))
}
