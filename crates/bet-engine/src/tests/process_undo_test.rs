//! Processing and undo engine tests, including full connect/disconnect
//! round trips.

use bet_ledger::entities::{EventKey, EventRecord, UndoEntry, UndoKey, UndoSnapshot};
use bet_ledger::view::{
    BettingLedger, Bets, ChainGamesBets, ChainGamesEvents, Events, LedgerOverlay, Results, Undos,
};
use bet_protocol::chain::{Block, OutPoint, Transaction};
use bet_protocol::market::{Outcome, ResultKind};
use bet_protocol::tx::{
    BettingTx, ChainGamesBetTx, ChainGamesEventTx, PeerlessBetTx, PeerlessParlayBetTx,
    PeerlessResultTx, PeerlessUpdateOddsTx,
};
use bet_protocol::COIN;

use super::harness::*;
use crate::error::{CheckError, UndoError};
use crate::process::process_betting_tx;
use crate::undo::{betting_undo, undo_betting_tx, undo_event_changes};
use crate::validate::check_betting_tx;

const HEIGHT: i64 = 351;

fn block_of(txs: &[&Transaction]) -> Block {
    Block {
        time: 1_700_000_123,
        txs: txs.iter().map(|tx| (*tx).clone()).collect(),
    }
}

fn connect(
    chain: &TestChain,
    overlay: &mut LedgerOverlay<'_>,
    block: &Block,
    height: i64,
) {
    for tx in &block.txs {
        process_betting_tx(chain, &TestOracle, &params(), overlay, tx, height, block).unwrap();
    }
}

#[test]
fn test_bet_prices_at_locked_odds_while_liability_tracks_updates() {
    let ledger = ledger();
    seed_event(&ledger, 1, 20_000);
    let mut chain = TestChain::new();

    // Same block: the oracle moves home odds to 3.0x, then a bet lands.
    let update = chain.betting_tx(
        &oracle_script(),
        &BettingTx::PeerlessUpdateOdds(PeerlessUpdateOddsTx {
            event_id: 1,
            home_odds: 30_000,
            away_odds: 20_000,
            draw_odds: 20_000,
        }),
        0,
    );
    let bet = chain.betting_tx(
        &player_script(),
        &BettingTx::PeerlessBet(PeerlessBetTx {
            event_id: 1,
            outcome: Outcome::MoneyLineHomeWin,
        }),
        100 * COIN,
    );
    let block = block_of(&[&update, &bet]);

    let mut overlay = LedgerOverlay::new(&ledger);
    connect(&chain, &mut overlay, &block, HEIGHT);
    overlay.flush().unwrap();

    // The bet record froze the pre-block odds.
    let bets = ledger.scan::<Bets>().unwrap();
    assert_eq!(bets.len(), 1);
    let record = &bets[0].1;
    assert_eq!(record.amount, 100 * COIN);
    assert_eq!(record.address, player_script());
    assert_eq!(record.bet_time, block.time);
    assert_eq!(record.locked_events[0].home_odds, 20_000);

    // The live event carries the new odds and the liability priced at
    // the locked 2.0x (194 coins after the winnings burn).
    let event = ledger.read::<Events>(&EventKey(1)).unwrap().unwrap();
    assert_eq!(event.home_odds, 30_000);
    assert_eq!(event.home_liability, 194);
    assert_eq!(event.home_bets, 1);
}

#[test]
fn test_connect_then_disconnect_restores_committed_state() {
    let ledger = ledger();
    seed_event(&ledger, 1, 20_000);
    seed_event(&ledger, 2, 15_000);
    let mut chain = TestChain::new();

    let events_before = ledger.scan::<Events>().unwrap();

    let update = chain.betting_tx(
        &oracle_script(),
        &BettingTx::PeerlessUpdateOdds(PeerlessUpdateOddsTx {
            event_id: 1,
            home_odds: 25_000,
            away_odds: 19_000,
            draw_odds: 21_000,
        }),
        0,
    );
    let single = chain.betting_tx(
        &player_script(),
        &BettingTx::PeerlessBet(PeerlessBetTx {
            event_id: 1,
            outcome: Outcome::MoneyLineHomeWin,
        }),
        100 * COIN,
    );
    let parlay = chain.betting_tx(
        &player_script(),
        &BettingTx::PeerlessParlayBet(PeerlessParlayBetTx {
            legs: vec![
                PeerlessBetTx { event_id: 1, outcome: Outcome::MoneyLineAwayWin },
                PeerlessBetTx { event_id: 2, outcome: Outcome::MoneyLineDraw },
            ],
        }),
        50 * COIN,
    );
    let block = block_of(&[&update, &single, &parlay]);
    chain.add_block(HEIGHT - 1, &block_of(&[]));

    let mut overlay = LedgerOverlay::new(&ledger);
    connect(&chain, &mut overlay, &block, HEIGHT);
    overlay.flush().unwrap();

    assert_ne!(ledger.scan::<Events>().unwrap(), events_before);
    assert_eq!(ledger.scan::<Bets>().unwrap().len(), 2);
    assert!(!ledger.scan::<Undos>().unwrap().is_empty());

    let resolver = RecordingResolver::default();
    let mut overlay = LedgerOverlay::new(&ledger);
    betting_undo(
        &chain,
        &TestOracle,
        &params(),
        &resolver,
        &mut overlay,
        HEIGHT,
        &block.txs,
    )
    .unwrap();
    overlay.flush().unwrap();

    assert_eq!(ledger.scan::<Events>().unwrap(), events_before);
    assert!(ledger.scan::<Bets>().unwrap().is_empty());
    assert!(ledger.scan::<Undos>().unwrap().is_empty());
    assert_eq!(*resolver.calls.borrow(), vec!["undo_pl", "undo_qg", "undo_field"]);
}

#[test]
fn test_parlay_registers_every_leg_once() {
    let ledger = ledger();
    seed_event(&ledger, 1, 20_000);
    seed_event(&ledger, 2, 20_000);
    let mut chain = TestChain::new();

    let parlay = chain.betting_tx(
        &player_script(),
        &BettingTx::PeerlessParlayBet(PeerlessParlayBetTx {
            legs: vec![
                PeerlessBetTx { event_id: 1, outcome: Outcome::MoneyLineHomeWin },
                PeerlessBetTx { event_id: 2, outcome: Outcome::MoneyLineAwayWin },
            ],
        }),
        50 * COIN,
    );
    let block = block_of(&[&parlay]);

    let mut overlay = LedgerOverlay::new(&ledger);
    connect(&chain, &mut overlay, &block, HEIGHT);
    overlay.flush().unwrap();

    let bets = ledger.scan::<Bets>().unwrap();
    assert_eq!(bets.len(), 1);
    assert_eq!(bets[0].1.legs.len(), 2);
    assert_eq!(bets[0].1.locked_events.len(), 2);

    // Legs only bump counters; parlay exposure is not per-event.
    let event = ledger.read::<Events>(&EventKey(1)).unwrap().unwrap();
    assert_eq!(event.home_bets, 1);
    assert_eq!(event.home_liability, 0);

    let undo_key = UndoKey::for_outpoint(&OutPoint::new(parlay.txid(), 0));
    assert_eq!(ledger.read::<Undos>(&undo_key).unwrap().unwrap().len(), 2);
}

#[test]
fn test_non_oracle_sender_cannot_publish_oracle_kinds() {
    let ledger = ledger();
    seed_mappings(&ledger);
    let mut chain = TestChain::new();

    let create = chain.betting_tx(&player_script(), &BettingTx::PeerlessEvent(event_tx(9)), 0);
    let block = block_of(&[&create]);

    let mut overlay = LedgerOverlay::new(&ledger);
    connect(&chain, &mut overlay, &block, HEIGHT);
    overlay.flush().unwrap();

    assert!(ledger.scan::<Events>().unwrap().is_empty());
}

#[test]
fn test_chain_games_bet_checks_the_locked_view() {
    let ledger = ledger();
    let mut chain = TestChain::new();

    // Event and bet in the same block: the bet must not see the event,
    // which only exists in the overlay.
    let create = chain.betting_tx(
        &oracle_script(),
        &BettingTx::ChainGamesEvent(ChainGamesEventTx { event_id: 4, entry_fee: 25 }),
        0,
    );
    let bet = chain.betting_tx(
        &player_script(),
        &BettingTx::ChainGamesBet(ChainGamesBetTx { event_id: 4 }),
        25 * COIN,
    );
    let block = block_of(&[&create, &bet]);

    let mut overlay = LedgerOverlay::new(&ledger);
    connect(&chain, &mut overlay, &block, HEIGHT);
    overlay.flush().unwrap();

    assert!(ledger.exists::<ChainGamesEvents>(&EventKey(4)).unwrap());
    assert!(ledger.scan::<ChainGamesBets>().unwrap().is_empty());

    // Next block the event is committed and the bet lands.
    let bet = chain.betting_tx(
        &player_script(),
        &BettingTx::ChainGamesBet(ChainGamesBetTx { event_id: 4 }),
        25 * COIN,
    );
    let block = block_of(&[&bet]);
    let mut overlay = LedgerOverlay::new(&ledger);
    connect(&chain, &mut overlay, &block, HEIGHT + 1);
    overlay.flush().unwrap();

    assert_eq!(ledger.scan::<ChainGamesBets>().unwrap().len(), 1);
}

#[test]
fn test_undo_rejects_snapshots_from_another_height() {
    let ledger = ledger();
    seed_event(&ledger, 1, 20_000);

    let key = UndoKey::for_outpoint(&OutPoint::new(
        Transaction::new(vec![], vec![]).txid(),
        0,
    ));
    let snapshot = EventRecord { event_id: 1, home_odds: 20_000, ..EventRecord::default() };

    let mut overlay = LedgerOverlay::new(&ledger);
    overlay
        .save_betting_undo(
            &key,
            vec![UndoEntry { snapshot: UndoSnapshot::Event(snapshot), height: 999 }],
        )
        .unwrap();

    assert!(matches!(
        undo_event_changes(&mut overlay, &key, HEIGHT),
        Err(UndoError::HeightMismatch { snapshot: 999, expected: HEIGHT })
    ));
}

#[test]
fn test_legacy_failed_marker_round_trip() {
    let ledger = ledger();
    let mut chain = TestChain::new();
    // V2-era height: processing marks misses instead of rejecting.
    let height = 260;

    let result = chain.betting_tx(
        &oracle_script(),
        &BettingTx::PeerlessResult(PeerlessResultTx {
            event_id: 42,
            result_kind: ResultKind::Standard,
            home_score: 0,
            away_score: 0,
        }),
        0,
    );
    let block = block_of(&[&result]);

    let mut overlay = LedgerOverlay::new(&ledger);
    connect(&chain, &mut overlay, &block, height);

    let marker = UndoKey::for_outpoint(&OutPoint::new(result.txid(), 0));
    assert!(overlay.exists_failed_tx(&marker).unwrap());

    undo_betting_tx(&chain, &TestOracle, &params(), &mut overlay, &result, height).unwrap();
    assert!(!overlay.exists_failed_tx(&marker).unwrap());
}

/// Full event lifecycle over three blocks: creation, odds move plus a
/// bet, then the result. Each transaction passes validation before it
/// is processed, as block connection would run them.
#[test]
fn test_event_lifecycle_create_update_bet_result() {
    let ledger = ledger();
    seed_mappings(&ledger);
    let mut chain = TestChain::new();
    let params = params();

    let checked_connect = |chain: &TestChain, ledger: &BettingLedger, block: &Block, height| {
        let mut overlay = LedgerOverlay::new(ledger);
        for tx in &block.txs {
            check_betting_tx(chain, &TestOracle, &TestSporks::default(), &params, &overlay, tx, height)
                .unwrap();
            process_betting_tx(chain, &TestOracle, &params, &mut overlay, tx, height, block)
                .unwrap();
        }
        overlay.flush().unwrap();
    };

    let create = chain.betting_tx(&oracle_script(), &BettingTx::PeerlessEvent(event_tx(7)), 0);
    checked_connect(&chain, &ledger, &block_of(&[&create]), HEIGHT);
    assert_eq!(
        ledger.read::<Events>(&EventKey(7)).unwrap().unwrap().home_odds,
        18_000
    );

    let update = chain.betting_tx(
        &oracle_script(),
        &BettingTx::PeerlessUpdateOdds(PeerlessUpdateOddsTx {
            event_id: 7,
            home_odds: 25_000,
            away_odds: 19_000,
            draw_odds: 28_000,
        }),
        0,
    );
    let bet = chain.betting_tx(
        &player_script(),
        &BettingTx::PeerlessBet(PeerlessBetTx { event_id: 7, outcome: Outcome::MoneyLineHomeWin }),
        100 * COIN,
    );
    checked_connect(&chain, &ledger, &block_of(&[&update, &bet]), HEIGHT + 1);

    // The bet locked the odds that were committed before its block.
    let bets: Vec<_> = ledger.scan::<Bets>().unwrap();
    assert_eq!(bets.len(), 1);
    assert_eq!(bets[0].1.locked_events[0].home_odds, 18_000);
    assert_eq!(ledger.read::<Events>(&EventKey(7)).unwrap().unwrap().home_odds, 25_000);

    let result = chain.betting_tx(
        &oracle_script(),
        &BettingTx::PeerlessResult(PeerlessResultTx {
            event_id: 7,
            result_kind: ResultKind::Standard,
            home_score: 2,
            away_score: 1,
        }),
        0,
    );
    checked_connect(&chain, &ledger, &block_of(&[&result]), HEIGHT + 2);
    assert_eq!(ledger.read::<Results>(&EventKey(7)).unwrap().unwrap().home_score, 2);

    // A resulted event no longer accepts bets.
    let late_bet = chain.betting_tx(
        &player_script(),
        &BettingTx::PeerlessBet(PeerlessBetTx { event_id: 7, outcome: Outcome::MoneyLineAwayWin }),
        100 * COIN,
    );
    let overlay = LedgerOverlay::new(&ledger);
    assert!(matches!(
        check_betting_tx(
            &chain,
            &TestOracle,
            &TestSporks::default(),
            &params,
            &overlay,
            &late_bet,
            HEIGHT + 3,
        ),
        Err(CheckError::EventResulted { event_id: 7 })
    ));
}
