//! Validation engine tests.

use std::collections::BTreeMap;

use bet_ledger::entities::{
    ChainGamesEventRecord, ContenderInfo, EventKey, FieldEventRecord, ResultRecord,
};
use bet_ledger::view::{BettingLedger, ChainGamesEvents, FieldEvents, LedgerOverlay, Results};
use bet_protocol::chain::Transaction;
use bet_protocol::market::{
    ContenderPlace, FieldGroup, FieldMarket, MappingKind, MarketFilter, Outcome, QuickGameKind,
    ResultKind,
};
use bet_protocol::params::ConsensusParams;
use bet_protocol::tx::{
    BettingTx, ChainGamesBetTx, ChainGamesEventTx, ChainGamesResultTx, FieldBetTx, FieldEventTx,
    FieldResultTx, FieldUpdateMarginTx, FieldUpdateModifiersTx, FieldUpdateOddsTx,
    FieldZeroingOddsTx, MappingTx, PeerlessBetTx, PeerlessEventPatchTx, PeerlessEventZeroingOddsTx,
    PeerlessParlayBetTx, PeerlessResultTx, PeerlessSpreadsEventTx, PeerlessTotalsEventTx,
    PeerlessUpdateOddsTx, QuickGamesBetTx,
};
use bet_protocol::COIN;

use super::harness::*;
use crate::error::CheckError;
use crate::validate::check_betting_tx;

const HEIGHT: i64 = 350;

fn check(
    chain: &TestChain,
    ledger: &BettingLedger,
    tx: &Transaction,
    height: i64,
) -> Result<(), CheckError> {
    check_with(chain, ledger, tx, height, &TestSporks::default(), &params())
}

fn check_with(
    chain: &TestChain,
    ledger: &BettingLedger,
    tx: &Transaction,
    height: i64,
    sporks: &TestSporks,
    params: &ConsensusParams,
) -> Result<(), CheckError> {
    let overlay = LedgerOverlay::new(ledger);
    check_betting_tx(chain, &TestOracle, sporks, params, &overlay, tx, height)
}

fn home_bet(event_id: u32) -> BettingTx {
    BettingTx::PeerlessBet(PeerlessBetTx { event_id, outcome: Outcome::MoneyLineHomeWin })
}

#[test]
fn test_bet_amount_boundaries() {
    let ledger = ledger();
    seed_event(&ledger, 1, 20_000);
    let mut chain = TestChain::new();
    let p = params();

    let too_small = chain.betting_tx(&player_script(), &home_bet(1), p.min_bet() - 1);
    assert!(matches!(
        check(&chain, &ledger, &too_small, HEIGHT),
        Err(CheckError::BetOutOfRange { .. })
    ));

    let at_min = chain.betting_tx(&player_script(), &home_bet(1), p.min_bet());
    assert!(check(&chain, &ledger, &at_min, HEIGHT).is_ok());

    let at_max = chain.betting_tx(&player_script(), &home_bet(1), p.max_bet());
    assert!(check(&chain, &ledger, &at_max, HEIGHT).is_ok());

    let too_large = chain.betting_tx(&player_script(), &home_bet(1), p.max_bet() + 1);
    assert!(matches!(
        check(&chain, &ledger, &too_large, HEIGHT),
        Err(CheckError::BetOutOfRange { .. })
    ));
}

#[test]
fn test_bet_needs_a_live_unresulted_event() {
    let ledger = ledger();
    let mut chain = TestChain::new();

    let unknown = chain.betting_tx(&player_script(), &home_bet(7), 100 * COIN);
    assert!(matches!(
        check(&chain, &ledger, &unknown, HEIGHT),
        Err(CheckError::UnknownEvent { event_id: 7 })
    ));

    seed_event(&ledger, 7, 20_000);
    let live = chain.betting_tx(&player_script(), &home_bet(7), 100 * COIN);
    assert!(check(&chain, &ledger, &live, HEIGHT).is_ok());

    ledger
        .write::<Results>(
            &EventKey(7),
            &ResultRecord {
                event_id: 7,
                result_kind: ResultKind::Standard,
                home_score: 2,
                away_score: 1,
            },
        )
        .unwrap();
    let resulted = chain.betting_tx(&player_script(), &home_bet(7), 100 * COIN);
    assert!(matches!(
        check(&chain, &ledger, &resulted, HEIGHT),
        Err(CheckError::EventResulted { event_id: 7 })
    ));
}

#[test]
fn test_v4_rejects_bets_on_zeroed_odds() {
    let ledger = ledger();
    seed_event(&ledger, 3, 0);
    let mut chain = TestChain::new();

    let tx = chain.betting_tx(&player_script(), &home_bet(3), 100 * COIN);
    assert!(matches!(
        check(&chain, &ledger, &tx, HEIGHT),
        Err(CheckError::DeadMarket { event_id: 3 })
    ));
}

#[test]
fn test_parlay_leg_count_and_duplicates() {
    let ledger = ledger();
    let mut chain = TestChain::new();
    let p = params();

    let leg = |event_id| PeerlessBetTx { event_id, outcome: Outcome::MoneyLineAwayWin };

    let too_many = BettingTx::PeerlessParlayBet(PeerlessParlayBetTx {
        legs: (1..=6).map(leg).collect(),
    });
    let tx = chain.betting_tx(&player_script(), &too_many, 100 * COIN);
    assert!(matches!(
        check(&chain, &ledger, &tx, HEIGHT),
        Err(CheckError::TooManyParlayLegs { count: 6 })
    ));

    let duplicated = BettingTx::PeerlessParlayBet(PeerlessParlayBetTx {
        legs: vec![leg(1), leg(2), leg(1)],
    });
    let tx = chain.betting_tx(&player_script(), &duplicated, 100 * COIN);
    assert!(matches!(
        check(&chain, &ledger, &tx, HEIGHT),
        Err(CheckError::DuplicateParlayLeg { event_id: 1 })
    ));

    // Parlays cap at the parlay maximum, below the single-bet maximum.
    seed_event(&ledger, 1, 20_000);
    seed_event(&ledger, 2, 20_000);
    let parlay = BettingTx::PeerlessParlayBet(PeerlessParlayBetTx { legs: vec![leg(1), leg(2)] });
    let at_cap = chain.betting_tx(&player_script(), &parlay, p.max_parlay_bet());
    assert!(check(&chain, &ledger, &at_cap, HEIGHT).is_ok());
    let over_cap = chain.betting_tx(&player_script(), &parlay, p.max_parlay_bet() + 1);
    assert!(matches!(
        check(&chain, &ledger, &over_cap, HEIGHT),
        Err(CheckError::BetOutOfRange { .. })
    ));
}

#[test]
fn test_maintenance_gate_boundary() {
    let ledger = ledger();
    seed_event(&ledger, 1, 20_000);
    let mut chain = TestChain::new();
    let sporks = TestSporks { maintenance_height: HEIGHT };

    let tx = chain.betting_tx(&player_script(), &home_bet(1), 100 * COIN);
    assert!(check_with(&chain, &ledger, &tx, HEIGHT - 1, &sporks, &params()).is_ok());
    assert!(matches!(
        check_with(&chain, &ledger, &tx, HEIGHT, &sporks, &params()),
        Err(CheckError::MaintenanceMode)
    ));
}

#[test]
fn test_pre_v3_transactions_are_not_validated() {
    let ledger = ledger();
    let mut chain = TestChain::new();

    // One unit on an event that does not exist; anything goes before V3.
    let tx = chain.betting_tx(&player_script(), &home_bet(1), 1);
    assert!(check(&chain, &ledger, &tx, 260).is_ok());
}

#[test]
fn test_oracle_kinds_require_an_oracle_input() {
    let ledger = ledger();
    seed_event(&ledger, 5, 20_000);
    let mut chain = TestChain::new();

    let oracle_kinds: Vec<BettingTx> = vec![
        BettingTx::Mapping(MappingTx { kind: MappingKind::Sport, id: 7, name: "golf".into() }),
        BettingTx::PeerlessEvent(event_tx(40)),
        BettingTx::PeerlessResult(PeerlessResultTx {
            event_id: 5,
            result_kind: ResultKind::Standard,
            home_score: 1,
            away_score: 0,
        }),
        BettingTx::PeerlessUpdateOdds(PeerlessUpdateOddsTx {
            event_id: 5,
            home_odds: 19_000,
            away_odds: 19_000,
            draw_odds: 19_000,
        }),
        BettingTx::PeerlessSpreadsEvent(PeerlessSpreadsEventTx {
            event_id: 5,
            points: -3,
            home_odds: 19_000,
            away_odds: 19_000,
        }),
        BettingTx::PeerlessTotalsEvent(PeerlessTotalsEventTx {
            event_id: 5,
            points: 42,
            over_odds: 19_000,
            under_odds: 19_000,
        }),
        BettingTx::PeerlessEventPatch(PeerlessEventPatchTx {
            event_id: 5,
            start_time: 1_700_100_000,
        }),
        BettingTx::PeerlessEventZeroingOdds(PeerlessEventZeroingOddsTx { event_ids: vec![5] }),
        BettingTx::ChainGamesEvent(ChainGamesEventTx { event_id: 90, entry_fee: 25 }),
        BettingTx::ChainGamesResult(ChainGamesResultTx { event_id: 90 }),
        BettingTx::FieldEvent(FieldEventTx {
            event_id: 60,
            start_time: 1_700_000_000,
            sport: 1,
            tournament: 2,
            stage: 0,
            group_type: FieldGroup::Other,
            market_type: MarketFilter::AllMarkets,
            margin_percent: 110,
            contender_odds: BTreeMap::from([(3, 50_000)]),
        }),
        BettingTx::FieldUpdateOdds(FieldUpdateOddsTx {
            event_id: 60,
            contender_odds: BTreeMap::from([(3, 60_000)]),
        }),
        BettingTx::FieldUpdateModifiers(FieldUpdateModifiersTx {
            event_id: 60,
            contender_modifiers: BTreeMap::from([(3, 9_000)]),
        }),
        BettingTx::FieldUpdateMargin(FieldUpdateMarginTx { event_id: 60, margin_percent: 115 }),
        BettingTx::FieldZeroingOdds(FieldZeroingOddsTx { event_id: 60 }),
        BettingTx::FieldResult(FieldResultTx {
            event_id: 60,
            result_kind: ResultKind::Standard,
            contender_results: BTreeMap::from([(3, ContenderPlace::Place1)]),
        }),
    ];

    for kind in &oracle_kinds {
        let from_player = chain.betting_tx(&player_script(), kind, 0);
        assert!(
            matches!(
                check(&chain, &ledger, &from_player, HEIGHT),
                Err(CheckError::UnauthorizedOracle)
            ),
            "{} accepted without an oracle input",
            kind.kind_name()
        );
    }

    let result = BettingTx::PeerlessResult(PeerlessResultTx {
        event_id: 5,
        result_kind: ResultKind::Standard,
        home_score: 1,
        away_score: 0,
    });
    let from_oracle = chain.betting_tx(&oracle_script(), &result, 0);
    assert!(check(&chain, &ledger, &from_oracle, HEIGHT).is_ok());
}

#[test]
fn test_unresolvable_spending_input_passes_oracle_kinds_through() {
    let ledger = ledger();
    let mut chain = TestChain::new();

    let result = BettingTx::PeerlessResult(PeerlessResultTx {
        event_id: 5,
        result_kind: ResultKind::Standard,
        home_score: 1,
        away_score: 0,
    });
    let tx = chain.betting_tx(&player_script(), &result, 0);

    // A fresh chain that never saw the funding tx cannot resolve the
    // input; the output is passed through for processing to handle.
    let empty_chain = TestChain::new();
    assert!(check(&empty_chain, &ledger, &tx, HEIGHT).is_ok());
}

#[test]
fn test_event_creation_needs_mappings_and_a_free_id() {
    let ledger = ledger();
    let mut chain = TestChain::new();
    let create = BettingTx::PeerlessEvent(event_tx(9));

    let tx = chain.betting_tx(&oracle_script(), &create, 0);
    assert!(matches!(
        check(&chain, &ledger, &tx, HEIGHT),
        Err(CheckError::UnknownMapping { .. })
    ));

    seed_mappings(&ledger);
    let tx = chain.betting_tx(&oracle_script(), &create, 0);
    assert!(check(&chain, &ledger, &tx, HEIGHT).is_ok());

    seed_event(&ledger, 9, 20_000);
    let tx = chain.betting_tx(&oracle_script(), &create, 0);
    assert!(matches!(
        check(&chain, &ledger, &tx, HEIGHT),
        Err(CheckError::DuplicateEvent { event_id: 9 })
    ));
}

#[test]
fn test_chain_games_bet_must_match_entry_fee() {
    let ledger = ledger();
    ledger
        .write::<ChainGamesEvents>(
            &EventKey(4),
            &ChainGamesEventRecord { event_id: 4, entry_fee: 25 },
        )
        .unwrap();
    let mut chain = TestChain::new();
    let bet = BettingTx::ChainGamesBet(ChainGamesBetTx { event_id: 4 });

    let exact = chain.betting_tx(&player_script(), &bet, 25 * COIN);
    assert!(check(&chain, &ledger, &exact, HEIGHT).is_ok());

    let off_by_one = chain.betting_tx(&player_script(), &bet, 25 * COIN - 1);
    assert!(matches!(
        check(&chain, &ledger, &off_by_one, HEIGHT),
        Err(CheckError::EntryFeeMismatch { .. })
    ));
}

#[test]
fn test_quick_and_chain_games_retire_at_end_height() {
    let ledger = ledger();
    let mut chain = TestChain::new();
    let p = params();

    let qg = BettingTx::QuickGamesBet(QuickGamesBetTx {
        game: QuickGameKind::Dice,
        bet_info: vec![0x01],
    });
    let tx = chain.betting_tx(&player_script(), &qg, 100 * COIN);
    assert!(check(&chain, &ledger, &tx, p.quick_games_end_height - 1).is_ok());
    assert!(matches!(
        check(&chain, &ledger, &tx, p.quick_games_end_height),
        Err(CheckError::QuickGamesRetired)
    ));

    let cg = BettingTx::ChainGamesBet(ChainGamesBetTx { event_id: 1 });
    let tx = chain.betting_tx(&player_script(), &cg, 25 * COIN);
    assert!(matches!(
        check(&chain, &ledger, &tx, p.quick_games_end_height),
        Err(CheckError::QuickGamesRetired)
    ));
}

#[test]
fn test_field_bet_market_and_contender_gating() {
    let ledger = ledger();
    let mut contenders = std::collections::BTreeMap::new();
    contenders.insert(
        7,
        ContenderInfo { input_odds: 50_000, outright_odds: 45_000, ..ContenderInfo::default() },
    );
    ledger
        .write::<FieldEvents>(
            &EventKey(2),
            &FieldEventRecord {
                event_id: 2,
                start_time: 1_700_000_000,
                sport: 1,
                tournament: 2,
                stage: 0,
                group_type: FieldGroup::AnimalRacing,
                market_type: MarketFilter::OutrightOnly,
                margin_percent: 100,
                contenders,
            },
        )
        .unwrap();
    let mut chain = TestChain::new();

    let place = BettingTx::FieldBet(FieldBetTx {
        event_id: 2,
        market: FieldMarket::Place,
        contender_id: 7,
    });
    let tx = chain.betting_tx(&player_script(), &place, 100 * COIN);
    assert!(matches!(
        check(&chain, &ledger, &tx, HEIGHT),
        Err(CheckError::MarketClosed { event_id: 2, market: FieldMarket::Place })
    ));

    let unknown_contender = BettingTx::FieldBet(FieldBetTx {
        event_id: 2,
        market: FieldMarket::Outright,
        contender_id: 8,
    });
    let tx = chain.betting_tx(&player_script(), &unknown_contender, 100 * COIN);
    assert!(matches!(
        check(&chain, &ledger, &tx, HEIGHT),
        Err(CheckError::UnknownContender { event_id: 2, contender_id: 8 })
    ));

    let outright = BettingTx::FieldBet(FieldBetTx {
        event_id: 2,
        market: FieldMarket::Outright,
        contender_id: 7,
    });
    let tx = chain.betting_tx(&player_script(), &outright, 100 * COIN);
    assert!(check(&chain, &ledger, &tx, HEIGHT).is_ok());
}

#[test]
fn test_field_kinds_are_premature_before_v4() {
    let ledger = ledger();
    let mut chain = TestChain::new();
    // V3 at 300 but V4 at 500 for this network.
    let p = ConsensusParams { v4_start_height: 500, ..params() };

    let bet = BettingTx::FieldBet(FieldBetTx {
        event_id: 1,
        market: FieldMarket::Outright,
        contender_id: 1,
    });
    let tx = chain.betting_tx(&player_script(), &bet, 100 * COIN);
    assert!(matches!(
        check_with(&chain, &ledger, &tx, HEIGHT, &TestSporks::default(), &p),
        Err(CheckError::PrematureKind { .. })
    ));
}
