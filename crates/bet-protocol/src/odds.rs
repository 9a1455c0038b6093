//! Fixed-point odds math shared by validation, processing and payouts.
//!
//! Odds are integers scaled by [`ODDS_DIVISOR`]: `15000` means 1.5x. The
//! network burns 6% of net winnings, so the odds a bet is actually paid at
//! are slightly below the posted odds.

/// Fixed-point scale for odds values.
pub const ODDS_DIVISOR: u32 = 10_000;

/// Burn rate applied to net winnings, in permille.
pub const BURN_PERMILLE: u64 = 60;

/// Posted odds reduced by the winnings burn.
///
/// Zero odds (dead market) and refund odds (`== ODDS_DIVISOR`, stake back)
/// pass through unchanged; there are no net winnings to burn in either case.
pub fn effective_odds(raw: u32) -> u32 {
    if raw <= ODDS_DIVISOR {
        return raw;
    }
    let net = (raw - ODDS_DIVISOR) as u64;
    (raw as u64 - net * BURN_PERMILLE / 1000) as u32
}

/// Split a winning bet into the amount paid to the bettor and the amount
/// burned, from the stake and the posted odds.
pub fn payout_and_burn(amount: i64, raw_odds: u32) -> (i64, i64) {
    if raw_odds == 0 {
        return (0, 0);
    }
    if raw_odds == ODDS_DIVISOR {
        return (amount, 0);
    }
    let gross = amount as i128 * effective_odds(raw_odds) as i128 / ODDS_DIVISOR as i128;
    let full = amount as i128 * raw_odds as i128 / ODDS_DIVISOR as i128;
    (gross as i64, (full - gross) as i64)
}

/// Gross payout only, for liability accounting.
pub fn gross_payout(amount: i64, raw_odds: u32) -> i64 {
    payout_and_burn(amount, raw_odds).0
}
