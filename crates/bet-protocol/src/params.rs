//! Height-indexed consensus parameters for the betting protocol.

use crate::chain::COIN;

/// Height-activated betting protocol generations.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum ProtocolVersion {
    V1,
    V2,
    V3,
    V4,
    V5,
}

/// Read-only consensus constants for one network.
#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub v1_start_height: i64,
    pub v2_start_height: i64,
    pub v3_start_height: i64,
    pub v4_start_height: i64,
    pub v5_start_height: i64,
    /// Quick/chain games retired from this height on.
    pub quick_games_end_height: i64,

    /// Minimum single-bet stake, in coin units.
    pub min_bet_payout_range: i64,
    /// Maximum single-bet stake, in coin units.
    pub max_bet_payout_range: i64,
    /// Maximum parlay stake, in coin units.
    pub max_parlay_bet_payout_range: i64,
    pub max_parlay_legs: usize,

    /// Result lookback window, in blocks, for the V2 era.
    pub bet_blocks_index_timespan_v2: i64,
    /// Result lookback window, in blocks, from V3 on.
    pub bet_blocks_index_timespan_v3: i64,

    pub dev_reward_permille: i64,
    pub omno_reward_permille: i64,
}

impl ConsensusParams {
    pub fn main_net() -> Self {
        Self {
            v1_start_height: 298_386,
            v2_start_height: 763_350,
            v3_start_height: 1_501_000,
            v4_start_height: i64::MAX,
            v5_start_height: i64::MAX,
            quick_games_end_height: 1_501_000,
            min_bet_payout_range: 25,
            max_bet_payout_range: 10_000,
            max_parlay_bet_payout_range: 4_000,
            max_parlay_legs: 5,
            bet_blocks_index_timespan_v2: 23_040,
            bet_blocks_index_timespan_v3: 90_050,
            dev_reward_permille: 6,
            omno_reward_permille: 24,
        }
    }

    pub fn test_net() -> Self {
        Self {
            v1_start_height: 1_100,
            v2_start_height: 1_100,
            v3_start_height: 2_000,
            v4_start_height: 405_000,
            v5_start_height: i64::MAX,
            quick_games_end_height: 101_650,
            ..Self::main_net()
        }
    }

    pub fn reg_test() -> Self {
        Self {
            v1_start_height: 251,
            v2_start_height: 251,
            v3_start_height: 300,
            v4_start_height: 300,
            v5_start_height: i64::MAX,
            quick_games_end_height: 300,
            ..Self::main_net()
        }
    }

    /// Betting protocol generation in force at `height`.
    pub fn protocol_version(&self, height: i64) -> ProtocolVersion {
        if height >= self.v5_start_height {
            ProtocolVersion::V5
        } else if height >= self.v4_start_height {
            ProtocolVersion::V4
        } else if height >= self.v3_start_height {
            ProtocolVersion::V3
        } else if height >= self.v2_start_height {
            ProtocolVersion::V2
        } else {
            ProtocolVersion::V1
        }
    }

    /// Minimum stake in smallest units.
    pub fn min_bet(&self) -> i64 {
        self.min_bet_payout_range * COIN
    }

    /// Maximum single-bet stake in smallest units.
    pub fn max_bet(&self) -> i64 {
        self.max_bet_payout_range * COIN
    }

    /// Maximum parlay stake in smallest units.
    pub fn max_parlay_bet(&self) -> i64 {
        self.max_parlay_bet_payout_range * COIN
    }

    /// Result lookback window in force at `height`.
    pub fn bet_blocks_index_timespan(&self, height: i64) -> i64 {
        if self.protocol_version(height) >= ProtocolVersion::V3 {
            self.bet_blocks_index_timespan_v3
        } else {
            self.bet_blocks_index_timespan_v2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_boundaries() {
        let params = ConsensusParams::test_net();
        assert_eq!(params.protocol_version(1_099), ProtocolVersion::V1);
        assert_eq!(params.protocol_version(1_100), ProtocolVersion::V2);
        assert_eq!(params.protocol_version(1_999), ProtocolVersion::V2);
        assert_eq!(params.protocol_version(2_000), ProtocolVersion::V3);
        assert_eq!(params.protocol_version(405_000), ProtocolVersion::V4);
    }

    #[test]
    fn test_version_ordering_supports_gating() {
        assert!(ProtocolVersion::V4 >= ProtocolVersion::V3);
        assert!(ProtocolVersion::V2 < ProtocolVersion::V3);
    }

    #[test]
    fn test_lookback_window_switches_at_v3() {
        let params = ConsensusParams::test_net();
        assert_eq!(params.bet_blocks_index_timespan(1_500), 23_040);
        assert_eq!(params.bet_blocks_index_timespan(2_000), 90_050);
    }

    #[test]
    fn test_stake_ranges_in_smallest_units() {
        let params = ConsensusParams::main_net();
        assert_eq!(params.min_bet(), 25 * COIN);
        assert_eq!(params.max_bet(), 10_000 * COIN);
        assert_eq!(params.max_parlay_bet(), 4_000 * COIN);
    }
}
