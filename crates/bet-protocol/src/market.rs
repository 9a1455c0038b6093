//! Outcome, market and oracle-mapping enumerations.
//!
//! Every enum here travels on the wire inside a betting payload, so the
//! discriminants are consensus-fixed and borsh encodes them by value.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Outcome of a moneyline / spread / total bet leg.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
    Clone, Copy, PartialEq, Eq, Hash, Debug,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum Outcome {
    MoneyLineHomeWin = 0x01,
    MoneyLineAwayWin = 0x02,
    MoneyLineDraw = 0x03,
    SpreadHome = 0x04,
    SpreadAway = 0x05,
    TotalOver = 0x06,
    TotalUnder = 0x07,
}

/// Market a field bet targets.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
    Clone, Copy, PartialEq, Eq, Hash, Debug,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum FieldMarket {
    Outright = 0x01,
    Place = 0x02,
    Show = 0x03,
}

/// Which markets a field event offers.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
    Clone, Copy, PartialEq, Eq, Hash, Debug,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum MarketFilter {
    AllMarkets = 0x01,
    OutrightPlace = 0x02,
    OutrightOnly = 0x03,
}

impl MarketFilter {
    pub fn is_market_open(self, market: FieldMarket) -> bool {
        match self {
            MarketFilter::AllMarkets => true,
            MarketFilter::OutrightPlace => {
                matches!(market, FieldMarket::Outright | FieldMarket::Place)
            }
            MarketFilter::OutrightOnly => matches!(market, FieldMarket::Outright),
        }
    }
}

/// Broad category of a field event.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
    Clone, Copy, PartialEq, Eq, Hash, Debug,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum FieldGroup {
    Other = 0x01,
    AnimalRacing = 0x02,
}

/// Final placing of one field-event contender.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
    Clone, Copy, PartialEq, Eq, Hash, Debug,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum ContenderPlace {
    Place1 = 0x01,
    Place2 = 0x02,
    Place3 = 0x03,
    DidNotFinish = 0x04,
    DidNotRace = 0x05,
}

/// How a result settles its event.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
    Clone, Copy, PartialEq, Eq, Hash, Debug,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum ResultKind {
    Standard = 0x01,
    EventRefund = 0x02,
    MoneyLineRefund = 0x03,
    EventClosed = 0x04,
}

/// Namespace of an oracle mapping row.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum MappingKind {
    Sport = 0x01,
    Round = 0x02,
    Team = 0x03,
    Tournament = 0x04,
    IndividualSport = 0x05,
    Contender = 0x06,
}

/// Recognized quick-game variants. Only dice ever shipped.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
    Clone, Copy, PartialEq, Eq, Hash, Debug,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum QuickGameKind {
    Dice = 0x00,
}
