use crate::channels::error::{ChannelError, ChannelResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Open,
    Closing,
    Closed,
}

impl ChannelStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, ChannelStatus::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// How much each channel is funded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPolicy {
    /// Price of one ticket for one hop, in base units
    pub ticket_price: u128,
    /// Multiplier on top of the strictly needed amount
    pub safety_multiplier: u32,
}

impl Default for FundingPolicy {
    fn default() -> Self {
        Self {
            ticket_price: 100,
            safety_multiplier: 20,
        }
    }
}

impl FundingPolicy {
    pub fn new(ticket_price: u128, safety_multiplier: u32) -> Self {
        Self {
            ticket_price,
            safety_multiplier: safety_multiplier.max(1),
        }
    }

    /// Funding for a channel expected to relay `messages` messages.
    pub fn funding_for(&self, messages: u64) -> u128 {
        self.ticket_price
            .saturating_mul(messages.max(1) as u128)
            .saturating_mul(self.safety_multiplier as u128)
    }

    /// Check that `funding` covers `messages` tickets with the safety margin.
    pub fn ensure_covers(&self, funding: u128, messages: u64) -> ChannelResult<()> {
        let required = self.funding_for(messages);
        if funding < required {
            return Err(ChannelError::InsufficientFunding { funding, required });
        }
        Ok(())
    }
}

/// An opened channel as tracked by the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: String,
    pub source: String,
    pub destination: String,
    pub funding: u128,
    pub direction: Direction,
    pub status: ChannelStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funding_scales_with_messages_and_margin() {
        let policy = FundingPolicy::new(100, 20);
        assert_eq!(policy.funding_for(100), 200_000);
        assert!(policy.ensure_covers(200_000, 100).is_ok());
        assert!(matches!(
            policy.ensure_covers(199_999, 100),
            Err(ChannelError::InsufficientFunding { required: 200_000, .. })
        ));
    }

    #[test]
    fn test_zero_messages_still_funds_one_ticket() {
        let policy = FundingPolicy::new(10, 2);
        assert_eq!(policy.funding_for(0), 20);
    }

    #[test]
    fn test_multiplier_floor() {
        let policy = FundingPolicy::new(10, 0);
        assert_eq!(policy.safety_multiplier, 1);
    }
}
