//! Engine timing constants.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing rules for slots, deposits, withdrawals and bot liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Lifetime of a fresh slot and length of one renewal
    pub renewal_period_secs: i64,
    /// Automatic renewals a fresh slot carries
    pub renewals: i64,
    /// Grace period between force-lock and force-sale, drawn uniformly
    pub force_sell_delay_min_secs: i64,
    pub force_sell_delay_max_secs: i64,
    pub deposit_ttl_secs: i64,
    pub withdrawal_ttl_secs: i64,
    /// A picked-up deposit never confirmed is discarded after this long
    pub stuck_deposit_secs: i64,
    /// A bot is live if its last status arrived within this window
    pub bot_liveness: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            renewal_period_secs: 86_400,
            renewals: 14,
            force_sell_delay_min_secs: 5 * 60,
            force_sell_delay_max_secs: 10 * 60,
            deposit_ttl_secs: 15 * 60,
            withdrawal_ttl_secs: 15 * 60,
            stuck_deposit_secs: 86_400,
            bot_liveness: Duration::from_secs(5),
        }
    }
}

impl Policy {
    /// Random grace period before a force-locked slot is sold
    pub fn force_sell_delay(&self) -> i64 {
        let (min, max) = (
            self.force_sell_delay_min_secs,
            self.force_sell_delay_max_secs.max(self.force_sell_delay_min_secs),
        );
        rand::thread_rng().gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_sell_delay_in_range() {
        let policy = Policy::default();
        for _ in 0..100 {
            let delay = policy.force_sell_delay();
            assert!((300..=600).contains(&delay));
        }
    }

    #[test]
    fn test_degenerate_range() {
        let policy = Policy {
            force_sell_delay_min_secs: 10,
            force_sell_delay_max_secs: 3,
            ..Policy::default()
        };
        assert_eq!(policy.force_sell_delay(), 10);
    }
}
