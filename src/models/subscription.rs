use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user's link to a tracked listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub user_id: String,
    pub listing_id: String,
    pub notify: bool,
    pub lower_threshold: Option<Decimal>,
    pub upper_threshold: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdCrossing {
    /// Price fell to or below the lower threshold.
    Below(Decimal),
    /// Price rose to or above the upper threshold.
    Above(Decimal),
}

impl Subscription {
    pub fn new(user_id: impl Into<String>, listing_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            listing_id: listing_id.into(),
            notify: false,
            lower_threshold: None,
            upper_threshold: None,
        }
    }

    pub fn with_thresholds(mut self, lower: Option<Decimal>, upper: Option<Decimal>) -> Self {
        self.notify = true;
        self.lower_threshold = lower;
        self.upper_threshold = upper;
        self
    }

    /// Returns the threshold crossed by moving from `old` to `new`, if any.
    /// Staying beyond a threshold across runs does not count again.
    pub fn threshold_crossed(&self, old: Decimal, new: Decimal) -> Option<ThresholdCrossing> {
        if !self.notify {
            return None;
        }
        if let Some(lower) = self.lower_threshold {
            if old > lower && new <= lower {
                return Some(ThresholdCrossing::Below(lower));
            }
        }
        if let Some(upper) = self.upper_threshold {
            if old < upper && new >= upper {
                return Some(ThresholdCrossing::Above(upper));
            }
        }
        None
    }
}
