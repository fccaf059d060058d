//! Freshness policy: how long each cache category stays valid

use std::collections::HashMap;

use super::key::CacheCategory;

/// One hour in milliseconds
pub const HOUR_MILLIS: u64 = 60 * 60 * 1000;

/// One day in milliseconds
pub const DAY_MILLIS: u64 = 24 * HOUR_MILLIS;

/// Maximum age of a cache entry before it is considered stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAge {
    /// Entry expires once this many milliseconds have elapsed since the write
    Millis(u64),
    /// Entry never expires; it stays valid until overwritten or invalidated
    Unbounded,
}

impl MaxAge {
    /// Saturates at `u64::MAX` milliseconds for absurdly large inputs
    pub fn hours(hours: u64) -> Self {
        MaxAge::Millis(hours.saturating_mul(HOUR_MILLIS))
    }

    pub fn days(days: u64) -> Self {
        MaxAge::Millis(days.saturating_mul(DAY_MILLIS))
    }

    /// Like [`MaxAge::hours`], but `None` when the duration does not fit
    pub fn checked_hours(hours: u64) -> Option<Self> {
        hours.checked_mul(HOUR_MILLIS).map(MaxAge::Millis)
    }

    /// Whether an entry of the given age (in milliseconds) is still fresh
    pub fn admits(self, age_millis: i64) -> bool {
        match self {
            MaxAge::Unbounded => true,
            // A timestamp from the future (clock moved back) counts as age 0
            MaxAge::Millis(max) => (age_millis.max(0) as u64) < max,
        }
    }
}

/// Lookup table from cache category to maximum age
///
/// The defaults keep catalog structure (series, sets) for a week and
/// card lists and exchange rates for a day. Individual categories can be
/// overridden, including opting out of expiry with [`MaxAge::Unbounded`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreshnessPolicy {
    overrides: HashMap<CacheCategory, MaxAge>,
}

impl FreshnessPolicy {
    /// Built-in maximum age for a category
    pub fn default_max_age(category: CacheCategory) -> MaxAge {
        match category {
            CacheCategory::Series => MaxAge::days(7),
            CacheCategory::Sets => MaxAge::days(7),
            CacheCategory::Cards => MaxAge::days(1),
            CacheCategory::ExchangeRate => MaxAge::days(1),
        }
    }

    /// Overrides the maximum age for one category
    pub fn with_max_age(mut self, category: CacheCategory, max_age: MaxAge) -> Self {
        self.overrides.insert(category, max_age);
        self
    }

    /// Resolves the maximum age for a category
    pub fn max_age_for(&self, category: CacheCategory) -> MaxAge {
        self.overrides
            .get(&category)
            .copied()
            .unwrap_or_else(|| Self::default_max_age(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_ages() {
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.max_age_for(CacheCategory::Series), MaxAge::Millis(604_800_000));
        assert_eq!(policy.max_age_for(CacheCategory::Sets), MaxAge::Millis(604_800_000));
        assert_eq!(policy.max_age_for(CacheCategory::Cards), MaxAge::Millis(86_400_000));
        assert_eq!(policy.max_age_for(CacheCategory::ExchangeRate), MaxAge::Millis(86_400_000));
    }

    #[test]
    fn test_override_applies_to_one_category() {
        let policy = FreshnessPolicy::default().with_max_age(CacheCategory::Cards, MaxAge::hours(2));
        assert_eq!(policy.max_age_for(CacheCategory::Cards), MaxAge::Millis(2 * HOUR_MILLIS));
        assert_eq!(policy.max_age_for(CacheCategory::Sets), MaxAge::days(7));
    }

    #[test]
    fn test_admits_is_strictly_less_than() {
        let max_age = MaxAge::Millis(1000);
        assert!(max_age.admits(0));
        assert!(max_age.admits(999));
        assert!(!max_age.admits(1000));
        assert!(!max_age.admits(5000));
    }

    #[test]
    fn test_huge_durations_do_not_overflow() {
        assert_eq!(MaxAge::hours(u64::MAX), MaxAge::Millis(u64::MAX));
        assert_eq!(MaxAge::days(u64::MAX), MaxAge::Millis(u64::MAX));
        assert_eq!(MaxAge::checked_hours(u64::MAX), None);
        assert_eq!(MaxAge::checked_hours(3), Some(MaxAge::Millis(3 * HOUR_MILLIS)));
    }

    #[test]
    fn test_unbounded_always_admits() {
        assert!(MaxAge::Unbounded.admits(i64::MAX));
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        assert!(MaxAge::Millis(1000).admits(-50));
    }
}
