//! Eviction decisions
//!
//! Pure functions: the engine reads the state, asks these what to drop,
//! and performs the deletes inside a transaction.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of the age policy for a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeCutoff {
    /// No age limit configured, the pass is skipped
    Unbounded,
    /// Zero age limit: every resident entry is expired
    Everything,
    /// Entries last used strictly before this instant are expired
    Before(DateTime<Utc>),
}

impl AgeCutoff {
    pub fn is_expired(&self, last_used_at: DateTime<Utc>) -> bool {
        match self {
            AgeCutoff::Unbounded => false,
            AgeCutoff::Everything => true,
            AgeCutoff::Before(cutoff) => last_used_at < *cutoff,
        }
    }
}

/// Compute the age cutoff for `now`
pub fn age_cutoff(now: DateTime<Utc>, max_age: Option<Duration>) -> AgeCutoff {
    let Some(max_age) = max_age else {
        return AgeCutoff::Unbounded;
    };
    if max_age.is_zero() {
        return AgeCutoff::Everything;
    }
    // An age limit reaching past the representable range expires nothing
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .map_or(AgeCutoff::Unbounded, AgeCutoff::Before)
}

/// Given insertion orders sorted ascending, the leading slice to delete so
/// that at most `max_count` remain.
pub fn count_victims(orders: &[i64], max_count: usize) -> &[i64] {
    let excess = orders.len().saturating_sub(max_count);
    &orders[..excess]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_count_victims_under_limit() {
        assert!(count_victims(&[1, 2, 3], 5).is_empty());
        assert!(count_victims(&[1, 2, 3], 3).is_empty());
        assert!(count_victims(&[], 1).is_empty());
    }

    #[test]
    fn test_count_victims_drops_oldest() {
        let orders: Vec<i64> = (1..=10).collect();
        assert_eq!(count_victims(&orders, 5), &[1, 2, 3, 4, 5]);
        assert_eq!(count_victims(&orders, 9), &[1]);
    }

    #[test]
    fn test_count_victims_gapped_orders() {
        // Orders are never reused, so the live set usually has holes
        let orders = [3, 8, 9, 15, 40];
        assert_eq!(count_victims(&orders, 2), &[3, 8, 9]);
    }

    #[test]
    fn test_age_cutoff_unbounded() {
        let cutoff = age_cutoff(at(0), None);
        assert_eq!(cutoff, AgeCutoff::Unbounded);
        assert!(!cutoff.is_expired(at(-1_000_000)));
    }

    #[test]
    fn test_age_cutoff_zero_expires_everything() {
        let cutoff = age_cutoff(at(0), Some(Duration::ZERO));
        assert_eq!(cutoff, AgeCutoff::Everything);
        assert!(cutoff.is_expired(at(0)));
        assert!(cutoff.is_expired(at(10)));
    }

    #[test]
    fn test_age_cutoff_before() {
        let cutoff = age_cutoff(at(100), Some(Duration::from_secs(60)));
        assert_eq!(cutoff, AgeCutoff::Before(at(40)));
        assert!(cutoff.is_expired(at(39)));
        assert!(!cutoff.is_expired(at(40)));
        assert!(!cutoff.is_expired(at(100)));
    }

    #[test]
    fn test_age_cutoff_huge_limit() {
        let cutoff = age_cutoff(at(0), Some(Duration::from_secs(u64::MAX)));
        assert_eq!(cutoff, AgeCutoff::Unbounded);
    }
}
