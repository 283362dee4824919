//! Rolling spend windows
//!
//! Calendar boundaries are fixed in UTC: days start at 00:00, weeks on
//! Sunday 00:00, months on day 1 at 00:00. A transaction stamped exactly on
//! a boundary belongs to the new window.

use agentwallet_store::Store;
use agentwallet_types::{Money, Result, WalletId};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use std::sync::Arc;

/// Start of the UTC day containing `at`
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), at.day(), 0, 0, 0)
        .single()
        .expect("midnight is always valid")
}

/// Start of the UTC week (Sunday 00:00) containing `at`
pub fn start_of_week(at: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_sunday = at.weekday().num_days_from_sunday();
    start_of_day(at) - Duration::days(i64::from(days_from_sunday))
}

/// Start of the UTC month containing `at`
pub fn start_of_month(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month is always valid")
}

/// Spend aggregates over completed, non-deposit transactions
#[derive(Clone)]
pub struct SpendWindows {
    store: Arc<dyn Store>,
}

impl SpendWindows {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn spend_since(&self, wallet: WalletId, since: DateTime<Utc>) -> Result<Money> {
        self.store.spend_since(wallet, since).await
    }

    pub async fn daily(&self, wallet: WalletId, at: DateTime<Utc>) -> Result<Money> {
        self.spend_since(wallet, start_of_day(at)).await
    }

    pub async fn weekly(&self, wallet: WalletId, at: DateTime<Utc>) -> Result<Money> {
        self.spend_since(wallet, start_of_week(at)).await
    }

    pub async fn monthly(&self, wallet: WalletId, at: DateTime<Utc>) -> Result<Money> {
        self.spend_since(wallet, start_of_month(at)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_day() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            start_of_day(at),
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_week_starts_sunday() {
        // 2025-03-14 is a Friday; the week began Sunday 2025-03-09
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap();
        assert_eq!(
            start_of_week(at),
            Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_sunday_midnight_counts_toward_new_week() {
        let boundary = Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(start_of_week(boundary), boundary);
    }

    #[test]
    fn test_start_of_month() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            start_of_month(at),
            Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap()
        );
    }
}
