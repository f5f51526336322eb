// Loyalty Ledger
//
// Points balance and tier per member, backed by an append-only transaction
// log. Earned points are tracked per batch so redemption and expiry can both
// consume the oldest points first. Every mutation for a user runs under that
// user's lock.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::booking_rules::{
    error::{BRResult, BookingRulesError},
    types::{LoyaltyTier, TransactionType},
};
use crate::store::{JsonStore, KeyedLocks, Record};

/// Loyalty configuration
///
/// Tier thresholds are lifetime points and must be strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoyaltyConfig {
    pub silver_threshold: i64,
    pub gold_threshold: i64,
    pub platinum_threshold: i64,
    #[schema(value_type = f64, example = 0.1)]
    pub points_per_unit: Decimal,
    /// Days until an earned batch expires; 0 means never
    pub points_expiry_days: u32,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            silver_threshold: 10_000,
            gold_threshold: 25_000,
            platinum_threshold: 50_000,
            points_per_unit: Decimal::new(1, 1),
            points_expiry_days: 365,
        }
    }
}

impl LoyaltyConfig {
    pub fn validate(&self) -> BRResult<()> {
        if self.silver_threshold <= 0 {
            return Err(BookingRulesError::InvalidConfiguration(
                "Silver threshold must be positive".to_string(),
            ));
        }
        if !(self.silver_threshold < self.gold_threshold
            && self.gold_threshold < self.platinum_threshold)
        {
            return Err(BookingRulesError::InvalidConfiguration(format!(
                "Tier thresholds must be strictly increasing: silver {}, gold {}, platinum {}",
                self.silver_threshold, self.gold_threshold, self.platinum_threshold
            )));
        }
        if self.points_per_unit < Decimal::ZERO {
            return Err(BookingRulesError::InvalidConfiguration(
                "points_per_unit cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Tier for a lifetime points total
    pub fn tier_for(&self, lifetime_points: i64) -> LoyaltyTier {
        if lifetime_points >= self.platinum_threshold {
            LoyaltyTier::Platinum
        } else if lifetime_points >= self.gold_threshold {
            LoyaltyTier::Gold
        } else if lifetime_points >= self.silver_threshold {
            LoyaltyTier::Silver
        } else {
            LoyaltyTier::Bronze
        }
    }

    /// Points earned for a paid amount, rounded down
    pub fn points_for_amount(&self, amount: Decimal) -> BRResult<i64> {
        if amount <= Decimal::ZERO {
            return Ok(0);
        }
        amount
            .checked_mul(self.points_per_unit)
            .and_then(|points| points.floor().to_i64())
            .ok_or_else(|| {
                BookingRulesError::ValidationError(format!(
                    "Amount {} earns more points than can be recorded",
                    amount
                ))
            })
    }

    fn expiry_for(&self, earned_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.points_expiry_days == 0 {
            None
        } else {
            Some(earned_at + Duration::days(i64::from(self.points_expiry_days)))
        }
    }
}

/// Entry in a member's points log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PointsTransaction {
    pub id: String,
    pub user_id: String,
    pub transaction_type: TransactionType,
    /// Signed change to the balance: earn positive, redeem and expire negative
    pub points: i64,
    pub reason: String,
    #[serde(default)]
    pub booking_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Unspent remainder of one earn transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PointsBatch {
    pub transaction_id: String,
    pub earned_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub original: i64,
    pub remaining: i64,
}

impl PointsBatch {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// A member's balance, tier and history
///
/// `points` always equals the sum of `remaining` over `batches`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MemberAccount {
    pub user_id: String,
    pub points: i64,
    pub lifetime_points: i64,
    pub tier: LoyaltyTier,
    #[serde(default)]
    pub batches: Vec<PointsBatch>,
    #[serde(default)]
    pub transactions: Vec<PointsTransaction>,
    pub updated_at: DateTime<Utc>,
}

impl Record for MemberAccount {
    fn key(&self) -> String {
        self.user_id.clone()
    }
}

impl MemberAccount {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            points: 0,
            lifetime_points: 0,
            tier: LoyaltyTier::Bronze,
            batches: Vec::new(),
            transactions: Vec::new(),
            updated_at: now,
        }
    }

    /// Zero out expired batches, one `expire` transaction per batch
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<PointsTransaction> {
        let mut expired = Vec::new();

        for batch in self.batches.iter_mut() {
            if batch.remaining == 0 || !batch.is_expired(now) {
                continue;
            }
            expired.push(PointsTransaction {
                id: Uuid::new_v4().to_string(),
                user_id: self.user_id.clone(),
                transaction_type: TransactionType::Expire,
                points: -batch.remaining,
                reason: format!("Batch {} expired", batch.transaction_id),
                booking_id: None,
                created_at: now,
                expires_at: None,
            });
            self.points -= batch.remaining;
            batch.remaining = 0;
        }

        self.batches.retain(|batch| batch.remaining > 0);
        if !expired.is_empty() {
            self.transactions.extend(expired.iter().cloned());
            self.updated_at = now;
        }
        expired
    }

    /// Add an earn batch and re-evaluate the tier
    ///
    /// Fails without touching the account when the balance would overflow.
    pub fn earn(
        &mut self,
        config: &LoyaltyConfig,
        points: i64,
        reason: &str,
        booking_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> BRResult<PointsTransaction> {
        if points <= 0 {
            return Err(BookingRulesError::ValidationError(
                "Earned points must be positive".to_string(),
            ));
        }
        let (Some(balance), Some(lifetime_points)) = (
            self.points.checked_add(points),
            self.lifetime_points.checked_add(points),
        ) else {
            return Err(BookingRulesError::ValidationError(format!(
                "Earning {} points would overflow the balance of {}",
                points, self.user_id
            )));
        };

        let transaction = PointsTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            transaction_type: TransactionType::Earn,
            points,
            reason: reason.to_string(),
            booking_id: booking_id.map(str::to_string),
            created_at: now,
            expires_at: config.expiry_for(now),
        };

        self.batches.push(PointsBatch {
            transaction_id: transaction.id.clone(),
            earned_at: now,
            expires_at: transaction.expires_at,
            original: points,
            remaining: points,
        });
        self.points = balance;
        self.lifetime_points = lifetime_points;
        self.tier = config.tier_for(self.lifetime_points);
        self.transactions.push(transaction.clone());
        self.updated_at = now;

        Ok(transaction)
    }

    /// Spend points from the oldest batches first
    ///
    /// On failure the account is left exactly as it was.
    pub fn redeem(
        &mut self,
        points: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> BRResult<PointsTransaction> {
        if points <= 0 {
            return Err(BookingRulesError::ValidationError(
                "Redeemed points must be positive".to_string(),
            ));
        }
        if points > self.points {
            return Err(BookingRulesError::InsufficientPoints {
                user_id: self.user_id.clone(),
                requested: points,
                available: self.points,
            });
        }

        self.batches.sort_by_key(|batch| batch.earned_at);
        let mut outstanding = points;
        for batch in self.batches.iter_mut() {
            if outstanding == 0 {
                break;
            }
            let taken = batch.remaining.min(outstanding);
            batch.remaining -= taken;
            outstanding -= taken;
        }
        self.batches.retain(|batch| batch.remaining > 0);

        let transaction = PointsTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            transaction_type: TransactionType::Redeem,
            points: -points,
            reason: reason.to_string(),
            booking_id: None,
            created_at: now,
            expires_at: None,
        };
        self.points -= points;
        self.transactions.push(transaction.clone());
        self.updated_at = now;

        Ok(transaction)
    }
}

/// Loyalty Ledger
///
/// Persists one `MemberAccount` per user.
pub struct LoyaltyLedger {
    accounts: JsonStore<MemberAccount>,
    locks: KeyedLocks,
    config: LoyaltyConfig,
}

impl LoyaltyLedger {
    pub fn in_memory(config: LoyaltyConfig) -> Self {
        Self {
            accounts: JsonStore::in_memory("loyalty_accounts"),
            locks: KeyedLocks::new(),
            config,
        }
    }

    pub async fn open(dir: &Path, config: LoyaltyConfig) -> BRResult<Self> {
        Ok(Self {
            accounts: JsonStore::open(dir, "loyalty_accounts").await?,
            locks: KeyedLocks::new(),
            config,
        })
    }

    pub fn config(&self) -> &LoyaltyConfig {
        &self.config
    }

    /// Current view of a member, with expired batches already removed
    ///
    /// Unknown users get an empty bronze account. Nothing is written.
    pub async fn member(&self, user_id: &str, now: DateTime<Utc>) -> MemberAccount {
        let mut account = self.load(user_id, now).await;
        account.sweep_expired(now);
        account
    }

    /// Earn points for a member
    ///
    /// A booking earns at most once: when the account already holds an earn
    /// for `booking_id`, that transaction is returned and nothing is written.
    pub async fn record_earn(
        &self,
        user_id: &str,
        points: i64,
        reason: &str,
        booking_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> BRResult<PointsTransaction> {
        let _guard = self.locks.lock(user_id).await;

        let mut account = self.load(user_id, now).await;
        if let Some(booking_id) = booking_id {
            let existing = account.transactions.iter().find(|t| {
                t.transaction_type == TransactionType::Earn
                    && t.booking_id.as_deref() == Some(booking_id)
            });
            if let Some(existing) = existing {
                tracing::debug!(user_id, booking_id, "Booking already earned points");
                return Ok(existing.clone());
            }
        }

        account.sweep_expired(now);
        let previous_tier = account.tier;
        let transaction = account.earn(&self.config, points, reason, booking_id, now)?;
        self.accounts.put(account.clone()).await?;

        tracing::info!(
            user_id,
            points,
            balance = account.points,
            lifetime_points = account.lifetime_points,
            "Points earned"
        );
        if account.tier != previous_tier {
            tracing::info!(user_id, from = %previous_tier, to = %account.tier, "Tier upgraded");
        }

        Ok(transaction)
    }

    /// Redeem points against the current balance
    ///
    /// Fails with `InsufficientPoints` without writing anything when the
    /// balance, after expiry, is too small.
    pub async fn redeem(
        &self,
        user_id: &str,
        points: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> BRResult<PointsTransaction> {
        let _guard = self.locks.lock(user_id).await;

        let mut account = self.load(user_id, now).await;
        account.sweep_expired(now);
        let transaction = account.redeem(points, reason, now)?;
        self.accounts.put(account.clone()).await?;

        tracing::info!(user_id, points, balance = account.points, "Points redeemed");
        Ok(transaction)
    }

    /// Expire one member's overdue batches
    pub async fn expire_points(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> BRResult<Vec<PointsTransaction>> {
        let _guard = self.locks.lock(user_id).await;

        let Some(mut account) = self.accounts.get(user_id).await else {
            return Ok(Vec::new());
        };
        let expired = account.sweep_expired(now);
        if !expired.is_empty() {
            self.accounts.put(account.clone()).await?;
            let total: i64 = expired.iter().map(|t| -t.points).sum();
            tracing::info!(user_id, points = total, balance = account.points, "Points expired");
        }
        Ok(expired)
    }

    /// Scheduled sweep over every member; returns the expire transactions written
    pub async fn sweep_all(&self, now: DateTime<Utc>) -> BRResult<usize> {
        let mut written = 0;
        for account in self.accounts.list().await {
            written += self.expire_points(&account.user_id, now).await?.len();
        }
        Ok(written)
    }

    /// Stored account with its tier re-derived from the current thresholds
    async fn load(&self, user_id: &str, now: DateTime<Utc>) -> MemberAccount {
        let mut account = self
            .accounts
            .get(user_id)
            .await
            .unwrap_or_else(|| MemberAccount::new(user_id, now));
        account.tier = self.config.tier_for(account.lifetime_points);
        account
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_tier_thresholds() {
        let config = LoyaltyConfig::default();
        assert_eq!(config.tier_for(0), LoyaltyTier::Bronze);
        assert_eq!(config.tier_for(9_999), LoyaltyTier::Bronze);
        assert_eq!(config.tier_for(10_000), LoyaltyTier::Silver);
        assert_eq!(config.tier_for(25_000), LoyaltyTier::Gold);
        assert_eq!(config.tier_for(50_000), LoyaltyTier::Platinum);
    }

    #[test]
    fn test_config_validation() {
        assert!(LoyaltyConfig::default().validate().is_ok());

        let overlapping = LoyaltyConfig {
            gold_threshold: 10_000,
            ..LoyaltyConfig::default()
        };
        assert!(matches!(
            overlapping.validate(),
            Err(BookingRulesError::InvalidConfiguration(_))
        ));

        let zero = LoyaltyConfig {
            silver_threshold: 0,
            ..LoyaltyConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_points_for_amount_rounds_down() {
        let config = LoyaltyConfig::default();
        assert_eq!(config.points_for_amount(dec!(7500)).unwrap(), 750);
        assert_eq!(config.points_for_amount(dec!(105.5)).unwrap(), 10);
        assert_eq!(config.points_for_amount(dec!(-10)).unwrap(), 0);

        let generous = LoyaltyConfig {
            points_per_unit: dec!(1000),
            ..LoyaltyConfig::default()
        };
        assert!(generous.points_for_amount(Decimal::MAX).is_err());
    }

    #[tokio::test]
    async fn test_earn_overflow_leaves_account_unchanged() {
        let ledger = LoyaltyLedger::in_memory(LoyaltyConfig::default());
        ledger.record_earn("u1", i64::MAX, "Stay", None, now()).await.unwrap();
        let before = ledger.member("u1", now()).await;

        let result = ledger.record_earn("u1", 1, "Stay", None, now()).await;
        assert!(matches!(result, Err(BookingRulesError::ValidationError(_))));

        let after = ledger.member("u1", now()).await;
        assert_eq!(after, before);
        assert_eq!(after.lifetime_points, i64::MAX);
        assert_eq!(after.tier, LoyaltyTier::Platinum);
    }

    #[tokio::test]
    async fn test_booking_earns_once() {
        let ledger = LoyaltyLedger::in_memory(LoyaltyConfig::default());

        let first = ledger
            .record_earn("u1", 600, "Booking b1", Some("b1"), now())
            .await
            .unwrap();
        let repeat = ledger
            .record_earn("u1", 600, "Booking b1", Some("b1"), now())
            .await
            .unwrap();
        assert_eq!(repeat, first);

        ledger
            .record_earn("u1", 300, "Booking b2", Some("b2"), now())
            .await
            .unwrap();

        let member = ledger.member("u1", now()).await;
        assert_eq!(member.points, 900);
        assert_eq!(member.transactions.len(), 2);
    }

    #[tokio::test]
    async fn test_member_tier_follows_current_thresholds() {
        let dir = std::env::temp_dir().join(format!("villa-loyalty-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        {
            let ledger = LoyaltyLedger::open(&dir, LoyaltyConfig::default()).await.unwrap();
            ledger.record_earn("u1", 12_000, "Stay", None, now()).await.unwrap();
            assert_eq!(ledger.member("u1", now()).await.tier, LoyaltyTier::Silver);
        }

        let raised = LoyaltyConfig {
            silver_threshold: 20_000,
            gold_threshold: 40_000,
            platinum_threshold: 80_000,
            ..LoyaltyConfig::default()
        };
        let ledger = LoyaltyLedger::open(&dir, raised).await.unwrap();
        let member = ledger.member("u1", now()).await;
        assert_eq!(member.lifetime_points, 12_000);
        assert_eq!(member.tier, LoyaltyTier::Bronze);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_earn_crosses_tier() {
        let ledger = LoyaltyLedger::in_memory(LoyaltyConfig::default());

        ledger.record_earn("u1", 9_999, "Stay", None, now()).await.unwrap();
        assert_eq!(ledger.member("u1", now()).await.tier, LoyaltyTier::Bronze);

        ledger.record_earn("u1", 1, "Stay", None, now()).await.unwrap();
        let member = ledger.member("u1", now()).await;
        assert_eq!(member.lifetime_points, 10_000);
        assert_eq!(member.tier, LoyaltyTier::Silver);
    }

    #[tokio::test]
    async fn test_insufficient_points_leaves_balance() {
        let ledger = LoyaltyLedger::in_memory(LoyaltyConfig::default());
        ledger.record_earn("u1", 500, "Stay", None, now()).await.unwrap();

        let result = ledger.redeem("u1", 600, "Upgrade", now()).await;
        assert!(matches!(
            result,
            Err(BookingRulesError::InsufficientPoints {
                requested: 600,
                available: 500,
                ..
            })
        ));

        let member = ledger.member("u1", now()).await;
        assert_eq!(member.points, 500);
        assert_eq!(member.transactions.len(), 1);
    }

    #[tokio::test]
    async fn test_redeem_keeps_tier_and_lifetime() {
        let ledger = LoyaltyLedger::in_memory(LoyaltyConfig::default());
        ledger.record_earn("u1", 12_000, "Stay", None, now()).await.unwrap();

        let transaction = ledger.redeem("u1", 11_000, "Free night", now()).await.unwrap();
        assert_eq!(transaction.points, -11_000);
        assert_eq!(transaction.transaction_type, TransactionType::Redeem);

        let member = ledger.member("u1", now()).await;
        assert_eq!(member.points, 1_000);
        assert_eq!(member.lifetime_points, 12_000);
        assert_eq!(member.tier, LoyaltyTier::Silver);
    }

    #[test]
    fn test_fifo_consumption_then_expiry() {
        let config = LoyaltyConfig {
            points_expiry_days: 30,
            ..LoyaltyConfig::default()
        };
        let start = now();
        let mut account = MemberAccount::new("u1", start);

        account.earn(&config, 100, "first", None, start).unwrap();
        account
            .earn(&config, 200, "second", None, start + Duration::days(10))
            .unwrap();

        // Takes all of the older batch and 50 of the newer one
        account.redeem(150, "spend", start + Duration::days(15)).unwrap();
        assert_eq!(account.batches.len(), 1);
        assert_eq!(account.batches[0].remaining, 150);

        // The first batch is already spent, so nothing expires at day 31
        assert!(account.sweep_expired(start + Duration::days(31)).is_empty());

        let expired = account.sweep_expired(start + Duration::days(41));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].points, -150);
        assert_eq!(account.points, 0);
        assert_eq!(account.lifetime_points, 300);
    }

    #[tokio::test]
    async fn test_expired_points_cannot_be_redeemed() {
        let config = LoyaltyConfig {
            points_expiry_days: 30,
            ..LoyaltyConfig::default()
        };
        let ledger = LoyaltyLedger::in_memory(config);
        ledger.record_earn("u1", 500, "Stay", None, now()).await.unwrap();

        let later = now() + Duration::days(31);
        let result = ledger.redeem("u1", 100, "Upgrade", later).await;
        assert!(matches!(result, Err(BookingRulesError::InsufficientPoints { available: 0, .. })));

        assert_eq!(ledger.sweep_all(later).await.unwrap(), 1);
        let member = ledger.member("u1", later).await;
        assert_eq!(member.points, 0);
        assert_eq!(
            member.transactions.last().map(|t| t.transaction_type),
            Some(TransactionType::Expire)
        );
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_never_overspend() {
        let ledger = Arc::new(LoyaltyLedger::in_memory(LoyaltyConfig::default()));
        ledger.record_earn("u1", 500, "Stay", None, now()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.redeem("u1", 100, "Spa", now()).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(ledger.member("u1", now()).await.points, 0);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    proptest! {
        #[test]
        fn prop_tier_is_monotonic(a in 0i64..100_000, b in 0i64..100_000) {
            let config = LoyaltyConfig::default();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(config.tier_for(low) <= config.tier_for(high));
        }

        #[test]
        fn prop_overdraw_fails_and_balance_unchanged(
            earns in prop::collection::vec(1i64..5_000, 1..6),
            extra in 1i64..1_000,
        ) {
            let config = LoyaltyConfig::default();
            let mut account = MemberAccount::new("u1", now());
            for points in &earns {
                account.earn(&config, *points, "stay", None, now()).unwrap();
            }
            let before = account.clone();

            let result = account.redeem(before.points + extra, "too much", now());
            prop_assert!(
                matches!(result, Err(BookingRulesError::InsufficientPoints { .. })),
                "expected InsufficientPoints"
            );
            prop_assert_eq!(account, before);
        }

        #[test]
        fn prop_balance_matches_batches(
            ops in prop::collection::vec((any::<bool>(), 1i64..3_000), 1..20),
        ) {
            let config = LoyaltyConfig::default();
            let mut account = MemberAccount::new("u1", now());
            let mut last_tier = account.tier;

            for (is_earn, points) in ops {
                if is_earn {
                    account.earn(&config, points, "stay", None, now()).unwrap();
                } else {
                    let _ = account.redeem(points, "spend", now());
                }
                let remaining: i64 = account.batches.iter().map(|b| b.remaining).sum();
                prop_assert_eq!(account.points, remaining);
                prop_assert!(account.points >= 0);
                prop_assert!(account.tier >= last_tier);
                last_tier = account.tier;
            }
        }
    }
}
