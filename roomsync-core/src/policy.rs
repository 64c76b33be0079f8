//! Tariff resolution for a booking date, and booking pricing on top of it.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::booking::Booking;
use crate::cache::FreshnessCache;
use crate::civil_time::local_date;
use crate::constants::UPSERT_BATCH_SIZE;
use crate::error::RoomSyncResult;
use crate::pricing::PriceCalculator;
use crate::store::{BookingStore, PricePolicyStore};
use crate::tariff::{PricePolicy, TariffTable, resolve_policy};

/// Reads effective-dated policies through a freshness cache, falling back
/// to the default table.
pub struct PolicyResolver {
    store: Arc<dyn PricePolicyStore>,
    cache: FreshnessCache<(), Arc<Vec<PricePolicy>>>,
    defaults: TariffTable,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn PricePolicyStore>, defaults: TariffTable, ttl: Duration) -> Self {
        PolicyResolver {
            store,
            cache: FreshnessCache::new(ttl),
            defaults,
        }
    }

    pub fn defaults(&self) -> &TariffTable {
        &self.defaults
    }

    /// Current policies. A failed refresh serves the stale list, or none.
    pub async fn policies(&self) -> Arc<Vec<PricePolicy>> {
        let cached = self.cache.get(&());
        if let Some((policies, true)) = &cached {
            return policies.clone();
        }

        match self.store.policies().await {
            Ok(policies) => {
                let policies = Arc::new(policies);
                self.cache.insert((), policies.clone());
                policies
            }
            Err(err) => {
                tracing::warn!(error = %err, "price policy refresh failed, using cached or default tariffs");
                cached.map(|(policies, _)| policies).unwrap_or_default()
            }
        }
    }

    /// Policies read straight from the store, refreshing the cache. Unlike
    /// [`policies`](Self::policies), a failed read goes back to the caller.
    pub async fn stored_policies(&self) -> RoomSyncResult<Arc<Vec<PricePolicy>>> {
        let policies = Arc::new(self.store.policies().await?);
        self.cache.insert((), policies.clone());
        Ok(policies)
    }

    /// Tariffs in force on a local date. Rooms the applicable policy does not
    /// mention keep their default tariff.
    pub async fn tariffs_on(&self, date: NaiveDate) -> TariffTable {
        let policies = self.policies().await;
        let mut table = self.defaults.clone();
        if let Some(policy) = resolve_policy(&policies, date) {
            for (room, tariff) in &policy.tariffs.0 {
                table.insert(*room, tariff.clone());
            }
        }
        table
    }

    pub async fn insert(&self, policy: &PricePolicy) -> RoomSyncResult<PricePolicy> {
        let stored = self.store.insert_policy(policy).await?;
        self.invalidate();
        tracing::info!(effective_from = %stored.effective_from, "price policy added");
        Ok(stored)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecalculationReport {
    pub total: usize,
    pub updated: usize,
}

/// Prices bookings with the tariffs in force on their local start date.
pub struct Pricer {
    policies: Arc<PolicyResolver>,
    calculator: PriceCalculator,
}

impl Pricer {
    pub fn new(policies: Arc<PolicyResolver>, calculator: PriceCalculator) -> Self {
        Pricer {
            policies,
            calculator,
        }
    }

    pub fn policies(&self) -> &Arc<PolicyResolver> {
        &self.policies
    }

    pub fn calculator(&self) -> &PriceCalculator {
        &self.calculator
    }

    pub async fn price(&self, booking: &mut Booking) {
        let tariffs = self.policies.tariffs_on(local_date(booking.start)).await;
        let quote = self.calculator.quote(
            booking.room_id,
            booking.start,
            booking.end,
            &booking.description,
            &tariffs,
        );
        booking.apply_quote(quote);
    }

    /// Reprice every stored booking and write it back. Failed batches are
    /// logged and left out of `updated`.
    pub async fn recalculate(&self, store: &dyn BookingStore) -> RoomSyncResult<RecalculationReport> {
        let mut bookings = store.all_bookings().await?;
        let total = bookings.len();
        for booking in &mut bookings {
            self.price(booking).await;
        }

        let mut updated = 0;
        for batch in bookings.chunks(UPSERT_BATCH_SIZE) {
            match store.upsert_bookings(batch).await {
                Ok(written) => updated += written,
                Err(err) => {
                    tracing::error!(error = %err, rows = batch.len(), "repriced batch not written")
                }
            }
        }

        tracing::info!(total, updated, "price recalculation finished");
        Ok(RecalculationReport { total, updated })
    }
}
