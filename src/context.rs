// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{BudgetError, Result};
use crate::ratelimit::{EntityType, RateLimiter};
use crate::store::Store;
use chrono::NaiveDate;

/// What every core operation runs against: the store, an optional mutation
/// limiter and the clock.
pub struct Context<'a> {
    pub store: &'a dyn Store,
    pub limiter: Option<&'a RateLimiter<'a>>,
    pub today: NaiveDate,
    pub now_ms: i64,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a dyn Store, today: NaiveDate) -> Self {
        Context {
            store,
            limiter: None,
            today,
            now_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_limiter(mut self, limiter: &'a RateLimiter<'a>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn at(mut self, now_ms: i64) -> Self {
        self.now_ms = now_ms;
        self
    }

    /// Refuse the mutation when the limiter's window for `entity` is full.
    pub fn check_rate(&self, entity: EntityType) -> Result<()> {
        let Some(limiter) = self.limiter else {
            return Ok(());
        };
        let decision = limiter.check_rate_limit(entity, self.now_ms);
        if decision.allowed {
            Ok(())
        } else {
            tracing::warn!(entity = %entity, retry_after_ms = decision.retry_after_ms, "mutation rate limited");
            Err(BudgetError::RateLimited {
                entity,
                retry_after_ms: decision.retry_after_ms,
            })
        }
    }

    pub fn record_mutation(&self, entity: EntityType) {
        if let Some(limiter) = self.limiter {
            limiter.record_mutation(entity, self.now_ms);
        }
    }
}
