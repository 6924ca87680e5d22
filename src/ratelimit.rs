// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Local sliding-window limiter for mutations, one window per entity type.
//!
//! Recent timestamps are cached in memory, hydrated once from a durable
//! key/value store and written back after each recorded mutation. A failed
//! write-back only loses history, which makes the limiter more permissive,
//! never stricter.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

const KEY_PREFIX: &str = "rate_limit:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Transaction,
    Budget,
    Settlement,
    Account,
    Category,
    Household,
    Template,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Transaction,
        EntityType::Budget,
        EntityType::Settlement,
        EntityType::Account,
        EntityType::Category,
        EntityType::Household,
        EntityType::Template,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Transaction => "transaction",
            EntityType::Budget => "budget",
            EntityType::Settlement => "settlement",
            EntityType::Account => "account",
            EntityType::Category => "category",
            EntityType::Household => "household",
            EntityType::Template => "template",
        }
    }

    fn storage_key(self) -> String {
        format!("{}{}", KEY_PREFIX, self.as_str())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable local storage backing the limiter.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryKv {
    map: RefCell<HashMap<String, String>>,
    fail_writes: Cell<bool>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        self.map.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.map.borrow_mut().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_mutations: usize,
    pub window_ms: i64,
}

impl RateLimitPolicy {
    pub const fn new(max_mutations: usize, window_secs: i64) -> Self {
        RateLimitPolicy {
            max_mutations,
            window_ms: window_secs.saturating_mul(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub default: RateLimitPolicy,
    pub settlements: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            default: RateLimitPolicy::new(10, 60),
            settlements: RateLimitPolicy::new(5, 60),
        }
    }
}

impl RateLimitConfig {
    pub fn policy(&self, entity: EntityType) -> RateLimitPolicy {
        match entity {
            EntityType::Settlement => self.settlements,
            _ => self.default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_ms: u64,
    pub remaining: usize,
}

pub struct RateLimiter<'a> {
    kv: &'a dyn KeyValueStore,
    config: RateLimitConfig,
    cache: RefCell<HashMap<EntityType, Vec<i64>>>,
    loaded: Cell<bool>,
}

impl<'a> RateLimiter<'a> {
    pub fn create(kv: &'a dyn KeyValueStore, config: RateLimitConfig) -> Self {
        RateLimiter {
            kv,
            config,
            cache: RefCell::new(HashMap::new()),
            loaded: Cell::new(false),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Hydrate the cache from durable storage. Runs once; later calls are no-ops.
    pub fn load(&self) {
        if self.loaded.replace(true) {
            return;
        }
        let mut cache = self.cache.borrow_mut();
        for entity in EntityType::ALL {
            match self.kv.get(&entity.storage_key()) {
                Ok(Some(raw)) => match serde_json::from_str::<Vec<i64>>(&raw) {
                    Ok(stamps) => {
                        cache.insert(entity, stamps);
                    }
                    Err(e) => tracing::warn!(entity = %entity, error = %e, "discarding unreadable rate-limit history"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(entity = %entity, error = %e, "rate-limit history unavailable"),
            }
        }
    }

    pub fn check_rate_limit(&self, entity: EntityType, now_ms: i64) -> RateLimitDecision {
        self.load();
        let policy = self.config.policy(entity);
        let mut cache = self.cache.borrow_mut();
        let stamps = cache.entry(entity).or_default();
        stamps.retain(|t| *t > now_ms.saturating_sub(policy.window_ms));

        if stamps.len() >= policy.max_mutations {
            let oldest = stamps.iter().copied().min().unwrap_or(now_ms);
            let retry = oldest.saturating_add(policy.window_ms).saturating_sub(now_ms).max(0) as u64;
            RateLimitDecision {
                allowed: false,
                retry_after_ms: retry,
                remaining: 0,
            }
        } else {
            RateLimitDecision {
                allowed: true,
                retry_after_ms: 0,
                remaining: policy.max_mutations - stamps.len(),
            }
        }
    }

    pub fn record_mutation(&self, entity: EntityType, now_ms: i64) {
        self.load();
        let snapshot = {
            let mut cache = self.cache.borrow_mut();
            let stamps = cache.entry(entity).or_default();
            stamps.push(now_ms);
            stamps.clone()
        };
        self.persist(entity, &snapshot);
    }

    pub fn check_and_record(&self, entity: EntityType, now_ms: i64) -> RateLimitDecision {
        let mut decision = self.check_rate_limit(entity, now_ms);
        if decision.allowed {
            self.record_mutation(entity, now_ms);
            decision.remaining -= 1;
        }
        decision
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
        for entity in EntityType::ALL {
            if let Err(e) = self.kv.remove(&entity.storage_key()) {
                tracing::warn!(entity = %entity, error = %e, "could not clear rate-limit history");
            }
        }
    }

    fn persist(&self, entity: EntityType, stamps: &[i64]) {
        let raw = match serde_json::to_string(stamps) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "could not encode rate-limit history");
                return;
            }
        };
        if let Err(e) = self.kv.set(&entity.storage_key(), &raw) {
            tracing::warn!(entity = %entity, error = %e, "could not persist rate-limit history");
        }
    }
}
