// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{BudgetError, Result};
use crate::ratelimit::{KeyValueStore, RateLimitConfig, RateLimitPolicy};
use chrono::NaiveDate;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rust_decimal::Decimal;

pub const CURRENT_EMAIL_KEY: &str = "current_email";

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return Err(BudgetError::validation("Transaction date is required"));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| BudgetError::validation(format!("Invalid date '{}', expected YYYY-MM-DD", s)))
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .map_err(|_| BudgetError::validation(format!("Invalid decimal '{}'", s.trim())))
}

pub fn require_positive(amount: Decimal) -> Result<Decimal> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(BudgetError::validation("Amount must be greater than 0"))
    }
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(json_flag: bool, v: &T) -> anyhow::Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    Ok(false)
}

pub fn get_setting(kv: &dyn KeyValueStore, key: &str) -> Result<Option<String>> {
    Ok(kv.get(key)?)
}

pub fn set_setting(kv: &dyn KeyValueStore, key: &str, value: &str) -> Result<()> {
    kv.set(key, value)?;
    Ok(())
}

/// Limiter policy, with the non-settlement window overridable from settings.
pub fn rate_limit_config(kv: &dyn KeyValueStore) -> Result<RateLimitConfig> {
    let mut config = RateLimitConfig::default();
    let max = get_setting(kv, "rate_limit_max")?.and_then(|s| s.trim().parse::<usize>().ok());
    let secs = get_setting(kv, "rate_limit_window_secs")?
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|secs| *secs > 0);
    if max.is_some() || secs.is_some() {
        config.default = RateLimitPolicy::new(
            max.unwrap_or(config.default.max_mutations),
            secs.unwrap_or(config.default.window_ms / 1000),
        );
    }
    Ok(config)
}
