// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{BudgetError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt;

/// Slack allowed between a summary's allocated total and its income.
pub const SUMMARY_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
/// Slack allowed when split percentages are checked against 100.
pub const PERCENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
pub const WARNING_RATIO: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

pub fn truncate_cents(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

pub fn round_cents(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Split `total` across parties in proportion to `weights`.
///
/// Each share is truncated to the cent and whatever truncation dropped goes
/// to the first share, so the result always sums to `total` exactly.
pub fn prorate(total: Decimal, weights: &[Decimal]) -> Result<Vec<Decimal>> {
    if total.is_sign_negative() && !total.is_zero() {
        return Err(BudgetError::validation("Amount to split must not be negative"));
    }
    if total.normalize().scale() > 2 {
        return Err(BudgetError::validation(
            "Amount to split must have at most two decimal places",
        ));
    }
    if weights.iter().any(|w| w.is_sign_negative() && !w.is_zero()) {
        return Err(BudgetError::validation("Split weights must not be negative"));
    }
    let sum: Decimal = weights.iter().copied().sum();
    if weights.is_empty() || sum.is_zero() {
        return Err(BudgetError::validation(
            "Split weights must not be empty or all zero",
        ));
    }
    if total.is_zero() {
        return Ok(vec![Decimal::ZERO; weights.len()]);
    }

    let mut shares = Vec::with_capacity(weights.len());
    for w in weights {
        let exact = total
            .checked_mul(*w)
            .and_then(|v| v.checked_div(sum))
            .ok_or_else(|| BudgetError::validation("Split amount out of range"))?;
        shares.push(truncate_cents(exact));
    }
    let allotted: Decimal = shares.iter().copied().sum();
    shares[0] += total - allotted;
    Ok(shares)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetStatus {
    OnTrack,
    Warning,
    OverBudget,
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BudgetStatus::OnTrack => "on-track",
            BudgetStatus::Warning => "warning",
            BudgetStatus::OverBudget => "over-budget",
        })
    }
}

pub fn classify_status(allocated: Decimal, spent: Decimal) -> BudgetStatus {
    if allocated <= Decimal::ZERO {
        BudgetStatus::OnTrack
    } else if spent > allocated {
        BudgetStatus::OverBudget
    } else if spent >= allocated * WARNING_RATIO {
        BudgetStatus::Warning
    } else {
        BudgetStatus::OnTrack
    }
}

/// Share of `allocated` already spent, in percent with one decimal.
pub fn percent_used(allocated: Decimal, spent: Decimal) -> Decimal {
    if allocated <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (spent * HUNDRED / allocated).round_dp(1)
}

/// `part` as a percentage of `whole`, two decimals; zero when `whole` is zero.
pub fn percentage_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_cents(part * HUNDRED / whole)
}

/// Snap `total_allocated` onto `total_income` when they differ by at most
/// [`SUMMARY_TOLERANCE`].
pub fn normalize_allocated(total_income: Decimal, total_allocated: Decimal) -> Decimal {
    if (total_income - total_allocated).abs() <= SUMMARY_TOLERANCE {
        total_income
    } else {
        total_allocated
    }
}

pub fn fmt_money(d: &Decimal, ccy: &str) -> String {
    format!("{} {:.2}", ccy, d.round_dp(2))
}
