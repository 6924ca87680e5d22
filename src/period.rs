// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Pay-period windows anchored on a payday day-of-month.
//!
//! A period starts on the most recent payday on or before the reference date
//! and ends the day before the following payday. Paydays past the end of a
//! short month fall on that month's last day, so day 31 becomes Feb 28/29,
//! Apr 30 and so on. Everything here is pure; the display path and the
//! spend-filtering path both call [`period_for`] and must agree exactly.

use crate::error::{BudgetError, Result};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

pub const DEFAULT_PAYDAY: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_remaining: i64,
}

impl PayPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
    }
}

/// `(year, month)` moved by `delta` months.
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let idx = year * 12 + month as i32 - 1 + delta;
    (idx.div_euclid(12), idx.rem_euclid(12) as u32 + 1)
}

/// The payday inside `(year, month)`, pulled back to the last day of short months.
pub fn clamp_day(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| BudgetError::validation(format!("Invalid date {}-{:02}-{:02}", year, month, day)))
}

pub fn validate_payday(payday_day: u32) -> Result<u32> {
    if (1..=31).contains(&payday_day) {
        Ok(payday_day)
    } else {
        Err(BudgetError::validation(format!(
            "Payday must be between 1 and 31, got {}",
            payday_day
        )))
    }
}

/// Days left in the period counting the end date itself; never negative.
pub fn days_remaining(end: NaiveDate, reference: NaiveDate) -> i64 {
    ((end - reference).num_days() + 1).max(0)
}

pub fn period_for(payday_day: u32, reference: NaiveDate) -> Result<PayPeriod> {
    let payday_day = validate_payday(payday_day)?;
    let (y, m) = (reference.year(), reference.month());

    let this_month = clamp_day(y, m, payday_day)?;
    let start = if reference >= this_month {
        this_month
    } else {
        let (py, pm) = shift_month(y, m, -1);
        clamp_day(py, pm, payday_day)?
    };

    let (ny, nm) = shift_month(start.year(), start.month(), 1);
    let next_payday = clamp_day(ny, nm, payday_day)?;
    let end = next_payday
        .pred_opt()
        .ok_or_else(|| BudgetError::validation("Pay period end is out of range"))?;

    Ok(PayPeriod {
        start,
        end,
        days_remaining: days_remaining(end, reference),
    })
}
