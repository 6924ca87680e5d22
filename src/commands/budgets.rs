// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::categories::category_names;
use crate::commands::households::{active_members, find_active_membership, get_household};
use crate::commands::users::Session;
use crate::context::Context;
use crate::error::{BudgetError, Result};
use crate::models::{Account, Budget, BudgetSummary, Category, Transaction};
use crate::money::{BudgetStatus, classify_status, normalize_allocated, percent_used, percentage_of};
use crate::period::{DEFAULT_PAYDAY, period_for};
use crate::ratelimit::EntityType;
use crate::redact::Redacted;
use crate::store::{Collection, Operation, Query, fetch, fetch_one};
use crate::utils::{maybe_print_json, new_id, parse_decimal, pretty_table};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodSource {
    Member,
    Household,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_remaining: i64,
    pub payday_day: u32,
    pub source: PeriodSource,
}

impl ResolvedPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Which payday governs the user's budget: their own, else the household's,
/// else the default. Reads only.
pub fn resolve_budget_period(cx: &Context, user_id: &str, household_id: &str) -> Result<ResolvedPeriod> {
    let member = find_active_membership(cx, user_id, household_id)?;
    let (payday_day, source) = match member.as_ref().and_then(|m| m.payday_day) {
        Some(day) => (day, PeriodSource::Member),
        None => {
            let household = get_household(cx, household_id)?;
            if member.is_none() && household.is_none() {
                return Err(BudgetError::not_found("Household"));
            }
            let day = household.and_then(|h| h.payday_day).unwrap_or(DEFAULT_PAYDAY);
            (day, PeriodSource::Household)
        }
    };

    let period = period_for(payday_day, cx.today)?;
    Ok(ResolvedPeriod {
        start: period.start,
        end: period.end,
        days_remaining: period.days_remaining,
        payday_day,
        source,
    })
}

pub fn fetch_summary(cx: &Context, user_id: &str) -> Result<Option<BudgetSummary>> {
    let mut rows: Vec<BudgetSummary> = fetch(
        cx.store,
        Query::all(Collection::BudgetSummaries).where_eq("userId", user_id),
    )?;
    Ok(rows.pop())
}

pub fn active_budgets(cx: &Context, user_id: &str) -> Result<Vec<Budget>> {
    Ok(fetch(
        cx.store,
        Query::all(Collection::Budgets)
            .where_eq("userId", user_id)
            .where_eq("isActive", true),
    )?)
}

fn empty_summary(user_id: &str) -> BudgetSummary {
    BudgetSummary {
        id: new_id(),
        user_id: user_id.to_string(),
        total_income: Decimal::ZERO,
        total_allocated: Decimal::ZERO,
        total_spent: Decimal::ZERO,
        period_start: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcOutcome {
    pub by_category: BTreeMap<String, Decimal>,
    pub uncategorized: Decimal,
    pub total_spent: Decimal,
    pub budgets_updated: usize,
}

/// Rebuild every active budget's `spentAmount` and the summary's
/// `totalSpent` from the ledger. Values are overwritten, so running it twice
/// gives the same result.
///
/// Counted: expenses dated inside `[period_start, period_end]` and not after
/// today, on accounts that are not budget-excluded, not themselves excluded.
pub fn recalculate_spent(
    cx: &Context,
    user_id: &str,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<RecalcOutcome> {
    let mut res = cx.store.query_once(&[
        Query::all(Collection::Accounts)
            .where_eq("userId", user_id)
            .where_eq("isExcludedFromBudget", true),
        Query::all(Collection::Transactions)
            .where_eq("userId", user_id)
            .where_eq("type", "expense"),
        Query::all(Collection::Budgets)
            .where_eq("userId", user_id)
            .where_eq("isActive", true),
        Query::all(Collection::BudgetSummaries).where_eq("userId", user_id),
    ])?;
    let excluded: HashSet<String> = res
        .take::<Account>(Collection::Accounts)?
        .into_iter()
        .map(|a| a.id)
        .collect();
    let expenses: Vec<Transaction> = res.take(Collection::Transactions)?;
    let budgets: Vec<Budget> = res.take(Collection::Budgets)?;
    let summary = res.take::<BudgetSummary>(Collection::BudgetSummaries)?.pop();

    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut uncategorized = Decimal::ZERO;
    for tx in expenses.iter().filter(|tx| {
        period_start <= tx.date
            && tx.date <= period_end
            && tx.date <= cx.today
            && !excluded.contains(&tx.account_id)
            && !tx.is_excluded_from_budget
    }) {
        match &tx.category_id {
            Some(cat) => *by_category.entry(cat.clone()).or_default() += tx.amount,
            None => uncategorized += tx.amount,
        }
    }
    let total_spent = by_category.values().copied().sum::<Decimal>() + uncategorized;

    let mut ops = Vec::with_capacity(budgets.len() + 1);
    for b in &budgets {
        let spent = by_category.get(&b.category_id).copied().unwrap_or(Decimal::ZERO);
        ops.push(Operation::update(
            Collection::Budgets,
            &b.id,
            json!({ "spentAmount": spent }),
        ));
    }
    if let Some(s) = &summary {
        ops.push(Operation::update(
            Collection::BudgetSummaries,
            &s.id,
            json!({ "totalSpent": total_spent }),
        ));
    }
    if !ops.is_empty() {
        cx.store.transact(ops)?;
    }
    tracing::info!(
        user = %Redacted(user_id),
        budgets = budgets.len(),
        categories = by_category.len(),
        "spend recalculated"
    );

    Ok(RecalcOutcome {
        by_category,
        uncategorized,
        total_spent,
        budgets_updated: budgets.len(),
    })
}

/// Resolve the user's current period and recalculate within it.
pub fn recalculate_current(cx: &Context, user_id: &str, household_id: &str) -> Result<RecalcOutcome> {
    let period = resolve_budget_period(cx, user_id, household_id)?;
    recalculate_spent(cx, user_id, period.start, period.end)
}

/// Add `delta` to one category's spend and to the summary total.
pub fn apply_spend_delta(cx: &Context, user_id: &str, category_id: Option<&str>, delta: Decimal) -> Result<()> {
    let mut ops = Vec::new();
    if let Some(cat) = category_id {
        let budgets: Vec<Budget> = fetch(
            cx.store,
            Query::all(Collection::Budgets)
                .where_eq("userId", user_id)
                .where_eq("categoryId", cat)
                .where_eq("isActive", true),
        )?;
        for b in budgets {
            ops.push(Operation::update(
                Collection::Budgets,
                &b.id,
                json!({ "spentAmount": b.spent_amount + delta }),
            ));
        }
    }
    if let Some(s) = fetch_summary(cx, user_id)? {
        ops.push(Operation::update(
            Collection::BudgetSummaries,
            &s.id,
            json!({ "totalSpent": s.total_spent + delta }),
        ));
    }
    if !ops.is_empty() {
        cx.store.transact(ops)?;
    }
    Ok(())
}

/// `Active -> Archived` for one row. Archived rows are final.
fn archive_op(budget: &Budget) -> Result<Operation> {
    if !budget.is_active {
        return Err(BudgetError::validation("Budget is already archived"));
    }
    Ok(Operation::update(
        Collection::Budgets,
        &budget.id,
        json!({ "isActive": false }),
    ))
}

/// Fresh active row carrying the allocation into the next period.
fn successor(budget: &Budget) -> Budget {
    Budget {
        id: new_id(),
        user_id: budget.user_id.clone(),
        category_id: budget.category_id.clone(),
        allocated_amount: budget.allocated_amount,
        spent_amount: Decimal::ZERO,
        percentage: budget.percentage,
        category_group: budget.category_group.clone(),
        is_active: true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub archived: usize,
    pub created: usize,
    pub period_start: NaiveDate,
}

/// Archive every active budget row and open a new one per category, zero
/// the summary's spend and stamp the period start, all in one batch.
pub fn reset_budget_period(cx: &Context, user_id: &str, period_start: NaiveDate) -> Result<ResetOutcome> {
    let budgets = active_budgets(cx, user_id)?;
    let summary = fetch_summary(cx, user_id)?;

    let mut ops = Vec::with_capacity(budgets.len() * 2 + 1);
    for b in &budgets {
        ops.push(archive_op(b)?);
        let next = successor(b);
        ops.push(Operation::put(Collection::Budgets, &next.id, &next)?);
    }
    let mut summary = summary.unwrap_or_else(|| {
        let mut s = empty_summary(user_id);
        s.total_allocated = budgets.iter().map(|b| b.allocated_amount).sum();
        s
    });
    summary.total_spent = Decimal::ZERO;
    summary.period_start = Some(period_start);
    ops.push(Operation::put(Collection::BudgetSummaries, &summary.id, &summary)?);

    cx.store.transact(ops)?;
    tracing::info!(user = %Redacted(user_id), rows = budgets.len(), %period_start, "budget period reset");
    Ok(ResetOutcome {
        archived: budgets.len(),
        created: budgets.len(),
        period_start,
    })
}

/// Reset only when the summary was last reset for a different period, then
/// recount spend for the new period. Returns whether a reset happened.
pub fn reset_if_period_rolled(cx: &Context, user_id: &str, household_id: &str) -> Result<bool> {
    let period = resolve_budget_period(cx, user_id, household_id)?;
    let summary = fetch_summary(cx, user_id)?;
    if summary.and_then(|s| s.period_start) == Some(period.start) {
        return Ok(false);
    }
    reset_budget_period(cx, user_id, period.start)?;
    recalculate_spent(cx, user_id, period.start, period.end)?;
    Ok(true)
}

#[derive(Debug)]
pub struct MemberReset {
    pub user_id: String,
    pub outcome: Result<ResetOutcome>,
}

/// Reset every active member of the household. Each member is its own
/// batch, so a failure part-way leaves earlier members reset.
pub fn reset_household_budget_period(cx: &Context, household_id: &str) -> Result<Vec<MemberReset>> {
    let members = active_members(cx, household_id)?;
    let mut report = Vec::with_capacity(members.len());
    for m in members {
        let outcome = resolve_budget_period(cx, &m.user_id, household_id).and_then(|period| {
            let out = reset_budget_period(cx, &m.user_id, period.start)?;
            recalculate_spent(cx, &m.user_id, period.start, period.end)?;
            Ok(out)
        });
        if let Err(e) = &outcome {
            tracing::error!(user = %Redacted(&m.user_id), error = %e, "member budget reset failed");
        }
        report.push(MemberReset {
            user_id: m.user_id,
            outcome,
        });
    }
    Ok(report)
}

fn rebalance_summary(summary: &mut BudgetSummary, budgets: &[Budget]) {
    let allocated: Decimal = budgets.iter().map(|b| b.allocated_amount).sum();
    summary.total_allocated = normalize_allocated(summary.total_income, allocated);
}

pub fn set_income(cx: &Context, user_id: &str, total_income: Decimal) -> Result<BudgetSummary> {
    if total_income < Decimal::ZERO {
        return Err(BudgetError::validation("Income must not be negative"));
    }
    cx.check_rate(EntityType::Budget)?;
    let budgets = active_budgets(cx, user_id)?;
    let mut summary = fetch_summary(cx, user_id)?.unwrap_or_else(|| empty_summary(user_id));
    summary.total_income = total_income;
    rebalance_summary(&mut summary, &budgets);

    let mut ops = Vec::with_capacity(budgets.len() + 1);
    for b in &budgets {
        ops.push(Operation::update(
            Collection::Budgets,
            &b.id,
            json!({ "percentage": percentage_of(b.allocated_amount, total_income) }),
        ));
    }
    ops.push(Operation::put(Collection::BudgetSummaries, &summary.id, &summary)?);
    cx.store.transact(ops)?;
    cx.record_mutation(EntityType::Budget);
    Ok(summary)
}

/// Create or change the allocation of the user's active budget for a category.
pub fn set_allocation(
    cx: &Context,
    user_id: &str,
    category_id: &str,
    allocated: Decimal,
    category_group: Option<&str>,
) -> Result<Budget> {
    if allocated < Decimal::ZERO {
        return Err(BudgetError::validation("Allocated amount must not be negative"));
    }
    let category: Option<Category> = fetch_one(cx.store, Collection::Categories, category_id)?;
    if category.is_none() {
        return Err(BudgetError::not_found("Category"));
    }
    cx.check_rate(EntityType::Budget)?;

    let mut budgets = active_budgets(cx, user_id)?;
    let mut summary = fetch_summary(cx, user_id)?.unwrap_or_else(|| empty_summary(user_id));
    let percentage = percentage_of(allocated, summary.total_income);

    let budget = match budgets.iter_mut().find(|b| b.category_id == category_id) {
        Some(b) => {
            b.allocated_amount = allocated;
            b.percentage = percentage;
            if let Some(g) = category_group {
                b.category_group = Some(g.to_string());
            }
            b.clone()
        }
        None => {
            let b = Budget {
                id: new_id(),
                user_id: user_id.to_string(),
                category_id: category_id.to_string(),
                allocated_amount: allocated,
                spent_amount: Decimal::ZERO,
                percentage,
                category_group: category_group.map(str::to_string),
                is_active: true,
            };
            budgets.push(b.clone());
            b
        }
    };
    rebalance_summary(&mut summary, &budgets);

    cx.store.transact(vec![
        Operation::put(Collection::Budgets, &budget.id, &budget)?,
        Operation::put(Collection::BudgetSummaries, &summary.id, &summary)?,
    ])?;
    cx.record_mutation(EntityType::Budget);
    Ok(budget)
}

pub fn get_budget_summary(cx: &Context, user_id: &str) -> Option<BudgetSummary> {
    match fetch_summary(cx, user_id) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "budget summary unavailable");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetDetail {
    pub budget_id: String,
    pub category_id: String,
    pub category_name: String,
    pub category_group: Option<String>,
    pub allocated: Decimal,
    pub spent: Decimal,
    pub remaining: Decimal,
    pub percent_used: Decimal,
    pub status: BudgetStatus,
}

fn try_budget_details(cx: &Context, user_id: &str) -> Result<Vec<BudgetDetail>> {
    let names = category_names(cx)?;
    let mut details: Vec<BudgetDetail> = active_budgets(cx, user_id)?
        .into_iter()
        .map(|b| BudgetDetail {
            category_name: names.get(&b.category_id).cloned().unwrap_or_default(),
            remaining: b.allocated_amount - b.spent_amount,
            percent_used: percent_used(b.allocated_amount, b.spent_amount),
            status: classify_status(b.allocated_amount, b.spent_amount),
            budget_id: b.id,
            category_id: b.category_id,
            category_group: b.category_group,
            allocated: b.allocated_amount,
            spent: b.spent_amount,
        })
        .collect();
    details.sort_by(|a, b| a.category_name.cmp(&b.category_name));
    Ok(details)
}

pub fn get_budget_details(cx: &Context, user_id: &str) -> Vec<BudgetDetail> {
    try_budget_details(cx, user_id).unwrap_or_else(|e| {
        tracing::error!(error = %e, "budget details unavailable");
        Vec::new()
    })
}

pub fn handle(cx: &Context, session: &Session, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let user_id = &session.user.id;
    match m.subcommand() {
        Some(("period", sub)) => {
            let period = resolve_budget_period(cx, user_id, session.require_household()?)?;
            if !maybe_print_json(sub.get_flag("json"), &period)? {
                println!(
                    "{} .. {} ({} days left, payday {} from {:?})",
                    period.start, period.end, period.days_remaining, period.payday_day, period.source
                );
            }
        }
        Some(("income", sub)) => {
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let s = set_income(cx, user_id, amount)?;
            println!("Income set to {:.2}", s.total_income);
        }
        Some(("set", sub)) => {
            let cat = sub.get_one::<String>("category").unwrap().trim();
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let group = sub.get_one::<String>("group").map(|s| s.trim());
            let b = set_allocation(cx, user_id, cat, amount, group)?;
            println!("Budget set: {:.2} ({}% of income)", b.allocated_amount, b.percentage);
        }
        Some(("status", sub)) => {
            if let Some(household_id) = session.household_id.as_deref() {
                if let Err(e) = reset_if_period_rolled(cx, user_id, household_id) {
                    tracing::warn!(error = %e, "period rollover check failed");
                }
            }
            let details = get_budget_details(cx, user_id);
            if !maybe_print_json(sub.get_flag("json"), &details)? {
                let rows = details
                    .into_iter()
                    .map(|d| {
                        vec![
                            d.category_name,
                            format!("{:.2}", d.allocated),
                            format!("{:.2}", d.spent),
                            format!("{:.2}", d.remaining),
                            format!("{}%", d.percent_used),
                            d.status.to_string(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Category", "Allocated", "Spent", "Remaining", "Used", "Status"],
                        rows
                    )
                );
                if let Some(s) = get_budget_summary(cx, user_id) {
                    println!(
                        "Income {:.2} / allocated {:.2} / spent {:.2}",
                        s.total_income, s.total_allocated, s.total_spent
                    );
                }
            }
        }
        Some(("recalc", _)) => {
            let out = recalculate_current(cx, user_id, session.require_household()?)?;
            println!(
                "Recalculated {} budgets, total spent {:.2}",
                out.budgets_updated, out.total_spent
            );
        }
        Some(("reset", sub)) => {
            let household_id = session.require_household()?;
            if sub.get_flag("household") {
                for r in reset_household_budget_period(cx, household_id)? {
                    match r.outcome {
                        Ok(o) => println!("{}: {} budgets rolled over", r.user_id, o.created),
                        Err(e) => println!("{}: failed ({})", r.user_id, e),
                    }
                }
            } else if sub.get_flag("force") {
                let period = resolve_budget_period(cx, user_id, household_id)?;
                let o = reset_budget_period(cx, user_id, period.start)?;
                recalculate_spent(cx, user_id, period.start, period.end)?;
                println!("{} budgets rolled over to {}", o.created, o.period_start);
            } else if reset_if_period_rolled(cx, user_id, household_id)? {
                println!("New pay period started, budgets rolled over");
            } else {
                println!("Budgets already track the current pay period");
            }
        }
        _ => {}
    }
    Ok(())
}
