// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::*;
use housebudget::commands::budgets::{
    PeriodSource, get_budget_details, get_budget_summary, recalculate_spent, reset_budget_period,
    reset_household_budget_period, reset_if_period_rolled, resolve_budget_period, set_allocation,
    set_income,
};
use housebudget::context::Context;
use housebudget::error::BudgetError;
use housebudget::models::{Budget, BudgetSummary};
use housebudget::money::BudgetStatus;
use housebudget::store::{Collection, MemoryStore, Operation, Query, fetch};
use rust_decimal::Decimal;

fn budgets(store: &MemoryStore) -> Vec<Budget> {
    fetch(store, Query::all(Collection::Budgets)).unwrap()
}

fn summary(store: &MemoryStore) -> BudgetSummary {
    fetch::<BudgetSummary>(store, Query::all(Collection::BudgetSummaries))
        .unwrap()
        .pop()
        .unwrap()
}

fn spent_of(store: &MemoryStore, budget_id: &str) -> Decimal {
    budgets(store).into_iter().find(|b| b.id == budget_id).unwrap().spent_amount
}

#[test]
fn member_payday_wins() {
    let store = MemoryStore::new();
    seed_household(&store, HOME, Some(15));
    seed_member(&store, HOME, ALICE, Some(1));
    let cx = Context::new(&store, today());

    let p = resolve_budget_period(&cx, ALICE, HOME).unwrap();
    assert_eq!(p.source, PeriodSource::Member);
    assert_eq!(p.payday_day, 1);
    assert_eq!(p.start, d("2025-03-01"));
    assert_eq!(p.end, d("2025-03-31"));
}

#[test]
fn household_payday_is_the_fallback() {
    let store = MemoryStore::new();
    seed_household(&store, HOME, Some(15));
    seed_member(&store, HOME, ALICE, None);
    let cx = Context::new(&store, today());

    let p = resolve_budget_period(&cx, ALICE, HOME).unwrap();
    assert_eq!(p.source, PeriodSource::Household);
    assert_eq!(p.payday_day, 15);
    assert_eq!(p.start, d("2025-02-15"));
}

#[test]
fn default_payday_is_25() {
    let store = household_with_alice();
    let cx = Context::new(&store, today());

    let p = resolve_budget_period(&cx, ALICE, HOME).unwrap();
    assert_eq!(p.source, PeriodSource::Household);
    assert_eq!(p.payday_day, 25);
    assert_eq!(p.start, d("2025-02-25"));
    assert_eq!(p.end, d("2025-03-24"));
    assert_eq!(p.days_remaining, 15);
}

#[test]
fn unknown_household_is_not_found() {
    let store = MemoryStore::new();
    let cx = Context::new(&store, today());
    assert!(matches!(
        resolve_budget_period(&cx, ALICE, "nope"),
        Err(BudgetError::NotFound(_))
    ));
}

fn ledger() -> MemoryStore {
    let store = household_with_alice();
    seed_account(&store, "acc-savings", ALICE, "10000", true);
    seed_category(&store, "cat-food", "Groceries");
    seed_category(&store, "cat-fun", "Fun");
    seed_budget(&store, "b-food", ALICE, "cat-food", "600", "999");
    seed_budget(&store, "b-fun", ALICE, "cat-fun", "250", "0");
    seed_summary(&store, "s-alice", ALICE, "5000", "0");

    seed_tx(&store, "t1", ALICE, "acc-main", Some("cat-food"), "87.35", "2025-03-01");
    seed_tx(&store, "t2", ALICE, "acc-main", Some("cat-food"), "52.90", "2025-02-25");
    seed_tx(&store, "t3", ALICE, "acc-main", Some("cat-fun"), "280.00", "2025-03-09");
    seed_tx(&store, "t4", ALICE, "acc-main", None, "12.00", "2025-03-02");
    // future-dated, inside the period
    seed_tx(&store, "t5", ALICE, "acc-main", Some("cat-food"), "500.00", "2025-03-20");
    // before the period
    seed_tx(&store, "t6", ALICE, "acc-main", Some("cat-food"), "40.00", "2025-02-24");
    // excluded account
    seed_tx(&store, "t7", ALICE, "acc-savings", Some("cat-food"), "300.00", "2025-03-03");
    // another user
    seed_tx(&store, "t8", BOB, "acc-bob", Some("cat-food"), "70.00", "2025-03-03");
    let mut excluded = seed_tx(&store, "t9", ALICE, "acc-main", Some("cat-fun"), "30.00", "2025-03-04");
    excluded.is_excluded_from_budget = true;
    store.insert(Collection::Transactions, "t9", &excluded).unwrap();
    store
}

#[test]
fn recalculation_counts_only_eligible_expenses() {
    let store = ledger();
    let cx = Context::new(&store, today());

    let out = recalculate_spent(&cx, ALICE, d("2025-02-25"), d("2025-03-24")).unwrap();
    assert_eq!(out.by_category.get("cat-food"), Some(&dec("140.25")));
    assert_eq!(out.by_category.get("cat-fun"), Some(&dec("280.00")));
    assert_eq!(out.uncategorized, dec("12.00"));
    assert_eq!(out.total_spent, dec("432.25"));
    assert_eq!(out.budgets_updated, 2);

    assert_eq!(spent_of(&store, "b-food"), dec("140.25"));
    assert_eq!(spent_of(&store, "b-fun"), dec("280.00"));
    assert_eq!(summary(&store).total_spent, dec("432.25"));
    assert_eq!(store.batches().len(), 1);
    assert_eq!(store.last_batch().unwrap().len(), 3);
}

#[test]
fn recalculation_is_idempotent() {
    let store = ledger();
    let cx = Context::new(&store, today());

    let first = recalculate_spent(&cx, ALICE, d("2025-02-25"), d("2025-03-24")).unwrap();
    let after_first = (spent_of(&store, "b-food"), summary(&store).total_spent);
    let second = recalculate_spent(&cx, ALICE, d("2025-02-25"), d("2025-03-24")).unwrap();
    let after_second = (spent_of(&store, "b-food"), summary(&store).total_spent);

    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
}

#[test]
fn future_dated_expense_counts_once_its_day_arrives() {
    let store = ledger();
    let later = Context::new(&store, d("2025-03-20"));
    let out = recalculate_spent(&later, ALICE, d("2025-02-25"), d("2025-03-24")).unwrap();
    assert_eq!(out.by_category.get("cat-food"), Some(&dec("640.25")));
}

#[test]
fn categories_without_expenses_are_zeroed() {
    let store = household_with_alice();
    seed_budget(&store, "b-food", ALICE, "cat-food", "600", "123.45");
    let cx = Context::new(&store, today());

    recalculate_spent(&cx, ALICE, d("2025-02-25"), d("2025-03-24")).unwrap();
    assert_eq!(spent_of(&store, "b-food"), Decimal::ZERO);
}

#[test]
fn recalculation_propagates_store_failures() {
    let store = ledger();
    let cx = Context::new(&store, today());
    store.set_fail_writes(true);
    let err = recalculate_spent(&cx, ALICE, d("2025-02-25"), d("2025-03-24")).unwrap_err();
    assert!(err.is_upstream());
    assert_eq!(spent_of(&store, "b-food"), dec("999"));
}

#[test]
fn reset_archives_and_recreates_in_one_batch() {
    let store = household_with_alice();
    seed_budget(&store, "b-food", ALICE, "cat-food", "600", "140.25");
    seed_budget(&store, "b-fun", ALICE, "cat-fun", "250", "280");
    seed_summary(&store, "s-alice", ALICE, "5000", "420.25");
    let cx = Context::new(&store, today());

    let out = reset_budget_period(&cx, ALICE, d("2025-02-25")).unwrap();
    assert_eq!(out.archived, 2);
    assert_eq!(out.created, 2);
    assert_eq!(store.batches().len(), 1);
    assert_eq!(store.last_batch().unwrap().len(), 5);

    let all = budgets(&store);
    assert_eq!(all.len(), 4);
    let archived: Vec<_> = all.iter().filter(|b| !b.is_active).collect();
    assert_eq!(archived.len(), 2);
    assert!(archived.iter().all(|b| b.id == "b-food" || b.id == "b-fun"));
    let fresh: Vec<_> = all.iter().filter(|b| b.is_active).collect();
    assert!(fresh.iter().all(|b| b.spent_amount.is_zero()));
    assert!(fresh.iter().any(|b| b.category_id == "cat-food" && b.allocated_amount == dec("600")));

    let s = summary(&store);
    assert!(s.total_spent.is_zero());
    assert_eq!(s.period_start, Some(d("2025-02-25")));
}

#[test]
fn archived_rows_are_never_reactivated() {
    let store = household_with_alice();
    seed_budget(&store, "b-food", ALICE, "cat-food", "600", "0");
    seed_summary(&store, "s-alice", ALICE, "5000", "0");
    let cx = Context::new(&store, today());

    reset_budget_period(&cx, ALICE, d("2025-02-25")).unwrap();
    reset_budget_period(&cx, ALICE, d("2025-03-25")).unwrap();

    let reactivated = store.batches().iter().flatten().any(|op| match op {
        Operation::Update { collection: Collection::Budgets, id, fields } => {
            id == "b-food" && fields.get("isActive") == Some(&serde_json::Value::Bool(true))
        }
        _ => false,
    });
    assert!(!reactivated);
    assert_eq!(budgets(&store).iter().filter(|b| b.is_active).count(), 1);
}

#[test]
fn rollover_happens_once_per_period() {
    let store = ledger();
    let cx = Context::new(&store, today());

    assert!(reset_if_period_rolled(&cx, ALICE, HOME).unwrap());
    assert_eq!(summary(&store).period_start, Some(d("2025-02-25")));
    assert_eq!(summary(&store).total_spent, dec("432.25"));
    assert!(!reset_if_period_rolled(&cx, ALICE, HOME).unwrap());

    let next = Context::new(&store, d("2025-03-26"));
    assert!(reset_if_period_rolled(&next, ALICE, HOME).unwrap());
    assert_eq!(summary(&store).period_start, Some(d("2025-03-25")));
}

#[test]
fn household_reset_reports_each_member() {
    let store = household_with_alice();
    seed_user(&store, BOB, "Bob");
    seed_member(&store, HOME, BOB, Some(1));
    seed_budget(&store, "b-a", ALICE, "cat-food", "600", "50");
    seed_budget(&store, "b-b", BOB, "cat-food", "400", "20");
    let cx = Context::new(&store, today());

    let report = reset_household_budget_period(&cx, HOME).unwrap();
    assert_eq!(report.len(), 2);
    assert!(report.iter().all(|r| r.outcome.is_ok()));
    let summaries: Vec<BudgetSummary> = fetch(&store, Query::all(Collection::BudgetSummaries)).unwrap();
    let bob = summaries.iter().find(|s| s.user_id == BOB).unwrap();
    assert_eq!(bob.period_start, Some(d("2025-03-01")));
}

#[test]
fn allocations_track_income() {
    let store = household_with_alice();
    seed_category(&store, "cat-food", "Groceries");
    seed_category(&store, "cat-rent", "Rent");
    let cx = Context::new(&store, today());

    set_income(&cx, ALICE, dec("5000")).unwrap();
    let food = set_allocation(&cx, ALICE, "cat-food", dec("1250"), Some("Needs")).unwrap();
    assert_eq!(food.percentage, dec("25"));
    set_allocation(&cx, ALICE, "cat-rent", dec("3749.97"), None).unwrap();
    assert_eq!(summary(&store).total_allocated, dec("5000"));

    let again = set_allocation(&cx, ALICE, "cat-food", dec("1000"), None).unwrap();
    assert_eq!(again.id, food.id);
    assert_eq!(budgets(&store).len(), 2);
    assert_eq!(summary(&store).total_allocated, dec("4749.97"));

    assert!(matches!(
        set_allocation(&cx, ALICE, "cat-missing", dec("10"), None),
        Err(BudgetError::NotFound(_))
    ));
    assert!(matches!(set_income(&cx, ALICE, dec("-1")), Err(BudgetError::Validation(_))));
}

#[test]
fn details_join_names_and_status() {
    let store = household_with_alice();
    seed_category(&store, "cat-food", "Groceries");
    seed_category(&store, "cat-fun", "Fun");
    seed_budget(&store, "b-food", ALICE, "cat-food", "600", "140.25");
    seed_budget(&store, "b-fun", ALICE, "cat-fun", "250", "280");
    let cx = Context::new(&store, today());

    let details = get_budget_details(&cx, ALICE);
    assert_eq!(details.len(), 2);
    assert_eq!(details[0].category_name, "Fun");
    assert_eq!(details[0].status, BudgetStatus::OverBudget);
    assert_eq!(details[0].remaining, dec("-30"));
    assert_eq!(details[1].status, BudgetStatus::OnTrack);
    assert_eq!(details[1].percent_used, dec("23.4"));
}

#[test]
fn reads_degrade_when_the_store_is_down() {
    let store = ledger();
    let cx = Context::new(&store, today());
    store.set_fail_reads(true);
    assert!(get_budget_summary(&cx, ALICE).is_none());
    assert!(get_budget_details(&cx, ALICE).is_empty());
}
