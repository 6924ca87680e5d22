// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

#![allow(dead_code)]

use chrono::NaiveDate;
use housebudget::commands::transactions::NewTransaction;
use housebudget::models::*;
use housebudget::store::{Collection, MemoryStore};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const ALICE: &str = "u-alice";
pub const BOB: &str = "u-bob";
pub const HOME: &str = "h-home";

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Fixed clock for every test: inside the 2025-02-25 .. 2025-03-24 period.
pub fn today() -> NaiveDate {
    d("2025-03-10")
}

pub fn seed_user(store: &MemoryStore, id: &str, name: &str) -> User {
    let user = User {
        id: id.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        name: name.into(),
        flags: Vec::new(),
    };
    store.insert(Collection::Users, id, &user).unwrap();
    user
}

pub fn seed_household(store: &MemoryStore, id: &str, payday: Option<u32>) -> Household {
    let h = Household {
        id: id.into(),
        name: "Home".into(),
        currency: "CHF".into(),
        payday_day: payday,
        default_split_percentage: None,
    };
    store.insert(Collection::Households, id, &h).unwrap();
    h
}

pub fn seed_member(store: &MemoryStore, household_id: &str, user_id: &str, payday: Option<u32>) -> HouseholdMember {
    let m = HouseholdMember {
        id: format!("m-{}-{}", household_id, user_id),
        household_id: household_id.into(),
        user_id: user_id.into(),
        status: MemberStatus::Active,
        role: MemberRole::Admin,
        payday_day: payday,
    };
    store.insert(Collection::HouseholdMembers, &m.id, &m).unwrap();
    m
}

pub fn seed_account(store: &MemoryStore, id: &str, user_id: &str, balance: &str, excluded: bool) -> Account {
    let a = Account {
        id: id.into(),
        user_id: user_id.into(),
        name: id.into(),
        balance: dec(balance),
        currency: "CHF".into(),
        is_excluded_from_budget: excluded,
        is_default: false,
    };
    store.insert(Collection::Accounts, id, &a).unwrap();
    a
}

pub fn seed_category(store: &MemoryStore, id: &str, name: &str) -> Category {
    let c = Category {
        id: id.into(),
        name: name.into(),
        category_group_id: None,
        created_by_user_id: None,
    };
    store.insert(Collection::Categories, id, &c).unwrap();
    c
}

pub fn seed_budget(store: &MemoryStore, id: &str, user_id: &str, category_id: &str, allocated: &str, spent: &str) -> Budget {
    let b = Budget {
        id: id.into(),
        user_id: user_id.into(),
        category_id: category_id.into(),
        allocated_amount: dec(allocated),
        spent_amount: dec(spent),
        percentage: Decimal::ZERO,
        category_group: None,
        is_active: true,
    };
    store.insert(Collection::Budgets, id, &b).unwrap();
    b
}

pub fn seed_summary(store: &MemoryStore, id: &str, user_id: &str, income: &str, spent: &str) -> BudgetSummary {
    let s = BudgetSummary {
        id: id.into(),
        user_id: user_id.into(),
        total_income: dec(income),
        total_allocated: Decimal::ZERO,
        total_spent: dec(spent),
        period_start: None,
    };
    store.insert(Collection::BudgetSummaries, id, &s).unwrap();
    s
}

pub fn seed_tx(
    store: &MemoryStore,
    id: &str,
    user_id: &str,
    account_id: &str,
    category_id: Option<&str>,
    amount: &str,
    date: &str,
) -> Transaction {
    let tx = Transaction {
        id: id.into(),
        user_id: user_id.into(),
        household_id: HOME.into(),
        account_id: account_id.into(),
        category_id: category_id.map(str::to_string),
        kind: TransactionKind::Expense,
        amount: dec(amount),
        date: d(date),
        payee: "Shop".into(),
        note: None,
        is_shared: false,
        paid_by_user_id: None,
        is_excluded_from_budget: false,
    };
    store.insert(Collection::Transactions, id, &tx).unwrap();
    tx
}

pub fn seed_split(store: &MemoryStore, id: &str, tx_id: &str, ower: &str, owed_to: &str, amount: &str) -> SharedExpenseSplit {
    let s = SharedExpenseSplit {
        id: id.into(),
        transaction_id: tx_id.into(),
        ower_user_id: ower.into(),
        owed_to_user_id: owed_to.into(),
        split_amount: dec(amount),
        split_percentage: Decimal::from(50),
        is_paid: false,
        settlement_id: None,
    };
    store.insert(Collection::SharedExpenseSplits, id, &s).unwrap();
    s
}

pub fn expense(account_id: &str, amount: &str, date: &str) -> NewTransaction {
    NewTransaction {
        user_id: ALICE.into(),
        household_id: HOME.into(),
        account_id: account_id.into(),
        category_id: None,
        kind: TransactionKind::Expense,
        amount: dec(amount),
        date: date.into(),
        payee: "Migros".into(),
        note: None,
        is_excluded_from_budget: false,
        shared: None,
    }
}

/// Alice in household `HOME` with the default payday and one account.
pub fn household_with_alice() -> MemoryStore {
    let store = MemoryStore::new();
    seed_user(&store, ALICE, "Alice");
    seed_household(&store, HOME, None);
    seed_member(&store, HOME, ALICE, None);
    seed_account(&store, "acc-main", ALICE, "4250.75", false);
    store
}
