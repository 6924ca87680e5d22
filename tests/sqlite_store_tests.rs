// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::*;
use housebudget::commands::transactions::{create, delete, list_for_user};
use housebudget::context::Context;
use housebudget::db::SqliteStore;
use housebudget::models::{Account, Household, HouseholdMember, MemberRole, MemberStatus};
use housebudget::ratelimit::{EntityType, RateLimitConfig, RateLimiter};
use housebudget::store::{Collection, Operation, Query, Store, fetch, fetch_one};
use rusqlite::params;
use serde_json::json;
use tempfile::tempdir;

fn seed(store: &SqliteStore) {
    let account = Account {
        id: "acc-main".into(),
        user_id: ALICE.into(),
        name: "Main".into(),
        balance: dec("4250.75"),
        currency: "CHF".into(),
        is_excluded_from_budget: false,
        is_default: true,
    };
    let household = Household {
        id: HOME.into(),
        name: "Home".into(),
        currency: "CHF".into(),
        payday_day: None,
        default_split_percentage: None,
    };
    let member = HouseholdMember {
        id: "m-1".into(),
        household_id: HOME.into(),
        user_id: ALICE.into(),
        status: MemberStatus::Active,
        role: MemberRole::Admin,
        payday_day: None,
    };
    store
        .transact(vec![
            Operation::put(Collection::Accounts, &account.id, &account).unwrap(),
            Operation::put(Collection::Households, &household.id, &household).unwrap(),
            Operation::put(Collection::HouseholdMembers, &member.id, &member).unwrap(),
        ])
        .unwrap();
}

#[test]
fn documents_round_trip_and_merge() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("hb.sqlite")).unwrap();
    seed(&store);

    store
        .transact(vec![Operation::update(
            Collection::Accounts,
            "acc-main",
            json!({ "balance": "100.00" }),
        )])
        .unwrap();
    let account: Account = fetch_one(&store, Collection::Accounts, "acc-main").unwrap().unwrap();
    assert_eq!(account.balance, dec("100.00"));
    assert_eq!(account.name, "Main");

    let found: Vec<Account> = fetch(
        &store,
        Query::all(Collection::Accounts).where_eq("userId", ALICE),
    )
    .unwrap();
    assert_eq!(found.len(), 1);
    let none: Vec<Account> = fetch(&store, Query::all(Collection::Accounts).where_eq("userId", BOB)).unwrap();
    assert!(none.is_empty());
}

#[test]
fn failing_batch_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("hb.sqlite")).unwrap();
    store
        .conn()
        .execute(
            "INSERT INTO documents(collection, id, body) VALUES(?1, ?2, ?3)",
            params!["transactions", "broken", "[1, 2, 3]"],
        )
        .unwrap();

    let result = store.transact(vec![
        Operation::update(Collection::Accounts, "acc-new", json!({ "balance": "1.00" })),
        Operation::update(Collection::Transactions, "broken", json!({ "amount": "2.00" })),
    ]);
    assert!(result.is_err());
    let left: i64 = store
        .conn()
        .query_row("SELECT COUNT(*) FROM documents WHERE id='acc-new'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(left, 0);
}

#[test]
fn mutator_works_against_sqlite_and_persists() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hb.sqlite");
    let tx_id = {
        let store = SqliteStore::open(&path).unwrap();
        seed(&store);
        let cx = Context::new(&store, today());
        create(&cx, expense("acc-main", "87.35", "2025-03-01")).unwrap().id
    };

    let store = SqliteStore::open(&path).unwrap();
    let cx = Context::new(&store, today());
    let account: Account = fetch_one(&store, Collection::Accounts, "acc-main").unwrap().unwrap();
    assert_eq!(account.balance, dec("4163.40"));
    assert_eq!(list_for_user(&cx, ALICE).len(), 1);

    delete(&cx, ALICE, &tx_id).unwrap();
    let account: Account = fetch_one(&store, Collection::Accounts, "acc-main").unwrap().unwrap();
    assert_eq!(account.balance, dec("4250.75"));
}

#[test]
fn limiter_history_lives_in_settings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hb.sqlite");
    {
        let store = SqliteStore::open(&path).unwrap();
        let limiter = RateLimiter::create(&store, RateLimitConfig::default());
        for i in 0..5 {
            limiter.record_mutation(EntityType::Settlement, 1_000 + i);
        }
    }
    let store = SqliteStore::open(&path).unwrap();
    let limiter = RateLimiter::create(&store, RateLimitConfig::default());
    assert!(!limiter.check_rate_limit(EntityType::Settlement, 2_000).allowed);
}
