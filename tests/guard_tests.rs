// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::*;
use housebudget::commands::accounts::delete_account;
use housebudget::commands::categories::{create_category, create_category_group, delete_category, delete_category_group};
use housebudget::commands::guards::{
    DeleteCheck, check_account_deletable, check_category_deletable, check_category_group_deletable,
    check_household_deletable,
};
use housebudget::commands::households::delete_household;
use housebudget::context::Context;
use housebudget::error::BudgetError;
use housebudget::models::{CategoryMapping, TransactionKind};
use housebudget::store::Collection;

fn blocked_reason(check: DeleteCheck) -> String {
    match check {
        DeleteCheck::Blocked(reason) => reason,
        DeleteCheck::Allowed => panic!("expected the delete to be blocked"),
    }
}

#[test]
fn account_with_history_is_blocked_with_counts() {
    let store = household_with_alice();
    seed_tx(&store, "t1", ALICE, "acc-main", None, "10", "2025-03-01");
    seed_tx(&store, "t2", ALICE, "acc-main", None, "20", "2025-03-02");
    let cx = Context::new(&store, today());

    let reason = blocked_reason(check_account_deletable(&cx, "acc-main"));
    assert!(reason.contains("account"));
    assert!(reason.contains("2 transactions"));

    let err = delete_account(&cx, ALICE, "acc-main").unwrap_err();
    assert!(matches!(err, BudgetError::Validation(_)));
    assert_eq!(store.count(Collection::Accounts), 1);
}

#[test]
fn unused_account_can_go() {
    let store = household_with_alice();
    let cx = Context::new(&store, today());
    assert!(check_account_deletable(&cx, "acc-main").is_allowed());
    delete_account(&cx, ALICE, "acc-main").unwrap();
    assert_eq!(store.count(Collection::Accounts), 0);
}

#[test]
fn guards_fail_closed() {
    let store = household_with_alice();
    let cx = Context::new(&store, today());
    store.set_fail_reads(true);
    for check in [
        check_account_deletable(&cx, "acc-main"),
        check_category_deletable(&cx, "cat-food"),
        check_category_group_deletable(&cx, "g-1"),
        check_household_deletable(&cx, HOME, ALICE),
    ] {
        assert!(blocked_reason(check).contains("could not be verified"));
    }
}

#[test]
fn category_counts_every_reference() {
    let store = household_with_alice();
    let cx = Context::new(&store, today());
    let cat = create_category(&cx, ALICE, "Groceries", None).unwrap();
    seed_tx(&store, "t1", ALICE, "acc-main", Some(&cat.id), "10", "2025-03-01");
    seed_budget(&store, "b1", ALICE, &cat.id, "100", "0");
    let mapping = CategoryMapping {
        id: "map-1".into(),
        user_id: ALICE.into(),
        pattern: "MIGROS".into(),
        category_id: cat.id.clone(),
    };
    store.insert(Collection::CategoryMappings, "map-1", &mapping).unwrap();

    let reason = blocked_reason(check_category_deletable(&cx, &cat.id));
    assert!(reason.contains("1 transaction"));
    assert!(reason.contains("1 budget"));
    assert!(reason.contains("1 import mapping"));
    assert!(matches!(delete_category(&cx, ALICE, &cat.id), Err(BudgetError::Validation(_))));
    assert!(matches!(delete_category(&cx, "u-bob", &cat.id), Err(BudgetError::AccessDenied(_))));
}

#[test]
fn category_groups_guard_defaults_and_members() {
    let store = household_with_alice();
    let cx = Context::new(&store, today());
    let builtin = create_category_group(&cx, None, "Essentials", TransactionKind::Expense, 0, true).unwrap();
    let mine = create_category_group(&cx, Some(ALICE), "Hobbies", TransactionKind::Expense, 1, false).unwrap();
    create_category(&cx, ALICE, "Climbing", Some(&mine.id)).unwrap();

    assert!(blocked_reason(check_category_group_deletable(&cx, &builtin.id)).contains("default"));
    assert!(blocked_reason(check_category_group_deletable(&cx, &mine.id)).contains("1 category"));
    assert!(delete_category_group(&cx, ALICE, &builtin.id).is_err());
}

#[test]
fn household_ignores_the_requesting_member() {
    let store = household_with_alice();
    let cx = Context::new(&store, today());
    assert!(check_household_deletable(&cx, HOME, ALICE).is_allowed());

    seed_user(&store, BOB, "Bob");
    seed_member(&store, HOME, BOB, None);
    let reason = blocked_reason(check_household_deletable(&cx, HOME, ALICE));
    assert!(reason.contains("1 other active member"));
}

#[test]
fn household_delete_removes_memberships() {
    let store = household_with_alice();
    let cx = Context::new(&store, today());
    delete_household(&cx, ALICE, HOME).unwrap();
    assert_eq!(store.count(Collection::Households), 0);
    assert_eq!(store.count(Collection::HouseholdMembers), 0);
    assert_eq!(store.last_batch().unwrap().len(), 2);
}
