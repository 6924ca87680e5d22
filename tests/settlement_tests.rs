// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::*;
use housebudget::commands::settlements::{SettleRequest, net_debt, settle, unsettled_splits};
use housebudget::commands::transactions::{SharedSplit, SplitShare, create};
use housebudget::context::Context;
use housebudget::error::BudgetError;
use housebudget::models::{Account, SharedExpenseSplit};
use housebudget::store::{Collection, MemoryStore, fetch_one};

fn couple() -> MemoryStore {
    let store = household_with_alice();
    seed_user(&store, BOB, "Bob");
    seed_member(&store, HOME, BOB, None);
    seed_account(&store, "acc-bob", BOB, "1000", false);
    store
}

fn shared(payer: &str, other: &str, payer_pct: &str) -> SharedSplit {
    SharedSplit {
        paid_by_user_id: payer.into(),
        shares: vec![
            SplitShare { user_id: payer.into(), percentage: dec(payer_pct) },
            SplitShare { user_id: other.into(), percentage: dec("100") - dec(payer_pct) },
        ],
    }
}

/// Alice pays rent 2100 with Bob owing 40%; Bob pays 63.20 with Alice owing 60%.
fn rent_and_groceries(cx: &Context) -> (String, String) {
    let mut rent = expense("acc-main", "2100.00", "2025-03-01");
    rent.shared = Some(shared(ALICE, BOB, "60"));
    let rent = create(cx, rent).unwrap();

    let mut groceries = expense("acc-bob", "63.20", "2025-03-02");
    groceries.user_id = BOB.into();
    groceries.shared = Some(shared(BOB, ALICE, "40"));
    let groceries = create(cx, groceries).unwrap();
    (rent.id, groceries.id)
}

fn balance(store: &MemoryStore, id: &str) -> rust_decimal::Decimal {
    fetch_one::<Account>(store, Collection::Accounts, id).unwrap().unwrap().balance
}

#[test]
fn net_debt_sign_follows_the_viewer() {
    let store = couple();
    let cx = Context::new(&store, today());
    rent_and_groceries(&cx);

    let alice = net_debt(&cx, HOME, ALICE).unwrap().unwrap();
    assert_eq!(alice.other_member_id, BOB);
    assert_eq!(alice.other_member_name, "Bob");
    assert_eq!(alice.amount, dec("-802.08"));

    let bob = net_debt(&cx, HOME, BOB).unwrap().unwrap();
    assert_eq!(bob.amount, dec("802.08"));
}

#[test]
fn unsettled_lists_only_open_splits_involving_the_user() {
    let store = couple();
    let cx = Context::new(&store, today());
    let (rent, groceries) = rent_and_groceries(&cx);
    seed_user(&store, "u-carol", "Carol");
    seed_split(&store, "sp-other", &rent, "u-carol", BOB, "10");
    let mut paid = seed_split(&store, "sp-paid", &groceries, ALICE, BOB, "5");
    paid.is_paid = true;
    store.insert(Collection::SharedExpenseSplits, "sp-paid", &paid).unwrap();

    let open = unsettled_splits(&cx, HOME, ALICE);
    assert_eq!(open.len(), 2);
    assert_eq!(open[0].transaction_id, rent);
    assert_eq!(open[0].your_share, dec("-840.00"));
    assert_eq!(open[0].counterparty_name, "Bob");
    assert_eq!(open[1].transaction_id, groceries);
    assert_eq!(open[1].your_share, dec("37.92"));
}

#[test]
fn net_debt_needs_exactly_one_other_member() {
    let store = household_with_alice();
    let cx = Context::new(&store, today());
    assert_eq!(net_debt(&cx, HOME, ALICE).unwrap(), None);

    let store = couple();
    seed_user(&store, "u-carol", "Carol");
    seed_member(&store, HOME, "u-carol", None);
    let cx = Context::new(&store, today());
    assert_eq!(net_debt(&cx, HOME, ALICE).unwrap(), None);
}

#[test]
fn unsettled_degrades_but_net_debt_propagates() {
    let store = couple();
    let cx = Context::new(&store, today());
    rent_and_groceries(&cx);
    store.set_fail_reads(true);
    assert!(unsettled_splits(&cx, HOME, ALICE).is_empty());
    assert!(net_debt(&cx, HOME, ALICE).unwrap_err().is_upstream());
}

fn request(amount: &str, split_ids: Vec<String>) -> SettleRequest {
    SettleRequest {
        payer_user_id: BOB.into(),
        receiver_user_id: ALICE.into(),
        amount: dec(amount),
        payer_account_id: "acc-bob".into(),
        receiver_account_id: "acc-main".into(),
        household_id: HOME.into(),
        category_id: None,
        split_ids,
        payee: "Settle up".into(),
    }
}

#[test]
fn settle_moves_money_and_closes_splits_atomically() {
    let store = couple();
    let cx = Context::new(&store, today());
    let (rent, _) = rent_and_groceries(&cx);
    let rent_split = unsettled_splits(&cx, HOME, BOB)
        .into_iter()
        .find(|e| e.transaction_id == rent)
        .unwrap();
    let main_before = balance(&store, "acc-main");
    let bob_before = balance(&store, "acc-bob");
    let batches_before = store.batches().len();

    let s = settle(&cx, request("840.00", vec![rent_split.split_id.clone()])).unwrap();
    assert_eq!(s.date, today());
    assert_eq!(store.batches().len(), batches_before + 1);
    assert_eq!(store.last_batch().unwrap().len(), 4);

    assert_eq!(balance(&store, "acc-main"), main_before + dec("840"));
    assert_eq!(balance(&store, "acc-bob"), bob_before - dec("840"));
    let split = fetch_one::<SharedExpenseSplit>(&store, Collection::SharedExpenseSplits, &rent_split.split_id)
        .unwrap()
        .unwrap();
    assert!(split.is_paid);
    assert_eq!(split.settlement_id, Some(s.id.clone()));
    assert_eq!(store.count(Collection::Transactions), 2);

    let bob = net_debt(&cx, HOME, BOB).unwrap().unwrap();
    assert_eq!(bob.amount, dec("-37.92"));
}

#[test]
fn settle_validates_before_writing() {
    let store = couple();
    let cx = Context::new(&store, today());
    let (rent, _) = rent_and_groceries(&cx);
    let split_id = unsettled_splits(&cx, HOME, BOB)
        .into_iter()
        .find(|e| e.transaction_id == rent)
        .unwrap()
        .split_id;
    let before = store.batches().len();

    assert!(matches!(settle(&cx, request("0", vec![split_id.clone()])), Err(BudgetError::Validation(_))));
    assert!(matches!(settle(&cx, request("10", vec![])), Err(BudgetError::Validation(_))));
    let mut missing_account = request("10", vec![split_id.clone()]);
    missing_account.receiver_account_id = "acc-gone".into();
    assert!(matches!(settle(&cx, missing_account), Err(BudgetError::NotFound(_))));
    assert!(matches!(
        settle(&cx, request("10", vec!["sp-unknown".into()])),
        Err(BudgetError::NotFound(_))
    ));
    assert_eq!(store.batches().len(), before);

    settle(&cx, request("840", vec![split_id.clone()])).unwrap();
    assert!(matches!(settle(&cx, request("840", vec![split_id])), Err(BudgetError::Validation(_))));
}

#[test]
fn settle_only_closes_debts_between_the_pair() {
    let store = couple();
    let cx = Context::new(&store, today());
    let (rent, _) = rent_and_groceries(&cx);
    let split_id = unsettled_splits(&cx, HOME, BOB)
        .into_iter()
        .find(|e| e.transaction_id == rent)
        .unwrap()
        .split_id;
    let before = store.batches().len();
    let main_before = balance(&store, "acc-main");

    // Bob owes the rent split, so Alice paying it to Bob runs the wrong way.
    let mut reversed = request("840", vec![split_id.clone()]);
    reversed.payer_user_id = ALICE.into();
    reversed.receiver_user_id = BOB.into();
    reversed.payer_account_id = "acc-main".into();
    reversed.receiver_account_id = "acc-bob".into();
    assert!(matches!(settle(&cx, reversed), Err(BudgetError::Validation(_))));

    let mut elsewhere = request("840", vec![split_id.clone()]);
    elsewhere.household_id = "h-other".into();
    assert!(matches!(settle(&cx, elsewhere), Err(BudgetError::Validation(_))));

    assert_eq!(store.batches().len(), before);
    assert_eq!(balance(&store, "acc-main"), main_before);
    assert_eq!(net_debt(&cx, HOME, BOB).unwrap().unwrap().amount, dec("802.08"));
}

#[test]
fn failed_settlement_write_is_reported() {
    let store = couple();
    let cx = Context::new(&store, today());
    let (rent, _) = rent_and_groceries(&cx);
    let split_id = unsettled_splits(&cx, HOME, BOB)
        .into_iter()
        .find(|e| e.transaction_id == rent)
        .unwrap()
        .split_id;
    let main_before = balance(&store, "acc-main");
    let bob_before = balance(&store, "acc-bob");

    store.set_fail_writes(true);
    let err = settle(&cx, request("840", vec![split_id.clone()])).unwrap_err();
    assert!(err.is_upstream());
    store.set_fail_writes(false);

    assert_eq!(balance(&store, "acc-main"), main_before);
    assert_eq!(balance(&store, "acc-bob"), bob_before);
    let split = fetch_one::<SharedExpenseSplit>(&store, Collection::SharedExpenseSplits, &split_id)
        .unwrap()
        .unwrap();
    assert!(!split.is_paid);
    assert_eq!(store.count(Collection::Settlements), 0);
}
