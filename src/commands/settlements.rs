// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Who owes whom inside a household, and the transfers that clear it.
//!
//! Every unpaid split row is a debt from `owerUserId` to `owedToUserId`.
//! Seen from one member, a split they owe counts positive and a split owed
//! to them counts negative, so the sum over all open splits is their net
//! position. A settlement moves money between two accounts and closes the
//! splits it covers; it is a transfer, so no transaction record is written.

use crate::commands::accounts::get_account;
use crate::commands::categories::category_names;
use crate::commands::households::active_members;
use crate::commands::users::Session;
use crate::context::Context;
use crate::error::{BudgetError, Result};
use crate::models::{Settlement, SharedExpenseSplit, Transaction, User};
use crate::ratelimit::EntityType;
use crate::redact::Redacted;
use crate::store::{Collection, Operation, Query, fetch, fetch_one};
use crate::utils::{maybe_print_json, new_id, parse_decimal, pretty_table};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsettledExpense {
    pub split_id: String,
    pub transaction_id: String,
    pub date: NaiveDate,
    pub payee: String,
    pub category_name: Option<String>,
    pub total_amount: Decimal,
    pub split_amount: Decimal,
    /// Positive when the viewing user owes, negative when they are owed.
    pub your_share: Decimal,
    pub counterparty_id: String,
    pub counterparty_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetDebt {
    pub other_member_id: String,
    pub other_member_name: String,
    /// Positive: the user owes the other member. Negative: the user is owed.
    pub amount: Decimal,
}

fn try_unsettled_splits(cx: &Context, household_id: &str, user_id: &str) -> Result<Vec<UnsettledExpense>> {
    let mut res = cx.store.query_once(&[
        Query::all(Collection::Transactions)
            .where_eq("householdId", household_id)
            .where_eq("isShared", true),
        Query::all(Collection::SharedExpenseSplits).where_eq("isPaid", false),
    ])?;
    let txs: HashMap<String, Transaction> = res
        .take::<Transaction>(Collection::Transactions)?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect();
    let splits: Vec<SharedExpenseSplit> = res
        .take::<SharedExpenseSplit>(Collection::SharedExpenseSplits)?
        .into_iter()
        .filter(|s| s.ower_user_id == user_id || s.owed_to_user_id == user_id)
        .filter(|s| txs.contains_key(&s.transaction_id))
        .collect();
    if splits.is_empty() {
        return Ok(Vec::new());
    }

    let counterparties: Vec<&str> = splits
        .iter()
        .map(|s| counterparty(s, user_id))
        .collect();
    let names: HashMap<String, String> = fetch::<User>(
        cx.store,
        Query::all(Collection::Users).where_in("id", counterparties),
    )?
    .into_iter()
    .map(|u| (u.id, u.name))
    .collect();
    let categories = category_names(cx)?;

    Ok(splits
        .into_iter()
        .filter_map(|s| {
            let tx = txs.get(&s.transaction_id)?;
            let your_share = if s.ower_user_id == user_id {
                s.split_amount
            } else {
                -s.split_amount
            };
            let other = counterparty(&s, user_id).to_string();
            Some(UnsettledExpense {
                transaction_id: tx.id.clone(),
                date: tx.date,
                payee: tx.payee.clone(),
                category_name: tx.category_id.as_ref().and_then(|c| categories.get(c).cloned()),
                total_amount: tx.amount,
                split_amount: s.split_amount,
                your_share,
                counterparty_name: names.get(&other).cloned().unwrap_or_default(),
                counterparty_id: other,
                split_id: s.id,
            })
        })
        .collect())
}

fn counterparty<'s>(split: &'s SharedExpenseSplit, user_id: &str) -> &'s str {
    if split.ower_user_id == user_id {
        &split.owed_to_user_id
    } else {
        &split.ower_user_id
    }
}

/// Open splits involving the user, in read order. Empty on read failure.
pub fn unsettled_splits(cx: &Context, household_id: &str, user_id: &str) -> Vec<UnsettledExpense> {
    try_unsettled_splits(cx, household_id, user_id).unwrap_or_else(|e| {
        tracing::error!(error = %e, "unsettled splits unavailable");
        Vec::new()
    })
}

/// Net position against the one other active member. `None` unless the
/// household has exactly two active members.
pub fn net_debt(cx: &Context, household_id: &str, user_id: &str) -> Result<Option<NetDebt>> {
    let others: Vec<_> = active_members(cx, household_id)?
        .into_iter()
        .filter(|m| m.user_id != user_id)
        .collect();
    let [other] = others.as_slice() else {
        return Ok(None);
    };
    let amount = try_unsettled_splits(cx, household_id, user_id)?
        .iter()
        .map(|e| e.your_share)
        .sum();
    let name = fetch_one::<User>(cx.store, Collection::Users, &other.user_id)?
        .map(|u| u.name)
        .unwrap_or_default();
    Ok(Some(NetDebt {
        other_member_id: other.user_id.clone(),
        other_member_name: name,
        amount,
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettleRequest {
    pub payer_user_id: String,
    pub receiver_user_id: String,
    pub amount: Decimal,
    pub payer_account_id: String,
    pub receiver_account_id: String,
    pub household_id: String,
    pub category_id: Option<String>,
    pub split_ids: Vec<String>,
    pub payee: String,
}

/// Record the transfer, move both balances and close the covered splits in
/// one batch.
pub fn settle(cx: &Context, req: SettleRequest) -> Result<Settlement> {
    if req.amount <= Decimal::ZERO {
        return Err(BudgetError::validation("Amount must be greater than 0"));
    }
    if req.split_ids.is_empty() {
        return Err(BudgetError::validation("Select at least one expense to settle"));
    }
    cx.check_rate(EntityType::Settlement)?;

    let receiver_account = get_account(cx, &req.receiver_account_id)?
        .ok_or_else(|| BudgetError::not_found("Receiver account"))?;
    let payer_account = get_account(cx, &req.payer_account_id)?
        .ok_or_else(|| BudgetError::not_found("Payer account"))?;
    let splits: Vec<SharedExpenseSplit> = fetch(
        cx.store,
        Query::all(Collection::SharedExpenseSplits).where_in("id", req.split_ids.iter().map(String::as_str)),
    )?;
    if splits.len() != req.split_ids.len() {
        return Err(BudgetError::not_found("Shared expense split"));
    }
    if splits.iter().any(|s| s.is_paid) {
        return Err(BudgetError::validation("Expense is already settled"));
    }
    if splits
        .iter()
        .any(|s| s.ower_user_id != req.payer_user_id || s.owed_to_user_id != req.receiver_user_id)
    {
        return Err(BudgetError::validation(
            "Expense is not owed by the payer to the receiver",
        ));
    }
    let txs: Vec<Transaction> = fetch(
        cx.store,
        Query::all(Collection::Transactions)
            .where_in("id", splits.iter().map(|s| s.transaction_id.as_str())),
    )?;
    let in_household = |s: &SharedExpenseSplit| {
        txs.iter()
            .any(|t| t.id == s.transaction_id && t.household_id == req.household_id)
    };
    if !splits.iter().all(in_household) {
        return Err(BudgetError::validation("Expense belongs to another household"));
    }

    let settlement = Settlement {
        id: new_id(),
        household_id: req.household_id,
        payer_user_id: req.payer_user_id,
        receiver_user_id: req.receiver_user_id,
        amount: req.amount,
        payer_account_id: payer_account.id.clone(),
        receiver_account_id: receiver_account.id.clone(),
        category_id: req.category_id,
        split_ids: req.split_ids,
        payee: req.payee.trim().to_string(),
        date: cx.today,
    };

    let mut ops = vec![Operation::put(Collection::Settlements, &settlement.id, &settlement)?];
    if payer_account.id != receiver_account.id {
        ops.push(Operation::update(
            Collection::Accounts,
            &payer_account.id,
            json!({ "balance": payer_account.balance - settlement.amount }),
        ));
        ops.push(Operation::update(
            Collection::Accounts,
            &receiver_account.id,
            json!({ "balance": receiver_account.balance + settlement.amount }),
        ));
    }
    for id in &settlement.split_ids {
        ops.push(Operation::update(
            Collection::SharedExpenseSplits,
            id,
            json!({ "isPaid": true, "settlementId": settlement.id }),
        ));
    }
    cx.store.transact(ops)?;
    cx.record_mutation(EntityType::Settlement);
    tracing::info!(
        settlement = %Redacted(&settlement.id),
        splits = settlement.split_ids.len(),
        "settlement recorded"
    );
    Ok(settlement)
}

pub fn handle(cx: &Context, session: &Session, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let user_id = &session.user.id;
    let household_id = session.require_household()?;
    match m.subcommand() {
        Some(("show", sub)) => {
            let open = unsettled_splits(cx, household_id, user_id);
            if !maybe_print_json(sub.get_flag("json"), &open)? {
                let rows = open
                    .into_iter()
                    .map(|e| {
                        vec![
                            e.split_id,
                            e.date.to_string(),
                            e.payee,
                            e.category_name.unwrap_or_default(),
                            format!("{:.2}", e.total_amount),
                            format!("{:.2}", e.your_share),
                            e.counterparty_name,
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Split", "Date", "Payee", "Category", "Total", "Your share", "With"],
                        rows
                    )
                );
            }
        }
        Some(("net", sub)) => match net_debt(cx, household_id, user_id)? {
            Some(debt) => {
                if !maybe_print_json(sub.get_flag("json"), &debt)? {
                    if debt.amount > Decimal::ZERO {
                        println!("You owe {} {:.2}", debt.other_member_name, debt.amount);
                    } else if debt.amount < Decimal::ZERO {
                        println!("{} owes you {:.2}", debt.other_member_name, -debt.amount);
                    } else {
                        println!("You and {} are even", debt.other_member_name);
                    }
                }
            }
            None => println!("Net balance needs a household of exactly two members"),
        },
        Some(("settle", sub)) => {
            let wanted: Option<Vec<String>> = sub
                .get_many::<String>("splits")
                .map(|ids| ids.map(|s| s.trim().to_string()).collect());
            let mut owed: Vec<UnsettledExpense> = unsettled_splits(cx, household_id, user_id)
                .into_iter()
                .filter(|e| e.your_share > Decimal::ZERO)
                .filter(|e| wanted.as_ref().is_none_or(|w| w.contains(&e.split_id)))
                .collect();
            let Some(receiver) = owed.first().map(|e| e.counterparty_id.clone()) else {
                println!("Nothing to settle");
                return Ok(());
            };
            owed.retain(|e| e.counterparty_id == receiver);
            let amount = match sub.get_one::<String>("amount") {
                Some(a) => parse_decimal(a)?,
                None => owed.iter().map(|e| e.your_share).sum(),
            };
            let s = settle(
                cx,
                SettleRequest {
                    payer_user_id: user_id.clone(),
                    receiver_user_id: receiver,
                    amount,
                    payer_account_id: sub.get_one::<String>("from-account").unwrap().trim().to_string(),
                    receiver_account_id: sub.get_one::<String>("to-account").unwrap().trim().to_string(),
                    household_id: household_id.to_string(),
                    category_id: sub.get_one::<String>("category").map(|c| c.trim().to_string()),
                    split_ids: owed.iter().map(|e| e.split_id.clone()).collect(),
                    payee: sub.get_one::<String>("payee").cloned().unwrap_or_else(|| "Settlement".into()),
                },
            )?;
            println!("Settled {:.2} across {} expenses", s.amount, s.split_ids.len());
        }
        _ => {}
    }
    Ok(())
}
