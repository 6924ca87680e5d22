// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::accounts::{get_account, owned_account};
use crate::commands::budgets::{apply_spend_delta, recalculate_current, resolve_budget_period};
use crate::commands::categories::category_names;
use crate::commands::households::get_household;
use crate::commands::users::{Session, find_user_by_email};
use crate::context::Context;
use crate::error::{BudgetError, Result};
use crate::models::{SharedExpenseSplit, Transaction, TransactionKind};
use crate::money::{PERCENT_TOLERANCE, prorate};
use crate::ratelimit::EntityType;
use crate::redact::Redacted;
use crate::store::{Collection, Operation, Query, fetch, fetch_one};
use crate::utils::{maybe_print_json, new_id, parse_date, parse_decimal, pretty_table, require_positive};
use anyhow::Context as _;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

/// How a lookup treats a record that exists but belongs to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Display reads: a foreign record is reported exactly like a missing
    /// one, so callers cannot probe which ids exist.
    HideExistence,
    /// Writes: the caller already holds the id, so a foreign record fails
    /// with `AccessDenied`.
    Explicit,
}

impl AccessPolicy {
    pub fn apply(self, tx: Option<Transaction>, requesting_user_id: &str) -> Result<Option<Transaction>> {
        match tx {
            None => Ok(None),
            Some(tx) if tx.user_id == requesting_user_id => Ok(Some(tx)),
            Some(_) => match self {
                AccessPolicy::HideExistence => Ok(None),
                AccessPolicy::Explicit => Err(BudgetError::access_denied(
                    "transaction belongs to another user",
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitShare {
    pub user_id: String,
    pub percentage: Decimal,
}

/// Who paid a shared expense and how it divides. The payer's own share is
/// prorated first and absorbs any rounding remainder; the others follow in
/// the order given.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedSplit {
    pub paid_by_user_id: String,
    pub shares: Vec<SplitShare>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: String,
    pub household_id: String,
    pub account_id: String,
    pub category_id: Option<String>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    /// Raw `YYYY-MM-DD` input.
    pub date: String,
    pub payee: String,
    pub note: Option<String>,
    pub is_excluded_from_budget: bool,
    pub shared: Option<SharedSplit>,
}

/// Replacement values for an existing transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub account_id: String,
    pub category_id: Option<String>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub date: String,
    pub payee: String,
    pub note: Option<String>,
    pub is_excluded_from_budget: bool,
}

impl From<&Transaction> for TransactionUpdate {
    fn from(tx: &Transaction) -> Self {
        TransactionUpdate {
            account_id: tx.account_id.clone(),
            category_id: tx.category_id.clone(),
            kind: tx.kind,
            amount: tx.amount,
            date: tx.date.to_string(),
            payee: tx.payee.clone(),
            note: tx.note.clone(),
            is_excluded_from_budget: tx.is_excluded_from_budget,
        }
    }
}

fn validate_amount_and_date(amount: Decimal, date: &str) -> Result<NaiveDate> {
    require_positive(amount)?;
    parse_date(date)
}

fn build_splits(tx: &Transaction, split: &SharedSplit) -> Result<Vec<SharedExpenseSplit>> {
    if split.shares.is_empty() {
        return Err(BudgetError::validation("A shared expense needs at least one share"));
    }
    let (payer, others): (Vec<&SplitShare>, Vec<&SplitShare>) = split
        .shares
        .iter()
        .partition(|s| s.user_id == split.paid_by_user_id);
    let ordered: Vec<&SplitShare> = payer.into_iter().chain(others).collect();
    let weights: Vec<Decimal> = ordered.iter().map(|s| s.percentage).collect();
    let total_pct: Decimal = weights.iter().copied().sum();
    if (total_pct - Decimal::ONE_HUNDRED).abs() > PERCENT_TOLERANCE {
        return Err(BudgetError::validation("Split percentages must add up to 100"));
    }
    let amounts = prorate(tx.amount, &weights)?;

    Ok(ordered
        .into_iter()
        .zip(amounts)
        .filter(|(share, _)| share.user_id != split.paid_by_user_id)
        .map(|(share, amount)| SharedExpenseSplit {
            id: new_id(),
            transaction_id: tx.id.clone(),
            ower_user_id: share.user_id.clone(),
            owed_to_user_id: split.paid_by_user_id.clone(),
            split_amount: amount,
            split_percentage: share.percentage,
            is_paid: false,
            settlement_id: None,
        })
        .collect())
}

fn splits_for(cx: &Context, transaction_id: &str) -> Result<Vec<SharedExpenseSplit>> {
    Ok(fetch(
        cx.store,
        Query::all(Collection::SharedExpenseSplits).where_eq("transactionId", transaction_id),
    )?)
}

/// Spread a new amount over existing split rows, in the same order
/// `build_splits` used: the payer's implied share first, then the rows.
fn reprorate(amount: Decimal, splits: &[SharedExpenseSplit]) -> Result<Vec<Decimal>> {
    let owed_pct: Decimal = splits.iter().map(|s| s.split_percentage).sum();
    let payer_pct = Decimal::ONE_HUNDRED - owed_pct;
    let mut weights = Vec::with_capacity(splits.len() + 1);
    if payer_pct > Decimal::ZERO {
        weights.push(payer_pct);
    }
    weights.extend(splits.iter().map(|s| s.split_percentage));
    let mut shares = prorate(amount, &weights)?;
    if payer_pct > Decimal::ZERO {
        shares.remove(0);
    }
    Ok(shares)
}

/// Count a freshly created expense against its category, if it falls inside
/// the user's current period. Failures are logged only.
fn track_new_expense(cx: &Context, tx: &Transaction) {
    let result = resolve_budget_period(cx, &tx.user_id, &tx.household_id).and_then(|period| {
        if period.contains(tx.date) && tx.date <= cx.today {
            apply_spend_delta(cx, &tx.user_id, tx.category_id.as_deref(), tx.amount)
        } else {
            Ok(())
        }
    });
    if let Err(e) = result {
        tracing::warn!(tx = %Redacted(&tx.id), error = %e, "budget spend update failed");
    }
}

fn refresh_spend(cx: &Context, user_id: &str, household_id: &str) {
    if let Err(e) = recalculate_current(cx, user_id, household_id) {
        tracing::warn!(user = %Redacted(user_id), error = %e, "spend recalculation failed");
    }
}

pub fn create(cx: &Context, req: NewTransaction) -> Result<Transaction> {
    create_with(cx, req, Vec::new())
}

/// Like [`create`], with `extra` operations committed in the same batch as
/// the transaction and its balance update.
pub fn create_with(cx: &Context, req: NewTransaction, extra: Vec<Operation>) -> Result<Transaction> {
    let date = validate_amount_and_date(req.amount, &req.date)?;
    cx.check_rate(EntityType::Transaction)?;
    let account = owned_account(cx, &req.user_id, &req.account_id)?;

    let tx = Transaction {
        id: new_id(),
        user_id: req.user_id,
        household_id: req.household_id,
        account_id: account.id.clone(),
        category_id: req.category_id,
        kind: req.kind,
        amount: req.amount,
        date,
        payee: req.payee.trim().to_string(),
        note: req.note,
        is_shared: req.shared.is_some(),
        paid_by_user_id: req.shared.as_ref().map(|s| s.paid_by_user_id.clone()),
        is_excluded_from_budget: req.is_excluded_from_budget,
    };
    let splits = match &req.shared {
        Some(split) => build_splits(&tx, split)?,
        None => Vec::new(),
    };

    let mut ops = Vec::with_capacity(splits.len() + extra.len() + 2);
    ops.push(Operation::put(Collection::Transactions, &tx.id, &tx)?);
    ops.push(Operation::update(
        Collection::Accounts,
        &account.id,
        json!({ "balance": account.balance + tx.kind.balance_delta(tx.amount) }),
    ));
    for s in &splits {
        ops.push(Operation::put(Collection::SharedExpenseSplits, &s.id, s)?);
    }
    ops.extend(extra);
    cx.store.transact(ops)?;
    cx.record_mutation(EntityType::Transaction);
    tracing::info!(tx = %Redacted(&tx.id), kind = %tx.kind, splits = splits.len(), "transaction created");

    if tx.kind == TransactionKind::Expense && !account.is_excluded_from_budget && !tx.is_excluded_from_budget {
        track_new_expense(cx, &tx);
    }
    Ok(tx)
}

pub fn update(
    cx: &Context,
    requesting_user_id: &str,
    transaction_id: &str,
    changes: TransactionUpdate,
) -> Result<Transaction> {
    let date = validate_amount_and_date(changes.amount, &changes.date)?;
    cx.check_rate(EntityType::Transaction)?;
    let original = AccessPolicy::Explicit
        .apply(fetch_one(cx.store, Collection::Transactions, transaction_id)?, requesting_user_id)?
        .ok_or_else(|| BudgetError::not_found("Transaction"))?;

    let old_account =
        get_account(cx, &original.account_id)?.ok_or_else(|| BudgetError::not_found("Account"))?;
    let reverted = old_account.balance - original.kind.balance_delta(original.amount);
    let applied = changes.kind.balance_delta(changes.amount);

    let mut ops = Vec::new();
    if changes.account_id == old_account.id {
        ops.push(Operation::update(
            Collection::Accounts,
            &old_account.id,
            json!({ "balance": reverted + applied }),
        ));
    } else {
        let new_account = owned_account(cx, requesting_user_id, &changes.account_id)?;
        ops.push(Operation::update(
            Collection::Accounts,
            &old_account.id,
            json!({ "balance": reverted }),
        ));
        ops.push(Operation::update(
            Collection::Accounts,
            &new_account.id,
            json!({ "balance": new_account.balance + applied }),
        ));
    }

    let updated = Transaction {
        account_id: changes.account_id,
        category_id: changes.category_id,
        kind: changes.kind,
        amount: changes.amount,
        date,
        payee: changes.payee.trim().to_string(),
        note: changes.note,
        is_excluded_from_budget: changes.is_excluded_from_budget,
        ..original.clone()
    };
    ops.push(Operation::put(Collection::Transactions, &updated.id, &updated)?);

    if original.is_shared && original.amount != updated.amount {
        let splits = splits_for(cx, &original.id)?;
        if splits.iter().any(|s| s.is_paid) {
            return Err(BudgetError::validation(
                "A shared expense with settled splits cannot change its amount",
            ));
        }
        for (s, amount) in splits.iter().zip(reprorate(updated.amount, &splits)?) {
            ops.push(Operation::update(
                Collection::SharedExpenseSplits,
                &s.id,
                json!({ "splitAmount": amount }),
            ));
        }
    }

    cx.store.transact(ops)?;
    cx.record_mutation(EntityType::Transaction);
    tracing::info!(tx = %Redacted(&updated.id), "transaction updated");
    refresh_spend(cx, &updated.user_id, &updated.household_id);
    Ok(updated)
}

/// Remove a transaction with its split rows and undo its balance effect in
/// one batch: one delete per split, the transaction delete, the balance update.
pub fn delete(cx: &Context, requesting_user_id: &str, transaction_id: &str) -> Result<()> {
    let tx = AccessPolicy::Explicit
        .apply(fetch_one(cx.store, Collection::Transactions, transaction_id)?, requesting_user_id)?
        .ok_or_else(|| BudgetError::not_found("Transaction"))?;
    let account = get_account(cx, &tx.account_id)?.ok_or_else(|| BudgetError::not_found("Account"))?;
    cx.check_rate(EntityType::Transaction)?;
    let splits = splits_for(cx, &tx.id)?;

    let mut ops: Vec<Operation> = splits
        .iter()
        .map(|s| Operation::delete(Collection::SharedExpenseSplits, &s.id))
        .collect();
    ops.push(Operation::delete(Collection::Transactions, &tx.id));
    ops.push(Operation::update(
        Collection::Accounts,
        &account.id,
        json!({ "balance": account.balance - tx.kind.balance_delta(tx.amount) }),
    ));
    cx.store.transact(ops)?;
    cx.record_mutation(EntityType::Transaction);
    tracing::info!(tx = %Redacted(&tx.id), splits = splits.len(), "transaction deleted");

    refresh_spend(cx, &tx.user_id, &tx.household_id);
    Ok(())
}

pub fn get(cx: &Context, transaction_id: &str, requesting_user_id: &str) -> Result<Option<Transaction>> {
    AccessPolicy::HideExistence.apply(
        fetch_one(cx.store, Collection::Transactions, transaction_id)?,
        requesting_user_id,
    )
}

/// Newest first. Read failures yield an empty list.
pub fn list_for_user(cx: &Context, user_id: &str) -> Vec<Transaction> {
    match fetch::<Transaction>(cx.store, Query::all(Collection::Transactions).where_eq("userId", user_id)) {
        Ok(mut txs) => {
            txs.sort_by(|a, b| b.date.cmp(&a.date));
            txs
        }
        Err(e) => {
            tracing::error!(error = %e, "transactions unavailable");
            Vec::new()
        }
    }
}

fn shared_split_from_args(
    cx: &Context,
    session: &Session,
    sub: &clap::ArgMatches,
) -> anyhow::Result<Option<SharedSplit>> {
    let Some(email) = sub.get_one::<String>("split-with") else {
        return Ok(None);
    };
    let other = find_user_by_email(cx, email)?.ok_or_else(|| BudgetError::not_found("User"))?;
    let mine = match sub.get_one::<String>("my-share") {
        Some(s) => parse_decimal(s)?,
        None => get_household(cx, session.require_household()?)?
            .and_then(|h| h.default_split_percentage)
            .unwrap_or(Decimal::from(50)),
    };
    Ok(Some(SharedSplit {
        paid_by_user_id: session.user.id.clone(),
        shares: vec![
            SplitShare {
                user_id: session.user.id.clone(),
                percentage: mine,
            },
            SplitShare {
                user_id: other.id,
                percentage: Decimal::ONE_HUNDRED - mine,
            },
        ],
    }))
}

pub fn handle(cx: &Context, session: &Session, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let user_id = &session.user.id;
    match m.subcommand() {
        Some(("add", sub)) => {
            let kind = sub
                .get_one::<String>("type")
                .map(|s| s.parse::<TransactionKind>())
                .transpose()
                .map_err(BudgetError::Validation)?
                .unwrap_or(TransactionKind::Expense);
            let req = NewTransaction {
                user_id: user_id.clone(),
                household_id: session.require_household()?.to_string(),
                account_id: sub.get_one::<String>("account").unwrap().trim().to_string(),
                category_id: sub.get_one::<String>("category").map(|s| s.trim().to_string()),
                kind,
                amount: parse_decimal(sub.get_one::<String>("amount").unwrap())?,
                date: sub
                    .get_one::<String>("date")
                    .cloned()
                    .unwrap_or_else(|| cx.today.to_string()),
                payee: sub.get_one::<String>("payee").cloned().unwrap_or_default(),
                note: sub.get_one::<String>("note").cloned(),
                is_excluded_from_budget: sub.get_flag("exclude"),
                shared: shared_split_from_args(cx, session, sub)?,
            };
            let tx = create(cx, req)?;
            println!("Recorded {} of {:.2} on {} ({})", tx.kind, tx.amount, tx.date, tx.id);
        }
        Some(("list", sub)) => {
            let mut txs = list_for_user(cx, user_id);
            if let Some(limit) = sub.get_one::<usize>("limit") {
                txs.truncate(*limit);
            }
            if !maybe_print_json(sub.get_flag("json"), &txs)? {
                let names = category_names(cx).unwrap_or_default();
                let rows = txs
                    .into_iter()
                    .map(|t| {
                        let cat = t
                            .category_id
                            .as_ref()
                            .and_then(|c| names.get(c).cloned())
                            .unwrap_or_default();
                        vec![
                            t.id,
                            t.date.to_string(),
                            t.kind.to_string(),
                            format!("{:.2}", t.amount),
                            cat,
                            t.payee,
                            if t.is_shared { "shared".into() } else { String::new() },
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["ID", "Date", "Type", "Amount", "Category", "Payee", "Split"],
                        rows
                    )
                );
            }
        }
        Some(("edit", sub)) => {
            let id = sub.get_one::<String>("id").unwrap().trim();
            let current = get(cx, id, user_id)?.ok_or_else(|| BudgetError::not_found("Transaction"))?;
            let mut changes = TransactionUpdate::from(&current);
            if let Some(a) = sub.get_one::<String>("amount") {
                changes.amount = parse_decimal(a)?;
            }
            if let Some(d) = sub.get_one::<String>("date") {
                changes.date = d.clone();
            }
            if let Some(a) = sub.get_one::<String>("account") {
                changes.account_id = a.trim().to_string();
            }
            if let Some(c) = sub.get_one::<String>("category") {
                changes.category_id = Some(c.trim().to_string());
            }
            if let Some(p) = sub.get_one::<String>("payee") {
                changes.payee = p.clone();
            }
            if let Some(t) = sub.get_one::<String>("type") {
                changes.kind = t.parse().map_err(BudgetError::Validation)?;
            }
            let tx = update(cx, user_id, id, changes).context("Failed to update transaction")?;
            println!("Updated transaction {}", tx.id);
        }
        Some(("rm", sub)) => {
            let id = sub.get_one::<String>("id").unwrap().trim();
            delete(cx, user_id, id).context("Failed to delete transaction")?;
            println!("Removed transaction {}", id);
        }
        _ => {}
    }
    Ok(())
}
