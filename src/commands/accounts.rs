// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::guards::{DeleteCheck, check_account_deletable};
use crate::commands::users::Session;
use crate::context::Context;
use crate::error::{BudgetError, Result};
use crate::models::Account;
use crate::money::fmt_money;
use crate::ratelimit::EntityType;
use crate::redact::Redacted;
use crate::store::{Collection, Operation, Query, fetch, fetch_one};
use crate::utils::{maybe_print_json, new_id, parse_decimal, pretty_table};
use rust_decimal::Decimal;
use serde_json::json;

pub fn get_account(cx: &Context, account_id: &str) -> Result<Option<Account>> {
    Ok(fetch_one(cx.store, Collection::Accounts, account_id)?)
}

pub(crate) fn owned_account(cx: &Context, user_id: &str, account_id: &str) -> Result<Account> {
    let account = get_account(cx, account_id)?.ok_or_else(|| BudgetError::not_found("Account"))?;
    if account.user_id != user_id {
        return Err(BudgetError::access_denied("account belongs to another user"));
    }
    Ok(account)
}

pub fn create_account(
    cx: &Context,
    user_id: &str,
    name: &str,
    currency: &str,
    opening_balance: Decimal,
    is_default: bool,
    is_excluded_from_budget: bool,
) -> Result<Account> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BudgetError::validation("Account name is required"));
    }
    cx.check_rate(EntityType::Account)?;
    let account = Account {
        id: new_id(),
        user_id: user_id.to_string(),
        name: name.to_string(),
        balance: opening_balance,
        currency: currency.trim().to_uppercase(),
        is_excluded_from_budget,
        is_default,
    };
    cx.store
        .transact(vec![Operation::put(Collection::Accounts, &account.id, &account)?])?;
    cx.record_mutation(EntityType::Account);
    tracing::info!(account = %Redacted(&account.id), "account created");
    Ok(account)
}

pub fn list_accounts(cx: &Context, user_id: &str) -> Result<Vec<Account>> {
    let mut accounts: Vec<Account> =
        fetch(cx.store, Query::all(Collection::Accounts).where_eq("userId", user_id))?;
    accounts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(accounts)
}

pub fn set_account_excluded(cx: &Context, user_id: &str, account_id: &str, excluded: bool) -> Result<()> {
    let account = owned_account(cx, user_id, account_id)?;
    cx.store.transact(vec![Operation::update(
        Collection::Accounts,
        &account.id,
        json!({ "isExcludedFromBudget": excluded }),
    )])?;
    Ok(())
}

pub fn delete_account(cx: &Context, user_id: &str, account_id: &str) -> Result<()> {
    let account = owned_account(cx, user_id, account_id)?;
    if let DeleteCheck::Blocked(reason) = check_account_deletable(cx, &account.id) {
        return Err(BudgetError::validation(reason));
    }
    cx.check_rate(EntityType::Account)?;
    cx.store
        .transact(vec![Operation::delete(Collection::Accounts, &account.id)])?;
    cx.record_mutation(EntityType::Account);
    tracing::info!(account = %Redacted(&account.id), "account deleted");
    Ok(())
}

pub fn handle(cx: &Context, session: &Session, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let user_id = &session.user.id;
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let ccy = sub.get_one::<String>("currency").unwrap();
            let balance = match sub.get_one::<String>("balance") {
                Some(s) => parse_decimal(s)?,
                None => Decimal::ZERO,
            };
            let a = create_account(
                cx,
                user_id,
                name,
                ccy,
                balance,
                sub.get_flag("default"),
                sub.get_flag("exclude"),
            )?;
            println!("Added account '{}' ({}, {})", a.name, a.currency, a.id);
        }
        Some(("list", sub)) => {
            let accounts = list_accounts(cx, user_id)?;
            if !maybe_print_json(sub.get_flag("json"), &accounts)? {
                let rows = accounts
                    .into_iter()
                    .map(|a| {
                        vec![
                            a.id,
                            a.name,
                            fmt_money(&a.balance, &a.currency),
                            if a.is_excluded_from_budget { "excluded".into() } else { String::new() },
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Name", "Balance", "Budget"], rows)
                );
            }
        }
        Some(("exclude", sub)) => {
            let id = sub.get_one::<String>("id").unwrap();
            let off = sub.get_flag("off");
            set_account_excluded(cx, user_id, id.trim(), !off)?;
            println!("Account budget exclusion {}", if off { "cleared" } else { "set" });
        }
        Some(("rm", sub)) => {
            let id = sub.get_one::<String>("id").unwrap();
            delete_account(cx, user_id, id.trim())?;
            println!("Removed account {}", id.trim());
        }
        _ => {}
    }
    Ok(())
}
