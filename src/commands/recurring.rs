// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::accounts::owned_account;
use crate::commands::transactions::{self, NewTransaction};
use crate::commands::users::Session;
use crate::context::Context;
use crate::error::{BudgetError, Result};
use crate::models::{RecurringTemplate, Transaction, TransactionKind};
use crate::period::clamp_day;
use crate::ratelimit::EntityType;
use crate::store::{Collection, Operation, Query, fetch, fetch_one};
use crate::utils::{maybe_print_json, new_id, parse_decimal, pretty_table, require_positive};
use chrono::Datelike;
use rust_decimal::Decimal;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct NewTemplate {
    pub user_id: String,
    pub household_id: String,
    pub account_id: String,
    pub category_id: Option<String>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub payee: String,
    pub recurring_day: u32,
}

pub fn create_template(cx: &Context, req: NewTemplate) -> Result<RecurringTemplate> {
    require_positive(req.amount)?;
    if !(1..=31).contains(&req.recurring_day) {
        return Err(BudgetError::validation("Recurring day must be between 1 and 31"));
    }
    owned_account(cx, &req.user_id, &req.account_id)?;
    cx.check_rate(EntityType::Template)?;
    let template = RecurringTemplate {
        id: new_id(),
        user_id: req.user_id,
        household_id: req.household_id,
        account_id: req.account_id,
        category_id: req.category_id,
        kind: req.kind,
        amount: req.amount,
        payee: req.payee.trim().to_string(),
        recurring_day: req.recurring_day,
        is_active: true,
        last_created_date: None,
    };
    cx.store.transact(vec![Operation::put(
        Collection::RecurringTemplates,
        &template.id,
        &template,
    )?])?;
    cx.record_mutation(EntityType::Template);
    Ok(template)
}

pub fn list_templates(cx: &Context, user_id: &str) -> Result<Vec<RecurringTemplate>> {
    let mut templates: Vec<RecurringTemplate> = fetch(
        cx.store,
        Query::all(Collection::RecurringTemplates).where_eq("userId", user_id),
    )?;
    templates.sort_by_key(|t| t.recurring_day);
    Ok(templates)
}

pub fn deactivate_template(cx: &Context, user_id: &str, template_id: &str) -> Result<()> {
    let template: RecurringTemplate = fetch_one(cx.store, Collection::RecurringTemplates, template_id)?
        .ok_or_else(|| BudgetError::not_found("Recurring template"))?;
    if template.user_id != user_id {
        return Err(BudgetError::access_denied("template belongs to another user"));
    }
    cx.store.transact(vec![Operation::update(
        Collection::RecurringTemplates,
        &template.id,
        json!({ "isActive": false }),
    )])?;
    Ok(())
}

/// Book this month's occurrence of every active template that is due and
/// not yet booked. The day is clamped to the month's length. Each booking
/// and its `lastCreatedDate` stamp commit in one batch.
pub fn materialize_due(cx: &Context, user_id: &str) -> Result<Vec<Transaction>> {
    let due: Vec<RecurringTemplate> = fetch(
        cx.store,
        Query::all(Collection::RecurringTemplates)
            .where_eq("userId", user_id)
            .where_eq("isActive", true),
    )?;

    let mut created = Vec::new();
    for t in due {
        let occurrence = clamp_day(cx.today.year(), cx.today.month(), t.recurring_day)?;
        if occurrence > cx.today || t.last_created_date.is_some_and(|d| d >= occurrence) {
            continue;
        }
        let stamp = Operation::update(
            Collection::RecurringTemplates,
            &t.id,
            json!({ "lastCreatedDate": occurrence }),
        );
        let tx = transactions::create_with(
            cx,
            NewTransaction {
                user_id: t.user_id.clone(),
                household_id: t.household_id.clone(),
                account_id: t.account_id.clone(),
                category_id: t.category_id.clone(),
                kind: t.kind,
                amount: t.amount,
                date: occurrence.to_string(),
                payee: t.payee.clone(),
                note: None,
                is_excluded_from_budget: false,
                shared: None,
            },
            vec![stamp],
        )?;
        created.push(tx);
    }
    Ok(created)
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
            let t = create_template(
                cx,
                NewTemplate {
                    user_id: user_id.clone(),
                    household_id: session.require_household()?.to_string(),
                    account_id: sub.get_one::<String>("account").unwrap().trim().to_string(),
                    category_id: sub.get_one::<String>("category").map(|c| c.trim().to_string()),
                    kind,
                    amount: parse_decimal(sub.get_one::<String>("amount").unwrap())?,
                    payee: sub.get_one::<String>("payee").cloned().unwrap_or_default(),
                    recurring_day: *sub.get_one::<u32>("day").unwrap(),
                },
            )?;
            println!("Added recurring {} on day {} ({})", t.kind, t.recurring_day, t.id);
        }
        Some(("list", sub)) => {
            let templates = list_templates(cx, user_id)?;
            if !maybe_print_json(sub.get_flag("json"), &templates)? {
                let rows = templates
                    .into_iter()
                    .map(|t| {
                        vec![
                            t.id,
                            t.recurring_day.to_string(),
                            t.kind.to_string(),
                            format!("{:.2}", t.amount),
                            t.payee,
                            if t.is_active { "active".into() } else { "stopped".into() },
                            t.last_created_date.map(|d| d.to_string()).unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Day", "Type", "Amount", "Payee", "State", "Last"], rows)
                );
            }
        }
        Some(("stop", sub)) => {
            let id = sub.get_one::<String>("id").unwrap().trim();
            deactivate_template(cx, user_id, id)?;
            println!("Stopped recurring template {}", id);
        }
        Some(("run", _)) => {
            let created = materialize_due(cx, user_id)?;
            println!("Booked {} recurring transactions", created.len());
        }
        _ => {}
    }
    Ok(())
}
