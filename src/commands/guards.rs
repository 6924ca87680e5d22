// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Pre-delete reference checks. The store has no foreign keys, so nothing
//! may be deleted while other documents still point at it. A check that
//! cannot read its dependents refuses the delete.

use crate::context::Context;
use crate::models::CategoryGroup;
use crate::redact::Redacted;
use crate::store::{Collection, Query, StoreError, fetch_one};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCheck {
    Allowed,
    Blocked(String),
}

impl DeleteCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DeleteCheck::Allowed)
    }
}

struct Dependent {
    count: usize,
    singular: &'static str,
    plural: &'static str,
}

fn count(cx: &Context, query: Query) -> Result<usize, StoreError> {
    let collection = query.collection;
    let res = cx.store.query_once(&[query])?;
    Ok(res.raw(collection).len())
}

fn dependent(cx: &Context, query: Query, singular: &'static str, plural: &'static str) -> Result<Dependent, StoreError> {
    Ok(Dependent {
        count: count(cx, query)?,
        singular,
        plural,
    })
}

fn verdict(subject: &str, deps: &[Dependent]) -> DeleteCheck {
    let parts: Vec<String> = deps
        .iter()
        .filter(|d| d.count > 0)
        .map(|d| {
            let noun = if d.count == 1 { d.singular } else { d.plural };
            format!("{} {}", d.count, noun)
        })
        .collect();
    if parts.is_empty() {
        DeleteCheck::Allowed
    } else {
        DeleteCheck::Blocked(format!(
            "Cannot delete {}: it is still used by {}",
            subject,
            parts.join(", ")
        ))
    }
}

fn fail_closed(subject: &str, id: &str, err: StoreError) -> DeleteCheck {
    tracing::error!(subject, id = %Redacted(id), error = %err, "dependency check failed");
    DeleteCheck::Blocked(format!(
        "Cannot delete {}: its dependencies could not be verified, try again later",
        subject
    ))
}

pub fn check_account_deletable(cx: &Context, account_id: &str) -> DeleteCheck {
    let deps = || -> Result<Vec<Dependent>, StoreError> {
        Ok(vec![
            dependent(
                cx,
                Query::all(Collection::Transactions).where_eq("accountId", account_id),
                "transaction",
                "transactions",
            )?,
            dependent(
                cx,
                Query::all(Collection::RecurringTemplates).where_eq("accountId", account_id),
                "recurring template",
                "recurring templates",
            )?,
            dependent(
                cx,
                Query::all(Collection::Settlements).where_eq("payerAccountId", account_id),
                "outgoing settlement",
                "outgoing settlements",
            )?,
            dependent(
                cx,
                Query::all(Collection::Settlements).where_eq("receiverAccountId", account_id),
                "incoming settlement",
                "incoming settlements",
            )?,
        ])
    };
    match deps() {
        Ok(deps) => verdict("account", &deps),
        Err(e) => fail_closed("account", account_id, e),
    }
}

pub fn check_category_deletable(cx: &Context, category_id: &str) -> DeleteCheck {
    let deps = || -> Result<Vec<Dependent>, StoreError> {
        Ok(vec![
            dependent(
                cx,
                Query::all(Collection::Transactions).where_eq("categoryId", category_id),
                "transaction",
                "transactions",
            )?,
            dependent(
                cx,
                Query::all(Collection::Budgets).where_eq("categoryId", category_id),
                "budget",
                "budgets",
            )?,
            dependent(
                cx,
                Query::all(Collection::RecurringTemplates).where_eq("categoryId", category_id),
                "recurring template",
                "recurring templates",
            )?,
            dependent(
                cx,
                Query::all(Collection::CategoryMappings).where_eq("categoryId", category_id),
                "import mapping",
                "import mappings",
            )?,
            dependent(
                cx,
                Query::all(Collection::Settlements).where_eq("categoryId", category_id),
                "settlement",
                "settlements",
            )?,
        ])
    };
    match deps() {
        Ok(deps) => verdict("category", &deps),
        Err(e) => fail_closed("category", category_id, e),
    }
}

pub fn check_category_group_deletable(cx: &Context, group_id: &str) -> DeleteCheck {
    let check = || -> Result<DeleteCheck, StoreError> {
        let group: Option<CategoryGroup> = fetch_one(cx.store, Collection::CategoryGroups, group_id)?;
        if group.is_some_and(|g| g.is_default) {
            return Ok(DeleteCheck::Blocked(
                "Cannot delete category group: default groups are protected".into(),
            ));
        }
        let deps = vec![dependent(
            cx,
            Query::all(Collection::Categories).where_eq("categoryGroupId", group_id),
            "category",
            "categories",
        )?];
        Ok(verdict("category group", &deps))
    };
    check().unwrap_or_else(|e| fail_closed("category group", group_id, e))
}

/// The requesting member does not count against the household.
pub fn check_household_deletable(cx: &Context, household_id: &str, requesting_user_id: &str) -> DeleteCheck {
    let deps = || -> Result<Vec<Dependent>, StoreError> {
        let res = cx.store.query_once(&[Query::all(Collection::HouseholdMembers)
            .where_eq("householdId", household_id)
            .where_eq("status", "active")])?;
        let others = res
            .raw(Collection::HouseholdMembers)
            .iter()
            .filter(|m| m.get("userId").and_then(|v| v.as_str()) != Some(requesting_user_id))
            .count();
        Ok(vec![
            Dependent {
                count: others,
                singular: "other active member",
                plural: "other active members",
            },
            dependent(
                cx,
                Query::all(Collection::Transactions).where_eq("householdId", household_id),
                "transaction",
                "transactions",
            )?,
            dependent(
                cx,
                Query::all(Collection::RecurringTemplates).where_eq("householdId", household_id),
                "recurring template",
                "recurring templates",
            )?,
            dependent(
                cx,
                Query::all(Collection::Settlements).where_eq("householdId", household_id),
                "settlement",
                "settlements",
            )?,
        ])
    };
    match deps() {
        Ok(deps) => verdict("household", &deps),
        Err(e) => fail_closed("household", household_id, e),
    }
}
