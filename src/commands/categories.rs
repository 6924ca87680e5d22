// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::guards::{DeleteCheck, check_category_deletable, check_category_group_deletable};
use crate::commands::users::Session;
use crate::context::Context;
use crate::error::{BudgetError, Result};
use crate::models::{Category, CategoryGroup, TransactionKind};
use crate::ratelimit::EntityType;
use crate::store::{Collection, Operation, Query, fetch, fetch_one};
use crate::utils::{new_id, pretty_table};
use std::collections::HashMap;

pub fn create_category_group(
    cx: &Context,
    user_id: Option<&str>,
    name: &str,
    kind: TransactionKind,
    display_order: i32,
    is_default: bool,
) -> Result<CategoryGroup> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BudgetError::validation("Category group name is required"));
    }
    cx.check_rate(EntityType::Category)?;
    let group = CategoryGroup {
        id: new_id(),
        name: name.to_string(),
        kind,
        display_order,
        is_default,
        created_by_user_id: user_id.map(str::to_string),
    };
    cx.store
        .transact(vec![Operation::put(Collection::CategoryGroups, &group.id, &group)?])?;
    cx.record_mutation(EntityType::Category);
    Ok(group)
}

pub fn create_category(cx: &Context, user_id: &str, name: &str, group_id: Option<&str>) -> Result<Category> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BudgetError::validation("Category name is required"));
    }
    if let Some(gid) = group_id {
        let group: Option<CategoryGroup> = fetch_one(cx.store, Collection::CategoryGroups, gid)?;
        if group.is_none() {
            return Err(BudgetError::not_found("Category group"));
        }
    }
    cx.check_rate(EntityType::Category)?;
    let category = Category {
        id: new_id(),
        name: name.to_string(),
        category_group_id: group_id.map(str::to_string),
        created_by_user_id: Some(user_id.to_string()),
    };
    cx.store
        .transact(vec![Operation::put(Collection::Categories, &category.id, &category)?])?;
    cx.record_mutation(EntityType::Category);
    Ok(category)
}

/// Categories visible to the user: their own plus unowned shared ones.
pub fn list_categories(cx: &Context, user_id: &str) -> Result<Vec<Category>> {
    let mut cats: Vec<Category> = fetch(cx.store, Query::all(Collection::Categories))?;
    cats.retain(|c| c.created_by_user_id.as_deref().is_none_or(|u| u == user_id));
    cats.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(cats)
}

pub fn list_category_groups(cx: &Context, user_id: &str) -> Result<Vec<CategoryGroup>> {
    let mut groups: Vec<CategoryGroup> = fetch(cx.store, Query::all(Collection::CategoryGroups))?;
    groups.retain(|g| g.created_by_user_id.as_deref().is_none_or(|u| u == user_id));
    groups.sort_by_key(|g| g.display_order);
    Ok(groups)
}

/// id -> name for every category, used to label joined rows.
pub fn category_names(cx: &Context) -> Result<HashMap<String, String>> {
    let cats: Vec<Category> = fetch(cx.store, Query::all(Collection::Categories))?;
    Ok(cats.into_iter().map(|c| (c.id, c.name)).collect())
}

pub fn delete_category(cx: &Context, user_id: &str, category_id: &str) -> Result<()> {
    let category: Category = fetch_one(cx.store, Collection::Categories, category_id)?
        .ok_or_else(|| BudgetError::not_found("Category"))?;
    if category.created_by_user_id.as_deref() != Some(user_id) {
        return Err(BudgetError::access_denied("category belongs to another user"));
    }
    if let DeleteCheck::Blocked(reason) = check_category_deletable(cx, category_id) {
        return Err(BudgetError::validation(reason));
    }
    cx.check_rate(EntityType::Category)?;
    cx.store
        .transact(vec![Operation::delete(Collection::Categories, category_id)])?;
    cx.record_mutation(EntityType::Category);
    Ok(())
}

pub fn delete_category_group(cx: &Context, user_id: &str, group_id: &str) -> Result<()> {
    let group: CategoryGroup = fetch_one(cx.store, Collection::CategoryGroups, group_id)?
        .ok_or_else(|| BudgetError::not_found("Category group"))?;
    if group.created_by_user_id.as_deref().is_some_and(|u| u != user_id) {
        return Err(BudgetError::access_denied("category group belongs to another user"));
    }
    if let DeleteCheck::Blocked(reason) = check_category_group_deletable(cx, group_id) {
        return Err(BudgetError::validation(reason));
    }
    cx.store
        .transact(vec![Operation::delete(Collection::CategoryGroups, group_id)])?;
    Ok(())
}

pub fn handle(cx: &Context, session: &Session, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let user_id = &session.user.id;
    match m.subcommand() {
        Some(("group-add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let kind = sub
                .get_one::<String>("type")
                .unwrap()
                .parse::<TransactionKind>()
                .map_err(BudgetError::Validation)?;
            let order = sub.get_one::<i32>("order").copied().unwrap_or(0);
            let g = create_category_group(cx, Some(user_id), name, kind, order, false)?;
            println!("Added category group '{}' ({})", g.name, g.id);
        }
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let group = sub.get_one::<String>("group").map(|s| s.trim());
            let c = create_category(cx, user_id, name, group)?;
            println!("Added category '{}' ({})", c.name, c.id);
        }
        Some(("list", _)) => {
            let groups: HashMap<String, String> = list_category_groups(cx, user_id)?
                .into_iter()
                .map(|g| (g.id, g.name))
                .collect();
            let rows = list_categories(cx, user_id)?
                .into_iter()
                .map(|c| {
                    let group = c
                        .category_group_id
                        .as_ref()
                        .and_then(|g| groups.get(g).cloned())
                        .unwrap_or_default();
                    vec![c.id, c.name, group]
                })
                .collect();
            println!("{}", pretty_table(&["ID", "Category", "Group"], rows));
        }
        Some(("rm", sub)) => {
            let id = sub.get_one::<String>("id").unwrap().trim();
            if sub.get_flag("group") {
                delete_category_group(cx, user_id, id)?;
                println!("Removed category group {}", id);
            } else {
                delete_category(cx, user_id, id)?;
                println!("Removed category {}", id);
            }
        }
        _ => {}
    }
    Ok(())
}
