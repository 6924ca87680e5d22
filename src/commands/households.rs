// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::guards::{DeleteCheck, check_household_deletable};
use crate::commands::users::{Session, find_user_by_email};
use crate::context::Context;
use crate::error::{BudgetError, Result};
use crate::models::{Household, HouseholdMember, MemberRole, MemberStatus};
use crate::period::validate_payday;
use crate::ratelimit::EntityType;
use crate::redact::Redacted;
use crate::store::{Collection, Operation, Query, fetch, fetch_one};
use crate::utils::{new_id, parse_decimal, pretty_table};
use rust_decimal::Decimal;
use serde_json::json;

pub fn get_household(cx: &Context, household_id: &str) -> Result<Option<Household>> {
    Ok(fetch_one(cx.store, Collection::Households, household_id)?)
}

pub fn find_active_membership(
    cx: &Context,
    user_id: &str,
    household_id: &str,
) -> Result<Option<HouseholdMember>> {
    let mut rows: Vec<HouseholdMember> = fetch(
        cx.store,
        Query::all(Collection::HouseholdMembers)
            .where_eq("userId", user_id)
            .where_eq("householdId", household_id)
            .where_eq("status", "active"),
    )?;
    Ok(rows.pop())
}

pub fn active_members(cx: &Context, household_id: &str) -> Result<Vec<HouseholdMember>> {
    Ok(fetch(
        cx.store,
        Query::all(Collection::HouseholdMembers)
            .where_eq("householdId", household_id)
            .where_eq("status", "active"),
    )?)
}

pub fn create_household(
    cx: &Context,
    creator_user_id: &str,
    name: &str,
    currency: &str,
    payday_day: Option<u32>,
    default_split_percentage: Option<Decimal>,
) -> Result<(Household, HouseholdMember)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BudgetError::validation("Household name is required"));
    }
    let payday_day = payday_day.map(validate_payday).transpose()?;
    if let Some(pct) = default_split_percentage {
        if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
            return Err(BudgetError::validation("Split percentage must be between 0 and 100"));
        }
    }
    cx.check_rate(EntityType::Household)?;

    let household = Household {
        id: new_id(),
        name: name.to_string(),
        currency: currency.trim().to_uppercase(),
        payday_day,
        default_split_percentage,
    };
    let member = HouseholdMember {
        id: new_id(),
        household_id: household.id.clone(),
        user_id: creator_user_id.to_string(),
        status: MemberStatus::Active,
        role: MemberRole::Admin,
        payday_day: None,
    };
    cx.store.transact(vec![
        Operation::put(Collection::Households, &household.id, &household)?,
        Operation::put(Collection::HouseholdMembers, &member.id, &member)?,
    ])?;
    cx.record_mutation(EntityType::Household);
    tracing::info!(household = %Redacted(&household.id), "household created");
    Ok((household, member))
}

pub fn add_member(
    cx: &Context,
    household_id: &str,
    user_id: &str,
    role: MemberRole,
) -> Result<HouseholdMember> {
    if get_household(cx, household_id)?.is_none() {
        return Err(BudgetError::not_found("Household"));
    }
    if find_active_membership(cx, user_id, household_id)?.is_some() {
        return Err(BudgetError::validation("User is already an active member of this household"));
    }
    let member = HouseholdMember {
        id: new_id(),
        household_id: household_id.to_string(),
        user_id: user_id.to_string(),
        status: MemberStatus::Active,
        role,
        payday_day: None,
    };
    cx.store.transact(vec![Operation::put(
        Collection::HouseholdMembers,
        &member.id,
        &member,
    )?])?;
    Ok(member)
}

pub fn remove_member(cx: &Context, household_id: &str, user_id: &str) -> Result<()> {
    let member = find_active_membership(cx, user_id, household_id)?
        .ok_or_else(|| BudgetError::not_found("Household member"))?;
    cx.store.transact(vec![Operation::update(
        Collection::HouseholdMembers,
        &member.id,
        json!({ "status": "removed" }),
    )])?;
    Ok(())
}

/// Set or clear the member's personal payday.
pub fn set_member_payday(
    cx: &Context,
    household_id: &str,
    user_id: &str,
    payday_day: Option<u32>,
) -> Result<()> {
    let payday_day = payday_day.map(validate_payday).transpose()?;
    let member = find_active_membership(cx, user_id, household_id)?
        .ok_or_else(|| BudgetError::not_found("Household member"))?;
    cx.store.transact(vec![Operation::update(
        Collection::HouseholdMembers,
        &member.id,
        json!({ "paydayDay": payday_day }),
    )])?;
    Ok(())
}

pub fn set_household_payday(
    cx: &Context,
    requesting_user_id: &str,
    household_id: &str,
    payday_day: u32,
) -> Result<()> {
    let payday_day = validate_payday(payday_day)?;
    require_admin(cx, requesting_user_id, household_id)?;
    cx.store.transact(vec![Operation::update(
        Collection::Households,
        household_id,
        json!({ "paydayDay": payday_day }),
    )])?;
    Ok(())
}

fn require_admin(cx: &Context, user_id: &str, household_id: &str) -> Result<HouseholdMember> {
    let member = find_active_membership(cx, user_id, household_id)?
        .ok_or_else(|| BudgetError::access_denied("not a member of this household"))?;
    if member.role != MemberRole::Admin {
        return Err(BudgetError::access_denied("household admin role required"));
    }
    Ok(member)
}

pub fn delete_household(cx: &Context, requesting_user_id: &str, household_id: &str) -> Result<()> {
    if get_household(cx, household_id)?.is_none() {
        return Err(BudgetError::not_found("Household"));
    }
    require_admin(cx, requesting_user_id, household_id)?;
    if let DeleteCheck::Blocked(reason) = check_household_deletable(cx, household_id, requesting_user_id) {
        return Err(BudgetError::validation(reason));
    }

    let memberships: Vec<HouseholdMember> = fetch(
        cx.store,
        Query::all(Collection::HouseholdMembers).where_eq("householdId", household_id),
    )?;
    let mut ops: Vec<Operation> = memberships
        .iter()
        .map(|m| Operation::delete(Collection::HouseholdMembers, &m.id))
        .collect();
    ops.push(Operation::delete(Collection::Households, household_id));
    cx.store.transact(ops)?;
    tracing::info!(household = %Redacted(household_id), "household deleted");
    Ok(())
}

pub fn handle(cx: &Context, session: &Session, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let ccy = sub.get_one::<String>("currency").unwrap();
            let payday = sub.get_one::<u32>("payday").copied();
            let split = sub
                .get_one::<String>("split")
                .map(|s| parse_decimal(s))
                .transpose()?;
            let (h, _) = create_household(cx, &session.user.id, name, ccy, payday, split)?;
            println!("Created household '{}' ({})", h.name, h.id);
        }
        Some(("join", sub)) => {
            let household_id = match sub.get_one::<String>("household") {
                Some(id) => id.clone(),
                None => session.require_household()?.to_string(),
            };
            let email = sub.get_one::<String>("email").unwrap();
            let user = find_user_by_email(cx, email)?
                .ok_or_else(|| BudgetError::not_found("User"))?;
            require_admin(cx, &session.user.id, &household_id)?;
            add_member(cx, &household_id, &user.id, MemberRole::Member)?;
            println!("Added {} to household", user.name);
        }
        Some(("leave", _)) => {
            let household_id = session.require_household()?;
            remove_member(cx, household_id, &session.user.id)?;
            println!("Left household");
        }
        Some(("members", _)) => {
            let household_id = session.require_household()?;
            let rows = active_members(cx, household_id)?
                .into_iter()
                .map(|m| {
                    vec![
                        m.user_id,
                        format!("{:?}", m.role).to_lowercase(),
                        m.payday_day.map(|d| d.to_string()).unwrap_or_default(),
                    ]
                })
                .collect();
            println!("{}", pretty_table(&["User", "Role", "Payday"], rows));
        }
        Some(("payday", sub)) => {
            let household_id = session.require_household()?;
            let day = sub.get_one::<u32>("day").copied();
            if sub.get_flag("household") {
                let day = day.ok_or_else(|| BudgetError::validation("--day is required"))?;
                set_household_payday(cx, &session.user.id, household_id, day)?;
                println!("Household payday set to {}", day);
            } else {
                set_member_payday(cx, household_id, &session.user.id, day)?;
                match day {
                    Some(d) => println!("Personal payday set to {}", d),
                    None => println!("Personal payday cleared"),
                }
            }
        }
        Some(("rm", _)) => {
            let household_id = session.require_household()?;
            delete_household(cx, &session.user.id, household_id)?;
            println!("Removed household");
        }
        _ => {}
    }
    Ok(())
}
