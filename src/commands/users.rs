// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::context::Context;
use crate::error::{BudgetError, Result};
use crate::models::{HouseholdMember, MemberStatus, User};
use crate::ratelimit::KeyValueStore;
use crate::redact::Redacted;
use crate::store::{Collection, Operation, Query, fetch};
use crate::utils::{CURRENT_EMAIL_KEY, get_setting, new_id, set_setting};

/// Source of the signed-in user's e-mail. Identity is resolved by e-mail
/// only; nothing else from the auth layer is trusted.
pub trait AuthProvider {
    fn current_email(&self) -> Option<String>;
}

pub struct StaticAuth(pub Option<String>);

impl AuthProvider for StaticAuth {
    fn current_email(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the e-mail stored by `login` in the settings table.
pub struct SettingsAuth<'a>(pub &'a dyn KeyValueStore);

impl AuthProvider for SettingsAuth<'_> {
    fn current_email(&self) -> Option<String> {
        match get_setting(self.0, CURRENT_EMAIL_KEY) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "could not read signed-in user");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub household_id: Option<String>,
}

impl Session {
    pub fn require_household(&self) -> Result<&str> {
        self.household_id
            .as_deref()
            .ok_or_else(|| BudgetError::not_found("Household membership"))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn find_user_by_email(cx: &Context, email: &str) -> Result<Option<User>> {
    let mut users: Vec<User> = fetch(
        cx.store,
        Query::all(Collection::Users).where_eq("email", normalize_email(email)),
    )?;
    Ok(users.pop())
}

pub fn create_user(cx: &Context, email: &str, name: &str) -> Result<User> {
    let email = normalize_email(email);
    if email.is_empty() || !email.contains('@') {
        return Err(BudgetError::validation("A valid e-mail address is required"));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(BudgetError::validation("Name is required"));
    }
    if find_user_by_email(cx, &email)?.is_some() {
        return Err(BudgetError::validation("A user with this e-mail already exists"));
    }

    let user = User {
        id: new_id(),
        email,
        name: name.to_string(),
        flags: Vec::new(),
    };
    cx.store
        .transact(vec![Operation::put(Collection::Users, &user.id, &user)?])?;
    tracing::info!(user = %Redacted(&user.id), "user created");
    Ok(user)
}

pub fn resolve_session(cx: &Context, auth: &dyn AuthProvider) -> Result<Session> {
    let email = auth
        .current_email()
        .ok_or_else(|| BudgetError::access_denied("not signed in"))?;
    let user = find_user_by_email(cx, &email)?.ok_or_else(|| BudgetError::not_found("User"))?;

    let memberships: Vec<HouseholdMember> = fetch(
        cx.store,
        Query::all(Collection::HouseholdMembers)
            .where_eq("userId", user.id.as_str())
            .where_eq("status", "active"),
    )?;
    let household_id = memberships
        .into_iter()
        .find(|m| m.status == MemberStatus::Active)
        .map(|m| m.household_id);

    Ok(Session { user, household_id })
}

pub fn login(kv: &dyn KeyValueStore, cx: &Context, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let email = sub.get_one::<String>("email").unwrap();
    let user = find_user_by_email(cx, email)?.ok_or_else(|| BudgetError::not_found("User"))?;
    set_setting(kv, CURRENT_EMAIL_KEY, &user.email)?;
    println!("Signed in as {}", user.name);
    Ok(())
}

pub fn handle(cx: &Context, m: &clap::ArgMatches) -> anyhow::Result<()> {
    if let Some(("add", sub)) = m.subcommand() {
        let email = sub.get_one::<String>("email").unwrap();
        let name = sub.get_one::<String>("name").unwrap();
        let user = create_user(cx, email, name)?;
        println!("Added user '{}' <{}>", user.name, user.email);
    }
    Ok(())
}
